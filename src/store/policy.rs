//! Eviction Policy Module
//!
//! Names the rule used to pick a victim when the store exceeds its byte
//! budget. Unknown policy names fail at configuration time, never on
//! first eviction.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

// == Eviction Policy ==
/// Victim-selection rule for size-bounded eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvictionPolicy {
    /// Evict the entry written longest ago
    LeastRecentlyStored,
    /// Evict the entry read or written longest ago
    LeastRecentlyUsed,
    /// Evict the entry with the fewest accesses
    LeastFrequentlyUsed,
}

impl EvictionPolicy {
    /// Canonical policy name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionPolicy::LeastRecentlyStored => "least-recently-stored",
            EvictionPolicy::LeastRecentlyUsed => "least-recently-used",
            EvictionPolicy::LeastFrequentlyUsed => "least-frequently-used",
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvictionPolicy {
    type Err = CacheError;

    /// Accepts both the canonical names and the short aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lrs" | "least-recently-stored" => Ok(EvictionPolicy::LeastRecentlyStored),
            "lru" | "least-recently-used" => Ok(EvictionPolicy::LeastRecentlyUsed),
            "lfu" | "least-frequently-used" => Ok(EvictionPolicy::LeastFrequentlyUsed),
            other => Err(CacheError::InvalidConfig(format!(
                "unknown eviction policy '{other}' (expected lrs, lru or lfu)"
            ))),
        }
    }
}
