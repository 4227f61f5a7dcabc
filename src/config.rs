//! Configuration Module
//!
//! Handles cache configuration: the store directory, byte budget,
//! eviction policy, default TTL and sweep tuning. All values can come
//! from environment variables with sensible defaults, and everything is
//! validated once at construction.

use std::env;
use std::path::PathBuf;

use crate::error::{CacheError, Result};
use crate::store::EvictionPolicy;

// == Defaults ==
/// Default store directory, relative to the working directory
pub const DEFAULT_DIR: &str = "cache_dir";

/// Default byte budget (12 GiB)
pub const DEFAULT_MAX_SIZE: u64 = 12 * 1024 * 1024 * 1024;

/// Default TTL in seconds applied when a write does not specify one
pub const DEFAULT_TTL_SECS: u64 = 600;

/// Default interval between background expiry sweeps, in seconds
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Default number of worker threads used by an expiry sweep
pub const DEFAULT_SWEEP_WORKERS: usize = 4;

// == Cache Config ==
/// Cache configuration, immutable after construction.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Filesystem location of the store (created if absent)
    pub directory: PathBuf,
    /// Hard ceiling on total store footprint, in bytes
    pub max_size_bytes: u64,
    /// Rule used to pick eviction victims when over budget
    pub eviction_policy: EvictionPolicy,
    /// TTL in seconds applied when a write gives none; None = no default expiry
    pub default_ttl: Option<u64>,
    /// Interval between background expiry sweeps, in seconds
    pub sweep_interval: u64,
    /// Worker threads per expiry sweep
    pub sweep_workers: usize,
}

impl CacheConfig {
    /// Creates a validated configuration.
    ///
    /// The policy name is parsed here so a typo fails construction, not
    /// the first eviction.
    pub fn new(
        directory: impl Into<PathBuf>,
        max_size: &str,
        eviction_policy: &str,
        default_ttl: Option<u64>,
    ) -> Result<Self> {
        Ok(Self {
            directory: directory.into(),
            max_size_bytes: parse_size(max_size)?,
            eviction_policy: eviction_policy.parse()?,
            default_ttl,
            sweep_interval: DEFAULT_SWEEP_INTERVAL_SECS,
            sweep_workers: DEFAULT_SWEEP_WORKERS,
        })
    }

    /// Loads configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DIR` - store directory (default: `cache_dir`)
    /// - `CACHE_MAX_SIZE` - byte budget, plain bytes or with a unit
    ///   suffix such as `512mb` or `12gb` (default: 12 GiB)
    /// - `CACHE_EVICTION_POLICY` - `lrs`, `lru` or `lfu`, long names
    ///   accepted (default: `lrs`)
    /// - `CACHE_DEFAULT_TTL` - default TTL in seconds, or `none` to
    ///   disable default expiry (default: 600)
    /// - `CACHE_SWEEP_INTERVAL` - sweep frequency in seconds (default: 60)
    /// - `CACHE_SWEEP_WORKERS` - sweep worker threads (default: 4)
    pub fn from_env() -> Result<Self> {
        let directory = env::var("CACHE_DIR").unwrap_or_else(|_| DEFAULT_DIR.to_string());

        let max_size_bytes = match env::var("CACHE_MAX_SIZE") {
            Ok(expr) => parse_size(&expr)?,
            Err(_) => DEFAULT_MAX_SIZE,
        };

        let eviction_policy = match env::var("CACHE_EVICTION_POLICY") {
            Ok(name) => name.parse()?,
            Err(_) => EvictionPolicy::LeastRecentlyStored,
        };

        let default_ttl = match env::var("CACHE_DEFAULT_TTL") {
            Ok(raw) if raw.eq_ignore_ascii_case("none") => None,
            Ok(raw) => Some(raw.parse().map_err(|_| {
                CacheError::InvalidConfig(format!("CACHE_DEFAULT_TTL is not a number: '{raw}'"))
            })?),
            Err(_) => Some(DEFAULT_TTL_SECS),
        };

        let sweep_interval = env::var("CACHE_SWEEP_INTERVAL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);

        let sweep_workers = env::var("CACHE_SWEEP_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_SWEEP_WORKERS);

        Ok(Self {
            directory: PathBuf::from(directory),
            max_size_bytes,
            eviction_policy,
            default_ttl,
            sweep_interval,
            sweep_workers,
        })
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_DIR),
            max_size_bytes: DEFAULT_MAX_SIZE,
            eviction_policy: EvictionPolicy::LeastRecentlyStored,
            default_ttl: Some(DEFAULT_TTL_SECS),
            sweep_interval: DEFAULT_SWEEP_INTERVAL_SECS,
            sweep_workers: DEFAULT_SWEEP_WORKERS,
        }
    }
}

// == Size Parsing ==
/// Parses a size expression: plain bytes (`"1048576"`) or a number with
/// a unit suffix (`"512kb"`, `"100mb"`, `"1.5gb"`).
pub fn parse_size(expr: &str) -> Result<u64> {
    let trimmed = expr.trim().to_ascii_lowercase();
    let invalid = || CacheError::InvalidConfig(format!("invalid size expression: '{expr}'"));

    let (number, multiplier) = if let Some(n) = trimmed.strip_suffix("gb") {
        (n.to_string(), 1024u64.pow(3))
    } else if let Some(n) = trimmed.strip_suffix("mb") {
        (n.to_string(), 1024u64.pow(2))
    } else if let Some(n) = trimmed.strip_suffix("kb") {
        (n.to_string(), 1024)
    } else if let Some(n) = trimmed.strip_suffix('b') {
        (n.to_string(), 1)
    } else {
        (trimmed, 1)
    };

    let value: f64 = number.trim().parse().map_err(|_| invalid())?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid());
    }
    Ok((value * multiplier as f64).round() as u64)
}
