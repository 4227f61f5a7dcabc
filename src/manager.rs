//! Cache Manager Module
//!
//! The public-facing cache: owns the record store, applies TTL semantics
//! on read and write, picks the codec path per the persisted payload tag
//! and exposes get/set/delete/key-listing operations.
//!
//! Expiry is lazy. A key moves `absent -> live -> expired -> absent`;
//! expired entries are removed on the access that finds them, and the
//! background sweep covers keys that are never read again.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::codec;
use crate::config::CacheConfig;
use crate::document::Document;
use crate::error::{CacheError, Result};
use crate::stats::{CacheStats, StatsRecorder};
use crate::store::{now_ms, DiskStore, Payload, StoredEntry};

// == Cache Manager ==
/// Disk-backed cache with TTL expiry and dual raw/columnar storage.
///
/// Constructed once at process startup and passed to whatever needs it;
/// it exclusively owns the store handle for its lifetime.
#[derive(Debug)]
pub struct CacheManager {
    store: DiskStore,
    default_ttl: Option<u64>,
    stats: StatsRecorder,
}

impl CacheManager {
    // == Open ==
    /// Opens the cache at the configured directory, creating it if
    /// absent or reusing whatever entries already live there.
    pub fn open(config: &CacheConfig) -> Result<Self> {
        let store = DiskStore::open(
            &config.directory,
            config.max_size_bytes,
            config.eviction_policy,
        )?;
        let manager = Self {
            store,
            default_ttl: config.default_ttl,
            stats: StatsRecorder::default(),
        };

        // Probing for at least one live key tells us whether this
        // directory already holds a cache from an earlier run.
        let existing = manager.live_keys()?;
        if existing.is_empty() {
            info!(dir = %config.directory.display(), "initialized empty cache");
        } else {
            info!(
                dir = %config.directory.display(),
                entries = existing.len(),
                "reusing existing cache"
            );
        }
        Ok(manager)
    }

    // == Set ==
    /// Stores a value under a key.
    ///
    /// The expiry is `now + ttl` when given, else `now + default_ttl`
    /// when configured, else never. With `columnar` set, the value goes
    /// through the columnar codec; otherwise it is stored as raw JSON
    /// bytes. The entry's size is the byte length of whichever
    /// representation is persisted.
    pub fn set(&self, key: &str, value: &Document, ttl: Option<u64>, columnar: bool) -> Result<()> {
        let start = Instant::now();

        let effective_ttl = ttl.or(self.default_ttl);
        let expires_at = effective_ttl.map(|secs| now_ms() + secs * 1000);
        if effective_ttl.is_none() {
            debug!(key, "no TTL; key will not expire");
        }

        let payload = if columnar {
            Payload::Columnar(codec::encode_document(value)?)
        } else {
            Payload::Raw(value.to_json_string()?.into_bytes())
        };

        let entry = StoredEntry::new(key.to_string(), expires_at, payload);
        let size = entry.size;
        self.store.put(entry)?;

        debug!(key, size, elapsed = ?start.elapsed(), "set");
        Ok(())
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Absent keys and entries found expired return `None`; an expired
    /// entry is deleted on the spot so stale data is never served. A
    /// corrupt entry is dropped and reads as a miss. Payloads decode per
    /// their persisted tag; a columnar blob that no longer decodes is a
    /// real error, not a silent miss.
    pub fn get(&self, key: &str) -> Result<Option<Document>> {
        let start = Instant::now();

        let entry = match self.store.get(key) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                self.stats.record_miss();
                return Ok(None);
            }
            Err(CacheError::CorruptEntry { key: k, reason }) => {
                warn!(key = %k, reason = %reason, "dropped corrupt entry");
                self.stats.record_miss();
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if entry.is_expired() {
            self.store.delete(key)?;
            self.stats.record_expiration();
            self.stats.record_miss();
            debug!(key, "expired on read");
            return Ok(None);
        }

        let doc = match &entry.payload {
            Payload::Columnar(bytes) => codec::decode_document(bytes)?,
            Payload::Raw(bytes) => Document::from_json_slice(bytes)?,
        };

        self.stats.record_hit();
        debug!(key, size = entry.size, elapsed = ?start.elapsed(), "get");
        Ok(Some(doc))
    }

    // == Delete ==
    /// Removes a key regardless of expiry state; absent keys are a
    /// quiet no-op.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.store.delete(key)?;
        Ok(())
    }

    // == Live Keys ==
    /// Sweeps every key, removing those found expired, and returns the
    /// survivors.
    pub fn live_keys(&self) -> Result<Vec<String>> {
        let mut live = Vec::new();
        for key in self.store.list_keys() {
            if !self.evict_if_expired(&key)? {
                live.push(key);
            }
        }
        Ok(live)
    }

    // == Size Of ==
    /// Stored byte size for a present key.
    pub fn size_of(&self, key: &str) -> Result<u64> {
        match self.store.meta(key) {
            Some(meta) => {
                let expired = meta.expires_at.is_some_and(|at| now_ms() >= at);
                if expired {
                    Err(CacheError::NotFound(key.to_string()))
                } else {
                    Ok(meta.size)
                }
            }
            None => Err(CacheError::NotFound(key.to_string())),
        }
    }

    // == Expiry Check ==
    /// Deletes the key if its expiry has passed; returns whether it was
    /// removed. Reads only index metadata, so it never perturbs access
    /// statistics. Used by `live_keys` and the expiry sweeper.
    pub(crate) fn evict_if_expired(&self, key: &str) -> Result<bool> {
        let Some(meta) = self.store.meta(key) else {
            return Ok(false);
        };
        let expired = meta.expires_at.is_some_and(|at| now_ms() >= at);
        if !expired {
            return Ok(false);
        }
        if self.store.delete(key)? {
            self.stats.record_expiration();
            debug!(key, "expired on sweep");
        }
        Ok(true)
    }

    /// Every stored key, expired or not.
    pub(crate) fn all_keys(&self) -> Vec<String> {
        self.store.list_keys()
    }

    // == Stats ==
    /// A snapshot of current cache metrics.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(
            self.store.len(),
            self.store.total_bytes(),
            self.store.evictions(),
        )
    }
}
