//! Shard Module
//!
//! One shard of the record store: a subdirectory of entry frames plus an
//! in-memory index rebuilt by scanning the directory at open. Entry files
//! are named by the SHA-256 of their key; writes go through a temp file
//! and an atomic rename so a failed put leaves the previous value intact.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{CacheError, Result};
use crate::store::entry::{now_ms, StoredEntry};
use crate::store::policy::EvictionPolicy;
use crate::store::ENTRY_EXT;

// == Index Metadata ==
/// Per-key metadata kept in memory for expiry probes and victim selection.
///
/// `stored_at` comes from the frame and survives restarts; access
/// statistics are process-local and reset on reopen.
#[derive(Debug, Clone)]
pub(crate) struct EntryMeta {
    pub expires_at: Option<u64>,
    pub size: u64,
    pub stored_at: u64,
    pub last_access: u64,
    pub access_count: u64,
}

/// An eviction candidate: the key plus its policy metric and tiebreak.
#[derive(Debug, Clone)]
pub(crate) struct Victim {
    pub key: String,
    pub metric: u64,
    pub tiebreak: u64,
}

// == Shard ==
/// A single lock domain of the store.
#[derive(Debug)]
pub(crate) struct Shard {
    dir: PathBuf,
    index: HashMap<String, EntryMeta>,
    bytes: u64,
}

impl Shard {
    // == Open ==
    /// Opens (or creates) the shard directory and rebuilds the index.
    ///
    /// Unparseable frames and leftover temp files are removed during the
    /// scan.
    pub fn open(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

        let mut index = HashMap::new();
        let mut bytes = 0u64;

        let listing = fs::read_dir(&dir).map_err(|e| io_err(&dir, e))?;
        for dirent in listing {
            let dirent = dirent.map_err(|e| io_err(&dir, e))?;
            let path = dirent.path();
            match path.extension().and_then(|e| e.to_str()) {
                Some(ext) if ext == ENTRY_EXT => {}
                Some("tmp") => {
                    let _ = fs::remove_file(&path);
                    continue;
                }
                _ => continue,
            }

            let frame = fs::read(&path).map_err(|e| io_err(&path, e))?;
            let hint = path.file_name().map(|n| n.to_string_lossy().into_owned());
            match StoredEntry::from_frame(hint.as_deref().unwrap_or("?"), &frame) {
                Ok(entry) => {
                    bytes += entry.size;
                    index.insert(
                        entry.key.clone(),
                        EntryMeta {
                            expires_at: entry.expires_at,
                            size: entry.size,
                            stored_at: entry.stored_at,
                            last_access: entry.stored_at,
                            access_count: 0,
                        },
                    );
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "removing unreadable entry file");
                    let _ = fs::remove_file(&path);
                }
            }
        }

        debug!(dir = %dir.display(), entries = index.len(), bytes, "shard opened");
        Ok(Self { dir, index, bytes })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{}.{ENTRY_EXT}", hex::encode(digest)))
    }

    // == Put ==
    /// Writes an entry frame atomically and updates the index.
    pub fn put(&mut self, entry: &StoredEntry) -> Result<()> {
        let frame = entry.to_frame()?;
        let path = self.entry_path(&entry.key);
        let tmp = path.with_extension("tmp");

        fs::write(&tmp, &frame).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(&path, e));
        }

        if let Some(old) = self.index.remove(&entry.key) {
            self.bytes -= old.size;
        }
        self.bytes += entry.size;
        self.index.insert(
            entry.key.clone(),
            EntryMeta {
                expires_at: entry.expires_at,
                size: entry.size,
                stored_at: entry.stored_at,
                last_access: entry.stored_at,
                access_count: 0,
            },
        );
        Ok(())
    }

    // == Get ==
    /// Reads an entry back, touching its access statistics.
    ///
    /// A frame that fails validation is removed and reported as a
    /// corrupt entry; the caller treats that as a miss.
    pub fn get(&mut self, key: &str) -> Result<Option<StoredEntry>> {
        if !self.index.contains_key(key) {
            return Ok(None);
        }
        let path = self.entry_path(key);

        let frame = match fs::read(&path) {
            Ok(frame) => frame,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Index said present but the file is gone; forget it
                self.forget(key);
                return Ok(None);
            }
            Err(e) => return Err(io_err(&path, e)),
        };

        match StoredEntry::from_frame(key, &frame) {
            Ok(entry) => {
                if let Some(meta) = self.index.get_mut(key) {
                    meta.last_access = now_ms();
                    meta.access_count += 1;
                }
                Ok(Some(entry))
            }
            Err(e) => {
                self.forget(key);
                let _ = fs::remove_file(&path);
                Err(e)
            }
        }
    }

    // == Delete ==
    /// Removes an entry; absent keys are a no-op.
    pub fn delete(&mut self, key: &str) -> Result<bool> {
        let existed = self.forget(key);
        let path = self.entry_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(existed),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    /// Drops a key from the index, returning whether it was present.
    fn forget(&mut self, key: &str) -> bool {
        match self.index.remove(key) {
            Some(old) => {
                self.bytes -= old.size;
                true
            }
            None => false,
        }
    }

    // == Metadata ==
    /// Index metadata for a key, without touching access statistics or
    /// reading the entry file.
    pub fn meta(&self, key: &str) -> Option<EntryMeta> {
        self.index.get(key).cloned()
    }

    /// All keys currently indexed, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.index.keys().cloned().collect()
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    // == Victim Selection ==
    /// The shard's best eviction candidate under the given policy.
    pub fn victim(&self, policy: EvictionPolicy) -> Option<Victim> {
        self.index
            .iter()
            .map(|(key, meta)| {
                let (metric, tiebreak) = match policy {
                    EvictionPolicy::LeastRecentlyStored => (meta.stored_at, meta.last_access),
                    EvictionPolicy::LeastRecentlyUsed => (meta.last_access, meta.stored_at),
                    EvictionPolicy::LeastFrequentlyUsed => (meta.access_count, meta.last_access),
                };
                Victim {
                    key: key.clone(),
                    metric,
                    tiebreak,
                }
            })
            .min_by_key(|v| (v.metric, v.tiebreak, v.key.clone()))
    }
}

fn io_err(path: &Path, source: std::io::Error) -> CacheError {
    CacheError::StoreUnavailable {
        path: path.to_path_buf(),
        source,
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::entry::Payload;
    use tempfile::tempdir;

    fn raw(key: &str, bytes: &[u8]) -> StoredEntry {
        StoredEntry::new(key.to_string(), None, Payload::Raw(bytes.to_vec()))
    }

    #[test]
    fn test_put_get_delete() {
        let dir = tempdir().unwrap();
        let mut shard = Shard::open(dir.path().to_path_buf()).unwrap();

        shard.put(&raw("k1", b"v1")).unwrap();
        let got = shard.get("k1").unwrap().unwrap();
        assert_eq!(got.payload, Payload::Raw(b"v1".to_vec()));

        assert!(shard.delete("k1").unwrap());
        assert!(shard.get("k1").unwrap().is_none());
        assert!(!shard.delete("k1").unwrap());
    }

    #[test]
    fn test_overwrite_updates_bytes() {
        let dir = tempdir().unwrap();
        let mut shard = Shard::open(dir.path().to_path_buf()).unwrap();

        shard.put(&raw("k", b"aaaa")).unwrap();
        assert_eq!(shard.bytes(), 4);
        shard.put(&raw("k", b"bb")).unwrap();
        assert_eq!(shard.bytes(), 2);
        assert_eq!(shard.len(), 1);
    }

    #[test]
    fn test_scan_rebuilds_index() {
        let dir = tempdir().unwrap();
        {
            let mut shard = Shard::open(dir.path().to_path_buf()).unwrap();
            shard.put(&raw("alpha", b"1")).unwrap();
            shard.put(&raw("beta", b"22")).unwrap();
        }

        let mut reopened = Shard::open(dir.path().to_path_buf()).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.bytes(), 3);
        assert!(reopened.get("alpha").unwrap().is_some());
    }

    #[test]
    fn test_corrupt_file_reported_and_removed() {
        let dir = tempdir().unwrap();
        let mut shard = Shard::open(dir.path().to_path_buf()).unwrap();
        shard.put(&raw("victim", b"data")).unwrap();

        // Garble the one entry file on disk
        let file = fs::read_dir(dir.path())
            .unwrap()
            .map(|d| d.unwrap().path())
            .find(|p| p.extension().is_some_and(|e| e == ENTRY_EXT))
            .unwrap();
        fs::write(&file, b"garbage").unwrap();

        let result = shard.get("victim");
        assert!(matches!(result, Err(CacheError::CorruptEntry { .. })));
        assert!(shard.get("victim").unwrap().is_none());
        assert!(!file.exists());
    }

    #[test]
    fn test_victim_least_recently_stored() {
        let dir = tempdir().unwrap();
        let mut shard = Shard::open(dir.path().to_path_buf()).unwrap();

        let mut first = raw("old", b"1");
        first.stored_at -= 10_000;
        shard.put(&first).unwrap();
        shard.put(&raw("new", b"2")).unwrap();

        let victim = shard.victim(EvictionPolicy::LeastRecentlyStored).unwrap();
        assert_eq!(victim.key, "old");
    }

    #[test]
    fn test_victim_least_frequently_used() {
        let dir = tempdir().unwrap();
        let mut shard = Shard::open(dir.path().to_path_buf()).unwrap();
        shard.put(&raw("hot", b"1")).unwrap();
        shard.put(&raw("cold", b"2")).unwrap();

        shard.get("hot").unwrap();
        shard.get("hot").unwrap();

        let victim = shard.victim(EvictionPolicy::LeastFrequentlyUsed).unwrap();
        assert_eq!(victim.key, "cold");
    }

    #[test]
    fn test_meta_does_not_touch_access_stats() {
        let dir = tempdir().unwrap();
        let mut shard = Shard::open(dir.path().to_path_buf()).unwrap();
        shard.put(&raw("k", b"v")).unwrap();

        let before = shard.meta("k").unwrap().access_count;
        let _ = shard.meta("k");
        let after = shard.meta("k").unwrap().access_count;
        assert_eq!(before, after);
    }
}
