//! Memoization Adapter Module
//!
//! Wraps an arbitrary asynchronous producer so repeated calls with the
//! same arguments are served from the cache instead of recomputed. The
//! key is derived deterministically from the serialized arguments, so
//! identical argument sets always map to the same entry.
//!
//! This is a memoization convenience, not a single-flight lock:
//! concurrent calls with the same key may each invoke the producer, and
//! the last store wins.

use std::future::Future;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::document::Document;
use crate::error::{CacheError, Result};
use crate::manager::CacheManager;

/// TTL applied to memoized results unless overridden, in seconds.
pub const DEFAULT_MEMO_TTL_SECS: u64 = 20;

// == Memo Config ==
/// Tuning for a memoized producer.
#[derive(Debug, Clone)]
pub struct MemoConfig {
    /// Prefix distinguishing this producer's keys from others sharing
    /// the cache
    pub namespace: String,
    /// TTL for stored results; None = never expire (subject to the
    /// cache's own default)
    pub ttl: Option<u64>,
    /// Store results through the columnar codec
    pub columnar: bool,
}

impl Default for MemoConfig {
    fn default() -> Self {
        Self {
            namespace: "memo".to_string(),
            ttl: Some(DEFAULT_MEMO_TTL_SECS),
            columnar: true,
        }
    }
}

impl MemoConfig {
    /// A default configuration under the given namespace.
    pub fn namespaced(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            ..Self::default()
        }
    }
}

// == Key Derivation ==
/// Derives the cache key for an argument set: canonical JSON of the
/// arguments, hashed with SHA-256 and prefixed with the namespace.
pub fn memo_key<A: Serialize>(namespace: &str, args: &A) -> Result<String> {
    let serialized = serde_json::to_string(args)
        .map_err(|e| CacheError::EncodeFailure(format!("unserializable memo arguments: {e}")))?;
    let digest = Sha256::digest(serialized.as_bytes());
    Ok(format!("{namespace}:{}", hex::encode(digest)))
}

// == Memoized ==
/// A producer function paired with a cache.
///
/// The wrapped call signature is preserved: `call` takes the producer's
/// arguments and returns the producer's result type, suspending only
/// while the producer itself runs.
pub struct Memoized<F> {
    cache: Arc<CacheManager>,
    config: MemoConfig,
    producer: F,
}

impl<F> Memoized<F> {
    /// Wraps a producer with default memoization settings.
    pub fn new(cache: Arc<CacheManager>, producer: F) -> Self {
        Self::with_config(cache, MemoConfig::default(), producer)
    }

    /// Wraps a producer with explicit settings.
    pub fn with_config(cache: Arc<CacheManager>, config: MemoConfig, producer: F) -> Self {
        Self {
            cache,
            config,
            producer,
        }
    }

    // == Call ==
    /// Returns the cached result for these arguments, or invokes the
    /// producer and stores what it returns.
    ///
    /// A cached value that no longer matches the producer's result type
    /// counts as a miss and is recomputed. Cache failures degrade to
    /// invoking the producer: a broken cache must not break the call.
    pub async fn call<A, T, E, Fut>(&self, args: A) -> std::result::Result<T, E>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        A: Serialize,
        T: Serialize + DeserializeOwned,
    {
        let key = match memo_key(&self.config.namespace, &args) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "memo key derivation failed, invoking producer");
                return (self.producer)(args).await;
            }
        };

        match self.cache.get(&key) {
            Ok(Some(doc)) => match doc.into_typed::<T>() {
                Ok(value) => {
                    debug!(key = %key, "memoized result served from cache");
                    return Ok(value);
                }
                Err(e) => {
                    debug!(key = %key, error = %e, "cached value has unexpected shape, recomputing");
                }
            },
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "cache read failed, invoking producer"),
        }

        let result = (self.producer)(args).await?;

        match Document::from_typed(&result) {
            Ok(doc) => {
                if let Err(e) = self
                    .cache
                    .set(&key, &doc, self.config.ttl, self.config.columnar)
                {
                    warn!(key = %key, error = %e, "failed to store memoized result");
                }
            }
            Err(e) => warn!(key = %key, error = %e, "memoized result is not cacheable"),
        }

        Ok(result)
    }
}
