//! Fancache - a disk-backed memoization cache
//!
//! Provides persistent key/value caching with TTL expiration, pluggable
//! size-bounded eviction (least-recently-stored, least-recently-used or
//! least-frequently-used), a dual raw/columnar payload encoding and an
//! adapter that memoizes asynchronous producer functions.

pub mod codec;
pub mod config;
pub mod document;
pub mod error;
pub mod manager;
pub mod memo;
pub mod stats;
pub mod store;
pub mod tasks;

pub use config::CacheConfig;
pub use document::Document;
pub use error::{CacheError, Result};
pub use manager::CacheManager;
pub use memo::{memo_key, MemoConfig, Memoized};
pub use stats::CacheStats;
pub use store::EvictionPolicy;
pub use tasks::{spawn_sweep_task, sweep_expired};
