//! Background Tasks Module
//!
//! Maintenance routines that run alongside live cache traffic.
//!
//! # Tasks
//! - Expiry sweep: removes entries whose TTL has elapsed, either
//!   on-demand or at configured intervals

mod sweep;

pub use sweep::{spawn_sweep_task, sweep_expired};
