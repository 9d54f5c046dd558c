//! # flowsync-core
//!
//! Core types for the flowsync coordination primitives.
//!
//! This crate has no notion of tasks, streams or executors. It holds the
//! leaf pieces every primitive in `flowsync` is assembled from.
//!
//! ## Modules
//!
//! - `lock` - Short-critical-section exclusive lock
//! - `cancel` - Cancellation token for cooperative cancellation
//! - `error` - Error types
//! - `id` - Subscription identifier type
//! - `demand` - Demand values and requested/satisfied accounting
//! - `env` - Environment variable utilities

pub mod lock;
pub mod cancel;
pub mod error;
pub mod id;
pub mod demand;
pub mod env;

// Re-exports for convenience
pub use lock::{Lock, LockGuard};
pub use cancel::{CancellationToken, CancelRegistration, WaitForCancellation};
pub use error::{SyncError, SyncResult};
pub use id::SubscriptionId;
pub use demand::{Demand, DemandCounter};
pub use env::{env_get, env_get_bool};
