//! Bridges between push signals and pull streams
//!
//! ```text
//!   PushSignal ──push_to_pull──► PullStream    observes on first demand,
//!                                              buffers beyond demand
//!   PullStream ──pull_to_push──► PushSignal    subscribes on observe,
//!                                              requests unlimited
//! ```
//!
//! In both directions at most one terminal event reaches the far side and
//! no value follows it, whatever the near side does afterwards.

mod to_pull;
mod to_push;

pub use to_pull::PushToPull;
pub use to_push::PullToPush;

use crate::pull::PullStream;
use crate::push::PushSignal;

/// Adapt a push signal into a demand-negotiated pull stream
pub fn push_to_pull<S: PushSignal>(signal: S) -> PushToPull<S> {
    PushToPull::new(signal)
}

/// Adapt a pull stream into a push signal
pub fn pull_to_push<P: PullStream>(stream: P) -> PullToPush<P> {
    PullToPush::new(stream)
}
