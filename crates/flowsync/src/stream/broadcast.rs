//! Hot multi-consumer stream with optional replay of the last value

use std::sync::Arc;

use flowsync_core::Lock;

use super::channel::{self, Registry, RegistryOwner, Values};

/// Fans every emitted value out to all current consumers
///
/// The last emitted value is remembered so a new consumer can ask to start
/// with it. The producer is never slowed down: each consumer has its own
/// unbounded queue.
///
/// # Example
///
/// ```ignore
/// let broadcast = BroadcastStream::new();
/// let mut late = broadcast.stream(true);
/// broadcast.emit(1);
/// assert_eq!(late.next().await, Some(1));
/// ```
pub struct BroadcastStream<T> {
    state: Arc<Lock<BroadcastState<T>>>,
}

struct BroadcastState<T> {
    registry: Registry<T>,
    current: Option<T>,
}

impl<T: Send + 'static> RegistryOwner<T> for BroadcastState<T> {
    fn registry(&mut self) -> &mut Registry<T> {
        &mut self.registry
    }
}

impl<T: Clone + Send + 'static> BroadcastStream<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Lock::new(BroadcastState {
                registry: Registry::new(),
                current: None,
            })),
        }
    }

    /// Record `value` as the current value and send it to every consumer
    pub fn emit(&self, value: T) {
        let channels = self.state.with(|s| {
            let channels = s.registry.broadcast(&value);
            s.current = Some(value);
            channels
        });
        channel::notify_all(channels);
    }

    /// Open a new consumer
    ///
    /// With `emit_last_value` set and a value already emitted, that value
    /// is the consumer's first element. The replay and the registration
    /// happen under one lock, so no live value can slip in between.
    pub fn stream(&self, emit_last_value: bool) -> Values<T> {
        let (id, core) = self.state.with(|s| {
            let (id, core) = s.registry.open();
            if emit_last_value {
                if let Some(current) = &s.current {
                    core.push(current.clone());
                }
            }
            (id, core)
        });
        tracing::debug!(%id, emit_last_value, "broadcast consumer attached");
        channel::consumer(&self.state, id, core)
    }

    /// End every open consumer
    ///
    /// Consumers still receive what was queued before this call. Streams
    /// opened afterwards receive later emissions as usual.
    pub fn finish(&self) {
        let channels = self.state.with(|s| s.registry.close_all());
        tracing::debug!(consumers = channels.len(), "broadcast finished");
        channel::notify_all(channels);
    }

    /// The most recently emitted value
    pub fn current_value(&self) -> Option<T> {
        self.state.with(|s| s.current.clone())
    }

    /// Number of consumers currently registered
    pub fn subscriber_count(&self) -> usize {
        self.state.with(|s| s.registry.len())
    }
}

impl<T: Clone + Send + 'static> Default for BroadcastStream<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for BroadcastStream<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}
