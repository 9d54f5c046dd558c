//! Replay-everything stream
//!
//! Keeps every value ever yielded. A consumer that starts late receives the
//! whole history in order, then the live values. Nothing is ever evicted,
//! so a long-lived stream grows without bound; past the configured
//! threshold each doubling of the buffer is logged as a warning.

use std::sync::Arc;

use flowsync_core::Lock;

use super::channel::{self, Registry, RegistryOwner, Values};
use crate::config::StreamConfig;

/// Unbounded append-only stream with full replay
pub struct BufferedStream<T> {
    state: Arc<Lock<BufferedState<T>>>,
    config: StreamConfig,
}

struct BufferedState<T> {
    registry: Registry<T>,
    buffer: Vec<T>,
    finished: bool,
}

impl<T: Send + 'static> RegistryOwner<T> for BufferedState<T> {
    fn registry(&mut self) -> &mut Registry<T> {
        &mut self.registry
    }
}

impl<T: Clone + Send + 'static> BufferedStream<T> {
    pub fn new() -> Self {
        Self::with_config(StreamConfig::global().clone())
    }

    pub fn with_config(config: StreamConfig) -> Self {
        Self {
            state: Arc::new(Lock::new(BufferedState {
                registry: Registry::new(),
                buffer: Vec::new(),
                finished: false,
            })),
            config,
        }
    }

    /// Append a value and forward it to every consumer already iterating
    ///
    /// Ignored once the stream is finished.
    pub fn yield_value(&self, value: T) {
        let outcome = self.state.with(|s| {
            if s.finished {
                return None;
            }
            let channels = s.registry.broadcast(&value);
            s.buffer.push(value);
            Some((channels, s.buffer.len()))
        });

        let Some((channels, len)) = outcome else {
            tracing::trace!("value yielded after finish dropped");
            return;
        };
        if self.config.should_warn_buffer(len) {
            tracing::warn!(len, "BufferedStream keeps growing; every value is retained for replay");
        }
        channel::notify_all(channels);
    }

    /// Finish the stream; idempotent
    ///
    /// Consumers drain what they have and end. Consumers opened later
    /// replay the full buffer and then end.
    pub fn finish(&self) {
        let channels = self.state.with(|s| {
            if s.finished {
                return Vec::new();
            }
            s.finished = true;
            s.registry.close_all()
        });
        channel::notify_all(channels);
    }

    /// Open a consumer that replays the whole buffer before live values
    pub fn values(&self) -> Values<T> {
        let opened = self.state.with(|s| {
            if s.finished {
                return Err(s.buffer.clone());
            }
            let (id, core) = s.registry.open();
            for value in &s.buffer {
                core.push(value.clone());
            }
            Ok((id, core))
        });

        match opened {
            Ok((id, core)) => channel::consumer(&self.state, id, core),
            Err(history) => Values::finished_with(history),
        }
    }

    /// Number of values retained
    pub fn len(&self) -> usize {
        self.state.with(|s| s.buffer.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_finished(&self) -> bool {
        self.state.with(|s| s.finished)
    }
}

impl<T: Clone + Send + 'static> Default for BufferedStream<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for BufferedStream<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            config: self.config.clone(),
        }
    }
}
