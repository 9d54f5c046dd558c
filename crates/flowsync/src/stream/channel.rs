//! Per-consumer channels and the registry that owns them
//!
//! Each consumer of a hot stream gets its own unbounded queue. The producer
//! side lives in a [`Registry`] keyed by [`SubscriptionId`]; the consumer
//! side is a [`Values`] stream. A channel leaves the registry through
//! exactly one of two doors: the producer finishing it, or the consumer
//! dropping its `Values`. Whichever comes second finds the entry gone and
//! does nothing. Dropping the registry itself, which happens when the last
//! producer handle goes away, finishes every channel still in it.

use core::pin::Pin;
use core::sync::atomic::{AtomicBool, Ordering};
use core::task::{Context, Poll};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crossbeam_queue::SegQueue;
use flowsync_core::{Lock, SubscriptionId};
use futures::task::AtomicWaker;
use futures::Stream;

/// Shared state of one consumer channel
pub(crate) struct ChannelCore<T> {
    queue: SegQueue<T>,
    waker: AtomicWaker,
    finished: AtomicBool,
}

impl<T> ChannelCore<T> {
    fn new() -> Self {
        Self {
            queue: SegQueue::new(),
            waker: AtomicWaker::new(),
            finished: AtomicBool::new(false),
        }
    }

    /// Queue a value; the consumer is not woken until [`notify`](Self::notify)
    pub(crate) fn push(&self, value: T) {
        self.queue.push(value);
    }

    /// Mark the channel finished; values already queued are still delivered
    pub(crate) fn close(&self) {
        self.finished.store(true, Ordering::Release);
    }

    /// Wake the consumer task, if it is parked
    pub(crate) fn notify(&self) {
        self.waker.wake();
    }
}

/// Anything holding a registry inside its lock
pub(crate) trait RegistryOwner<T>: Send + 'static {
    fn registry(&mut self) -> &mut Registry<T>;
}

/// Live consumer channels of one stream, keyed by subscription
pub(crate) struct Registry<T> {
    channels: HashMap<SubscriptionId, Arc<ChannelCore<T>>>,
}

impl<T> Registry<T> {
    pub(crate) fn new() -> Self {
        Self {
            channels: HashMap::new(),
        }
    }

    /// Open a channel and register it for live values
    pub(crate) fn open(&mut self) -> (SubscriptionId, Arc<ChannelCore<T>>) {
        let id = SubscriptionId::next();
        let core = Arc::new(ChannelCore::new());
        self.channels.insert(id, Arc::clone(&core));
        (id, core)
    }

    /// Remove a channel; a second removal of the same id is a no-op
    pub(crate) fn remove(&mut self, id: SubscriptionId) -> Option<Arc<ChannelCore<T>>> {
        self.channels.remove(&id)
    }

    /// Unregister every channel and mark each closed
    ///
    /// The caller wakes the returned channels once its lock is released.
    pub(crate) fn close_all(&mut self) -> Vec<Arc<ChannelCore<T>>> {
        self.channels
            .drain()
            .map(|(_, core)| {
                core.close();
                core
            })
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.channels.len()
    }
}

impl<T> Drop for Registry<T> {
    fn drop(&mut self) {
        let channels = self.close_all();
        if !channels.is_empty() {
            tracing::debug!(consumers = channels.len(), "producer dropped; finishing consumers");
        }
        notify_all(channels);
    }
}

impl<T: Clone> Registry<T> {
    /// Queue `value` on every live channel
    ///
    /// The caller wakes the returned channels once its lock is released.
    pub(crate) fn broadcast(&self, value: &T) -> Vec<Arc<ChannelCore<T>>> {
        self.channels
            .values()
            .map(|core| {
                core.push(value.clone());
                Arc::clone(core)
            })
            .collect()
    }
}

/// Wake every channel in `channels`; call with no lock held
pub(crate) fn notify_all<T>(channels: Vec<Arc<ChannelCore<T>>>) {
    for core in channels {
        core.notify();
    }
}

/// Build the consumer half for a channel registered in `owner`
///
/// Dropping the returned stream removes `id` from the owner's registry,
/// unless the owner itself is already gone.
pub(crate) fn consumer<S, T>(owner: &Arc<Lock<S>>, id: SubscriptionId, core: Arc<ChannelCore<T>>) -> Values<T>
where
    S: RegistryOwner<T>,
    T: Send + 'static,
{
    let weak: Weak<Lock<S>> = Arc::downgrade(owner);
    Values {
        core,
        on_terminate: Some(Box::new(move || {
            if let Some(owner) = weak.upgrade() {
                if owner.with(|s| s.registry().remove(id)).is_some() {
                    tracing::debug!(%id, "consumer detached");
                }
            }
        })),
    }
}

/// Consumer half of a stream channel
///
/// Yields values in the order the producer sent them and ends once the
/// producer finishes the channel. Implements [`futures::Stream`].
pub struct Values<T> {
    core: Arc<ChannelCore<T>>,
    on_terminate: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl<T> Values<T> {
    /// A stream that yields `values` and then ends, with no producer
    pub(crate) fn finished_with(values: impl IntoIterator<Item = T>) -> Self {
        let core = ChannelCore::new();
        for value in values {
            core.push(value);
        }
        core.close();
        Self {
            core: Arc::new(core),
            on_terminate: None,
        }
    }
}

impl<T> Stream for Values<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        if let Some(value) = self.core.queue.pop() {
            return Poll::Ready(Some(value));
        }

        self.core.waker.register(cx.waker());

        if let Some(value) = self.core.queue.pop() {
            return Poll::Ready(Some(value));
        }
        if self.core.finished.load(Ordering::Acquire) {
            // Values pushed before close() are visible once we see the flag
            return Poll::Ready(self.core.queue.pop());
        }
        Poll::Pending
    }
}

impl<T> Drop for Values<T> {
    fn drop(&mut self) {
        if let Some(on_terminate) = self.on_terminate.take() {
            on_terminate();
        }
    }
}

impl<T> std::fmt::Debug for Values<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Values")
            .field("queued", &self.core.queue.len())
            .field("finished", &self.core.finished.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    struct Owner {
        registry: Registry<u32>,
    }

    impl RegistryOwner<u32> for Owner {
        fn registry(&mut self) -> &mut Registry<u32> {
            &mut self.registry
        }
    }

    fn owner() -> Arc<Lock<Owner>> {
        Arc::new(Lock::new(Owner {
            registry: Registry::new(),
        }))
    }

    #[test]
    fn test_broadcast_reaches_consumer() {
        let owner = owner();
        let (id, core) = owner.with(|s| s.registry.open());
        let mut values = task::spawn(consumer(&owner, id, core));

        assert_pending!(values.poll_next());
        let channels = owner.with(|s| s.registry.broadcast(&7));
        notify_all(channels);

        assert!(values.is_woken());
        assert_ready_eq!(values.poll_next(), Some(7));
    }

    #[test]
    fn test_close_delivers_queued_then_ends() {
        let owner = owner();
        let (id, core) = owner.with(|s| s.registry.open());
        let mut values = task::spawn(consumer(&owner, id, core));

        let channels = owner.with(|s| {
            s.registry.broadcast(&1);
            s.registry.broadcast(&2);
            s.registry.close_all()
        });
        notify_all(channels);

        assert_ready_eq!(values.poll_next(), Some(1));
        assert_ready_eq!(values.poll_next(), Some(2));
        assert_ready_eq!(values.poll_next(), None);
    }

    #[test]
    fn test_drop_detaches_once() {
        let owner = owner();
        let (id, core) = owner.with(|s| s.registry.open());
        let values = consumer(&owner, id, core);
        assert_eq!(owner.with(|s| s.registry.len()), 1);

        drop(values);
        assert_eq!(owner.with(|s| s.registry.len()), 0);
        assert!(owner.with(|s| s.registry.remove(id)).is_none());
    }

    #[test]
    fn test_drop_after_close_is_noop() {
        let owner = owner();
        let (id, core) = owner.with(|s| s.registry.open());
        let (other_id, other_core) = owner.with(|s| s.registry.open());
        let values = consumer(&owner, id, core);
        let _other = consumer(&owner, other_id, other_core);

        owner.with(|s| s.registry.remove(id));
        drop(values);
        assert_eq!(owner.with(|s| s.registry.len()), 1);
    }

    #[test]
    fn test_drop_after_owner_gone() {
        let owner = owner();
        let (id, core) = owner.with(|s| s.registry.open());
        let values = consumer(&owner, id, core);
        drop(owner);
        drop(values);
    }

    #[test]
    fn test_owner_drop_finishes_consumer() {
        let owner = owner();
        let (id, core) = owner.with(|s| s.registry.open());
        let mut values = task::spawn(consumer(&owner, id, core));
        assert_pending!(values.poll_next());

        notify_all(owner.with(|s| s.registry.broadcast(&5)));
        drop(owner);

        assert!(values.is_woken());
        assert_ready_eq!(values.poll_next(), Some(5));
        assert_ready_eq!(values.poll_next(), None);
    }

    #[test]
    fn test_finished_with() {
        let mut values = task::spawn(Values::finished_with([3, 4]));
        assert_ready_eq!(values.poll_next(), Some(3));
        assert_ready_eq!(values.poll_next(), Some(4));
        assert_ready_eq!(values.poll_next(), None);
    }
}
