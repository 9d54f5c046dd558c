//! Closure-driven consumer for pull streams

use std::sync::Arc;

use flowsync_core::{Demand, Lock};

use super::{Completion, PullStream, Subscriber, Subscription};

/// Subscribe to `stream` with unlimited demand, calling `on_value` for every
/// value and `on_completion` once at the end
///
/// The returned handle cancels the subscription when dropped; call
/// [`SinkHandle::detach`] to let it run until the stream ends on its own.
pub fn sink<P, V, C>(stream: &P, on_value: V, on_completion: C) -> SinkHandle
where
    P: PullStream + ?Sized,
    V: Fn(P::Item) + Send + Sync + 'static,
    C: FnOnce(Completion<P::Error>) + Send + 'static,
{
    let slot = Arc::new(Lock::new(SinkSlot {
        subscription: None,
        done: false,
    }));
    stream.subscribe(Arc::new(SinkSubscriber {
        on_value,
        on_completion: Lock::new(Some(on_completion)),
        slot: Arc::clone(&slot),
    }));
    SinkHandle { slot: Some(slot) }
}

struct SinkSlot {
    subscription: Option<Arc<dyn Subscription>>,
    done: bool,
}

struct SinkSubscriber<V, C> {
    on_value: V,
    on_completion: Lock<Option<C>>,
    slot: Arc<Lock<SinkSlot>>,
}

impl<T, E, V, C> Subscriber<T, E> for SinkSubscriber<V, C>
where
    V: Fn(T) + Send + Sync,
    C: FnOnce(Completion<E>) + Send,
{
    fn receive_subscription(&self, subscription: Arc<dyn Subscription>) {
        let accepted = self.slot.with(|s| {
            if s.done {
                return false;
            }
            s.subscription = Some(Arc::clone(&subscription));
            true
        });
        if accepted {
            subscription.request(Demand::Unlimited);
        } else {
            subscription.cancel();
        }
    }

    fn receive(&self, value: T) -> Demand {
        (self.on_value)(value);
        Demand::NONE
    }

    fn receive_completion(&self, completion: Completion<E>) {
        self.slot.with(|s| {
            s.done = true;
            s.subscription = None;
        });
        if let Some(on_completion) = self.on_completion.with(Option::take) {
            on_completion(completion);
        }
    }
}

/// Keeps a [`sink`] subscription alive; cancels it on drop
#[must_use = "dropping a SinkHandle cancels the subscription"]
pub struct SinkHandle {
    slot: Option<Arc<Lock<SinkSlot>>>,
}

impl SinkHandle {
    /// Cancel the subscription; idempotent
    pub fn cancel(&self) {
        let Some(slot) = &self.slot else {
            return;
        };
        let subscription = slot.with(|s| {
            s.done = true;
            s.subscription.take()
        });
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
    }

    /// True once the stream ended or the handle was cancelled
    pub fn is_done(&self) -> bool {
        self.slot.as_ref().map_or(true, |slot| slot.with(|s| s.done))
    }

    /// Let the subscription run without a handle
    pub fn detach(mut self) {
        self.slot = None;
    }
}

impl Drop for SinkHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for SinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkHandle").field("done", &self.is_done()).finish()
    }
}
