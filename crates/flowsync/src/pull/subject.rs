//! Hot multicast pull source
//!
//! A `PullSubject` is driven by its owner with `send`, `finish` and `fail`.
//! Each subscriber has its own [`DemandBuffer`], so a slow subscriber
//! accumulates values without holding back the others.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use flowsync_core::{Demand, Lock, SubscriptionId};

use super::{Completion, DemandBuffer, EmptySubscription, PullStream, Subscriber, Subscription};

/// Hot pull source with per-subscriber demand buffering
pub struct PullSubject<T, E> {
    state: Arc<Lock<SubjectState<T, E>>>,
}

struct SubjectState<T, E> {
    subscribers: HashMap<SubscriptionId, Arc<DemandBuffer<T, E>>>,
    completion: Option<Completion<E>>,
}

impl<T, E> PullSubject<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            state: Arc::new(Lock::new(SubjectState {
                subscribers: HashMap::new(),
                completion: None,
            })),
        }
    }

    /// Offer `value` to every current subscriber; ignored after a terminal event
    pub fn send(&self, value: T) {
        let buffers: Vec<_> = self.state.with(|s| {
            if s.completion.is_some() {
                return Vec::new();
            }
            s.subscribers
                .values()
                .map(|buffer| {
                    buffer.push(value.clone());
                    Arc::clone(buffer)
                })
                .collect()
        });
        for buffer in buffers {
            buffer.drain();
        }
    }

    /// Finish every subscriber once it has drained its buffer
    pub fn finish(&self) {
        self.terminate(Completion::Finished);
    }

    /// Fail every subscriber immediately
    pub fn fail(&self, error: E) {
        self.terminate(Completion::Failed(error));
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.with(|s| s.subscribers.len())
    }

    fn terminate(&self, completion: Completion<E>) {
        let buffers: Vec<_> = self.state.with(|s| {
            if s.completion.is_some() {
                return Vec::new();
            }
            s.completion = Some(completion.clone());
            s.subscribers
                .drain()
                .map(|(_, buffer)| {
                    buffer.push_completion(completion.clone());
                    buffer
                })
                .collect()
        });
        for buffer in buffers {
            buffer.drain();
        }
    }
}

impl<T, E> Default for PullSubject<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Clone for PullSubject<T, E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T, E> PullStream for PullSubject<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Item = T;
    type Error = E;

    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T, E>>) {
        let attached = self.state.with(|s| match &s.completion {
            Some(completion) => Err(completion.clone()),
            None => {
                let id = SubscriptionId::next();
                let buffer = Arc::new(DemandBuffer::new(Arc::clone(&subscriber)));
                s.subscribers.insert(id, Arc::clone(&buffer));
                Ok((id, buffer))
            }
        });

        match attached {
            Ok((id, buffer)) => {
                tracing::debug!(%id, "pull subject subscribed");
                subscriber.receive_subscription(Arc::new(SubjectSubscription {
                    id,
                    buffer,
                    owner: Arc::downgrade(&self.state),
                }));
            }
            Err(completion) => {
                subscriber.receive_subscription(Arc::new(EmptySubscription));
                subscriber.receive_completion(completion);
            }
        }
    }
}

struct SubjectSubscription<T, E> {
    id: SubscriptionId,
    buffer: Arc<DemandBuffer<T, E>>,
    owner: Weak<Lock<SubjectState<T, E>>>,
}

impl<T: Send, E: Send> Subscription for SubjectSubscription<T, E> {
    fn request(&self, demand: Demand) {
        self.buffer.demand(demand);
    }

    fn cancel(&self) {
        self.buffer.cancel();
        if let Some(owner) = self.owner.upgrade() {
            if owner.with(|s| s.subscribers.remove(&self.id)).is_some() {
                tracing::debug!(id = %self.id, "pull subject subscriber cancelled");
            }
        }
    }
}
