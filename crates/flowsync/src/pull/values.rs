//! Pull stream as a `futures::Stream`
//!
//! Each poll that finds nothing queued asks upstream for exactly one more
//! value, so the consumer's polling pace is the demand.

use core::pin::Pin;
use core::task::{Context, Poll, Waker};
use std::collections::VecDeque;
use std::sync::Arc;

use flowsync_core::{Demand, Lock};
use futures::Stream;

use super::{Completion, PullStream, Subscriber, Subscription};

/// Async iterator over a pull stream
///
/// Yields `Ok(value)` for every value, then ends; a failure is yielded once
/// as `Err(error)` before the end. Dropping it cancels the subscription.
pub struct PullValues<T, E> {
    shared: Arc<Lock<ValuesState<T, E>>>,
}

struct ValuesState<T, E> {
    queue: VecDeque<T>,
    completion: Option<Completion<E>>,
    subscription: Option<Arc<dyn Subscription>>,
    waker: Option<Waker>,
    /// One value has been requested and not yet consumed
    in_flight: bool,
    done: bool,
}

enum Next<T, E> {
    Ready(Option<Result<T, E>>),
    Request(Arc<dyn Subscription>),
    Pending,
}

impl<T: Send + 'static, E: Send + 'static> PullValues<T, E> {
    /// Subscribe to `stream`; nothing is requested until the first poll
    pub fn subscribe<P>(stream: &P) -> Self
    where
        P: PullStream<Item = T, Error = E> + ?Sized,
    {
        let shared = Arc::new(Lock::new(ValuesState {
            queue: VecDeque::new(),
            completion: None,
            subscription: None,
            waker: None,
            in_flight: false,
            done: false,
        }));
        stream.subscribe(Arc::new(ValuesSubscriber {
            shared: Arc::clone(&shared),
        }));
        Self { shared }
    }
}

impl<T, E> Stream for PullValues<T, E> {
    type Item = Result<T, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<T, E>>> {
        loop {
            let next = self.shared.with(|s| {
                if let Some(value) = s.queue.pop_front() {
                    s.in_flight = false;
                    return Next::Ready(Some(Ok(value)));
                }
                match s.completion.take() {
                    Some(Completion::Failed(error)) => {
                        s.done = true;
                        return Next::Ready(Some(Err(error)));
                    }
                    Some(Completion::Finished) => s.done = true,
                    None => {}
                }
                if s.done {
                    return Next::Ready(None);
                }

                s.waker = Some(cx.waker().clone());
                match (&s.subscription, s.in_flight) {
                    (Some(subscription), false) => {
                        s.in_flight = true;
                        Next::Request(Arc::clone(subscription))
                    }
                    _ => Next::Pending,
                }
            });

            match next {
                Next::Ready(item) => return Poll::Ready(item),
                Next::Pending => return Poll::Pending,
                // The value may arrive synchronously; look again
                Next::Request(subscription) => subscription.request(Demand::max(1)),
            }
        }
    }
}

impl<T, E> Drop for PullValues<T, E> {
    fn drop(&mut self) {
        let subscription = self.shared.with(|s| {
            s.done = true;
            s.queue.clear();
            s.subscription.take()
        });
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
    }
}

impl<T, E> std::fmt::Debug for PullValues<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (queued, done) = self.shared.with(|s| (s.queue.len(), s.done));
        f.debug_struct("PullValues")
            .field("queued", &queued)
            .field("done", &done)
            .finish()
    }
}

struct ValuesSubscriber<T, E> {
    shared: Arc<Lock<ValuesState<T, E>>>,
}

impl<T: Send, E: Send> ValuesSubscriber<T, E> {
    fn wake(&self) {
        if let Some(waker) = self.shared.with(|s| s.waker.take()) {
            waker.wake();
        }
    }
}

impl<T: Send, E: Send> Subscriber<T, E> for ValuesSubscriber<T, E> {
    fn receive_subscription(&self, subscription: Arc<dyn Subscription>) {
        let accepted = self.shared.with(|s| {
            if s.done {
                return false;
            }
            s.subscription = Some(Arc::clone(&subscription));
            true
        });
        if accepted {
            // A poll may already be parked waiting for the subscription
            self.wake();
        } else {
            subscription.cancel();
        }
    }

    fn receive(&self, value: T) -> Demand {
        self.shared.with(|s| {
            if !s.done {
                s.queue.push_back(value);
            }
        });
        self.wake();
        Demand::NONE
    }

    fn receive_completion(&self, completion: Completion<E>) {
        self.shared.with(|s| {
            if !s.done && s.completion.is_none() {
                s.completion = Some(completion);
            }
            s.subscription = None;
        });
        self.wake();
    }
}
