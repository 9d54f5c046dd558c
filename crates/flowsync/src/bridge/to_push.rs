//! Pull stream → push signal

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use flowsync_core::{Demand, Lock};

use crate::pull::{Completion, PullStream, Subscriber, Subscription};
use crate::push::{Disposable, Event, Observer, PushSignal};

/// Push signal backed by a pull stream
///
/// Every observer subscribes to the stream at once with unlimited demand.
pub struct PullToPush<P> {
    stream: P,
}

impl<P> PullToPush<P> {
    pub(crate) fn new(stream: P) -> Self {
        Self { stream }
    }

    /// The underlying pull stream
    pub fn get_ref(&self) -> &P {
        &self.stream
    }
}

impl<P: PullStream + 'static> PushSignal for PullToPush<P> {
    type Item = P::Item;
    type Error = P::Error;

    fn observe(&self, observer: Arc<dyn Observer<P::Item, P::Error>>) -> Box<dyn Disposable> {
        let forwarder = Arc::new(Forwarder {
            observer,
            link: Lock::new(Link {
                subscription: None,
                disposed: false,
            }),
            terminated: AtomicBool::new(false),
        });
        self.stream.subscribe(forwarder.clone());
        Box::new(ForwardDisposal { forwarder })
    }
}

struct Link {
    subscription: Option<Arc<dyn Subscription>>,
    disposed: bool,
}

struct Forwarder<T, E> {
    observer: Arc<dyn Observer<T, E>>,
    link: Lock<Link>,
    terminated: AtomicBool,
}

impl<T, E> Forwarder<T, E> {
    fn is_live(&self) -> bool {
        !self.terminated.load(Ordering::Acquire) && !self.link.with(|l| l.disposed)
    }
}

impl<T: Send, E: Send> Subscriber<T, E> for Forwarder<T, E> {
    fn receive_subscription(&self, subscription: Arc<dyn Subscription>) {
        let accepted = self.link.with(|l| {
            if l.disposed {
                return false;
            }
            l.subscription = Some(Arc::clone(&subscription));
            true
        });
        if accepted {
            subscription.request(Demand::Unlimited);
        } else {
            subscription.cancel();
        }
    }

    fn receive(&self, value: T) -> Demand {
        if self.is_live() {
            self.observer.on_event(Event::Value(value));
        }
        Demand::NONE
    }

    fn receive_completion(&self, completion: Completion<E>) {
        let disposed = self.link.with(|l| {
            l.subscription = None;
            l.disposed
        });
        if disposed || self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        self.observer.on_event(match completion {
            Completion::Finished => Event::Completed,
            Completion::Failed(error) => Event::Failed(error),
        });
    }
}

struct ForwardDisposal<T, E> {
    forwarder: Arc<Forwarder<T, E>>,
}

impl<T: Send, E: Send> Disposable for ForwardDisposal<T, E> {
    fn dispose(&self) {
        let subscription = self.forwarder.link.with(|l| {
            l.disposed = true;
            l.subscription.take()
        });
        if let Some(subscription) = subscription {
            tracing::debug!("pull_to_push disposed; cancelling pull subscription");
            subscription.cancel();
        }
    }

    fn is_disposed(&self) -> bool {
        self.forwarder.link.with(|l| l.disposed)
    }
}
