//! Demand-negotiated (pull-based) streams
//!
//! A [`PullStream`] only emits as many values as its subscriber has asked
//! for. The handshake:
//!
//! ```text
//!   stream.subscribe(subscriber)
//!        └─► subscriber.receive_subscription(subscription)
//!               └─► subscription.request(Demand::max(n))
//!                      └─► subscriber.receive(value) -> extra demand   (≤ n times)
//!                      └─► subscriber.receive_completion(..)           (at most once)
//! ```
//!
//! Subscribers and subscriptions are shared (`Arc`) and take `&self`, so a
//! subscriber may call back into its subscription from inside `receive`.
//! Implementations therefore never hold a lock while calling a subscriber.

mod demand_buffer;
mod combine_latest;
mod iter;
mod subject;
mod sink;
mod values;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

pub use flowsync_core::Demand;

pub use combine_latest::{combine_latest_many, CombineLatestMany};
pub use demand_buffer::DemandBuffer;
pub use iter::{iter, Iter};
pub use sink::{sink, SinkHandle};
pub use subject::PullSubject;
pub use values::PullValues;

/// How a stream ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion<E> {
    /// Normal end of stream
    Finished,
    /// The stream failed; no further values follow
    Failed(E),
}

impl<E> Completion<E> {
    pub fn is_failure(&self) -> bool {
        matches!(self, Completion::Failed(_))
    }
}

/// Handle a subscriber uses to ask for values or stop them
pub trait Subscription: Send + Sync {
    /// Ask for `demand` more values on top of what was already requested
    fn request(&self, demand: Demand);

    /// Stop delivery and release upstream resources; idempotent
    fn cancel(&self);
}

/// Receiving side of a pull stream
pub trait Subscriber<T, E>: Send + Sync {
    /// Called once, before anything else
    fn receive_subscription(&self, subscription: Arc<dyn Subscription>);

    /// Deliver one value; the return value is additional demand
    fn receive(&self, value: T) -> Demand;

    /// Deliver the terminal event; called at most once
    fn receive_completion(&self, completion: Completion<E>);
}

/// A source that emits only on demand
pub trait PullStream: Send + Sync {
    type Item: Send + 'static;
    type Error: Send + 'static;

    /// Attach a subscriber; it receives its subscription synchronously
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<Self::Item, Self::Error>>);
}

impl<P: PullStream + ?Sized> PullStream for Arc<P> {
    type Item = P::Item;
    type Error = P::Error;

    fn subscribe(&self, subscriber: Arc<dyn Subscriber<Self::Item, Self::Error>>) {
        (**self).subscribe(subscriber)
    }
}

impl<P: PullStream + ?Sized> PullStream for Box<P> {
    type Item = P::Item;
    type Error = P::Error;

    fn subscribe(&self, subscriber: Arc<dyn Subscriber<Self::Item, Self::Error>>) {
        (**self).subscribe(subscriber)
    }
}

/// Subscription that does nothing, handed out by streams that are
/// already over
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptySubscription;

impl Subscription for EmptySubscription {
    fn request(&self, _demand: Demand) {}
    fn cancel(&self) {}
}

/// Convenience adapters for every [`PullStream`]
pub trait PullStreamExt: PullStream + Sized {
    /// Consume with closures, requesting unlimited demand
    fn sink<V, C>(&self, on_value: V, on_completion: C) -> SinkHandle
    where
        V: Fn(Self::Item) + Send + Sync + 'static,
        C: FnOnce(Completion<Self::Error>) + Send + 'static,
    {
        sink(self, on_value, on_completion)
    }

    /// Adapt into a `futures::Stream`, pulling one value per poll
    fn values(&self) -> PullValues<Self::Item, Self::Error> {
        PullValues::subscribe(self)
    }

    /// Adapt into a push signal that forwards every event
    fn into_push_signal(self) -> crate::bridge::PullToPush<Self> {
        crate::bridge::pull_to_push(self)
    }
}

impl<P: PullStream> PullStreamExt for P {}
