//! Push-based signals
//!
//! A [`PushSignal`] delivers events to its observers as soon as they
//! happen; the observer has no say in the pace. Observation is stopped
//! through the [`Disposable`] returned by [`PushSignal::observe`].
//!
//! Every observer sees zero or more [`Event::Value`]s followed by at most
//! one terminal event, [`Event::Completed`] or [`Event::Failed`].

mod disposable;
mod from_fn;
mod pipe;

use std::sync::Arc;

pub use disposable::ActionDisposable;
pub use from_fn::{from_fn, FnSignal};
pub use pipe::{pipe, Pipe, PipeInput};

/// One notification from a push signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event<T, E> {
    Value(T),
    Completed,
    Failed(E),
}

impl<T, E> Event<T, E> {
    /// True for `Completed` and `Failed`
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Event::Value(_))
    }
}

/// Receives events from a push signal
pub trait Observer<T, E>: Send + Sync {
    fn on_event(&self, event: Event<T, E>);
}

impl<T, E, F> Observer<T, E> for F
where
    F: Fn(Event<T, E>) + Send + Sync,
{
    fn on_event(&self, event: Event<T, E>) {
        self(event)
    }
}

/// Handle that stops an observation
pub trait Disposable: Send + Sync {
    /// Stop delivering events; idempotent
    fn dispose(&self);

    fn is_disposed(&self) -> bool;
}

/// A source that pushes events to its observers
pub trait PushSignal: Send + Sync {
    type Item: Send + 'static;
    type Error: Send + 'static;

    /// Start delivering events to `observer`
    ///
    /// A cold signal may deliver events, terminal ones included, before
    /// this returns.
    fn observe(&self, observer: Arc<dyn Observer<Self::Item, Self::Error>>) -> Box<dyn Disposable>;
}

impl<S: PushSignal + ?Sized> PushSignal for Arc<S> {
    type Item = S::Item;
    type Error = S::Error;

    fn observe(&self, observer: Arc<dyn Observer<Self::Item, Self::Error>>) -> Box<dyn Disposable> {
        (**self).observe(observer)
    }
}

/// Convenience adapters for every [`PushSignal`]
pub trait PushSignalExt: PushSignal + Sized {
    /// Observe with a closure
    fn observe_with<F>(&self, f: F) -> Box<dyn Disposable>
    where
        F: Fn(Event<Self::Item, Self::Error>) + Send + Sync + 'static,
    {
        self.observe(Arc::new(f))
    }

    /// Adapt into a demand-negotiated pull stream
    fn into_pull_stream(self) -> crate::bridge::PushToPull<Self> {
        crate::bridge::push_to_pull(self)
    }
}

impl<S: PushSignal> PushSignalExt for S {}
