use std::marker::PhantomData;
use std::sync::Arc;

use super::{Disposable, Observer, PushSignal};

/// Cold push signal: runs a closure for every observer
pub struct FnSignal<T, E, F> {
    f: F,
    _marker: PhantomData<fn() -> (T, E)>,
}

/// Build a cold signal whose `observe` calls `f`
///
/// # Example
///
/// ```ignore
/// let numbers = push::from_fn(|observer: Arc<dyn Observer<i32, ()>>| {
///     observer.on_event(Event::Value(1));
///     observer.on_event(Event::Completed);
///     Box::new(ActionDisposable::empty()) as Box<dyn Disposable>
/// });
/// ```
pub fn from_fn<T, E, F>(f: F) -> FnSignal<T, E, F>
where
    F: Fn(Arc<dyn Observer<T, E>>) -> Box<dyn Disposable> + Send + Sync,
{
    FnSignal {
        f,
        _marker: PhantomData,
    }
}

impl<T, E, F> PushSignal for FnSignal<T, E, F>
where
    T: Send + 'static,
    E: Send + 'static,
    F: Fn(Arc<dyn Observer<T, E>>) -> Box<dyn Disposable> + Send + Sync,
{
    type Item = T;
    type Error = E;

    fn observe(&self, observer: Arc<dyn Observer<T, E>>) -> Box<dyn Disposable> {
        (self.f)(observer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::{ActionDisposable, Event, PushSignalExt};
    use flowsync_core::Lock;

    #[test]
    fn test_runs_per_observer() {
        let signal = from_fn(|observer: Arc<dyn Observer<u8, ()>>| {
            observer.on_event(Event::Value(1));
            observer.on_event(Event::Completed);
            Box::new(ActionDisposable::empty()) as Box<dyn Disposable>
        });

        for _ in 0..2 {
            let seen = Arc::new(Lock::new(Vec::new()));
            let sink = Arc::clone(&seen);
            let _disposable = signal.observe_with(move |event| sink.with(|s| s.push(event)));
            assert_eq!(seen.with(|s| s.clone()), vec![Event::Value(1), Event::Completed]);
        }
    }
}
