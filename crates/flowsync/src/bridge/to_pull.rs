//! Push signal → pull stream

use std::sync::{Arc, Weak};

use flowsync_core::{Demand, Lock};

use crate::pull::{Completion, DemandBuffer, PullStream, Subscriber, Subscription};
use crate::push::{Disposable, Event, Observer, PushSignal};

/// Pull stream backed by a push signal
///
/// Each subscriber observes the signal separately, starting on its first
/// request. Values pushed beyond the subscriber's demand are buffered.
pub struct PushToPull<S> {
    signal: Arc<S>,
}

impl<S> PushToPull<S> {
    pub(crate) fn new(signal: S) -> Self {
        Self {
            signal: Arc::new(signal),
        }
    }
}

impl<S> Clone for PushToPull<S> {
    fn clone(&self) -> Self {
        Self {
            signal: Arc::clone(&self.signal),
        }
    }
}

impl<S: PushSignal + 'static> PullStream for PushToPull<S> {
    type Item = S::Item;
    type Error = S::Error;

    fn subscribe(&self, subscriber: Arc<dyn Subscriber<S::Item, S::Error>>) {
        let subscription = Arc::new_cyclic(|this| BridgeSubscription {
            this: this.clone(),
            signal: Arc::clone(&self.signal),
            state: Lock::new(BridgeState {
                upstream: None,
                started: false,
                cancelled: false,
                terminated: false,
            }),
            output: DemandBuffer::new(Arc::clone(&subscriber)),
        });
        subscriber.receive_subscription(subscription);
    }
}

struct BridgeState {
    /// Taken exactly once: on the terminal event or on cancel
    upstream: Option<Box<dyn Disposable>>,
    started: bool,
    cancelled: bool,
    /// Upstream sent its terminal event
    terminated: bool,
}

impl BridgeState {
    fn is_closed(&self) -> bool {
        self.cancelled || self.terminated
    }
}

struct BridgeSubscription<S: PushSignal> {
    this: Weak<Self>,
    signal: Arc<S>,
    // Lock order: state, then output
    state: Lock<BridgeState>,
    output: DemandBuffer<S::Item, S::Error>,
}

impl<S: PushSignal + 'static> BridgeSubscription<S> {
    fn start(&self) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        tracing::debug!("push_to_pull observing upstream");
        let handle = self.signal.observe(Arc::new(BridgeObserver { parent: this }));

        // A cold upstream may have finished, or we may have been cancelled,
        // before observe returned
        let unused = self.state.with(|s| {
            if s.is_closed() {
                Some(handle)
            } else {
                s.upstream = Some(handle);
                None
            }
        });
        if let Some(handle) = unused {
            handle.dispose();
        }
    }

    fn upstream_event(&self, event: Event<S::Item, S::Error>) {
        let released = self.state.with(|s| {
            if s.is_closed() {
                return None;
            }
            let completion = match event {
                Event::Value(value) => {
                    self.output.push(value);
                    return None;
                }
                Event::Completed => Completion::Finished,
                Event::Failed(error) => Completion::Failed(error),
            };
            s.terminated = true;
            self.output.push_completion(completion);
            s.upstream.take()
        });

        if let Some(handle) = released {
            handle.dispose();
        }
        self.output.drain();
    }
}

impl<S: PushSignal + 'static> Subscription for BridgeSubscription<S> {
    fn request(&self, demand: Demand) {
        self.output.request(demand);
        let first = self.state.with(|s| {
            let first = !s.started && !s.is_closed();
            s.started = true;
            first
        });
        if first {
            self.start();
        }
        self.output.drain();
    }

    fn cancel(&self) {
        let released = self.state.with(|s| {
            if s.cancelled {
                return None;
            }
            s.cancelled = true;
            s.upstream.take()
        });
        self.output.cancel();
        if let Some(handle) = released {
            tracing::debug!("push_to_pull cancelled; disposing upstream");
            handle.dispose();
        }
    }
}

struct BridgeObserver<S: PushSignal> {
    parent: Arc<BridgeSubscription<S>>,
}

impl<S: PushSignal + 'static> Observer<S::Item, S::Error> for BridgeObserver<S> {
    fn on_event(&self, event: Event<S::Item, S::Error>) {
        self.parent.upstream_event(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::push_to_pull;
    use crate::pull::testing::Recorder;
    use crate::push::{from_fn, pipe, ActionDisposable};
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Rec = Recorder<i32, &'static str>;

    #[test]
    fn test_observes_on_first_demand() {
        let (signal, input) = pipe::<i32, &str>();
        let stream = push_to_pull(signal.clone());
        let recorder = Rec::new(Demand::NONE, Demand::NONE);
        stream.subscribe(recorder.clone());
        assert_eq!(signal.observer_count(), 0);

        recorder.request(Demand::max(1));
        assert_eq!(signal.observer_count(), 1);
        input.send(1);
        assert_eq!(recorder.values(), vec![1]);
    }

    #[test]
    fn test_demand_of_one() {
        let (signal, input) = pipe::<i32, &str>();
        let recorder = Rec::new(Demand::max(1), Demand::NONE);
        push_to_pull(signal).subscribe(recorder.clone());

        for i in 0..5 {
            input.send(i);
        }
        assert_eq!(recorder.values(), vec![0]);

        recorder.request(Demand::max(2));
        assert_eq!(recorder.values(), vec![0, 1, 2]);
    }

    #[test]
    fn test_single_terminal_after_failure() {
        let (signal, input) = pipe::<i32, &str>();
        let recorder = Rec::new(Demand::Unlimited, Demand::NONE);
        push_to_pull(signal.clone()).subscribe(recorder.clone());

        input.send(1);
        input.fail("boom");
        input.send(2);
        input.complete();

        assert_eq!(recorder.values(), vec![1]);
        assert_eq!(recorder.completions(), vec![Completion::Failed("boom")]);
        assert_eq!(signal.observer_count(), 0);
    }

    #[test]
    fn test_misbehaving_upstream_terminates_once() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&disposed);
        let signal = from_fn(move |observer: Arc<dyn Observer<i32, &'static str>>| {
            observer.on_event(Event::Value(1));
            observer.on_event(Event::Failed("first"));
            observer.on_event(Event::Value(2));
            observer.on_event(Event::Completed);
            let counter = Arc::clone(&counter);
            Box::new(ActionDisposable::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })) as Box<dyn Disposable>
        });

        let recorder = Rec::new(Demand::Unlimited, Demand::NONE);
        push_to_pull(signal).subscribe(recorder.clone());
        recorder.cancel();

        assert_eq!(recorder.values(), vec![1]);
        assert_eq!(recorder.completions(), vec![Completion::Failed("first")]);
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_completion_waits_for_buffered_values() {
        let (signal, input) = pipe::<i32, &str>();
        let recorder = Rec::new(Demand::max(1), Demand::NONE);
        push_to_pull(signal).subscribe(recorder.clone());

        input.send(1);
        input.send(2);
        input.complete();
        assert_eq!(recorder.completion_count(), 0);

        recorder.request(Demand::max(1));
        assert_eq!(recorder.values(), vec![1, 2]);
        assert_eq!(recorder.completions(), vec![Completion::Finished]);
    }

    #[test]
    fn test_cancel_disposes_upstream_once() {
        let (signal, input) = pipe::<i32, &str>();
        let recorder = Rec::new(Demand::Unlimited, Demand::NONE);
        push_to_pull(signal.clone()).subscribe(recorder.clone());
        assert_eq!(signal.observer_count(), 1);

        recorder.cancel();
        recorder.cancel();
        input.send(1);
        input.complete();

        assert_eq!(signal.observer_count(), 0);
        assert!(recorder.values().is_empty());
        assert_eq!(recorder.completion_count(), 0);
    }

    #[test]
    fn test_cancel_discards_buffered_values() {
        let (signal, input) = pipe::<i32, &str>();
        let recorder = Rec::new(Demand::max(1), Demand::NONE);
        push_to_pull(signal.clone()).subscribe(recorder.clone());

        input.send(1);
        input.send(2);
        input.send(3);
        assert_eq!(recorder.values(), vec![1]);

        recorder.cancel();
        recorder.request(Demand::Unlimited);
        assert_eq!(recorder.values(), vec![1]);
        assert_eq!(recorder.completion_count(), 0);
        assert_eq!(signal.observer_count(), 0);
    }
}
