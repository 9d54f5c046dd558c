//! Hot push signal fed by hand
//!
//! `pipe()` returns the signal half, which observers attach to, and the
//! input half, which the owner sends events through. Events sent from
//! several threads at once are queued and handed out by one thread at a
//! time, so every observer sees them in a single order.
//!
//! The terminal event is sticky: observers that attach after it was
//! delivered receive it straight away and nothing else.

use core::sync::atomic::{AtomicBool, Ordering};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

use flowsync_core::{Lock, SubscriptionId};

use super::{ActionDisposable, Disposable, Event, Observer, PushSignal};

type ObserverRef<T, E> = Arc<dyn Observer<T, E>>;

/// Create a connected signal/input pair
pub fn pipe<T, E>() -> (Pipe<T, E>, PipeInput<T, E>)
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    let shared = Arc::new(Lock::new(PipeState {
        observers: HashMap::new(),
        pending: VecDeque::new(),
        delivering: false,
        terminal: None,
        terminal_delivered: false,
    }));
    (
        Pipe {
            shared: Arc::clone(&shared),
        },
        PipeInput { shared },
    )
}

struct PipeState<T, E> {
    observers: HashMap<SubscriptionId, ObserverRef<T, E>>,
    pending: VecDeque<Event<T, E>>,
    /// A thread is handing out `pending`
    delivering: bool,
    /// Set when the terminal event is queued
    terminal: Option<Event<T, E>>,
    /// Set once every observer has received the terminal event
    terminal_delivered: bool,
}

/// Observer-facing half of a [`pipe`]
pub struct Pipe<T, E> {
    shared: Arc<Lock<PipeState<T, E>>>,
}

impl<T, E> Clone for Pipe<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, E> Pipe<T, E> {
    pub fn observer_count(&self) -> usize {
        self.shared.with(|s| s.observers.len())
    }
}

impl<T, E> PushSignal for Pipe<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Item = T;
    type Error = E;

    fn observe(&self, observer: ObserverRef<T, E>) -> Box<dyn Disposable> {
        let attached = self.shared.with(|s| {
            if s.terminal_delivered {
                return Err(s.terminal.clone());
            }
            let id = SubscriptionId::next();
            s.observers.insert(id, Arc::clone(&observer));
            Ok(id)
        });

        match attached {
            Ok(id) => {
                tracing::debug!(%id, "pipe observer attached");
                Box::new(PipeDisposal {
                    id,
                    shared: Arc::downgrade(&self.shared),
                    disposed: AtomicBool::new(false),
                })
            }
            Err(terminal) => {
                if let Some(event) = terminal {
                    observer.on_event(event);
                }
                let disposable = ActionDisposable::empty();
                disposable.dispose();
                Box::new(disposable)
            }
        }
    }
}

/// Sending half of a [`pipe`]
pub struct PipeInput<T, E> {
    shared: Arc<Lock<PipeState<T, E>>>,
}

impl<T, E> Clone for PipeInput<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, E> PipeInput<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub fn send(&self, value: T) {
        self.send_event(Event::Value(value));
    }

    pub fn complete(&self) {
        self.send_event(Event::Completed);
    }

    pub fn fail(&self, error: E) {
        self.send_event(Event::Failed(error));
    }

    /// Queue `event` for every observer; dropped after a terminal event
    pub fn send_event(&self, event: Event<T, E>) {
        let became_deliverer = self.shared.with(|s| {
            if s.terminal.is_some() {
                return false;
            }
            if event.is_terminal() {
                s.terminal = Some(event.clone());
            }
            s.pending.push_back(event);
            if s.delivering {
                false
            } else {
                s.delivering = true;
                true
            }
        });
        if became_deliverer {
            self.deliver_pending();
        }
    }

    fn deliver_pending(&self) {
        loop {
            let next = self.shared.with(|s| match s.pending.pop_front() {
                None => {
                    s.delivering = false;
                    None
                }
                Some(event) => {
                    let observers: Vec<_> = if event.is_terminal() {
                        s.terminal_delivered = true;
                        s.observers.drain().map(|(_, o)| o).collect()
                    } else {
                        s.observers.values().cloned().collect()
                    };
                    Some((event, observers))
                }
            });

            let Some((event, observers)) = next else {
                return;
            };
            for observer in observers {
                observer.on_event(event.clone());
            }
        }
    }
}

struct PipeDisposal<T, E> {
    id: SubscriptionId,
    shared: Weak<Lock<PipeState<T, E>>>,
    disposed: AtomicBool,
}

impl<T: Send, E: Send> Disposable for PipeDisposal<T, E> {
    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            // Dropped outside the lock
            let _observer = shared.with(|s| s.observers.remove(&self.id));
            tracing::debug!(id = %self.id, "pipe observer disposed");
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::PushSignalExt;

    type Seen<T, E> = Arc<Lock<Vec<Event<T, E>>>>;

    fn recorder<T: Send + 'static, E: Send + 'static>() -> (Seen<T, E>, impl Fn(Event<T, E>) + Send + Sync + 'static) {
        let seen = Arc::new(Lock::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |event: Event<T, E>| sink.with(|s| s.push(event)))
    }

    #[test]
    fn test_fans_out_in_order() {
        let (signal, input) = pipe::<i32, ()>();
        let (a, on_a) = recorder::<i32, ()>();
        let (b, on_b) = recorder::<i32, ()>();
        let _da = signal.observe_with(on_a);
        let _db = signal.observe_with(on_b);

        input.send(1);
        input.send(2);
        input.complete();

        let expected = vec![Event::Value(1), Event::Value(2), Event::Completed];
        assert_eq!(a.with(|s| s.clone()), expected);
        assert_eq!(b.with(|s| s.clone()), expected);
        assert_eq!(signal.observer_count(), 0);
    }

    #[test]
    fn test_terminal_is_sticky() {
        let (signal, input) = pipe::<i32, &str>();
        input.fail("down");
        input.send(1);
        input.complete();

        let (late, on_late) = recorder::<i32, &str>();
        let disposable = signal.observe_with(on_late);
        assert!(disposable.is_disposed());
        assert_eq!(late.with(|s| s.clone()), vec![Event::Failed("down")]);
    }

    #[test]
    fn test_dispose_stops_delivery() {
        let (signal, input) = pipe::<i32, ()>();
        let (seen, on_event) = recorder::<i32, ()>();
        let disposable = signal.observe_with(on_event);

        input.send(1);
        disposable.dispose();
        disposable.dispose();
        input.send(2);

        assert!(disposable.is_disposed());
        assert_eq!(seen.with(|s| s.clone()), vec![Event::Value(1)]);
        assert_eq!(signal.observer_count(), 0);
    }

    #[test]
    fn test_reentrant_send_is_queued() {
        let (signal, input) = pipe::<i32, ()>();
        let (seen, on_event) = recorder::<i32, ()>();
        let echo = input.clone();
        let _echo = signal.observe_with(move |event| {
            if event == Event::Value(1) {
                echo.send(2);
            }
        });
        let _recorded = signal.observe_with(on_event);

        input.send(1);
        assert_eq!(seen.with(|s| s.clone()), vec![Event::Value(1), Event::Value(2)]);
    }
}
