//! Combine the latest values of many pull streams
//!
//! ```text
//!   source 0 ──► slot 0 ─┐
//!   source 1 ──► slot 1 ─┼──► row [latest 0, latest 1, ..] ──► DemandBuffer ──► subscriber
//!   source N ──► slot N ─┘
//! ```
//!
//! Nothing is subscribed until the downstream subscriber first asks for
//! values. Every slot is then asked for unlimited values; rows are
//! produced as soon as every slot holds a value and again on each later
//! slot update, and the output buffer holds them until there is demand.
//!
//! The combined stream finishes once every slot has finished. The first
//! slot failure cancels every other slot and fails the stream at once,
//! discarding rows that were still waiting for demand.

use std::sync::{Arc, Weak};

use flowsync_core::{Demand, Lock};

use super::{Completion, DemandBuffer, PullStream, Subscriber, Subscription};

/// Pull stream of rows holding the latest value from every source
pub struct CombineLatestMany<P> {
    sources: Arc<Vec<P>>,
}

/// Combine `sources` into one stream of `Vec` rows, one column per source
///
/// With no sources at all the stream emits one empty row and finishes.
///
/// # Example
///
/// ```ignore
/// let a = PullSubject::<i32, ()>::new();
/// let b = PullSubject::<i32, ()>::new();
/// let rows = combine_latest_many([a.clone(), b.clone()]);
/// let handle = rows.sink(|row| println!("{row:?}"), |_| {});
/// a.send(1);
/// b.send(2); // prints [1, 2]
/// a.send(3); // prints [3, 2]
/// ```
pub fn combine_latest_many<I, P>(sources: I) -> CombineLatestMany<P>
where
    I: IntoIterator<Item = P>,
    P: PullStream,
{
    CombineLatestMany {
        sources: Arc::new(sources.into_iter().collect()),
    }
}

impl<P> CombineLatestMany<P> {
    /// Number of columns in every row
    pub fn width(&self) -> usize {
        self.sources.len()
    }
}

impl<P> Clone for CombineLatestMany<P> {
    fn clone(&self) -> Self {
        Self {
            sources: Arc::clone(&self.sources),
        }
    }
}

impl<P> PullStream for CombineLatestMany<P>
where
    P: PullStream + 'static,
    P::Item: Clone,
{
    type Item = Vec<P::Item>;
    type Error = P::Error;

    fn subscribe(&self, subscriber: Arc<dyn Subscriber<Vec<P::Item>, P::Error>>) {
        let sources = Arc::clone(&self.sources);
        let output = DemandBuffer::new(Arc::clone(&subscriber));
        let subscription = Arc::new_cyclic(|this| CombineSubscription {
            this: this.clone(),
            state: Lock::new(CombineState {
                slots: (0..sources.len()).map(|_| Slot::default()).collect(),
                started: false,
                terminated: false,
            }),
            sources,
            output,
        });
        subscriber.receive_subscription(subscription);
    }
}

// ============================================================================
// Subscription
// ============================================================================

struct Slot<T> {
    handle: Option<Arc<dyn Subscription>>,
    latest: Option<T>,
    completed: bool,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            handle: None,
            latest: None,
            completed: false,
        }
    }
}

struct CombineState<T> {
    slots: Vec<Slot<T>>,
    started: bool,
    /// Set on completion, failure or cancel; slots are ignored afterwards
    terminated: bool,
}

impl<T> CombineState<T> {
    fn take_handles(&mut self) -> Vec<Arc<dyn Subscription>> {
        self.slots.iter_mut().filter_map(|slot| slot.handle.take()).collect()
    }
}

struct CombineSubscription<P: PullStream> {
    this: Weak<Self>,
    sources: Arc<Vec<P>>,
    // Lock order: state, then output
    state: Lock<CombineState<P::Item>>,
    output: DemandBuffer<Vec<P::Item>, P::Error>,
}

impl<P> CombineSubscription<P>
where
    P: PullStream + 'static,
    P::Item: Clone,
{
    fn start(&self) {
        if self.sources.is_empty() {
            self.state.with(|s| s.terminated = true);
            self.output.push(Vec::new());
            self.output.push_completion(Completion::Finished);
            return;
        }

        let Some(this) = self.this.upgrade() else {
            return;
        };
        tracing::debug!(slots = self.sources.len(), "combine_latest_many subscribing to sources");
        for (index, source) in self.sources.iter().enumerate() {
            source.subscribe(Arc::new(SlotSubscriber {
                index,
                parent: Arc::clone(&this),
            }));
        }
    }

    fn slot_subscribed(&self, index: usize, handle: Arc<dyn Subscription>) {
        let accepted = self.state.with(|s| {
            if s.terminated || s.slots[index].completed {
                return false;
            }
            s.slots[index].handle = Some(Arc::clone(&handle));
            true
        });
        if accepted {
            handle.request(Demand::Unlimited);
        } else {
            handle.cancel();
        }
    }

    fn slot_value(&self, index: usize, value: P::Item) {
        self.state.with(|s| {
            if s.terminated {
                return;
            }
            s.slots[index].latest = Some(value);
            let row: Option<Vec<P::Item>> = s.slots.iter().map(|slot| slot.latest.clone()).collect();
            if let Some(row) = row {
                self.output.push(row);
            }
        });
        self.output.drain();
    }

    fn slot_completed(&self, index: usize, completion: Completion<P::Error>) {
        let siblings = self.state.with(|s| {
            if s.terminated {
                return Vec::new();
            }
            let slot = &mut s.slots[index];
            slot.completed = true;
            slot.handle = None;

            match completion {
                Completion::Failed(error) => {
                    s.terminated = true;
                    self.output.push_completion(Completion::Failed(error));
                    s.take_handles()
                }
                Completion::Finished => {
                    if s.slots.iter().all(|slot| slot.completed) {
                        s.terminated = true;
                        self.output.push_completion(Completion::Finished);
                    }
                    Vec::new()
                }
            }
        });

        if !siblings.is_empty() {
            tracing::debug!(index, cancelled = siblings.len(), "slot failed; cancelling siblings");
        }
        for handle in siblings {
            handle.cancel();
        }
        self.output.drain();
    }
}

impl<P> Subscription for CombineSubscription<P>
where
    P: PullStream + 'static,
    P::Item: Clone,
{
    fn request(&self, demand: Demand) {
        self.output.request(demand);
        let first = self.state.with(|s| {
            let first = !s.started && !s.terminated;
            s.started = true;
            first
        });
        if first {
            self.start();
        }
        self.output.drain();
    }

    fn cancel(&self) {
        let handles = self.state.with(|s| {
            if s.terminated && s.slots.iter().all(|slot| slot.handle.is_none()) {
                return None;
            }
            s.terminated = true;
            Some(s.take_handles())
        });
        self.output.cancel();

        if let Some(handles) = handles {
            tracing::debug!(slots = handles.len(), "combine_latest_many cancelled");
            for handle in handles {
                handle.cancel();
            }
        }
    }
}

/// Subscriber attached to one source, feeding its slot
struct SlotSubscriber<P: PullStream> {
    index: usize,
    parent: Arc<CombineSubscription<P>>,
}

impl<P> Subscriber<P::Item, P::Error> for SlotSubscriber<P>
where
    P: PullStream + 'static,
    P::Item: Clone,
{
    fn receive_subscription(&self, subscription: Arc<dyn Subscription>) {
        self.parent.slot_subscribed(self.index, subscription);
    }

    fn receive(&self, value: P::Item) -> Demand {
        self.parent.slot_value(self.index, value);
        Demand::NONE
    }

    fn receive_completion(&self, completion: Completion<P::Error>) {
        self.parent.slot_completed(self.index, completion);
    }
}
