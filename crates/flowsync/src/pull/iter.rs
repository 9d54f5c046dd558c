//! Cold pull source over an iterator
//!
//! Every subscriber gets a fresh iterator. Values are pulled from it only
//! while the subscriber has unmet demand, so an infinite iterator is fine
//! as long as demand stays bounded.

use std::iter::Peekable;
use std::marker::PhantomData;
use std::sync::Arc;

use flowsync_core::{Demand, Lock};

use super::{Completion, DemandBuffer, PullStream, Subscriber, Subscription};

/// Pull source yielding the items of a cloneable collection
pub struct Iter<I, E> {
    items: I,
    _error: PhantomData<fn() -> E>,
}

/// Build a cold pull source from `items`
///
/// # Example
///
/// ```ignore
/// let numbers = pull::iter::<_, ()>(vec![1, 2, 3]);
/// let handle = numbers.sink(|n| println!("{n}"), |_| {});
/// ```
pub fn iter<I, E>(items: I) -> Iter<I, E>
where
    I: IntoIterator + Clone,
{
    Iter {
        items,
        _error: PhantomData,
    }
}

impl<I: Clone, E> Clone for Iter<I, E> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            _error: PhantomData,
        }
    }
}

impl<I, E> PullStream for Iter<I, E>
where
    I: IntoIterator + Clone + Send + Sync + 'static,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
    E: Send + 'static,
{
    type Item = I::Item;
    type Error = E;

    fn subscribe(&self, subscriber: Arc<dyn Subscriber<I::Item, E>>) {
        let subscription = Arc::new(IterSubscription {
            source: Lock::new(Some(self.items.clone().into_iter().peekable())),
            output: DemandBuffer::new(Arc::clone(&subscriber)),
        });
        subscriber.receive_subscription(subscription.clone());
        // Completes an empty source even if nothing is ever requested
        subscription.pump();
    }
}

struct IterSubscription<It: Iterator, E> {
    /// `None` once exhausted or cancelled
    source: Lock<Option<Peekable<It>>>,
    output: DemandBuffer<It::Item, E>,
}

impl<It: Iterator, E> IterSubscription<It, E> {
    fn pump(&self) {
        while self.produce_one() {
            self.output.drain();
        }
        self.output.drain();
    }

    /// Pull one value if there is room for it; false when nothing was pulled
    fn produce_one(&self) -> bool {
        self.source.with(|source| {
            let Some(iter) = source.as_mut() else {
                return false;
            };

            let mut produced = false;
            if self.output.wants_more() {
                if let Some(value) = iter.next() {
                    self.output.push(value);
                    produced = true;
                }
            }
            if iter.peek().is_none() {
                *source = None;
                self.output.push_completion(Completion::Finished);
                return false;
            }
            produced
        })
    }
}

impl<It, E> Subscription for IterSubscription<It, E>
where
    It: Iterator + Send,
    It::Item: Send,
    E: Send,
{
    fn request(&self, demand: Demand) {
        self.output.request(demand);
        self.pump();
    }

    fn cancel(&self) {
        self.output.cancel();
        let _exhausted = self.source.with(Option::take);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pull::testing::Recorder;

    #[test]
    fn test_pulls_only_what_is_requested() {
        let recorder = Recorder::<i32, ()>::new(Demand::max(2), Demand::NONE);
        iter(vec![1, 2, 3, 4]).subscribe(recorder.clone());
        assert_eq!(recorder.values(), vec![1, 2]);
        assert_eq!(recorder.completion_count(), 0);

        recorder.request(Demand::max(2));
        assert_eq!(recorder.values(), vec![1, 2, 3, 4]);
        assert_eq!(recorder.completions(), vec![Completion::Finished]);
    }

    #[test]
    fn test_infinite_source_stays_lazy() {
        let recorder = Recorder::<u64, ()>::new(Demand::max(3), Demand::NONE);
        let naturals = iter(0u64..);
        naturals.subscribe(recorder.clone());
        assert_eq!(recorder.values(), vec![0, 1, 2]);

        recorder.cancel();
        recorder.request(Demand::max(10));
        assert_eq!(recorder.values().len(), 3);
        assert_eq!(recorder.completion_count(), 0);
    }

    #[test]
    fn test_empty_completes_without_demand() {
        let recorder = Recorder::<i32, ()>::new(Demand::NONE, Demand::NONE);
        iter::<Vec<i32>, ()>(Vec::new()).subscribe(recorder.clone());
        assert_eq!(recorder.completions(), vec![Completion::Finished]);
    }

    #[test]
    fn test_demand_from_receive_keeps_pulling() {
        let recorder = Recorder::<i32, ()>::new(Demand::max(1), Demand::max(1));
        iter([5, 6, 7]).subscribe(recorder.clone());
        assert_eq!(recorder.values(), vec![5, 6, 7]);
        assert_eq!(recorder.completions(), vec![Completion::Finished]);
    }

    #[test]
    fn test_each_subscriber_gets_fresh_iterator() {
        let source = iter::<_, ()>(vec!['a', 'b']);
        let first = Recorder::<char, ()>::new(Demand::Unlimited, Demand::NONE);
        let second = Recorder::<char, ()>::new(Demand::Unlimited, Demand::NONE);
        source.subscribe(first.clone());
        source.subscribe(second.clone());
        assert_eq!(first.values(), vec!['a', 'b']);
        assert_eq!(second.values(), vec!['a', 'b']);
    }
}
