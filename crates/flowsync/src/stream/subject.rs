//! Stream that always holds a current value

use std::sync::Arc;

use flowsync_core::Lock;

use super::channel::{self, Registry, RegistryOwner, Values};

/// A value cell whose updates can be awaited
///
/// Every consumer opened with [`values`](Self::values) starts with the value
/// current at that moment, followed by every later [`send`](Self::send).
pub struct CurrentValueAsyncSubject<T> {
    state: Arc<Lock<SubjectState<T>>>,
}

struct SubjectState<T> {
    registry: Registry<T>,
    value: T,
}

impl<T: Send + 'static> RegistryOwner<T> for SubjectState<T> {
    fn registry(&mut self) -> &mut Registry<T> {
        &mut self.registry
    }
}

impl<T: Clone + Send + 'static> CurrentValueAsyncSubject<T> {
    pub fn new(initial: T) -> Self {
        Self {
            state: Arc::new(Lock::new(SubjectState {
                registry: Registry::new(),
                value: initial,
            })),
        }
    }

    /// Point-in-time read of the current value
    pub fn value(&self) -> T {
        self.state.with(|s| s.value.clone())
    }

    /// Replace the current value and send it to every consumer
    pub fn send(&self, value: T) {
        let channels = self.state.with(|s| {
            let channels = s.registry.broadcast(&value);
            s.value = value;
            channels
        });
        channel::notify_all(channels);
    }

    /// Open a consumer whose first element is the current value
    pub fn values(&self) -> Values<T> {
        let (id, core) = self.state.with(|s| {
            let (id, core) = s.registry.open();
            core.push(s.value.clone());
            (id, core)
        });
        channel::consumer(&self.state, id, core)
    }

    /// End every open consumer; the subject itself stays usable
    pub fn finish_continuations(&self) {
        let channels = self.state.with(|s| s.registry.close_all());
        channel::notify_all(channels);
    }

    /// Number of consumers currently registered
    pub fn subscriber_count(&self) -> usize {
        self.state.with(|s| s.registry.len())
    }
}

impl<T> Clone for CurrentValueAsyncSubject<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone + Send + Default + 'static> Default for CurrentValueAsyncSubject<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    #[test]
    fn test_value_is_synchronous() {
        let subject = CurrentValueAsyncSubject::new(1);
        assert_eq!(subject.value(), 1);
        subject.send(2);
        assert_eq!(subject.value(), 2);
    }

    #[test]
    fn test_consumer_starts_with_current() {
        let subject = CurrentValueAsyncSubject::new("a");
        subject.send("b");

        let mut values = task::spawn(subject.values());
        assert_ready_eq!(values.poll_next(), Some("b"));
        assert_pending!(values.poll_next());

        subject.send("c");
        subject.send("d");
        assert!(values.is_woken());
        assert_ready_eq!(values.poll_next(), Some("c"));
        assert_ready_eq!(values.poll_next(), Some("d"));
    }

    #[test]
    fn test_each_consumer_sees_its_own_current() {
        let subject = CurrentValueAsyncSubject::new(0);
        let mut early = task::spawn(subject.values());
        subject.send(1);
        let mut late = task::spawn(subject.values());

        assert_ready_eq!(early.poll_next(), Some(0));
        assert_ready_eq!(early.poll_next(), Some(1));
        assert_ready_eq!(late.poll_next(), Some(1));
        assert_pending!(late.poll_next());
    }

    #[test]
    fn test_finish_continuations() {
        let subject = CurrentValueAsyncSubject::new(9);
        let mut values = task::spawn(subject.values());
        subject.finish_continuations();

        assert_eq!(subject.subscriber_count(), 0);
        assert_ready_eq!(values.poll_next(), Some(9));
        assert_ready_eq!(values.poll_next(), None);

        subject.send(10);
        assert_eq!(subject.value(), 10);
    }

    #[test]
    fn test_dropping_subject_ends_consumers() {
        let subject = CurrentValueAsyncSubject::new(1);
        let mut values = task::spawn(subject.values());
        subject.send(2);
        drop(subject);

        assert_ready_eq!(values.poll_next(), Some(1));
        assert_ready_eq!(values.poll_next(), Some(2));
        assert_ready_eq!(values.poll_next(), None);
    }
}
