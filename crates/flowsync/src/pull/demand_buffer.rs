//! Demand-aware delivery buffer
//!
//! Every operator that produces values for a pull subscriber routes them
//! through a `DemandBuffer`. A value is handed over at once if the
//! subscriber has outstanding demand, otherwise it waits here until more
//! demand arrives. Delivery happens outside the lock and is serialised by
//! a `draining` flag: whichever thread finds the flag clear becomes the
//! drainer and delivers until nothing deliverable is left, so values
//! always leave in the order they were pushed even when producers and the
//! subscriber's `request` calls race on different threads.

use std::collections::VecDeque;
use std::sync::Arc;

use flowsync_core::{Demand, DemandCounter, Lock};

use super::{Completion, Subscriber};
use crate::config::StreamConfig;

/// Buffer between a producer and one pull subscriber
pub struct DemandBuffer<T, E> {
    state: Lock<BufferState<T, E>>,
    config: StreamConfig,
}

struct BufferState<T, E> {
    buffer: VecDeque<T>,
    demand: DemandCounter,
    completion: Option<Completion<E>>,
    /// Released once the terminal event is delivered or on cancel
    subscriber: Option<Arc<dyn Subscriber<T, E>>>,
    draining: bool,
    terminated: bool,
}

/// Next thing the drainer does after dropping the lock
enum Step<T, E> {
    Deliver(Arc<dyn Subscriber<T, E>>, T),
    Complete(Arc<dyn Subscriber<T, E>>, Completion<E>),
    Idle,
}

impl<T, E> DemandBuffer<T, E> {
    pub fn new(subscriber: Arc<dyn Subscriber<T, E>>) -> Self {
        Self::with_config(subscriber, StreamConfig::global().clone())
    }

    pub fn with_config(subscriber: Arc<dyn Subscriber<T, E>>, config: StreamConfig) -> Self {
        Self {
            state: Lock::new(BufferState {
                buffer: VecDeque::new(),
                demand: DemandCounter::new(),
                completion: None,
                subscriber: Some(subscriber),
                draining: false,
                terminated: false,
            }),
            config,
        }
    }

    /// Queue a value without delivering it
    ///
    /// Dropped if a terminal event has already been queued or delivered.
    pub fn push(&self, value: T) {
        let len = self.state.with(|s| {
            if s.terminated || s.completion.is_some() {
                return None;
            }
            s.buffer.push_back(value);
            Some(s.buffer.len())
        });
        if let Some(len) = len {
            if self.config.should_warn_buffer(len) {
                tracing::warn!(len, "demand buffer growing; subscriber is not keeping up");
            }
        }
    }

    /// Queue the terminal event without delivering it
    ///
    /// `Finished` is delivered after the buffered values. `Failed` drops
    /// whatever is still buffered and goes out next. Only the first
    /// terminal event counts.
    pub fn push_completion(&self, completion: Completion<E>) {
        self.state.with(|s| {
            if s.terminated || s.completion.is_some() {
                return;
            }
            if completion.is_failure() {
                s.buffer.clear();
            }
            s.completion = Some(completion);
        });
    }

    /// Add demand without delivering anything
    pub fn request(&self, demand: Demand) {
        self.state.with(|s| s.demand.request(demand));
    }

    /// Deliver everything the current demand allows
    ///
    /// Call with no lock held; the subscriber is invoked from here.
    pub fn drain(&self) {
        let became_drainer = self.state.with(|s| {
            if s.draining || s.terminated {
                false
            } else {
                s.draining = true;
                true
            }
        });
        if !became_drainer {
            return;
        }

        loop {
            match self.state.with(|s| s.next_step()) {
                Step::Deliver(subscriber, value) => {
                    let more = subscriber.receive(value);
                    if !more.is_none() {
                        self.state.with(|s| s.demand.request(more));
                    }
                }
                Step::Complete(subscriber, completion) => {
                    subscriber.receive_completion(completion);
                    return;
                }
                Step::Idle => return,
            }
        }
    }

    /// Push a value and drain
    pub fn send(&self, value: T) {
        self.push(value);
        self.drain();
    }

    /// Push the terminal event and drain
    pub fn complete(&self, completion: Completion<E>) {
        self.push_completion(completion);
        self.drain();
    }

    /// Add demand and drain
    pub fn demand(&self, demand: Demand) {
        self.request(demand);
        self.drain();
    }

    /// Stop all delivery and drop buffered values; idempotent
    pub fn cancel(&self) {
        // Take the subscriber out so it is dropped after the lock is released
        let _subscriber = self.state.with(|s| {
            s.terminated = true;
            s.buffer.clear();
            s.completion = None;
            s.subscriber.take()
        });
    }

    /// True once the terminal event went out or the buffer was cancelled
    pub fn is_terminated(&self) -> bool {
        self.state.with(|s| s.terminated)
    }

    /// Values waiting for demand
    pub fn buffered(&self) -> usize {
        self.state.with(|s| s.buffer.len())
    }

    /// True while demand exceeds what is already buffered
    ///
    /// Lazy producers use this to decide whether to generate another value.
    pub fn wants_more(&self) -> bool {
        self.state.with(|s| {
            if s.terminated || s.completion.is_some() {
                return false;
            }
            match s.demand.outstanding() {
                Demand::Unlimited => true,
                Demand::Max(n) => n > s.buffer.len(),
            }
        })
    }

    /// Requested demand not yet satisfied
    pub fn outstanding(&self) -> Demand {
        self.state.with(|s| s.demand.outstanding())
    }
}

impl<T, E> BufferState<T, E> {
    fn next_step(&mut self) -> Step<T, E> {
        if self.terminated {
            self.draining = false;
            return Step::Idle;
        }

        let terminal_ready = match &self.completion {
            Some(Completion::Failed(_)) => true,
            Some(Completion::Finished) => self.buffer.is_empty(),
            None => false,
        };
        if terminal_ready {
            self.terminated = true;
            self.draining = false;
            if let (Some(completion), Some(subscriber)) = (self.completion.take(), self.subscriber.take()) {
                return Step::Complete(subscriber, completion);
            }
            return Step::Idle;
        }

        if !self.buffer.is_empty() && self.demand.try_consume() {
            if let (Some(value), Some(subscriber)) = (self.buffer.pop_front(), self.subscriber.clone()) {
                return Step::Deliver(subscriber, value);
            }
        }

        self.draining = false;
        Step::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pull::testing::Recorder;

    fn buffer(recorder: &Arc<Recorder<u32, &'static str>>) -> DemandBuffer<u32, &'static str> {
        DemandBuffer::with_config(recorder.clone(), StreamConfig::defaults())
    }

    #[test]
    fn test_buffers_until_demand() {
        let recorder = Recorder::new(Demand::NONE, Demand::NONE);
        let buf = buffer(&recorder);

        buf.send(1);
        buf.send(2);
        assert!(recorder.values().is_empty());
        assert_eq!(buf.buffered(), 2);

        buf.demand(Demand::max(1));
        assert_eq!(recorder.values(), vec![1]);

        buf.demand(Demand::max(5));
        assert_eq!(recorder.values(), vec![1, 2]);
        assert_eq!(buf.outstanding(), Demand::max(4));
    }

    #[test]
    fn test_demand_returned_from_receive() {
        let recorder = Recorder::new(Demand::NONE, Demand::max(1));
        let buf = buffer(&recorder);
        for i in 0..4 {
            buf.push(i);
        }

        buf.demand(Demand::max(1));
        assert_eq!(recorder.values(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_finished_waits_for_buffer() {
        let recorder = Recorder::new(Demand::NONE, Demand::NONE);
        let buf = buffer(&recorder);
        buf.send(1);
        buf.complete(Completion::Finished);
        assert_eq!(recorder.completion_count(), 0);

        buf.demand(Demand::max(1));
        assert_eq!(recorder.values(), vec![1]);
        assert_eq!(recorder.completions(), vec![Completion::Finished]);
        assert!(buf.is_terminated());
    }

    #[test]
    fn test_failure_skips_buffer() {
        let recorder = Recorder::new(Demand::NONE, Demand::NONE);
        let buf = buffer(&recorder);
        buf.send(1);
        buf.send(2);
        buf.complete(Completion::Failed("boom"));

        assert!(recorder.values().is_empty());
        assert_eq!(recorder.completions(), vec![Completion::Failed("boom")]);
    }

    #[test]
    fn test_single_terminal_event() {
        let recorder = Recorder::new(Demand::Unlimited, Demand::NONE);
        let buf = buffer(&recorder);
        buf.complete(Completion::Failed("first"));
        buf.complete(Completion::Finished);
        buf.send(9);

        assert!(recorder.values().is_empty());
        assert_eq!(recorder.completions(), vec![Completion::Failed("first")]);
    }

    #[test]
    fn test_cancel_drops_buffer() {
        let recorder = Recorder::new(Demand::NONE, Demand::NONE);
        let buf = buffer(&recorder);
        buf.send(1);
        buf.cancel();
        buf.cancel();
        buf.demand(Demand::Unlimited);

        assert!(recorder.values().is_empty());
        assert_eq!(recorder.completion_count(), 0);
        assert_eq!(buf.buffered(), 0);
    }

    #[test]
    fn test_concurrent_producers_keep_per_thread_order() {
        let recorder = Recorder::new(Demand::NONE, Demand::NONE);
        let buf = Arc::new(buffer(&recorder));
        let mut handles = vec![];

        for t in 0..4u32 {
            let buf = Arc::clone(&buf);
            handles.push(std::thread::spawn(move || {
                for i in 0..250 {
                    buf.send(t * 1000 + i);
                }
            }));
        }
        let demander = {
            let buf = Arc::clone(&buf);
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    buf.demand(Demand::max(1));
                }
            })
        };
        for h in handles {
            h.join().unwrap();
        }
        demander.join().unwrap();
        buf.drain();

        let values = recorder.values();
        assert_eq!(values.len(), 1000);
        for t in 0..4u32 {
            let from_thread: Vec<u32> = values.iter().copied().filter(|v| v / 1000 == t).collect();
            assert_eq!(from_thread, (0..250).map(|i| t * 1000 + i).collect::<Vec<_>>());
        }
    }
}
