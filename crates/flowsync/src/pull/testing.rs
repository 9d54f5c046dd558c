//! Recording subscriber shared by the pull and bridge tests

use std::sync::Arc;

use flowsync_core::{Demand, Lock};

use super::{Completion, Subscriber, Subscription};

/// Subscriber that records everything and answers with fixed demand
pub(crate) struct Recorder<T, E> {
    pub values: Lock<Vec<T>>,
    pub completions: Lock<Vec<Completion<E>>>,
    pub subscription: Lock<Option<Arc<dyn Subscription>>>,
    pub initial: Demand,
    pub per_value: Demand,
}

impl<T, E> Recorder<T, E> {
    pub(crate) fn new(initial: Demand, per_value: Demand) -> Arc<Self> {
        Arc::new(Self {
            values: Lock::new(Vec::new()),
            completions: Lock::new(Vec::new()),
            subscription: Lock::new(None),
            initial,
            per_value,
        })
    }

    pub(crate) fn request(&self, demand: Demand) {
        let subscription = self.subscription.with(|s| s.clone());
        if let Some(subscription) = subscription {
            subscription.request(demand);
        }
    }

    pub(crate) fn cancel(&self) {
        let subscription = self.subscription.with(|s| s.clone());
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
    }

    pub(crate) fn completion_count(&self) -> usize {
        self.completions.with(|c| c.len())
    }
}

impl<T: Clone, E: Clone> Recorder<T, E> {
    pub(crate) fn values(&self) -> Vec<T> {
        self.values.with(|v| v.clone())
    }

    pub(crate) fn completions(&self) -> Vec<Completion<E>> {
        self.completions.with(|c| c.clone())
    }
}

impl<T: Send, E: Send> Subscriber<T, E> for Recorder<T, E> {
    fn receive_subscription(&self, subscription: Arc<dyn Subscription>) {
        self.subscription.with(|s| *s = Some(Arc::clone(&subscription)));
        if !self.initial.is_none() {
            subscription.request(self.initial);
        }
    }

    fn receive(&self, value: T) -> Demand {
        self.values.with(|v| v.push(value));
        self.per_value
    }

    fn receive_completion(&self, completion: Completion<E>) {
        self.completions.with(|c| c.push(completion));
    }
}

