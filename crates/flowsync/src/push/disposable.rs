use core::sync::atomic::{AtomicBool, Ordering};

use flowsync_core::Lock;

use super::Disposable;

type Action = Box<dyn FnOnce() + Send>;

/// Disposable that runs a closure the first time it is disposed
pub struct ActionDisposable {
    action: Lock<Option<Action>>,
    disposed: AtomicBool,
}

impl ActionDisposable {
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Lock::new(Some(Box::new(action))),
            disposed: AtomicBool::new(false),
        }
    }

    /// A disposable with nothing to do
    pub fn empty() -> Self {
        Self {
            action: Lock::new(None),
            disposed: AtomicBool::new(false),
        }
    }
}

impl Disposable for ActionDisposable {
    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(action) = self.action.with(Option::take) {
            action();
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ActionDisposable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDisposable")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_runs_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let disposable = {
            let runs = Arc::clone(&runs);
            ActionDisposable::new(move || {
                runs.fetch_add(1, Ordering::SeqCst);
            })
        };

        assert!(!disposable.is_disposed());
        disposable.dispose();
        disposable.dispose();
        assert!(disposable.is_disposed());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_dispose_runs_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let disposable = {
            let runs = Arc::clone(&runs);
            Arc::new(ActionDisposable::new(move || {
                runs.fetch_add(1, Ordering::SeqCst);
            }))
        };

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let d = Arc::clone(&disposable);
                std::thread::spawn(move || d.dispose())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
