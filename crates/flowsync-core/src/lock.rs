//! Exclusive lock for short critical sections
//!
//! Every primitive in flowsync guards its bookkeeping (waiter lists,
//! consumer registries, demand counters) with one of these. Sections are a
//! handful of field updates, so the lock spins briefly and then yields the
//! OS thread instead of parking.
//!
//! # Rules
//!
//! A guard must never be held across an `.await`, and never while calling
//! a `Waker`, a subscriber or an observer. Collect what needs to be done
//! under the lock, drop the guard, then call out.

use core::cell::UnsafeCell;
use core::fmt;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

/// Spins before the waiting thread starts yielding
const SPINS_BEFORE_YIELD: u32 = 64;

/// A mutual-exclusion lock with an RAII guard
pub struct Lock<T> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

// Safety: Lock hands out access to T to one holder at a time
unsafe impl<T: Send> Send for Lock<T> {}
unsafe impl<T: Send> Sync for Lock<T> {}

impl<T> Lock<T> {
    /// Create a new lock protecting `value`
    #[inline]
    pub const fn new(value: T) -> Self {
        Lock {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(value),
        }
    }

    /// Acquire the lock, spinning and then yielding until it is free
    #[inline]
    pub fn lock(&self) -> LockGuard<'_, T> {
        let mut attempts = 0u32;
        loop {
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return LockGuard { lock: self };
            }

            while self.locked.load(Ordering::Relaxed) {
                if attempts < SPINS_BEFORE_YIELD {
                    attempts += 1;
                    core::hint::spin_loop();
                } else {
                    std::thread::yield_now();
                }
            }
        }
    }

    /// Try to acquire the lock without waiting
    #[inline]
    pub fn try_lock(&self) -> Option<LockGuard<'_, T>> {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| LockGuard { lock: self })
    }

    /// Run `f` with the lock held and return its result
    ///
    /// The guard is released before this returns, which makes it the
    /// preferred form when the caller has to call out afterwards.
    #[inline]
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    /// Mutable access without locking; `&mut self` proves exclusivity
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Consume the lock and return the protected value
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    /// Check if the lock is currently held (hint only)
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

impl<T: Default> Default for Lock<T> {
    fn default() -> Self {
        Lock::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Lock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_lock() {
            Some(guard) => f.debug_struct("Lock").field("data", &*guard).finish(),
            None => f.debug_struct("Lock").field("data", &"<locked>").finish(),
        }
    }
}

/// Guard that releases the lock when dropped
pub struct LockGuard<'a, T> {
    lock: &'a Lock<T>,
}

impl<'a, T> Deref for LockGuard<'a, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // Safety: We hold the lock
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> DerefMut for LockGuard<'a, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // Safety: We hold the lock
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T> Drop for LockGuard<'a, T> {
    #[inline]
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_lock_basic() {
        let lock = Lock::new(0u32);
        *lock.lock() = 42;
        assert_eq!(*lock.lock(), 42);
    }

    #[test]
    fn test_try_lock_while_held() {
        let lock = Lock::new(());

        let guard = lock.try_lock();
        assert!(guard.is_some());
        assert!(lock.try_lock().is_none());
        assert!(lock.is_locked());

        drop(guard);
        assert!(lock.try_lock().is_some());
    }

    #[test]
    fn test_with_releases_before_return() {
        let lock = Lock::new(vec![1, 2]);
        let len = lock.with(|v| {
            v.push(3);
            v.len()
        });
        assert_eq!(len, 3);
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_concurrent_increments() {
        let lock = Arc::new(Lock::new(0u32));
        let mut handles = vec![];

        for _ in 0..4 {
            let lock = Arc::clone(&lock);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    lock.with(|n| *n += 1);
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(*lock.lock(), 4000);
    }

    #[test]
    fn test_debug_shows_locked() {
        let lock = Lock::new(7);
        assert_eq!(format!("{:?}", lock), "Lock { data: 7 }");
        let _guard = lock.lock();
        assert_eq!(format!("{:?}", lock), "Lock { data: \"<locked>\" }");
    }
}
