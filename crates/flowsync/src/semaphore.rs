//! Counting semaphore for async tasks
//!
//! `wait()` takes a permit, suspending the task while none is available;
//! `signal()` returns one and resumes the longest-waiting task.
//!
//! The count may go negative: `-value` is the number of tasks currently
//! suspended. Every state transition happens under the semaphore's lock,
//! and wakers are invoked only after it has been released.
//!
//! # Example
//!
//! ```ignore
//! let semaphore = Arc::new(AsyncSemaphore::new(2));
//!
//! // In a task:
//! semaphore.wait().await;
//! // ... at most two tasks run this section at a time ...
//! semaphore.signal();
//! ```

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};
use std::collections::VecDeque;

use flowsync_core::{CancelRegistration, CancellationToken, Lock, SyncError, SyncResult};

use crate::config::StreamConfig;

/// Identifies one suspended wait within its semaphore
type WaiterId = u64;

/// A counting semaphore usable from async tasks
///
/// Waiters are resumed in FIFO order.
///
/// # Panics
///
/// Dropping the semaphore while a task is suspended on it panics. Wait
/// futures borrow the semaphore, so this can only happen if one was
/// leaked with `mem::forget`.
pub struct AsyncSemaphore {
    state: Lock<SemaphoreState>,
}

struct SemaphoreState {
    /// Permits available; negative while tasks are suspended
    value: isize,
    /// Waiters in arrival order
    waiters: VecDeque<(WaiterId, Waiter)>,
    next_id: WaiterId,
}

/// Semaphore-side record of a suspended wait
enum Waiter {
    /// Parked until a `signal()`
    Suspended { waker: Waker, cancellable: bool },
    /// Handed a permit by `signal()`; the future has not observed it yet
    Resumed,
}

impl SemaphoreState {
    fn position(&self, id: WaiterId) -> Option<usize> {
        self.waiters.iter().position(|(waiter_id, _)| *waiter_id == id)
    }

    fn suspended_count(&self) -> usize {
        self.waiters
            .iter()
            .filter(|(_, w)| matches!(w, Waiter::Suspended { .. }))
            .count()
    }

    /// Hand a permit to the oldest suspended waiter
    fn resume_next(&mut self) -> Option<(WaiterId, Waker)> {
        self.waiters.iter_mut().find_map(|(id, waiter)| match waiter {
            Waiter::Suspended { .. } => match core::mem::replace(waiter, Waiter::Resumed) {
                Waiter::Suspended { waker, .. } => Some((*id, waker)),
                Waiter::Resumed => None,
            },
            Waiter::Resumed => None,
        })
    }
}

impl AsyncSemaphore {
    /// Create a semaphore holding `value` permits
    ///
    /// # Panics
    ///
    /// Panics if `value` is negative.
    pub fn new(value: isize) -> Self {
        if value < 0 {
            tracing::error!(value, "AsyncSemaphore created with a negative count");
            panic!("AsyncSemaphore requires a non-negative initial value, got {value}");
        }
        Self {
            state: Lock::new(SemaphoreState {
                value,
                waiters: VecDeque::new(),
                next_id: 0,
            }),
        }
    }

    /// Return a permit, resuming one suspended task if there is any
    ///
    /// Returns `true` if a task was resumed.
    pub fn signal(&self) -> bool {
        let resumed = self.state.with(|s| {
            s.value += 1;
            s.resume_next()
        });

        match resumed {
            Some((id, waker)) => {
                log_waiter("resumed", id);
                waker.wake();
                true
            }
            None => false,
        }
    }

    /// Take a permit if one is available without suspending
    pub fn try_wait(&self) -> bool {
        self.state.with(|s| {
            if s.value > 0 {
                s.value -= 1;
                true
            } else {
                false
            }
        })
    }

    /// Take a permit, suspending until one is signalled
    ///
    /// The wait itself cannot be cancelled. Dropping the future before it
    /// completes gives the permit back.
    pub fn wait(&self) -> Wait<'_> {
        Wait {
            acquire: Acquire::new(self, None),
        }
    }

    /// Take a permit unless `token` is cancelled first
    ///
    /// Resolves to `Err(SyncError::Cancelled)` if the token is cancelled
    /// before or during the wait. A cancelled wait never consumes a
    /// permit: the count is restored and the waiter is removed.
    pub fn wait_unless_cancelled<'a>(&'a self, token: &'a CancellationToken) -> WaitUnlessCancelled<'a> {
        WaitUnlessCancelled {
            acquire: Acquire::new(self, Some(token)),
        }
    }

    /// Current count; negative values count suspended tasks
    pub fn value(&self) -> isize {
        self.state.with(|s| s.value)
    }

    /// Number of tasks currently suspended
    pub fn waiter_count(&self) -> usize {
        self.state.with(|s| s.suspended_count())
    }
}

impl Drop for AsyncSemaphore {
    fn drop(&mut self) {
        let suspended = self.state.get_mut().suspended_count();
        if suspended > 0 {
            tracing::error!(suspended, "AsyncSemaphore dropped with suspended waiters");
            panic!("AsyncSemaphore dropped while {suspended} task(s) are suspended on it");
        }
    }
}

impl std::fmt::Debug for AsyncSemaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (value, waiters) = self.state.with(|s| (s.value, s.suspended_count()));
        f.debug_struct("AsyncSemaphore")
            .field("value", &value)
            .field("waiters", &waiters)
            .finish()
    }
}

fn log_waiter(event: &'static str, id: WaiterId) {
    if StreamConfig::global().trace_waiters {
        tracing::debug!(waiter = id, event, "semaphore waiter");
    } else {
        tracing::trace!(waiter = id, event, "semaphore waiter");
    }
}

// ============================================================================
// Wait futures
// ============================================================================

/// Future-side state of one wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitPhase {
    /// Not polled yet; the count is untouched
    Pending,
    /// Queued on the semaphore
    Suspended(WaiterId),
    /// Holds a permit
    Done,
    /// Ended with `SyncError::Cancelled`
    Cancelled,
}

/// Outcome of re-examining a suspended waiter
enum Wakeup {
    Acquired,
    Cancelled,
    Parked,
}

struct Acquire<'a> {
    semaphore: &'a AsyncSemaphore,
    token: Option<&'a CancellationToken>,
    phase: WaitPhase,
    registration: Option<CancelRegistration>,
}

impl<'a> Acquire<'a> {
    fn new(semaphore: &'a AsyncSemaphore, token: Option<&'a CancellationToken>) -> Self {
        Self {
            semaphore,
            token,
            phase: WaitPhase::Pending,
            registration: None,
        }
    }

    fn token_cancelled(&self) -> bool {
        self.token.is_some_and(CancellationToken::is_cancelled)
    }

    fn poll_acquire(&mut self, cx: &mut Context<'_>) -> Poll<SyncResult<()>> {
        match self.phase {
            WaitPhase::Pending => self.poll_first(cx),
            WaitPhase::Suspended(id) => self.poll_suspended(id, cx),
            WaitPhase::Done | WaitPhase::Cancelled => {
                panic!("semaphore wait polled after completion")
            }
        }
    }

    fn poll_first(&mut self, cx: &mut Context<'_>) -> Poll<SyncResult<()>> {
        if self.token_cancelled() {
            self.phase = WaitPhase::Cancelled;
            return Poll::Ready(Err(SyncError::Cancelled));
        }

        let cancellable = self.token.is_some();
        let queued = self.semaphore.state.with(|s| {
            s.value -= 1;
            if s.value >= 0 {
                return None;
            }
            let id = s.next_id;
            s.next_id += 1;
            s.waiters.push_back((
                id,
                Waiter::Suspended {
                    waker: cx.waker().clone(),
                    cancellable,
                },
            ));
            Some(id)
        });

        let Some(id) = queued else {
            self.phase = WaitPhase::Done;
            return Poll::Ready(Ok(()));
        };

        log_waiter("suspended", id);
        self.phase = WaitPhase::Suspended(id);
        if let Some(token) = self.token {
            self.registration = Some(token.register(cx.waker()));
            // A cancel that raced the registration would otherwise be lost
            if token.is_cancelled() {
                return self.poll_suspended(id, cx);
            }
        }
        Poll::Pending
    }

    fn poll_suspended(&mut self, id: WaiterId, cx: &mut Context<'_>) -> Poll<SyncResult<()>> {
        let cancelled = self.token_cancelled();
        let wakeup = self.semaphore.state.with(|s| {
            let Some(pos) = s.position(id) else {
                unreachable!("suspended waiter missing from its semaphore");
            };
            match &mut s.waiters[pos].1 {
                Waiter::Resumed => {
                    s.waiters.remove(pos);
                    Wakeup::Acquired
                }
                Waiter::Suspended { cancellable: true, .. } if cancelled => {
                    s.waiters.remove(pos);
                    s.value += 1;
                    Wakeup::Cancelled
                }
                Waiter::Suspended { waker, .. } => {
                    if !waker.will_wake(cx.waker()) {
                        *waker = cx.waker().clone();
                    }
                    Wakeup::Parked
                }
            }
        });

        match wakeup {
            Wakeup::Acquired => {
                self.phase = WaitPhase::Done;
                self.registration = None;
                Poll::Ready(Ok(()))
            }
            Wakeup::Cancelled => {
                log_waiter("cancelled", id);
                self.phase = WaitPhase::Cancelled;
                self.registration = None;
                Poll::Ready(Err(SyncError::Cancelled))
            }
            Wakeup::Parked => {
                if let Some(registration) = &self.registration {
                    registration.update(cx.waker());
                }
                Poll::Pending
            }
        }
    }
}

impl Drop for Acquire<'_> {
    fn drop(&mut self) {
        let WaitPhase::Suspended(id) = self.phase else {
            return;
        };

        // Abandoned while queued: refund the permit, or pass it on if
        // signal() already handed it to us.
        let pass_on = self.semaphore.state.with(|s| {
            let pos = s.position(id)?;
            match s.waiters.remove(pos) {
                Some((_, Waiter::Resumed)) => Some(()),
                Some((_, Waiter::Suspended { .. })) => {
                    s.value += 1;
                    None
                }
                None => None,
            }
        });

        log_waiter("abandoned", id);
        if pass_on.is_some() {
            self.semaphore.signal();
        }
    }
}

/// Future returned by [`AsyncSemaphore::wait`]
#[must_use = "futures do nothing unless polled"]
pub struct Wait<'a> {
    acquire: Acquire<'a>,
}

impl Future for Wait<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        // No token, so the wait cannot end cancelled
        self.acquire.poll_acquire(cx).map(|_| ())
    }
}

/// Future returned by [`AsyncSemaphore::wait_unless_cancelled`]
#[must_use = "futures do nothing unless polled"]
pub struct WaitUnlessCancelled<'a> {
    acquire: Acquire<'a>,
}

impl Future for WaitUnlessCancelled<'_> {
    type Output = SyncResult<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<SyncResult<()>> {
        self.acquire.poll_acquire(cx)
    }
}
