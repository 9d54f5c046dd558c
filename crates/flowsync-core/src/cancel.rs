//! Cancellation token for cooperative cancellation
//!
//! A task that may be cancelled is handed a token. Waiting primitives check
//! it before suspending and register their `Waker` with it, so a `cancel()`
//! issued while they are parked wakes them up to observe it.
//!
//! Tokens can be linked to form parent-child relationships: cancelling a
//! parent cancels every descendant, never the other way round.

use core::future::Future;
use core::pin::Pin;
use core::sync::atomic::{AtomicBool, Ordering};
use core::task::{Context, Poll, Waker};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{SyncError, SyncResult};
use crate::id::SubscriptionId;
use crate::lock::Lock;

/// Token for checking and triggering cancellation
///
/// Clones share state. A token made with [`CancellationToken::never`]
/// carries no state at all and can never be cancelled.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Option<Arc<TokenInner>>,
}

struct TokenInner {
    cancelled: AtomicBool,
    parent: Option<CancellationToken>,
    /// Wakers of tasks parked on this token or on a descendant
    wakers: Lock<HashMap<SubscriptionId, Waker>>,
}

impl CancellationToken {
    /// Create a new independent cancellation token
    pub fn new() -> Self {
        Self::with_parent(None)
    }

    /// Create a token that never cancels and allocates nothing
    pub const fn never() -> Self {
        Self { inner: None }
    }

    /// Create a child token linked to this one
    ///
    /// The child observes cancellation of this token (and of its
    /// ancestors). Cancelling the child leaves this token untouched.
    pub fn child(&self) -> Self {
        Self::with_parent(Some(self.clone()))
    }

    fn with_parent(parent: Option<CancellationToken>) -> Self {
        Self {
            inner: Some(Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                parent,
                wakers: Lock::new(HashMap::new()),
            })),
        }
    }

    /// Check if cancellation was requested here or on any ancestor
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        let mut current = self;
        while let Some(inner) = &current.inner {
            if inner.cancelled.load(Ordering::Acquire) {
                return true;
            }
            match &inner.parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
        false
    }

    /// Request cancellation and wake every task parked on this token
    ///
    /// Idempotent; only the first call wakes anything.
    pub fn cancel(&self) {
        let Some(inner) = &self.inner else {
            return;
        };
        if inner.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }

        let wakers: Vec<Waker> = inner.wakers.with(|w| w.drain().map(|(_, w)| w).collect());
        tracing::debug!(parked = wakers.len(), "cancellation token cancelled");
        for waker in wakers {
            waker.wake();
        }
    }

    /// Return `Err(SyncError::Cancelled)` if cancelled
    ///
    /// ```ignore
    /// loop {
    ///     token.check()?;
    ///     // ... do work ...
    /// }
    /// ```
    #[inline]
    pub fn check(&self) -> SyncResult<()> {
        if self.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Ask to be woken when this token (or an ancestor) is cancelled
    ///
    /// The waker is recorded on every stateful token in the chain. A
    /// cancel racing with this call may be missed, so callers re-check
    /// `is_cancelled()` after registering.
    pub fn register(&self, waker: &Waker) -> CancelRegistration {
        let key = SubscriptionId::next();
        let mut chain = Vec::new();
        let mut current = self;
        while let Some(inner) = &current.inner {
            inner.wakers.with(|w| w.insert(key, waker.clone()));
            chain.push(Arc::clone(inner));
            match &inner.parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
        CancelRegistration { key, chain }
    }

    /// Future that resolves once this token is cancelled
    pub fn cancelled(&self) -> WaitForCancellation<'_> {
        WaitForCancellation {
            token: self,
            registration: None,
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("never", &self.inner.is_none())
            .finish()
    }
}

/// Waker registration returned by [`CancellationToken::register`]
///
/// Dropping it removes the waker from every token it was recorded on.
pub struct CancelRegistration {
    key: SubscriptionId,
    chain: Vec<Arc<TokenInner>>,
}

impl CancelRegistration {
    /// Replace the recorded waker if the task's waker changed
    pub fn update(&self, waker: &Waker) {
        for inner in &self.chain {
            inner.wakers.with(|w| {
                if let Some(existing) = w.get_mut(&self.key) {
                    if !existing.will_wake(waker) {
                        *existing = waker.clone();
                    }
                }
            });
        }
    }
}

impl Drop for CancelRegistration {
    fn drop(&mut self) {
        for inner in &self.chain {
            inner.wakers.with(|w| w.remove(&self.key));
        }
    }
}

/// Future returned by [`CancellationToken::cancelled`]
pub struct WaitForCancellation<'a> {
    token: &'a CancellationToken,
    registration: Option<CancelRegistration>,
}

impl Future for WaitForCancellation<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.token.is_cancelled() {
            self.registration = None;
            return Poll::Ready(());
        }

        match &self.registration {
            Some(registration) => registration.update(cx.waker()),
            None => self.registration = Some(self.token.register(cx.waker())),
        }

        if self.token.is_cancelled() {
            self.registration = None;
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_basic_cancellation() {
        let token = CancellationToken::new();

        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());

        token.cancel();

        assert!(token.is_cancelled());
        assert_eq!(token.check(), Err(SyncError::Cancelled));
    }

    #[test]
    fn test_child_token() {
        let parent = CancellationToken::new();
        let child = parent.child();
        let grandchild = child.child();

        assert!(!grandchild.is_cancelled());
        parent.cancel();
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
    }

    #[test]
    fn test_child_cancel_leaves_parent() {
        let parent = CancellationToken::new();
        let child = parent.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_never_token() {
        let token = CancellationToken::never();
        token.cancel();
        assert!(!token.is_cancelled());
        assert!(!CancellationToken::default().is_cancelled());
    }

    #[test]
    fn test_cancel_wakes_registered_task() {
        let token = CancellationToken::new();
        let mut wait = task::spawn(token.cancelled());

        assert_pending!(wait.poll());
        assert!(!wait.is_woken());

        token.cancel();
        assert!(wait.is_woken());
        assert_ready!(wait.poll());
    }

    #[test]
    fn test_parent_cancel_wakes_child_waiter() {
        let parent = CancellationToken::new();
        let child = parent.child();
        let mut wait = task::spawn(child.cancelled());

        assert_pending!(wait.poll());
        parent.cancel();
        assert!(wait.is_woken());
        assert_ready!(wait.poll());
    }

    #[test]
    fn test_registration_drop_deregisters() {
        let token = CancellationToken::new();
        let waker = futures::task::noop_waker();
        let registration = token.register(&waker);
        let inner = token.inner.as_ref().unwrap();
        assert_eq!(inner.wakers.with(|w| w.len()), 1);

        drop(registration);
        assert_eq!(inner.wakers.with(|w| w.len()), 0);
    }

    #[test]
    fn test_clone_shares_state() {
        let token1 = CancellationToken::new();
        let token2 = token1.clone();

        token1.cancel();
        assert!(token2.is_cancelled());
    }
}
