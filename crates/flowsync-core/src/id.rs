//! Subscription identifier type

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier for one consumer registration
///
/// Registries key their per-consumer channels by this id so that removal
/// can be requested from either side (the producer finishing or the
/// consumer going away) and the second request finds nothing.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Allocate a fresh id; never returns the same value twice
    #[inline]
    pub fn next() -> Self {
        SubscriptionId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw u64 value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_unique() {
        let ids: HashSet<_> = (0..1000).map(|_| SubscriptionId::next()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_ids_increase() {
        let a = SubscriptionId::next();
        let b = SubscriptionId::next();
        assert!(b > a);
        assert_eq!(format!("{}", a), format!("sub#{}", a.as_u64()));
    }
}
