//! Demand values and requested/satisfied accounting
//!
//! A pull-based consumer states how many more values it is willing to
//! accept. Producers count what they have delivered against the running
//! total and buffer anything beyond it.

use core::cmp::Ordering;
use core::fmt;
use core::ops::{Add, AddAssign};

/// How many values a consumer will accept
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Demand {
    /// At most this many values
    Max(usize),
    /// No limit
    Unlimited,
}

impl Demand {
    /// No demand at all
    pub const NONE: Demand = Demand::Max(0);

    /// Demand for exactly `n` values
    #[inline]
    pub const fn max(n: usize) -> Self {
        Demand::Max(n)
    }

    #[inline]
    pub const fn is_unlimited(self) -> bool {
        matches!(self, Demand::Unlimited)
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        matches!(self, Demand::Max(0))
    }

    /// The bounded count, or `None` when unlimited
    #[inline]
    pub const fn as_max(self) -> Option<usize> {
        match self {
            Demand::Max(n) => Some(n),
            Demand::Unlimited => None,
        }
    }

    /// Sum of two demands; saturates to `Unlimited`
    #[inline]
    pub fn saturating_add(self, other: Demand) -> Demand {
        match (self, other) {
            (Demand::Max(a), Demand::Max(b)) => match a.checked_add(b) {
                Some(n) => Demand::Max(n),
                None => Demand::Unlimited,
            },
            _ => Demand::Unlimited,
        }
    }
}

impl Default for Demand {
    fn default() -> Self {
        Demand::NONE
    }
}

impl Add for Demand {
    type Output = Demand;

    fn add(self, rhs: Demand) -> Demand {
        self.saturating_add(rhs)
    }
}

impl AddAssign for Demand {
    fn add_assign(&mut self, rhs: Demand) {
        *self = self.saturating_add(rhs);
    }
}

impl PartialOrd for Demand {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Demand {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Demand::Unlimited, Demand::Unlimited) => Ordering::Equal,
            (Demand::Unlimited, _) => Ordering::Greater,
            (_, Demand::Unlimited) => Ordering::Less,
            (Demand::Max(a), Demand::Max(b)) => a.cmp(b),
        }
    }
}

impl fmt::Debug for Demand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Demand::Max(n) => write!(f, "Demand::Max({})", n),
            Demand::Unlimited => write!(f, "Demand::Unlimited"),
        }
    }
}

/// Running requested/satisfied totals for one subscription
///
/// `satisfied` never exceeds `requested` unless `requested` is unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemandCounter {
    requested: Demand,
    satisfied: usize,
}

impl DemandCounter {
    pub const fn new() -> Self {
        DemandCounter {
            requested: Demand::NONE,
            satisfied: 0,
        }
    }

    /// Add to the accumulated request
    #[inline]
    pub fn request(&mut self, demand: Demand) {
        self.requested += demand;
    }

    /// Count one delivery if the consumer still has room for it
    #[inline]
    pub fn try_consume(&mut self) -> bool {
        if self.has_outstanding() {
            self.satisfied = self.satisfied.saturating_add(1);
            true
        } else {
            false
        }
    }

    #[inline]
    pub fn has_outstanding(&self) -> bool {
        match self.requested {
            Demand::Unlimited => true,
            Demand::Max(n) => self.satisfied < n,
        }
    }

    /// Demand requested but not yet satisfied
    pub fn outstanding(&self) -> Demand {
        match self.requested {
            Demand::Unlimited => Demand::Unlimited,
            Demand::Max(n) => Demand::Max(n - self.satisfied),
        }
    }

    #[inline]
    pub fn requested(&self) -> Demand {
        self.requested
    }

    #[inline]
    pub fn satisfied(&self) -> usize {
        self.satisfied
    }
}
