//! Half-open Intervals
//!
//! Generic `[start, stop)` interval used for CRB, PRB, CCE and OFDM symbol ranges

use num_traits::PrimInt;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open interval `[start, stop)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Interval<T> {
    start: T,
    stop: T,
}

impl<T: PrimInt + fmt::Display> Interval<T> {
    /// Create a new interval. Panics if `start > stop`.
    pub fn new(start: T, stop: T) -> Self {
        assert!(start <= stop, "Invalid interval [{}, {})", start, stop);
        Self { start, stop }
    }

    /// Create an interval from its start and length
    pub fn from_length(start: T, length: T) -> Self {
        Self::new(start, start + length)
    }

    /// First element
    pub fn start(&self) -> T {
        self.start
    }

    /// One past the last element
    pub fn stop(&self) -> T {
        self.stop
    }

    /// Number of elements
    pub fn length(&self) -> T {
        self.stop - self.start
    }

    /// Whether the interval has no elements
    pub fn is_empty(&self) -> bool {
        self.start == self.stop
    }

    /// Whether `value` is inside the interval
    pub fn contains(&self, value: T) -> bool {
        value >= self.start && value < self.stop
    }

    /// Whether `other` is fully inside this interval
    pub fn contains_interval(&self, other: &Self) -> bool {
        other.start >= self.start && other.stop <= self.stop
    }

    /// Whether the two intervals share at least one element
    pub fn overlaps(&self, other: &Self) -> bool {
        !self.is_empty() && !other.is_empty() && self.start < other.stop && other.start < self.stop
    }

    /// Intersection of two intervals (empty if they do not overlap)
    pub fn intersect(&self, other: &Self) -> Self {
        let start = self.start.max(other.start);
        let stop = self.stop.min(other.stop);
        if start >= stop {
            Self { start, stop: start }
        } else {
            Self { start, stop }
        }
    }

    /// Resize the interval keeping its start
    pub fn resize(&mut self, length: T) {
        self.stop = self.start + length;
    }

    /// Iterate over the elements
    pub fn iter(&self) -> impl Iterator<Item = T> {
        let start = self.start;
        let len = (self.stop - self.start).to_usize().unwrap_or(0);
        (0..len).map(move |i| start + <T as num_traits::NumCast>::from(i).unwrap_or_else(T::zero))
    }
}

impl<T: PrimInt + fmt::Display> fmt::Display for Interval<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.stop)
    }
}

/// Common Resource Block interval
pub type CrbInterval = Interval<u32>;

/// Physical Resource Block interval
pub type PrbInterval = Interval<u32>;

/// Control Channel Element interval
pub type CceInterval = Interval<u32>;

/// OFDM symbol interval within a slot
pub type OfdmSymbolRange = Interval<u8>;

/// Number of OFDM symbols in a slot with normal cyclic prefix
pub const NOF_OFDM_SYMBOLS_PER_SLOT: u8 = 14;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_basic() {
        let a = CrbInterval::new(2, 10);
        assert_eq!(a.length(), 8);
        assert!(a.contains(2));
        assert!(!a.contains(10));
        assert_eq!(format!("{}", a), "[2, 10)");
        assert_eq!(a.iter().collect::<Vec<_>>(), (2..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_interval_overlap() {
        let a = CrbInterval::new(0, 5);
        let b = CrbInterval::new(4, 8);
        let c = CrbInterval::new(5, 8);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert_eq!(a.intersect(&b), CrbInterval::new(4, 5));
        assert!(a.intersect(&c).is_empty());
        assert!(!CrbInterval::new(3, 3).overlaps(&a));
    }

    #[test]
    #[should_panic]
    fn test_invalid_interval() {
        let _ = OfdmSymbolRange::new(5, 2);
    }
}
