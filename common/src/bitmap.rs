//! Bounded Bitmap
//!
//! Fixed-size bitmap used for CRB occupancy, CCE occupancy and per-symbol grids

use crate::interval::Interval;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

const WORD_BITS: usize = 64;

/// Bitmap with a fixed number of bits, set at construction
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct BoundedBitmap {
    words: Vec<u64>,
    len: usize,
}

impl BoundedBitmap {
    /// Create a bitmap of `len` bits, all cleared
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(WORD_BITS)],
            len,
        }
    }

    /// Number of bits
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the bitmap has zero length
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Set a bit
    pub fn set(&mut self, pos: usize) {
        assert!(pos < self.len, "Bit {} out of range {}", pos, self.len);
        self.words[pos / WORD_BITS] |= 1u64 << (pos % WORD_BITS);
    }

    /// Clear a bit
    pub fn reset(&mut self, pos: usize) {
        assert!(pos < self.len, "Bit {} out of range {}", pos, self.len);
        self.words[pos / WORD_BITS] &= !(1u64 << (pos % WORD_BITS));
    }

    /// Read a bit
    pub fn test(&self, pos: usize) -> bool {
        assert!(pos < self.len, "Bit {} out of range {}", pos, self.len);
        self.words[pos / WORD_BITS] & (1u64 << (pos % WORD_BITS)) != 0
    }

    /// Clear all bits
    pub fn reset_all(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    /// Set or clear every bit in `[start, stop)`
    pub fn fill(&mut self, start: usize, stop: usize, value: bool) {
        assert!(start <= stop && stop <= self.len, "Invalid range [{}, {})", start, stop);
        for pos in start..stop {
            if value {
                self.set(pos);
            } else {
                self.reset(pos);
            }
        }
    }

    /// Whether any bit in `[start, stop)` is set
    pub fn any_in(&self, start: usize, stop: usize) -> bool {
        assert!(start <= stop && stop <= self.len, "Invalid range [{}, {})", start, stop);
        (start..stop).any(|pos| self.test(pos))
    }

    /// Whether every bit in `[start, stop)` is set
    pub fn all_in(&self, start: usize, stop: usize) -> bool {
        assert!(start <= stop && stop <= self.len, "Invalid range [{}, {})", start, stop);
        (start..stop).all(|pos| self.test(pos))
    }

    /// Whether any bit is set
    pub fn any(&self) -> bool {
        self.words.iter().any(|w| *w != 0)
    }

    /// Whether every bit is set
    pub fn all(&self) -> bool {
        self.count() == self.len
    }

    /// Number of set bits
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Lowest position in `[start, stop)` whose bit equals `value`
    pub fn find_lowest(&self, start: usize, stop: usize, value: bool) -> Option<usize> {
        (start..stop.min(self.len)).find(|&pos| self.test(pos) == value)
    }

    /// Iterate over positions of set bits
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(move |&pos| self.test(pos))
    }

    /// Intervals of consecutive cleared bits, in increasing order
    pub fn free_intervals(&self) -> Vec<Interval<u32>> {
        let mut intervals = Vec::new();
        let mut pos = 0;
        while let Some(start) = self.find_lowest(pos, self.len, false) {
            let stop = self.find_lowest(start, self.len, true).unwrap_or(self.len);
            intervals.push(Interval::new(start as u32, stop as u32));
            pos = stop;
        }
        intervals
    }

    /// Longest run of cleared bits (lowest one on ties)
    pub fn largest_free_interval(&self) -> Interval<u32> {
        self.free_intervals()
            .into_iter()
            .fold(Interval::default(), |best, cur| {
                if cur.length() > best.length() {
                    cur
                } else {
                    best
                }
            })
    }

    /// First run of at least `min_len` cleared bits, truncated to `max_len`
    pub fn first_free_interval(&self, min_len: u32, max_len: u32) -> Option<Interval<u32>> {
        self.free_intervals()
            .into_iter()
            .find(|i| i.length() >= min_len.max(1))
            .map(|i| Interval::from_length(i.start(), i.length().min(max_len)))
    }
}

impl BitOrAssign<&BoundedBitmap> for BoundedBitmap {
    fn bitor_assign(&mut self, rhs: &BoundedBitmap) {
        assert_eq!(self.len, rhs.len, "Bitmap length mismatch");
        for (l, r) in self.words.iter_mut().zip(rhs.words.iter()) {
            *l |= *r;
        }
    }
}

impl BitOr<&BoundedBitmap> for &BoundedBitmap {
    type Output = BoundedBitmap;

    fn bitor(self, rhs: &BoundedBitmap) -> BoundedBitmap {
        let mut out = self.clone();
        out |= rhs;
        out
    }
}

impl fmt::Debug for BoundedBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits: String = (0..self.len)
            .map(|pos| if self.test(pos) { '1' } else { '0' })
            .collect();
        write!(f, "BoundedBitmap({})", bits)
    }
}
