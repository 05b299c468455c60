//! Slot Point
//!
//! Wrap-around slot counter with a fixed numerology. A slot point counts slots
//! modulo one hyper system frame of 1024 radio frames, so arithmetic and ordering
//! must account for wrap-around. Orderings are only meaningful for slot points
//! closer than half of the wrap-around range.

use crate::types::SubcarrierSpacing;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Number of system frame numbers before the SFN wraps
pub const NOF_SFNS: u32 = 1024;

/// Number of subframes in a radio frame
pub const NOF_SUBFRAMES_PER_FRAME: u32 = 10;

/// Slot point: numerology plus a slot count within the SFN cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotPoint {
    numerology: u8,
    count: u32,
}

impl SlotPoint {
    /// Create from SFN and slot index within the frame
    pub fn new(scs: SubcarrierSpacing, sfn: u32, slot_index: u32) -> Self {
        let nof_slots_per_frame = scs.slots_per_frame();
        assert!(sfn < NOF_SFNS, "Invalid SFN {}", sfn);
        assert!(
            slot_index < nof_slots_per_frame,
            "Invalid slot index {} for {} kHz",
            slot_index,
            scs.to_khz()
        );
        Self {
            numerology: scs.numerology(),
            count: sfn * nof_slots_per_frame + slot_index,
        }
    }

    /// Create from a raw slot count, wrapped into the SFN cycle
    pub fn from_count(scs: SubcarrierSpacing, count: u32) -> Self {
        let nof_slots = Self::nof_slots_per_sfn_cycle(scs.numerology());
        Self {
            numerology: scs.numerology(),
            count: count % nof_slots,
        }
    }

    fn nof_slots_per_sfn_cycle(numerology: u8) -> u32 {
        NOF_SFNS * NOF_SUBFRAMES_PER_FRAME * (1u32 << numerology)
    }

    /// Numerology index
    pub fn numerology(&self) -> u8 {
        self.numerology
    }

    /// Subcarrier spacing of this slot point
    pub fn scs(&self) -> SubcarrierSpacing {
        // Constructors only accept valid numerologies.
        SubcarrierSpacing::from_numerology(self.numerology).unwrap_or(SubcarrierSpacing::Scs15)
    }

    /// Slot count within the SFN cycle
    pub fn to_uint(&self) -> u32 {
        self.count
    }

    /// Number of slots in a 10 ms frame
    pub fn nof_slots_per_frame(&self) -> u32 {
        NOF_SUBFRAMES_PER_FRAME * self.nof_slots_per_subframe()
    }

    /// Number of slots in a 1 ms subframe
    pub fn nof_slots_per_subframe(&self) -> u32 {
        1u32 << self.numerology
    }

    /// Number of slots in the full SFN cycle
    pub fn nof_slots_per_system_frame(&self) -> u32 {
        Self::nof_slots_per_sfn_cycle(self.numerology)
    }

    /// System frame number
    pub fn sfn(&self) -> u32 {
        self.count / self.nof_slots_per_frame()
    }

    /// Slot index within the frame
    pub fn slot_index(&self) -> u32 {
        self.count % self.nof_slots_per_frame()
    }

    /// Subframe index within the frame
    pub fn subframe_index(&self) -> u32 {
        self.slot_index() / self.nof_slots_per_subframe()
    }

    /// Whether `(slot - offset) mod period == 0`
    pub fn is_occasion(&self, period: u32, offset: u32) -> bool {
        period > 0 && self.count % period == offset % period
    }
}

impl fmt::Display for SlotPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.sfn(), self.slot_index())
    }
}

impl Add<u32> for SlotPoint {
    type Output = SlotPoint;

    fn add(self, rhs: u32) -> SlotPoint {
        let nof_slots = self.nof_slots_per_system_frame();
        SlotPoint {
            numerology: self.numerology,
            count: ((self.count as u64 + rhs as u64) % nof_slots as u64) as u32,
        }
    }
}

impl AddAssign<u32> for SlotPoint {
    fn add_assign(&mut self, rhs: u32) {
        *self = *self + rhs;
    }
}

impl Sub<u32> for SlotPoint {
    type Output = SlotPoint;

    fn sub(self, rhs: u32) -> SlotPoint {
        let nof_slots = self.nof_slots_per_system_frame();
        let rhs = rhs % nof_slots;
        SlotPoint {
            numerology: self.numerology,
            count: (self.count + nof_slots - rhs) % nof_slots,
        }
    }
}

impl SubAssign<u32> for SlotPoint {
    fn sub_assign(&mut self, rhs: u32) {
        *self = *self - rhs;
    }
}

/// Signed distance in slots, folded into `[-N/2, N/2)`
impl Sub<SlotPoint> for SlotPoint {
    type Output = i32;

    fn sub(self, rhs: SlotPoint) -> i32 {
        assert_eq!(
            self.numerology, rhs.numerology,
            "Slot points with different numerologies cannot be compared"
        );
        let nof_slots = self.nof_slots_per_system_frame() as i64;
        let mut diff = self.count as i64 - rhs.count as i64;
        if diff >= nof_slots / 2 {
            diff -= nof_slots;
        } else if diff < -nof_slots / 2 {
            diff += nof_slots;
        }
        diff as i32
    }
}

impl PartialOrd for SlotPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.numerology != other.numerology {
            return None;
        }
        Some((*self - *other).cmp(&0))
    }
}

/// Slot interval `[start, stop)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotInterval {
    start: SlotPoint,
    stop: SlotPoint,
}

impl SlotInterval {
    /// Create a new interval
    pub fn new(start: SlotPoint, stop: SlotPoint) -> Self {
        assert!(start <= stop, "Invalid slot interval [{}, {})", start, stop);
        Self { start, stop }
    }

    /// First slot
    pub fn start(&self) -> SlotPoint {
        self.start
    }

    /// One past the last slot
    pub fn stop(&self) -> SlotPoint {
        self.stop
    }

    /// Number of slots
    pub fn length(&self) -> u32 {
        (self.stop - self.start) as u32
    }

    /// Whether the slot falls in the interval
    pub fn contains(&self, sl: SlotPoint) -> bool {
        sl >= self.start && sl < self.stop
    }
}
