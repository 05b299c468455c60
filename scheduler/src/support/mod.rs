//! Scheduler Support Functions
//!
//! 3GPP procedures and tables used by the allocators, plus the slot ring shared by
//! the per-slot allocator state

pub mod mcs_tbs;
pub mod pdcch_candidates;
pub mod pucch_common;
pub mod slot_ring;

pub use pdcch_candidates::AggregationLevel;
pub use slot_ring::SlotRing;
