//! PDCCH Scheduling
//!
//! Allocation of PDCCH candidates for common and UE-dedicated DCIs

pub mod pdcch_resource_allocator_impl;
pub mod pdcch_slot_allocator;

use crate::cell::CellSlotResourceAllocator;
use crate::config::{SearchSpaceId, UeCellConfiguration};
use crate::support::pdcch_candidates::AggregationLevel;
use common::slot_point::SlotPoint;
use common::types::Rnti;

pub use pdcch_resource_allocator_impl::PdcchResourceAllocatorImpl;

/// Number of per-slot PDCCH allocators kept ahead of the current slot
pub const SLOT_ALLOCATOR_RING_SIZE: usize = 32;

/// Maximum number of CORESET symbols
pub const MAX_CORESET_SYMBOLS: usize = 3;

/// Index of a DL PDCCH in `result.dl.dl_pdcchs` of its slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DlPdcchIndex(pub usize);

/// Index of a UL PDCCH in `result.dl.ul_pdcchs` of its slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UlPdcchIndex(pub usize);

/// PDCCH resource allocator
///
/// Allocations return the position of the new PDCCH in the slot result, or `None`
/// when no candidate is free. Handles of earlier PDCCHs of the slot stay valid
/// across allocations; only [`PdcchResourceAllocator::cancel_last_pdcch`] removes one.
pub trait PdcchResourceAllocator {
    /// Advance to a new slot. Must precede any allocation in that slot.
    fn slot_indication(&mut self, sl_tx: SlotPoint);

    /// DL DCI with a logical RNTI (SI, RA, P) in a common search space
    fn alloc_dl_pdcch_common(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        rnti: Rnti,
        ss_id: SearchSpaceId,
        aggr_lvl: AggregationLevel,
    ) -> Option<DlPdcchIndex>;

    /// UL DCI with a logical RNTI (TC-RNTI Msg3 retransmissions)
    fn alloc_ul_pdcch_common(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        rnti: Rnti,
        ss_id: SearchSpaceId,
        aggr_lvl: AggregationLevel,
    ) -> Option<UlPdcchIndex>;

    /// DL DCI for a UE
    fn alloc_dl_pdcch_ue(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        rnti: Rnti,
        ue_cfg: &UeCellConfiguration,
        ss_id: SearchSpaceId,
        aggr_lvl: AggregationLevel,
    ) -> Option<DlPdcchIndex>;

    /// UL DCI for a UE
    fn alloc_ul_pdcch_ue(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        rnti: Rnti,
        ue_cfg: &UeCellConfiguration,
        ss_id: SearchSpaceId,
        aggr_lvl: AggregationLevel,
    ) -> Option<UlPdcchIndex>;

    /// Undo the most recent PDCCH allocation of the slot. Panics if there is none.
    fn cancel_last_pdcch(&mut self, slot_alloc: &mut CellSlotResourceAllocator);
}
