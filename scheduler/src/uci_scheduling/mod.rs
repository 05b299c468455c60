//! UCI Scheduling
//!
//! Placement of HARQ-ACK, SR and CSI reports on PUCCH or on a PUSCH of the same
//! slot, and periodic pre-allocation of SR and CSI opportunities.

pub mod uci_allocator_impl;
pub mod uci_scheduler;

use crate::cell::{CellResourceAllocator, CellSlotResourceAllocator};
use crate::config::UeCellConfiguration;
use crate::result::{DciContext, PuschInformation};
use common::slot_point::SlotPoint;
use common::types::Rnti;

pub use uci_allocator_impl::UciAllocatorImpl;
pub use uci_scheduler::UciScheduler;

/// Where the HARQ-ACK of a PDSCH is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UciAllocation {
    /// PDSCH-to-HARQ-ACK delay
    pub k1: u8,
    /// PUCCH resource indicator, `None` when the HARQ-ACK rides a PUSCH
    pub pucch_res_indicator: Option<u8>,
    /// Position of the HARQ-ACK bit in the codebook of the UCI slot
    pub harq_bit_idx: u8,
}

/// UCI allocator
pub trait UciAllocator {
    /// Advance to a new slot. Must precede any allocation in that slot.
    fn slot_indication(&mut self, sl_tx: SlotPoint);

    /// Reserve the HARQ-ACK report of a PDSCH sent `k0` slots after the current
    /// slot, trying `k1_list` in order. `fallback_dci` is the DCI 1_0 of a
    /// fallback transmission, whose HARQ-ACK uses the common PUCCH resources.
    fn alloc_uci_harq_ue(
        &mut self,
        res_alloc: &mut CellResourceAllocator,
        rnti: Rnti,
        ue_cfg: &UeCellConfiguration,
        k0: u8,
        k1_list: &[u8],
        fallback_dci: Option<&DciContext>,
    ) -> Option<UciAllocation>;

    /// Move the UCI the UE has on PUCCH in the slot onto its PUSCH. SR is dropped
    /// since the PUSCH carries a BSR.
    fn multiplex_uci_on_pusch(
        &mut self,
        pusch: &mut PuschInformation,
        slot_alloc: &mut CellSlotResourceAllocator,
        ue_cfg: &UeCellConfiguration,
        rnti: Rnti,
    );

    /// SR opportunity, skipped when the UE already transmits a PUSCH in the slot
    fn uci_allocate_sr_opportunity(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        rnti: Rnti,
        ue_cfg: &UeCellConfiguration,
    );

    /// Periodic CSI report, on the PUSCH of the slot if there is one
    fn uci_allocate_csi_opportunity(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        rnti: Rnti,
        ue_cfg: &UeCellConfiguration,
    );

    /// Number of PDSCHs whose HARQ-ACK is reported in the slot
    fn get_scheduled_pdsch_counter_in_ue_uci(&self, slot_alloc: &CellSlotResourceAllocator, rnti: Rnti) -> u8;

    /// Drop every UCI of the UE over the lookahead window
    fn remove_ue(&mut self, res_alloc: &mut CellResourceAllocator, rnti: Rnti);

    /// Drop the SR and CSI opportunities of the UE over the lookahead window,
    /// keeping its pending HARQ-ACKs and PDSCH counters. `ue_cfg` is the
    /// configuration the opportunities were placed with.
    fn remove_periodic_uci(&mut self, res_alloc: &mut CellResourceAllocator, rnti: Rnti, ue_cfg: &UeCellConfiguration);
}
