//! PUCCH Scheduling
//!
//! Allocation of common and dedicated PUCCH resources for HARQ-ACK, SR and CSI,
//! with UCI multiplexing when several UCI types of a UE meet in the same slot
//! (TS 38.213 §9.2.5).

pub mod pucch_allocator_impl;
pub mod pucch_multiplexer;

use crate::cell::{CellSlotResourceAllocator, GrantInfo};
use crate::config::UeCellConfiguration;
use crate::result::{DciContext, PucchInformation, PucchResources, PucchUciBits};
use common::interval::OfdmSymbolRange;
use common::slot_point::SlotPoint;
use common::types::Rnti;

pub use pucch_allocator_impl::PucchAllocatorImpl;

/// PUCCH resource allocator
///
/// Every operation either applies fully or leaves the slot untouched. HARQ-ACK
/// allocations return the PUCCH resource indicator to signal in the DCI.
pub trait PucchAllocator {
    /// Advance to a new slot. Must precede any allocation in that slot.
    fn slot_indication(&mut self, sl_tx: SlotPoint);

    /// One HARQ-ACK bit on the common PUCCH resource set, derived from the DCI
    /// position. At most one common grant exists per UE and slot.
    fn alloc_common_harq_ack(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        rnti: Rnti,
        dci: &DciContext,
    ) -> Option<u8>;

    /// HARQ-ACK on both a common and a dedicated resource sharing the same PRI,
    /// for DCI 1_0 sent to a UE which may or may not have applied its dedicated
    /// configuration yet
    fn alloc_common_and_ded_harq_ack(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        rnti: Rnti,
        ue_cfg: &UeCellConfiguration,
        dci: &DciContext,
    ) -> Option<u8>;

    /// One more HARQ-ACK bit on the dedicated PUCCH of the UE. The caller
    /// guarantees that the UE has no PUSCH in the slot.
    fn alloc_ded_harq_ack(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        rnti: Rnti,
        ue_cfg: &UeCellConfiguration,
    ) -> Option<u8>;

    /// SR opportunity of the UE
    fn alloc_sr_opportunity(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        rnti: Rnti,
        ue_cfg: &UeCellConfiguration,
    ) -> bool;

    /// Periodic CSI report of the UE
    fn alloc_csi_opportunity(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        rnti: Rnti,
        ue_cfg: &UeCellConfiguration,
        csi_part1_bits: u32,
    ) -> bool;

    /// Remove every PUCCH of the UE in the slot, returning the UCI they carried
    fn remove_ue_uci_from_pucch(&mut self, slot_alloc: &mut CellSlotResourceAllocator, rnti: Rnti) -> PucchUciBits;

    /// Drop the SR and CSI of the UE in the slot. HARQ-ACK bits stay on the
    /// resource their DCI indicated.
    fn remove_periodic_uci(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        rnti: Rnti,
        ue_cfg: &UeCellConfiguration,
    );
}

/// Time/frequency footprint of a PUCCH, one entry per hop
pub(crate) fn pucch_grants(res: &PucchResources) -> Vec<GrantInfo> {
    match res.second_hop_prbs {
        None => vec![GrantInfo::new(res.symbols, res.prbs)],
        Some(second) => {
            let mid = res.symbols.start() + res.symbols.length() / 2;
            vec![
                GrantInfo::new(OfdmSymbolRange::new(res.symbols.start(), mid), res.prbs),
                GrantInfo::new(OfdmSymbolRange::new(mid, res.symbols.stop()), second),
            ]
        }
    }
}

/// Whether two PUCCHs interfere. Formats 0/1 on the same resources are
/// orthogonal when their cyclic shift or OCC differ.
pub(crate) fn pucchs_collide(a: &PucchInformation, b: &PucchInformation) -> bool {
    let same_family = a.format == b.format && a.format.is_small_payload();
    if same_family && a.resources.is_code_multiplexed_with(&b.resources) {
        return false;
    }
    let b_grants = pucch_grants(&b.resources);
    pucch_grants(&a.resources)
        .iter()
        .any(|ga| b_grants.iter().any(|gb| ga.overlaps(gb)))
}

/// Whether a PUCCH overlaps any PUSCH of the slot
pub(crate) fn pucch_collides_with_puschs(pucch: &PucchInformation, slot_alloc: &CellSlotResourceAllocator) -> bool {
    let grants = pucch_grants(&pucch.resources);
    slot_alloc.result.ul.puschs.iter().any(|p| {
        let pusch = GrantInfo::new(p.pusch.symbols, p.pusch.crbs);
        grants.iter().any(|g| g.overlaps(&pusch))
    })
}
