//! UCI Allocator
//!
//! Decides for every HARQ-ACK, SR and CSI report whether it goes on PUCCH or on
//! a PUSCH of the UE, and counts the PDSCHs acknowledged in each UCI slot to
//! index the HARQ-ACK codebook.

use super::{UciAllocation, UciAllocator};
use crate::cell::{CellResourceAllocator, CellSlotResourceAllocator, RING_ALLOCATOR_SIZE};
use crate::config::{CellConfiguration, UeCellConfiguration};
use crate::pucch_scheduling::PucchAllocator;
use crate::result::{DciContext, PuschInformation, UciOnPusch};
use crate::support::SlotRing;
use common::slot_point::SlotPoint;
use common::types::Rnti;
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy)]
struct UeUciCounter {
    rnti: Rnti,
    nof_pdschs: u8,
}

#[derive(Debug, Default)]
struct UciSlotState {
    ues: Vec<UeUciCounter>,
}

impl UciSlotState {
    fn counter(&self, rnti: Rnti) -> u8 {
        self.ues.iter().find(|u| u.rnti == rnti).map_or(0, |u| u.nof_pdschs)
    }

    fn increment(&mut self, rnti: Rnti) {
        match self.ues.iter_mut().find(|u| u.rnti == rnti) {
            Some(u) => u.nof_pdschs += 1,
            None => self.ues.push(UeUciCounter { rnti, nof_pdschs: 1 }),
        }
    }
}

/// Production UCI allocator
pub struct UciAllocatorImpl {
    cfg: Arc<CellConfiguration>,
    pucch: Box<dyn PucchAllocator + Send>,
    slots: SlotRing<UciSlotState>,
}

impl UciAllocatorImpl {
    /// Create the allocator on top of a PUCCH allocator
    pub fn new(cfg: Arc<CellConfiguration>, pucch: Box<dyn PucchAllocator + Send>) -> Self {
        Self {
            cfg,
            pucch,
            slots: SlotRing::new(RING_ALLOCATOR_SIZE),
        }
    }

    fn alloc_harq_in_slot(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        rnti: Rnti,
        ue_cfg: &UeCellConfiguration,
        fallback_dci: Option<&DciContext>,
    ) -> Option<Option<u8>> {
        if let Some(pusch) = slot_alloc.result.ul.puschs.iter_mut().find(|p| p.pusch.rnti == rnti) {
            let uci = pusch.pusch.uci.get_or_insert_with(UciOnPusch::default);
            uci.harq_ack_nof_bits += 1;
            return Some(None);
        }
        let pri = match fallback_dci {
            Some(dci) if ue_cfg.has_dedicated_pucch() => {
                self.pucch.alloc_common_and_ded_harq_ack(slot_alloc, rnti, ue_cfg, dci)
            }
            Some(dci) => self.pucch.alloc_common_harq_ack(slot_alloc, rnti, dci),
            None => self.pucch.alloc_ded_harq_ack(slot_alloc, rnti, ue_cfg),
        }?;
        Some(Some(pri))
    }
}

impl UciAllocator for UciAllocatorImpl {
    fn slot_indication(&mut self, sl_tx: SlotPoint) {
        self.slots.slot_indication(sl_tx, |s| s.ues.clear());
        self.pucch.slot_indication(sl_tx);
    }

    fn alloc_uci_harq_ue(
        &mut self,
        res_alloc: &mut CellResourceAllocator,
        rnti: Rnti,
        ue_cfg: &UeCellConfiguration,
        k0: u8,
        k1_list: &[u8],
        fallback_dci: Option<&DciContext>,
    ) -> Option<UciAllocation> {
        let max_bits = self.cfg.expert.max_harq_ack_bits_per_uci;
        for &k1 in k1_list {
            let offset = k0 as u32 + k1 as u32;
            if offset > res_alloc.max_slot_offset() {
                continue;
            }
            let uci_slot = res_alloc.slot_tx() + offset;
            if !self.cfg.is_ul_enabled(uci_slot) {
                continue;
            }
            let counter = self.slots.get(uci_slot).counter(rnti);
            if counter >= max_bits {
                trace!("rnti={} HARQ-ACK codebook full in slot {}", rnti, uci_slot);
                continue;
            }
            let slot_alloc = &mut res_alloc[offset];
            let Some(pri) = self.alloc_harq_in_slot(slot_alloc, rnti, ue_cfg, fallback_dci) else {
                continue;
            };
            self.slots.get_mut(uci_slot).increment(rnti);
            return Some(UciAllocation {
                k1,
                pucch_res_indicator: pri,
                harq_bit_idx: counter,
            });
        }
        debug!("rnti={} no UCI slot available for HARQ-ACK with k0={}", rnti, k0);
        None
    }

    fn multiplex_uci_on_pusch(
        &mut self,
        pusch: &mut PuschInformation,
        slot_alloc: &mut CellSlotResourceAllocator,
        ue_cfg: &UeCellConfiguration,
        rnti: Rnti,
    ) {
        let bits = self.pucch.remove_ue_uci_from_pucch(slot_alloc, rnti);
        if bits.is_empty() {
            return;
        }
        let csi_part1 = if ue_cfg.csi_report.is_some() { bits.csi_part1_nof_bits } else { 0 };
        if bits.harq_ack_nof_bits > 0 || csi_part1 > 0 {
            let uci = pusch.uci.get_or_insert_with(UciOnPusch::default);
            uci.harq_ack_nof_bits += bits.harq_ack_nof_bits;
            uci.csi_part1_nof_bits += csi_part1;
        }
        trace!(
            "rnti={} UCI moved to PUSCH: harq={} csi={} sr dropped={}",
            rnti,
            bits.harq_ack_nof_bits,
            csi_part1,
            bits.sr_nof_bits
        );
    }

    fn uci_allocate_sr_opportunity(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        rnti: Rnti,
        ue_cfg: &UeCellConfiguration,
    ) {
        if slot_alloc.result.ul.pusch_for(rnti).is_some() {
            trace!("rnti={} SR skipped, PUSCH in slot {}", rnti, slot_alloc.slot());
            return;
        }
        self.pucch.alloc_sr_opportunity(slot_alloc, rnti, ue_cfg);
    }

    fn uci_allocate_csi_opportunity(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        rnti: Rnti,
        ue_cfg: &UeCellConfiguration,
    ) {
        let Some(csi_cfg) = &ue_cfg.csi_report else {
            return;
        };
        if let Some(pusch) = slot_alloc.result.ul.puschs.iter_mut().find(|p| p.pusch.rnti == rnti) {
            let uci = pusch.pusch.uci.get_or_insert_with(UciOnPusch::default);
            uci.csi_part1_nof_bits = csi_cfg.csi_part1_bits;
            return;
        }
        self.pucch
            .alloc_csi_opportunity(slot_alloc, rnti, ue_cfg, csi_cfg.csi_part1_bits);
    }

    fn get_scheduled_pdsch_counter_in_ue_uci(&self, slot_alloc: &CellSlotResourceAllocator, rnti: Rnti) -> u8 {
        self.slots.get(slot_alloc.slot()).counter(rnti)
    }

    fn remove_ue(&mut self, res_alloc: &mut CellResourceAllocator, rnti: Rnti) {
        for offset in 0..=res_alloc.max_slot_offset() {
            let slot_alloc = &mut res_alloc[offset];
            let sl = slot_alloc.slot();
            self.pucch.remove_ue_uci_from_pucch(slot_alloc, rnti);
            self.slots.get_mut(sl).ues.retain(|u| u.rnti != rnti);
        }
    }

    fn remove_periodic_uci(&mut self, res_alloc: &mut CellResourceAllocator, rnti: Rnti, ue_cfg: &UeCellConfiguration) {
        for offset in 0..=res_alloc.max_slot_offset() {
            let slot_alloc = &mut res_alloc[offset];
            self.pucch.remove_periodic_uci(slot_alloc, rnti, ue_cfg);
            if let Some(pusch) = slot_alloc.result.ul.puschs.iter_mut().find(|p| p.pusch.rnti == rnti) {
                if let Some(uci) = &mut pusch.pusch.uci {
                    uci.csi_part1_nof_bits = 0;
                    if uci.harq_ack_nof_bits == 0 {
                        pusch.pusch.uci = None;
                    }
                }
            }
        }
    }
}
