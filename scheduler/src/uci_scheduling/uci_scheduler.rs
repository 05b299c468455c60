//! UCI Scheduler
//!
//! Places the periodic SR and CSI opportunities of every UE. Slots newly exposed
//! at the end of the lookahead window are filled on each slot indication; the
//! whole window is filled on the first slot, after a long gap, and for new UEs.

use super::UciAllocator;
use crate::cell::CellResourceAllocator;
use crate::config::{CellConfiguration, UeCellConfiguration};
use crate::ue_context::{Ue, UeRepository};
use common::slot_point::SlotPoint;
use common::types::Rnti;
use std::sync::Arc;
use tracing::trace;

/// Periodic SR/CSI pre-allocation
pub struct UciScheduler {
    cfg: Arc<CellConfiguration>,
    last_sl: Option<SlotPoint>,
}

impl UciScheduler {
    pub fn new(cfg: Arc<CellConfiguration>) -> Self {
        Self { cfg, last_sl: None }
    }

    /// Fill the newly exposed slots of the window for every UE
    pub fn run_slot(&mut self, res_alloc: &mut CellResourceAllocator, uci: &mut dyn UciAllocator, ues: &UeRepository) {
        let offsets = res_alloc.offsets_exposed_since(self.last_sl);
        self.last_sl = Some(res_alloc.slot_tx());

        for offset in offsets {
            for ue in ues.iter() {
                self.schedule_slot(res_alloc, uci, ue.crnti(), ue.cfg(), offset);
            }
        }
    }

    /// Fill the whole window for a UE that just joined or was reconfigured
    pub fn add_ue(&self, res_alloc: &mut CellResourceAllocator, uci: &mut dyn UciAllocator, ue: &Ue) {
        if ue.cfg().sr.is_none() && ue.cfg().csi_report.is_none() {
            return;
        }
        trace!("{} pre-allocating SR/CSI over the window", ue.ue_index());
        for offset in 0..=res_alloc.max_slot_offset() {
            self.schedule_slot(res_alloc, uci, ue.crnti(), ue.cfg(), offset);
        }
    }

    fn schedule_slot(
        &self,
        res_alloc: &mut CellResourceAllocator,
        uci: &mut dyn UciAllocator,
        rnti: Rnti,
        ue_cfg: &UeCellConfiguration,
        offset: u32,
    ) {
        let slot_alloc = &mut res_alloc[offset];
        let sl = slot_alloc.slot();
        if !self.cfg.is_ul_enabled(sl) {
            return;
        }
        if let Some(sr) = &ue_cfg.sr {
            if sl.is_occasion(sr.period_slots, sr.offset) {
                uci.uci_allocate_sr_opportunity(slot_alloc, rnti, ue_cfg);
            }
        }
        if let Some(csi) = &ue_cfg.csi_report {
            if sl.is_occasion(csi.period_slots, csi.offset) {
                uci.uci_allocate_csi_opportunity(slot_alloc, rnti, ue_cfg);
            }
        }
    }
}
