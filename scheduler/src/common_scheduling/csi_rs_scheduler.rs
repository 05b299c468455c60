//! CSI-RS Scheduler
//!
//! Periodic NZP CSI-RS over the whole carrier. PDSCHs are rate-matched around
//! it, so it does not occupy the resource grid.

use crate::cell::CellResourceAllocator;
use crate::config::CellConfiguration;
use crate::result::CsiRsInformation;
use common::interval::{CrbInterval, OfdmSymbolRange};
use common::slot_point::SlotPoint;
use std::sync::Arc;

pub struct CsiRsScheduler {
    cfg: Arc<CellConfiguration>,
    last_sl: Option<SlotPoint>,
}

impl CsiRsScheduler {
    pub fn new(cfg: Arc<CellConfiguration>) -> Self {
        Self { cfg, last_sl: None }
    }

    pub fn run_slot(&mut self, grid: &mut CellResourceAllocator) {
        let Some(csi_rs) = &self.cfg.csi_rs else {
            return;
        };
        let offsets = grid.offsets_exposed_since(self.last_sl);
        self.last_sl = Some(grid.slot_tx());
        for offset in offsets {
            let slot_alloc = &mut grid[offset];
            let sl = slot_alloc.slot();
            if !self.cfg.is_dl_enabled(sl) || !sl.is_occasion(csi_rs.period_slots, csi_rs.offset_slots) {
                continue;
            }
            slot_alloc.result.dl.csi_rs.push(CsiRsInformation {
                crbs: CrbInterval::new(0, self.cfg.nof_dl_crbs),
                symbols: OfdmSymbolRange::from_length(csi_rs.symbol, 1),
            });
        }
    }
}
