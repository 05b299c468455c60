//! SSB Scheduler
//!
//! SS/PBCH blocks are reserved as soon as their slot enters the lookahead window,
//! so no grant placed earlier can take their resources.

use crate::cell::{CellResourceAllocator, GrantInfo};
use crate::config::CellConfiguration;
use crate::result::SsbInformation;
use common::slot_point::SlotPoint;
use std::sync::Arc;
use tracing::trace;

pub struct SsbScheduler {
    cfg: Arc<CellConfiguration>,
    last_sl: Option<SlotPoint>,
}

impl SsbScheduler {
    pub fn new(cfg: Arc<CellConfiguration>) -> Self {
        Self { cfg, last_sl: None }
    }

    /// Whether an SSB burst is sent in `sl`
    pub fn is_ssb_slot(&self, sl: SlotPoint) -> bool {
        let period_slots = self.cfg.ssb.period_ms * sl.nof_slots_per_subframe();
        sl.is_occasion(period_slots, 0) && self.cfg.is_dl_enabled(sl)
    }

    pub fn run_slot(&mut self, grid: &mut CellResourceAllocator) {
        let offsets = grid.offsets_exposed_since(self.last_sl);
        self.last_sl = Some(grid.slot_tx());
        for offset in offsets {
            let slot_alloc = &mut grid[offset];
            if !self.is_ssb_slot(slot_alloc.slot()) {
                continue;
            }
            let ssb = SsbInformation {
                ssb_index: 0,
                crbs: self.cfg.ssb.crbs(),
                symbols: self.cfg.ssb.symbols,
            };
            slot_alloc.dl_res_grid.fill(GrantInfo::new(ssb.symbols, ssb.crbs));
            trace!("SSB reserved in slot {}", slot_alloc.slot());
            slot_alloc.result.dl.ssbs.push(ssb);
        }
    }
}
