//! SIB1 Scheduler
//!
//! SIB1 is broadcast with SI-RNTI in the SIB1 search space once per
//! retransmission period, at a fixed slot offset within the period.

use super::{commit_common_pdsch, find_common_pdsch};
use crate::cell::CellResources;
use crate::config::CellConfiguration;
use crate::result::SibInformation;
use common::slot_point::SlotPoint;
use common::types::Rnti;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct SibScheduler {
    cfg: Arc<CellConfiguration>,
}

impl SibScheduler {
    pub fn new(cfg: Arc<CellConfiguration>) -> Self {
        Self { cfg }
    }

    /// Whether SIB1 is due in `sl`
    pub fn is_sib1_slot(&self, sl: SlotPoint) -> bool {
        let period_slots = self.cfg.sib1.retx_period_ms * sl.nof_slots_per_subframe();
        sl.is_occasion(period_slots, self.cfg.sib1.slot_offset) && self.cfg.is_dl_enabled(sl)
    }

    pub fn run_slot(&mut self, res: &mut CellResources) {
        let sl_tx = res.slot_tx();
        if !self.is_sib1_slot(sl_tx) {
            return;
        }
        let sib1 = &self.cfg.sib1;
        let Some(pdsch) = find_common_pdsch(res, sib1.payload_size, sib1.mcs) else {
            warn!("No PDSCH space for SIB1 in slot {}", sl_tx);
            return;
        };
        let Some(pdcch) = res.pdcch.alloc_dl_pdcch_common(
            &mut res.grid[0],
            Rnti::SI_RNTI,
            self.cfg.sib1_search_space,
            sib1.aggregation_level,
        ) else {
            warn!("No PDCCH for SIB1 in slot {}", sl_tx);
            return;
        };
        let info = commit_common_pdsch(res, pdcch, &pdsch, Rnti::SI_RNTI);
        debug!("SIB1 scheduled in slot {} crbs={}", sl_tx, info.crbs);
        res.grid[pdsch.offset].result.dl.sibs.push(SibInformation {
            pdsch: info,
            payload_size: sib1.payload_size,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::DciRntiType;
    use common::types::SubcarrierSpacing;

    #[test]
    fn test_sib1_every_period_at_offset() {
        let cfg = Arc::new(CellConfiguration::default());
        let mut res = CellResources::new(cfg.clone());
        let mut sched = SibScheduler::new(cfg.clone());
        let mut sib_slots = Vec::new();
        for count in 0..60 {
            res.slot_indication(SlotPoint::from_count(SubcarrierSpacing::Scs15, count));
            sched.run_slot(&mut res);
            let result = &res.grid[0].result;
            if !result.dl.sibs.is_empty() {
                sib_slots.push(count);
                assert_eq!(result.dl.dl_pdcchs[0].ctx.rnti_type, DciRntiType::SiRnti);
                assert!(cfg.coreset0_crbs().contains_interval(&result.dl.sibs[0].pdsch.crbs));
                assert!(result.dl.sibs[0].pdsch.tbs_bytes >= cfg.sib1.payload_size);
            }
        }
        assert_eq!(sib_slots, vec![2, 22, 42]);
    }
}
