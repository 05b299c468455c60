//! Paging Scheduler
//!
//! Paging records are sent with P-RNTI on the paging occasions of the paged UE
//! (TS 38.304 §7.1), once per paging cycle, until the configured number of
//! retries is exhausted. Records due on the same occasion share one PDSCH.

use super::{commit_common_pdsch, find_common_pdsch, COMMON_AGGREGATION_LEVEL};
use crate::cell::CellResources;
use crate::config::CellConfiguration;
use crate::indications::PagingIndication;
use crate::result::{PagingInformation, PagingUeInfo};
use common::slot_point::SlotPoint;
use common::types::Rnti;
use std::sync::Arc;
use tracing::{debug, info};

/// UE_ID is the 5G-S-TMSI modulo this value
const UE_ID_MODULUS: u64 = 1024;

/// Paging message overhead in bytes
const PAGING_HEADER_BYTES: u32 = 2;

/// Bytes per paging record (48-bit 5G-S-TMSI plus encoding)
const PAGING_RECORD_BYTES: u32 = 7;

/// Records of one paging message
const MAX_PAGING_RECORDS: usize = 32;

#[derive(Debug, Clone)]
struct PagingRecord {
    s_tmsi: u64,
    ue_id: u32,
    /// Paging cycle T in radio frames
    cycle_rf: u32,
    remaining: u32,
}

pub struct PagingScheduler {
    cfg: Arc<CellConfiguration>,
    records: Vec<PagingRecord>,
}

impl PagingScheduler {
    pub fn new(cfg: Arc<CellConfiguration>) -> Self {
        Self {
            cfg,
            records: Vec::new(),
        }
    }

    /// Number of UEs still being paged
    pub fn nof_pending(&self) -> usize {
        self.records.len()
    }

    /// Start paging a UE. Paging it again restarts its retries.
    pub fn handle_paging_information(&mut self, ind: &PagingIndication) {
        let default_cycle = self.cfg.paging.default_paging_cycle_rf;
        let cycle_rf = ind.paging_drx_cycle_rf.map_or(default_cycle, |c| c.min(default_cycle)).max(1);
        let record = PagingRecord {
            s_tmsi: ind.s_tmsi,
            ue_id: (ind.s_tmsi % UE_ID_MODULUS) as u32,
            cycle_rf,
            remaining: self.cfg.expert.max_paging_retries,
        };
        info!("Paging s-tmsi={:#x} ue_id={} T={}", record.s_tmsi, record.ue_id, cycle_rf);
        self.records.retain(|r| r.s_tmsi != ind.s_tmsi);
        if record.remaining > 0 {
            self.records.push(record);
        }
    }

    fn is_paging_occasion(&self, rec: &PagingRecord, sl: SlotPoint) -> bool {
        let paging = &self.cfg.paging;
        let t = rec.cycle_rf;
        let n = paging.nof_pf_per_paging_cycle.clamp(1, t);
        let ns = paging.nof_po_per_pf.max(1);
        let pf = (t / n) * (rec.ue_id % n);
        if (sl.sfn() + paging.paging_frame_offset) % t != pf {
            return false;
        }
        let i_s = (rec.ue_id / n) % ns;
        sl.slot_index() == i_s * (sl.nof_slots_per_frame() / ns)
    }

    pub fn run_slot(&mut self, res: &mut CellResources) {
        let sl_tx = res.slot_tx();
        if self.records.is_empty() || !self.cfg.is_dl_enabled(sl_tx) {
            return;
        }
        let due: Vec<usize> = (0..self.records.len())
            .filter(|&i| self.is_paging_occasion(&self.records[i], sl_tx))
            .take(MAX_PAGING_RECORDS)
            .collect();
        if due.is_empty() {
            return;
        }

        let mcs = self.cfg.paging.mcs;
        let Some((nof_records, pdsch)) = (1..=due.len()).rev().find_map(|n| {
            find_common_pdsch(res, PAGING_HEADER_BYTES + n as u32 * PAGING_RECORD_BYTES, mcs).map(|p| (n, p))
        }) else {
            debug!("No PDSCH space for paging in slot {}", sl_tx);
            return;
        };
        let Some(pdcch) = res.pdcch.alloc_dl_pdcch_common(
            &mut res.grid[0],
            Rnti::P_RNTI,
            self.cfg.common_search_space,
            COMMON_AGGREGATION_LEVEL,
        ) else {
            debug!("No PDCCH for paging in slot {}", sl_tx);
            return;
        };
        let info = commit_common_pdsch(res, pdcch, &pdsch, Rnti::P_RNTI);

        let paged = &due[..nof_records];
        let records = paged
            .iter()
            .map(|&i| PagingUeInfo { s_tmsi: self.records[i].s_tmsi })
            .collect();
        res.grid[pdsch.offset]
            .result
            .dl
            .paging
            .push(PagingInformation { pdsch: info, records });
        for &i in paged {
            self.records[i].remaining -= 1;
        }
        self.records.retain(|r| r.remaining > 0);
        debug!("Paging sent in slot {} records={}", sl_tx, nof_records);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::DciRntiType;
    use common::types::{CellId, SubcarrierSpacing};

    fn bench(max_retries: u32) -> (CellResources, PagingScheduler) {
        let mut cell = CellConfiguration::default();
        cell.expert.max_paging_retries = max_retries;
        let cfg = Arc::new(cell);
        (CellResources::new(cfg.clone()), PagingScheduler::new(cfg))
    }

    #[test]
    fn test_paging_retries_spaced_by_cycle() {
        let (mut res, mut sched) = bench(3);
        let drx = 32;
        sched.handle_paging_information(&PagingIndication {
            cell_id: CellId(0),
            s_tmsi: 0x1234_5678_9a,
            paging_drx_cycle_rf: Some(drx),
        });

        let mut paging_slots = Vec::new();
        for count in 0..(3 + 1) * drx * 10 {
            res.slot_indication(SlotPoint::from_count(SubcarrierSpacing::Scs15, count));
            sched.run_slot(&mut res);
            let result = &res.grid[0].result;
            if !result.dl.paging.is_empty() {
                assert_eq!(result.dl.dl_pdcchs[0].ctx.rnti_type, DciRntiType::PRnti);
                assert_eq!(result.dl.paging[0].records, vec![PagingUeInfo { s_tmsi: 0x1234_5678_9a }]);
                paging_slots.push(count);
            }
        }
        assert_eq!(paging_slots.len(), 3);
        assert_eq!(paging_slots[1] - paging_slots[0], drx * 10);
        assert_eq!(paging_slots[2] - paging_slots[1], drx * 10);
        assert_eq!(sched.nof_pending(), 0);
    }

    #[test]
    fn test_occasion_follows_ue_id() {
        let (_, sched) = bench(1);
        let rec = PagingRecord { s_tmsi: 1024 + 5, ue_id: 5, cycle_rf: 32, remaining: 1 };
        // N = min(128, 32) = 32, PF = (32 / 32) * (5 mod 32) = 5
        let sl = SlotPoint::new(SubcarrierSpacing::Scs15, 5, 0);
        assert!(sched.is_paging_occasion(&rec, sl));
        assert!(!sched.is_paging_occasion(&rec, sl + 1));
        assert!(sched.is_paging_occasion(&rec, SlotPoint::new(SubcarrierSpacing::Scs15, 37, 0)));
    }
}
