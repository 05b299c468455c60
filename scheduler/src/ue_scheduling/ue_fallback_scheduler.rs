//! UE Fallback Scheduler
//!
//! Serves UEs that have no dedicated configuration yet with DCI 1_0/0_0 in the
//! common search space: the ConRes CE and the SRB0 RRC Setup (Msg4), then SRB1
//! until the UE is reconfigured. SRB0 PDUs are never segmented, so a PDU that
//! cannot fit the PDSCH is not attempted. Retransmissions go first.

use crate::cell::CellResources;
use crate::config::CellConfiguration;
use crate::policy::{next_pdsch_slot, schedule_ul_in_order, UeSchedContext};
use crate::ue_context::{Ue, UeRepository};
use crate::ue_scheduling::ue_cell_grid_allocator::{
    AllocStatus, DlLcSelection, UeCellGridAllocator, UeNewTxDlGrantRequest, UeRetxDlGrantRequest,
};
use common::slot_point::SlotPoint;
use common::types::{Lcid, UeIndex};
use std::sync::Arc;
use tracing::{debug, trace};

pub struct UeFallbackScheduler {
    cfg: Arc<CellConfiguration>,
}

/// DL payload a fallback UE is waiting for
fn pending_fallback_pdu(ue: &Ue) -> Option<(DlLcSelection, u32)> {
    if ue.dl_lc.pending_bytes_of(Lcid::SRB0) > 0 {
        Some((DlLcSelection::Srb0, ue.dl_lc.pending_srb0_bytes()))
    } else {
        let bytes = ue.dl_lc.pending_srb1_bytes();
        (bytes > 0).then_some((DlLcSelection::Srb1, bytes))
    }
}

impl UeFallbackScheduler {
    pub fn new(cfg: Arc<CellConfiguration>) -> Self {
        Self { cfg }
    }

    /// Allocate the DL and UL grants of fallback UEs in the current slot
    pub fn run_slot(&mut self, grid_alloc: &UeCellGridAllocator, res: &mut CellResources, ues: &mut UeRepository) {
        if !self.cfg.is_dl_enabled(res.slot_tx()) {
            return;
        }
        let fallback_ues: Vec<UeIndex> = ues.iter().filter(|ue| ue.is_fallback()).map(|ue| ue.ue_index()).collect();
        if fallback_ues.is_empty() {
            return;
        }
        if let Some(pdsch_slot) = next_pdsch_slot(res) {
            self.schedule_dl(grid_alloc, res, ues, &fallback_ues, pdsch_slot);
        }
        let mut ctx = UeSchedContext { grid_alloc, res, ues };
        schedule_ul_in_order(&mut ctx, &fallback_ues, |ue| ue.is_fallback());
    }

    fn schedule_dl(
        &self,
        grid_alloc: &UeCellGridAllocator,
        res: &mut CellResources,
        ues: &mut UeRepository,
        order: &[UeIndex],
        pdsch_slot: SlotPoint,
    ) {
        for &ue_index in order {
            let Some(ue) = ues.get_mut(ue_index) else { continue };
            let Some(harq_id) = ue.dl_harqs.find_pending_retx() else { continue };
            let req = UeRetxDlGrantRequest { pdsch_slot, harq_id };
            if grid_alloc.allocate_dl_retx_grant(res, ue, &req) == AllocStatus::SkipSlot {
                return;
            }
        }

        for &ue_index in order {
            let Some(ue) = ues.get_mut(ue_index) else { continue };
            let Some((lcs, pending_bytes)) = pending_fallback_pdu(ue) else { continue };
            let req = UeNewTxDlGrantRequest { pdsch_slot, pending_bytes, lcs };
            match grid_alloc.allocate_dl_grant(res, ue, &req) {
                Ok(builder) => {
                    let used = builder.used_crbs();
                    let crbs = builder.recommended_crbs(&used, u32::MAX);
                    builder.set_pdsch_params(crbs);
                }
                Err(AllocStatus::SkipSlot) => return,
                Err(AllocStatus::InvalidParams) if lcs == DlLcSelection::Srb0 => {
                    debug!("{} SRB0 PDU of {} bytes cannot be scheduled", ue_index, pending_bytes);
                }
                Err(status) => trace!("{} fallback DL skipped: {:?}", ue_index, status),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UeCellConfiguration;
    use crate::result::DciRntiType;
    use common::types::{Rnti, SubcarrierSpacing};

    struct Bench {
        cfg: Arc<CellConfiguration>,
        res: CellResources,
        ues: UeRepository,
        grid_alloc: UeCellGridAllocator,
        sched: UeFallbackScheduler,
    }

    impl Bench {
        fn new() -> Self {
            let cfg = Arc::new(CellConfiguration::default());
            Self {
                res: CellResources::new(cfg.clone()),
                ues: UeRepository::new(),
                grid_alloc: UeCellGridAllocator::new(cfg.clone()),
                sched: UeFallbackScheduler::new(cfg.clone()),
                cfg,
            }
        }

        fn add_ue(&mut self, idx: u16) {
            let ue = Ue::new(
                UeIndex(idx),
                Rnti(0x4601 + idx),
                UeCellConfiguration::fallback(&self.cfg),
                &self.cfg.expert,
            );
            self.ues.add_ue(ue).unwrap();
        }

        fn run(&mut self, count: u32) {
            self.res.slot_indication(SlotPoint::from_count(SubcarrierSpacing::Scs15, count));
            self.sched.run_slot(&self.grid_alloc, &mut self.res, &mut self.ues);
        }
    }

    #[test]
    fn test_msg4_with_conres() {
        let mut b = Bench::new();
        b.add_ue(0);
        let ue = b.ues.get_mut(UeIndex(0)).unwrap();
        ue.dl_lc.handle_conres_ce();
        ue.dl_lc.handle_dl_buffer_status(Lcid::SRB0, 101);
        b.run(0);

        let result = &b.res.grid[0].result;
        assert_eq!(result.dl.dl_pdcchs.len(), 1);
        assert_eq!(result.dl.dl_pdcchs[0].ctx.rnti_type, DciRntiType::TcRnti);
        let grant = &result.dl.ue_grants[0];
        assert!(grant.conres_ce);
        assert!(grant.pdsch.tbs_bytes >= 101);
        assert!(b.cfg.coreset0_crbs().contains_interval(&grant.pdsch.crbs));
        assert_eq!(b.ues.get(UeIndex(0)).unwrap().dl_lc.pending_bytes(), 0);
    }

    #[test]
    fn test_srb0_that_cannot_fit_is_not_attempted() {
        let mut b = Bench::new();
        b.add_ue(0);
        b.add_ue(1);
        b.ues.get_mut(UeIndex(0)).unwrap().dl_lc.handle_dl_buffer_status(Lcid::SRB0, 450);
        b.ues.get_mut(UeIndex(1)).unwrap().dl_lc.handle_dl_buffer_status(Lcid::SRB0, 50);
        for count in 0..10 {
            b.run(count);
            let result = &b.res.grid[0].result;
            assert!(result.dl.dl_pdcchs.iter().all(|p| p.ctx.rnti != Rnti(0x4601)));
            assert!(result.dl.ue_grants.iter().all(|g| g.ue_index != UeIndex(0)));
        }
        assert_eq!(b.ues.get(UeIndex(0)).unwrap().dl_lc.pending_bytes_of(Lcid::SRB0), 450);
        assert_eq!(b.ues.get(UeIndex(1)).unwrap().dl_lc.pending_bytes_of(Lcid::SRB0), 0);
    }

    #[test]
    fn test_srb1_after_srb0() {
        let mut b = Bench::new();
        b.add_ue(0);
        let ue = b.ues.get_mut(UeIndex(0)).unwrap();
        ue.dl_lc.handle_dl_buffer_status(Lcid::SRB1, 30);
        b.run(0);
        let grant = &b.res.grid[0].result.dl.ue_grants[0];
        assert!(grant.lc_grants.iter().all(|lc| lc.lcid == Lcid::SRB1));
        assert!(grant.is_fallback);
    }
}
