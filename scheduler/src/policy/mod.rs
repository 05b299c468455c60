//! Scheduling Policies
//!
//! A policy decides the order in which connected-mode UEs are offered the
//! resources left after common channels and fallback UEs were served. Within a
//! slot retransmissions always go before new transmissions.

pub mod proportional_fair;
pub mod round_robin;

use crate::cell::CellResources;
use crate::config::{CellConfiguration, PolicyKind};
use crate::ue_context::{Ue, UeRepository};
use crate::ue_scheduling::ue_cell_grid_allocator::{
    AllocStatus, DlLcSelection, UeCellGridAllocator, UeNewTxDlGrantRequest, UeNewTxUlGrantRequest,
    UeRetxDlGrantRequest, UeRetxUlGrantRequest,
};
use common::slot_point::SlotPoint;
use common::types::UeIndex;
use tracing::trace;

pub use proportional_fair::ProportionalFair;
pub use round_robin::RoundRobin;

/// Resources and UEs a policy works on during a slot
pub struct UeSchedContext<'a> {
    pub grid_alloc: &'a UeCellGridAllocator,
    pub res: &'a mut CellResources,
    pub ues: &'a mut UeRepository,
}

/// Scheduling policy for connected-mode UEs
pub trait SchedulerPolicy {
    fn add_ue(&mut self, _ue_index: UeIndex) {}

    fn rem_ue(&mut self, _ue_index: UeIndex) {}

    /// Allocate PDSCHs in the current slot
    fn dl_sched(&mut self, ctx: &mut UeSchedContext<'_>);

    /// Allocate PUSCHs in the current slot
    fn ul_sched(&mut self, ctx: &mut UeSchedContext<'_>);
}

/// Policy selected by the expert configuration
pub fn create_policy(cfg: &CellConfiguration) -> Box<dyn SchedulerPolicy + Send> {
    match cfg.expert.policy {
        PolicyKind::RoundRobin => Box::new(RoundRobin::new()),
        PolicyKind::ProportionalFair => Box::new(ProportionalFair::new(cfg.expert.pf_fairness_coeff)),
    }
}

/// First PDSCH slot reachable from the current slot that carries DL
pub(crate) fn next_pdsch_slot(res: &CellResources) -> Option<SlotPoint> {
    let sl_tx = res.slot_tx();
    res.cfg
        .pdsch_td_alloc_list
        .iter()
        .map(|td| sl_tx + td.k0 as u32)
        .find(|sl| res.cfg.is_dl_enabled(*sl))
}

/// First PUSCH slot reachable from the current slot that carries UL
pub(crate) fn next_pusch_slot(res: &CellResources) -> Option<SlotPoint> {
    let sl_tx = res.slot_tx();
    res.cfg
        .pusch_td_alloc_list
        .iter()
        .map(|td| sl_tx + td.k2 as u32)
        .find(|sl| res.cfg.is_ul_enabled(*sl))
}

/// RBs a UE may take when `nof_ues` compete for the band
fn fair_share(nof_crbs: u32, nof_ues: usize) -> u32 {
    (nof_crbs / nof_ues.max(1) as u32).max(1)
}

/// Offer the DL resources of the slot to connected-mode UEs in `order`.
/// Returns the new-data bytes allocated per UE.
pub(crate) fn schedule_dl_in_order(ctx: &mut UeSchedContext<'_>, order: &[UeIndex]) -> Vec<(UeIndex, u32)> {
    let mut served = Vec::new();
    if !ctx.res.cfg.is_dl_enabled(ctx.res.slot_tx()) {
        return served;
    }
    let Some(pdsch_slot) = next_pdsch_slot(ctx.res) else {
        return served;
    };

    for &ue_index in order {
        let Some(ue) = ctx.ues.get_mut(ue_index) else { continue };
        if ue.is_fallback() {
            continue;
        }
        let Some(harq_id) = ue.dl_harqs.find_pending_retx() else { continue };
        let req = UeRetxDlGrantRequest { pdsch_slot, harq_id };
        if ctx.grid_alloc.allocate_dl_retx_grant(ctx.res, ue, &req) == AllocStatus::SkipSlot {
            return served;
        }
    }

    let nof_candidates = order
        .iter()
        .filter_map(|idx| ctx.ues.get(*idx))
        .filter(|ue| !ue.is_fallback() && ue.dl_lc.has_pending_bytes())
        .count();
    let max_nof_rbs = fair_share(ctx.res.cfg.nof_dl_crbs, nof_candidates);
    for &ue_index in order {
        let Some(ue) = ctx.ues.get_mut(ue_index) else { continue };
        if ue.is_fallback() || !ue.dl_lc.has_pending_bytes() {
            continue;
        }
        let req = UeNewTxDlGrantRequest {
            pdsch_slot,
            pending_bytes: ue.dl_lc.pending_bytes(),
            lcs: DlLcSelection::All,
        };
        match ctx.grid_alloc.allocate_dl_grant(ctx.res, ue, &req) {
            Ok(builder) => {
                let used = builder.used_crbs();
                let crbs = builder.recommended_crbs(&used, max_nof_rbs);
                served.push((ue_index, builder.set_pdsch_params(crbs)));
            }
            Err(AllocStatus::SkipSlot) => break,
            Err(status) => trace!("{} DL newtx skipped: {:?}", ue_index, status),
        }
    }
    served
}

/// Offer the UL resources of the slot to the UEs in `order` that match `select`.
/// Returns the bytes granted per UE.
pub(crate) fn schedule_ul_in_order(
    ctx: &mut UeSchedContext<'_>,
    order: &[UeIndex],
    select: impl Fn(&Ue) -> bool,
) -> Vec<(UeIndex, u32)> {
    let mut served = Vec::new();
    if !ctx.res.cfg.is_dl_enabled(ctx.res.slot_tx()) {
        return served;
    }
    let Some(pusch_slot) = next_pusch_slot(ctx.res) else {
        return served;
    };
    let sr_grant_bytes = ctx.res.cfg.expert.sr_grant_bytes;

    for &ue_index in order {
        let Some(ue) = ctx.ues.get_mut(ue_index) else { continue };
        if !select(ue) {
            continue;
        }
        let Some(harq_id) = ue.ul_harqs.find_pending_retx() else { continue };
        let req = UeRetxUlGrantRequest { pusch_slot, harq_id };
        if ctx.grid_alloc.allocate_ul_retx_grant(ctx.res, ue, &req) == AllocStatus::SkipSlot {
            return served;
        }
    }

    let nof_candidates = order
        .iter()
        .filter_map(|idx| ctx.ues.get(*idx))
        .filter(|ue| select(ue) && ue.ul_lc.pending_bytes(sr_grant_bytes) > 0)
        .count();
    let max_nof_rbs = fair_share(ctx.res.cfg.nof_ul_crbs, nof_candidates);
    for &ue_index in order {
        let Some(ue) = ctx.ues.get_mut(ue_index) else { continue };
        let pending_bytes = ue.ul_lc.pending_bytes(sr_grant_bytes);
        if !select(ue) || pending_bytes == 0 {
            continue;
        }
        let req = UeNewTxUlGrantRequest { pusch_slot, pending_bytes };
        match ctx.grid_alloc.allocate_ul_grant(ctx.res, ue, &req) {
            Ok(builder) => {
                let used = builder.used_crbs();
                let crbs = builder.recommended_crbs(&used, max_nof_rbs);
                served.push((ue_index, builder.set_pusch_params(crbs)));
            }
            Err(AllocStatus::SkipSlot) => break,
            Err(status) => trace!("{} UL newtx skipped: {:?}", ue_index, status),
        }
    }
    served
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fair_share() {
        assert_eq!(fair_share(52, 0), 52);
        assert_eq!(fair_share(52, 4), 13);
        assert_eq!(fair_share(4, 10), 1);
    }
}
