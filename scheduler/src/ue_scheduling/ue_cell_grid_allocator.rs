//! UE Cell Grid Allocator
//!
//! Compound allocation of a UE grant: PDCCH, then the HARQ-ACK UCI, then the
//! PDSCH/PUSCH itself. New transmissions are handed back as a builder so the
//! caller can pick the CRBs against the live grid before committing. A failure
//! after the PDCCH was reserved cancels it, so no partial grant ever reaches the
//! slot result.

use crate::cell::{CellResourceAllocator, CellResources, GrantInfo};
use crate::config::{CellConfiguration, SearchSpaceConfiguration, SearchSpaceId};
use crate::pdcch_scheduling::{DlPdcchIndex, UlPdcchIndex};
use crate::result::{DlDciPayload, DlMsgAlloc, PdschInformation, PuschInformation, UlDciPayload, UlSchedInfo};
use crate::support::mcs_tbs::{compute_tbs_bytes, nof_prbs_for_bytes, TbsParameters};
use crate::support::AggregationLevel;
use crate::uci_scheduling::{UciAllocation, UciAllocator};
use crate::ue_context::{TransportBlockInfo, Ue};
use common::bitmap::BoundedBitmap;
use common::interval::{CrbInterval, OfdmSymbolRange};
use common::slot_point::SlotPoint;
use common::types::{HarqId, Lcid};
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Outcome of a grant allocation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocStatus {
    Success,
    /// No further UE can be served in this slot
    SkipSlot,
    /// Try another UE
    SkipUe,
    /// Try other parameters for the same UE
    InvalidParams,
}

/// Logical channels a DL grant may carry. The ConRes CE always goes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DlLcSelection {
    All,
    /// SRB0 only, never segmented
    Srb0,
    Srb1,
}

impl DlLcSelection {
    fn accepts(self, lcid: Lcid) -> bool {
        match self {
            DlLcSelection::All => true,
            DlLcSelection::Srb0 => lcid == Lcid::SRB0,
            DlLcSelection::Srb1 => lcid == Lcid::SRB1,
        }
    }
}

/// New DL transmission request
#[derive(Debug, Clone, Copy)]
pub struct UeNewTxDlGrantRequest {
    pub pdsch_slot: SlotPoint,
    /// Bytes to schedule, MAC subheaders included
    pub pending_bytes: u32,
    pub lcs: DlLcSelection,
}

/// DL retransmission request
#[derive(Debug, Clone, Copy)]
pub struct UeRetxDlGrantRequest {
    pub pdsch_slot: SlotPoint,
    pub harq_id: HarqId,
}

/// New UL transmission request
#[derive(Debug, Clone, Copy)]
pub struct UeNewTxUlGrantRequest {
    pub pusch_slot: SlotPoint,
    pub pending_bytes: u32,
}

/// UL retransmission request
#[derive(Debug, Clone, Copy)]
pub struct UeRetxUlGrantRequest {
    pub pusch_slot: SlotPoint,
    pub harq_id: HarqId,
}

/// Grant allocator shared by the UE schedulers of a cell
pub struct UeCellGridAllocator {
    cfg: Arc<CellConfiguration>,
}

impl UeCellGridAllocator {
    pub fn new(cfg: Arc<CellConfiguration>) -> Self {
        Self { cfg }
    }

    /// Reserve PDCCH and HARQ-ACK resources for a new DL transmission
    pub fn allocate_dl_grant<'a>(
        &'a self,
        res: &'a mut CellResources,
        ue: &'a mut Ue,
        req: &UeNewTxDlGrantRequest,
    ) -> Result<DlNewTxGrantBuilder<'a>, AllocStatus> {
        let expert = &self.cfg.expert;
        let pdsch = self.check_pdsch_slot(res, ue, req.pdsch_slot)?;
        let Some(harq_id) = ue.dl_harqs.find_empty() else {
            trace!("{} no empty DL HARQ", ue.ue_index());
            return Err(AllocStatus::SkipUe);
        };
        if req.pending_bytes == 0 {
            return Err(AllocStatus::InvalidParams);
        }

        let is_fallback = ue.is_fallback();
        let mcs = if is_fallback {
            ue.dl_mcs(expert).min(expert.max_msg4_mcs)
        } else {
            ue.dl_mcs(expert)
        };
        let crb_limits = self.pdsch_crb_limits(is_fallback);
        let sizing = GrantSizing {
            params: TbsParameters::new(mcs, pdsch.symbols),
            pending_bytes: req.pending_bytes,
            rb_min: expert.pdsch_nof_rbs.min,
            rb_max: expert.pdsch_nof_rbs.max.min(crb_limits.length()),
            segmentable: req.lcs != DlLcSelection::Srb0,
        };
        if !sizing.segmentable && nof_prbs_for_bytes(&sizing.params, sizing.pending_bytes, sizing.rb_max).is_none() {
            debug!(
                "{} SRB0 PDU of {} bytes does not fit at MCS {}",
                ue.ue_index(),
                req.pending_bytes,
                mcs
            );
            return Err(AllocStatus::InvalidParams);
        }
        let used = res.grid[pdsch.offset].dl_res_grid.used_crbs_within(pdsch.symbols, crb_limits);
        if used.all() {
            trace!("No DL CRBs left in slot {}", req.pdsch_slot);
            return Err(AllocStatus::SkipSlot);
        }
        if sizing.pick(&used, sizing.rb_max).is_empty() {
            return Err(AllocStatus::SkipUe);
        }

        let ss_id = self.dl_search_space(ue, is_fallback);
        let pdcch = self.alloc_dl_pdcch(res, ue, ss_id)?;
        let uci = self.alloc_harq_ack(res, ue, pdcch, pdsch.k0, is_fallback)?;

        Ok(DlNewTxGrantBuilder {
            cfg: &self.cfg,
            grid: &mut res.grid,
            ue,
            pdcch,
            pdsch,
            uci,
            harq_id,
            crb_limits,
            sizing,
            is_fallback,
            lcs: req.lcs,
            finalized: false,
        })
    }

    /// Retransmit a DL HARQ process with its transport block unchanged
    pub fn allocate_dl_retx_grant(&self, res: &mut CellResources, ue: &mut Ue, req: &UeRetxDlGrantRequest) -> AllocStatus {
        let pdsch = match self.check_pdsch_slot(res, ue, req.pdsch_slot) {
            Ok(p) => p,
            Err(status) => return status,
        };
        let Some(tb) = ue.dl_harqs.get(req.harq_id).filter(|h| h.has_pending_retx()).map(|h| *h.tb()) else {
            return AllocStatus::InvalidParams;
        };
        let crb_limits = self.pdsch_crb_limits(tb.is_fallback);
        let used = res.grid[pdsch.offset].dl_res_grid.used_crbs_within(pdsch.symbols, crb_limits);
        let Some(crbs) = used.first_free_interval(tb.nof_prbs, tb.nof_prbs) else {
            trace!("{} no room for DL retx of {} PRBs", ue.ue_index(), tb.nof_prbs);
            return if used.all() { AllocStatus::SkipSlot } else { AllocStatus::SkipUe };
        };

        let ss_id = self.dl_search_space(ue, tb.is_fallback);
        let pdcch = match self.alloc_dl_pdcch(res, ue, ss_id) {
            Ok(p) => p,
            Err(status) => return status,
        };
        let uci = match self.alloc_harq_ack(res, ue, pdcch, pdsch.k0, tb.is_fallback) {
            Ok(u) => u,
            Err(status) => return status,
        };

        let pdsch_slot = req.pdsch_slot;
        let Some(harq) = ue.dl_harqs.get_mut(req.harq_id) else {
            return AllocStatus::InvalidParams;
        };
        harq.new_retx(pdsch_slot, pdsch_slot + uci.k1 as u32);
        harq.set_harq_bit_idx(uci.harq_bit_idx);
        let (ndi, rv) = (harq.ndi(), harq.rv());

        let rnti = ue.crnti();
        res.grid[0].result.dl.dl_pdcchs[pdcch.0].dci = DlDciPayload {
            time_resource: pdsch.td_index,
            crbs,
            mcs: tb.mcs,
            harq_id: req.harq_id,
            ndi,
            rv,
            k1: uci.k1,
            pucch_res_indicator: uci.pucch_res_indicator.unwrap_or(0),
            dai: uci.harq_bit_idx % 4,
        };
        let slot_alloc = &mut res.grid[pdsch.offset];
        slot_alloc.dl_res_grid.fill(GrantInfo::new(pdsch.symbols, crbs));
        slot_alloc.result.dl.ue_grants.push(DlMsgAlloc {
            ue_index: ue.ue_index(),
            pdsch: PdschInformation {
                rnti,
                crbs,
                symbols: pdsch.symbols,
                mcs: tb.mcs,
                tbs_bytes: tb.tbs_bytes,
                harq_id: req.harq_id,
                is_new_data: false,
                rv,
            },
            lc_grants: Vec::new(),
            conres_ce: false,
            is_fallback: tb.is_fallback,
        });
        ue.set_last_pdsch_slot(pdsch_slot);
        debug!("{} DL retx h={} rv={} crbs={} slot={}", ue.ue_index(), req.harq_id.0, rv, crbs, pdsch_slot);
        AllocStatus::Success
    }

    /// Reserve the UL PDCCH of a new UL transmission
    pub fn allocate_ul_grant<'a>(
        &'a self,
        res: &'a mut CellResources,
        ue: &'a mut Ue,
        req: &UeNewTxUlGrantRequest,
    ) -> Result<UlNewTxGrantBuilder<'a>, AllocStatus> {
        let expert = &self.cfg.expert;
        let pusch = self.check_pusch_slot(res, ue, req.pusch_slot)?;
        let Some(harq_id) = ue.ul_harqs.find_empty() else {
            trace!("{} no empty UL HARQ", ue.ue_index());
            return Err(AllocStatus::SkipUe);
        };
        if req.pending_bytes == 0 {
            return Err(AllocStatus::InvalidParams);
        }
        let crb_limits = self.pusch_crb_limits();
        let sizing = GrantSizing {
            params: TbsParameters::new(ue.ul_mcs(expert), pusch.symbols),
            pending_bytes: req.pending_bytes,
            rb_min: expert.pusch_nof_rbs.min,
            rb_max: expert.pusch_nof_rbs.max.min(crb_limits.length()),
            segmentable: true,
        };
        let used = res.grid[pusch.offset].ul_res_grid.used_crbs_within(pusch.symbols, crb_limits);
        if used.all() {
            trace!("No UL CRBs left in slot {}", req.pusch_slot);
            return Err(AllocStatus::SkipSlot);
        }
        if sizing.pick(&used, sizing.rb_max).is_empty() {
            return Err(AllocStatus::SkipUe);
        }

        let is_fallback = ue.is_fallback();
        let ss_id = self.dl_search_space(ue, is_fallback);
        let pdcch = self.alloc_ul_pdcch(res, ue, ss_id)?;

        Ok(UlNewTxGrantBuilder {
            cfg: &self.cfg,
            grid: &mut res.grid,
            uci: &mut *res.uci,
            ue,
            pdcch,
            pusch,
            harq_id,
            crb_limits,
            sizing,
            finalized: false,
        })
    }

    /// Retransmit a UL HARQ process with its transport block unchanged
    pub fn allocate_ul_retx_grant(&self, res: &mut CellResources, ue: &mut Ue, req: &UeRetxUlGrantRequest) -> AllocStatus {
        let pusch = match self.check_pusch_slot(res, ue, req.pusch_slot) {
            Ok(p) => p,
            Err(status) => return status,
        };
        let Some(tb) = ue.ul_harqs.get(req.harq_id).filter(|h| h.has_pending_retx()).map(|h| *h.tb()) else {
            return AllocStatus::InvalidParams;
        };
        let used = res.grid[pusch.offset]
            .ul_res_grid
            .used_crbs_within(pusch.symbols, self.pusch_crb_limits());
        let Some(crbs) = used.first_free_interval(tb.nof_prbs, tb.nof_prbs) else {
            return if used.all() { AllocStatus::SkipSlot } else { AllocStatus::SkipUe };
        };
        let ss_id = self.dl_search_space(ue, ue.is_fallback());
        let pdcch = match self.alloc_ul_pdcch(res, ue, ss_id) {
            Ok(p) => p,
            Err(status) => return status,
        };

        let pusch_slot = req.pusch_slot;
        let Some(harq) = ue.ul_harqs.get_mut(req.harq_id) else {
            return AllocStatus::InvalidParams;
        };
        harq.new_retx(pusch_slot, pusch_slot);
        let (ndi, rv) = (harq.ndi(), harq.rv());
        res.grid[0].result.dl.ul_pdcchs[pdcch.0].dci = UlDciPayload {
            time_resource: pusch.td_index,
            crbs,
            mcs: tb.mcs,
            harq_id: req.harq_id,
            ndi,
            rv,
        };
        let mut info = PuschInformation {
            rnti: ue.crnti(),
            crbs,
            symbols: pusch.symbols,
            mcs: tb.mcs,
            tbs_bytes: tb.tbs_bytes,
            harq_id: req.harq_id,
            is_new_data: false,
            rv,
            uci: None,
        };
        commit_pusch(&mut res.grid, &mut *res.uci, ue, &pusch, &mut info);
        debug!("{} UL retx h={} rv={} crbs={} slot={}", ue.ue_index(), req.harq_id.0, rv, crbs, pusch_slot);
        AllocStatus::Success
    }

    /// Consistency pass over the current slot once every allocation is done
    pub fn post_process_results(&self, res: &mut CellResources) {
        let slot_alloc = &res.grid[0];
        let result = &slot_alloc.result;
        for p in &result.ul.puschs {
            let duplicated = p.pusch.uci.is_some_and(|u| u.harq_ack_nof_bits > 0)
                && result.ul.pucchs.iter().any(|c| c.rnti == p.pusch.rnti && c.uci_bits.harq_ack_nof_bits > 0);
            if duplicated {
                error!("rnti={} HARQ-ACK on both PUSCH and PUCCH in {}", p.pusch.rnti, slot_alloc.slot());
            }
            debug_assert!(!duplicated, "UCI of rnti={} reported on PUSCH and PUCCH", p.pusch.rnti);
        }
        trace!(
            "slot={} ue pdschs={} puschs={} pucchs={}",
            slot_alloc.slot(),
            result.dl.ue_grants.len(),
            result.ul.puschs.len(),
            result.ul.pucchs.len()
        );
    }

    fn check_pdsch_slot(&self, res: &CellResources, ue: &Ue, pdsch_slot: SlotPoint) -> Result<PdschPlacement, AllocStatus> {
        let sl_tx = res.grid.slot_tx();
        let k0 = pdsch_slot - sl_tx;
        let Some((td_index, td)) = self
            .cfg
            .pdsch_td_alloc_list
            .iter()
            .enumerate()
            .find(|(_, td)| td.k0 as i32 == k0)
        else {
            return Err(AllocStatus::InvalidParams);
        };
        if ue.last_pdsch_slot().is_some_and(|last| pdsch_slot - last < 0) {
            debug!("{} PDSCH slot {} precedes the last PDSCH", ue.ue_index(), pdsch_slot);
            return Err(AllocStatus::InvalidParams);
        }
        if !self.cfg.is_dl_enabled(sl_tx) || !self.cfg.is_dl_enabled(pdsch_slot) {
            return Err(AllocStatus::SkipSlot);
        }
        let result = &res.grid[td.k0 as u32].result;
        if result.dl.ue_grants.len() as u32 >= self.cfg.expert.max_pdschs_per_slot {
            return Err(AllocStatus::SkipSlot);
        }
        if result.dl.ue_grants.iter().any(|g| g.ue_index == ue.ue_index()) {
            return Err(AllocStatus::SkipUe);
        }
        Ok(PdschPlacement {
            offset: td.k0 as u32,
            k0: td.k0,
            td_index: td_index as u8,
            symbols: td.symbols,
        })
    }

    fn check_pusch_slot(&self, res: &CellResources, ue: &Ue, pusch_slot: SlotPoint) -> Result<PuschPlacement, AllocStatus> {
        let sl_tx = res.grid.slot_tx();
        let k2 = pusch_slot - sl_tx;
        let Some((td_index, td)) = self
            .cfg
            .pusch_td_alloc_list
            .iter()
            .enumerate()
            .find(|(_, td)| td.k2 as i32 == k2)
        else {
            return Err(AllocStatus::InvalidParams);
        };
        if ue.last_pusch_slot().is_some_and(|last| pusch_slot - last < 0) {
            debug!("{} PUSCH slot {} precedes the last PUSCH", ue.ue_index(), pusch_slot);
            return Err(AllocStatus::InvalidParams);
        }
        if !self.cfg.is_dl_enabled(sl_tx) || !self.cfg.is_ul_enabled(pusch_slot) {
            return Err(AllocStatus::SkipSlot);
        }
        let expert = &self.cfg.expert;
        let ul = &res.grid[td.k2 as u32].result.ul;
        let nof_ue_puschs = ul.puschs.iter().filter(|p| !p.is_msg3).count() as u32;
        if nof_ue_puschs >= expert.max_puschs_per_slot || ul.nof_grants() as u32 >= expert.max_ul_grants_per_slot {
            return Err(AllocStatus::SkipSlot);
        }
        if ul.pusch_for(ue.crnti()).is_some() {
            return Err(AllocStatus::SkipUe);
        }
        Ok(PuschPlacement {
            offset: td.k2 as u32,
            td_index: td_index as u8,
            symbols: td.symbols,
        })
    }

    fn pdsch_crb_limits(&self, is_fallback: bool) -> CrbInterval {
        let carrier = CrbInterval::new(0, self.cfg.nof_dl_crbs);
        if is_fallback {
            return self.cfg.coreset0_crbs().intersect(&carrier);
        }
        self.cfg.expert.pdsch_crb_limits.map_or(carrier, |lims| lims.intersect(&carrier))
    }

    fn pusch_crb_limits(&self) -> CrbInterval {
        let carrier = CrbInterval::new(0, self.cfg.nof_ul_crbs);
        self.cfg.expert.pusch_crb_limits.map_or(carrier, |lims| lims.intersect(&carrier))
    }

    fn dl_search_space(&self, ue: &Ue, is_fallback: bool) -> SearchSpaceId {
        match ue.cfg().ue_search_space {
            Some(ss) if !is_fallback => ss,
            _ => self.cfg.common_search_space,
        }
    }

    fn aggr_lvl(&self, ss_id: SearchSpaceId, cqi: u8) -> AggregationLevel {
        let default = self.cfg.expert.ue_pdcch_aggregation_level;
        match self.cfg.search_space(ss_id) {
            Some(ss) => select_aggr_lvl(ss, cqi, default),
            None => default,
        }
    }

    fn alloc_dl_pdcch(&self, res: &mut CellResources, ue: &Ue, ss_id: SearchSpaceId) -> Result<DlPdcchIndex, AllocStatus> {
        let aggr_lvl = self.aggr_lvl(ss_id, ue.cqi());
        res.pdcch
            .alloc_dl_pdcch_ue(&mut res.grid[0], ue.crnti(), ue.cfg(), ss_id, aggr_lvl)
            .ok_or_else(|| {
                debug!("{} no DL PDCCH in ss={}", ue.ue_index(), ss_id);
                AllocStatus::SkipUe
            })
    }

    fn alloc_ul_pdcch(&self, res: &mut CellResources, ue: &Ue, ss_id: SearchSpaceId) -> Result<UlPdcchIndex, AllocStatus> {
        let aggr_lvl = self.aggr_lvl(ss_id, ue.cqi());
        res.pdcch
            .alloc_ul_pdcch_ue(&mut res.grid[0], ue.crnti(), ue.cfg(), ss_id, aggr_lvl)
            .ok_or_else(|| {
                debug!("{} no UL PDCCH in ss={}", ue.ue_index(), ss_id);
                AllocStatus::SkipUe
            })
    }

    /// HARQ-ACK reservation, cancelling the PDCCH on failure
    fn alloc_harq_ack(
        &self,
        res: &mut CellResources,
        ue: &Ue,
        pdcch: DlPdcchIndex,
        k0: u8,
        is_fallback: bool,
    ) -> Result<UciAllocation, AllocStatus> {
        let fallback_dci = is_fallback.then(|| res.grid[0].result.dl.dl_pdcchs[pdcch.0].ctx.clone());
        let uci = res.uci.alloc_uci_harq_ue(
            &mut res.grid,
            ue.crnti(),
            ue.cfg(),
            k0,
            &ue.cfg().k1_candidates,
            fallback_dci.as_ref(),
        );
        uci.ok_or_else(|| {
            debug!("{} no UCI resources for HARQ-ACK, PDCCH cancelled", ue.ue_index());
            res.pdcch.cancel_last_pdcch(&mut res.grid[0]);
            AllocStatus::SkipUe
        })
    }
}

/// Aggregation level from the CQI, or the configured default when the search
/// space has no candidate for it
fn select_aggr_lvl(ss: &SearchSpaceConfiguration, cqi: u8, default: AggregationLevel) -> AggregationLevel {
    let preferred = AggregationLevel::from_cqi(cqi);
    if ss.nof_candidates(preferred) > 0 {
        return preferred;
    }
    if ss.nof_candidates(default) > 0 {
        return default;
    }
    AggregationLevel::ALL
        .into_iter()
        .rev()
        .find(|al| ss.nof_candidates(*al) > 0)
        .unwrap_or(default)
}

#[derive(Debug, Clone, Copy)]
struct PdschPlacement {
    offset: u32,
    k0: u8,
    td_index: u8,
    symbols: OfdmSymbolRange,
}

#[derive(Debug, Clone, Copy)]
struct PuschPlacement {
    offset: u32,
    td_index: u8,
    symbols: OfdmSymbolRange,
}

/// RB count estimation for a number of bytes
#[derive(Debug, Clone, Copy)]
struct GrantSizing {
    params: TbsParameters,
    pending_bytes: u32,
    rb_min: u32,
    rb_max: u32,
    segmentable: bool,
}

impl GrantSizing {
    /// RBs needed for the pending bytes, within the RB limits
    fn nof_rbs(&self, max_nof_rbs: u32) -> u32 {
        let max = self.rb_max.min(max_nof_rbs.max(self.rb_min));
        nof_prbs_for_bytes(&self.params, self.pending_bytes, max)
            .unwrap_or(max)
            .max(self.rb_min)
            .min(max)
    }

    /// First free CRB interval holding the needed RBs. Segmentable payloads
    /// settle for the largest free interval above the RB minimum.
    fn pick(&self, used: &BoundedBitmap, max_nof_rbs: u32) -> CrbInterval {
        let nof_rbs = self.nof_rbs(max_nof_rbs);
        if let Some(crbs) = used.first_free_interval(nof_rbs, nof_rbs) {
            return crbs;
        }
        if !self.segmentable {
            return CrbInterval::default();
        }
        let largest = used.largest_free_interval();
        if largest.length() < self.rb_min.max(1) {
            return CrbInterval::default();
        }
        CrbInterval::from_length(largest.start(), largest.length().min(nof_rbs))
    }
}

/// Pending new DL transmission with PDCCH and HARQ-ACK reserved.
///
/// Must be finalized with [`DlNewTxGrantBuilder::set_pdsch_params`]; dropping it
/// unfinalized is a contract violation.
pub struct DlNewTxGrantBuilder<'a> {
    cfg: &'a CellConfiguration,
    grid: &'a mut CellResourceAllocator,
    ue: &'a mut Ue,
    pdcch: DlPdcchIndex,
    pdsch: PdschPlacement,
    uci: UciAllocation,
    harq_id: HarqId,
    crb_limits: CrbInterval,
    sizing: GrantSizing,
    is_fallback: bool,
    lcs: DlLcSelection,
    finalized: bool,
}

impl DlNewTxGrantBuilder<'_> {
    /// Slot of the PDSCH
    pub fn pdsch_slot(&self) -> SlotPoint {
        self.grid.slot_tx() + self.pdsch.offset
    }

    /// CRBs already used in the PDSCH symbols, with CRBs outside the allowed
    /// range marked used
    pub fn used_crbs(&self) -> BoundedBitmap {
        self.grid[self.pdsch.offset]
            .dl_res_grid
            .used_crbs_within(self.pdsch.symbols, self.crb_limits)
    }

    /// CRBs for the pending bytes at the UE MCS, at most `max_nof_rbs` long
    pub fn recommended_crbs(&self, used: &BoundedBitmap, max_nof_rbs: u32) -> CrbInterval {
        self.sizing.pick(used, max_nof_rbs)
    }

    /// Commit the PDSCH on `crbs`, filling the transport block from the UE
    /// buffers. Returns the TBS in bytes.
    pub fn set_pdsch_params(mut self, crbs: CrbInterval) -> u32 {
        let used = self.used_crbs();
        if crbs.is_empty() || !self.crb_limits.contains_interval(&crbs) || used.any_in(crbs.start() as usize, crbs.stop() as usize) {
            error!("{} invalid PDSCH CRBs {} within {}", self.ue.ue_index(), crbs, self.crb_limits);
            panic!("PDSCH CRBs {} are not free", crbs);
        }
        let pdsch_slot = self.pdsch_slot();
        let expert = &self.cfg.expert;
        let mcs = self.sizing.params.mcs;
        let tbs_bytes = compute_tbs_bytes(&self.sizing.params, crbs.length());
        let lcs = self.lcs;
        let pdu = self.ue.dl_lc.allocate(tbs_bytes, |lcid| lcs.accepts(lcid));
        let max_retxs = if pdu.conres_ce { expert.max_msg4_harq_retxs } else { expert.max_nof_dl_harq_retxs };

        let tb = TransportBlockInfo {
            mcs,
            tbs_bytes,
            nof_prbs: crbs.length(),
            is_fallback: self.is_fallback,
        };
        let harq_id = self.harq_id;
        let (ndi, rv) = match self.ue.dl_harqs.get_mut(harq_id) {
            Some(harq) => {
                harq.new_tx(pdsch_slot, pdsch_slot + self.uci.k1 as u32, tb, max_retxs);
                harq.set_harq_bit_idx(self.uci.harq_bit_idx);
                (harq.ndi(), harq.rv())
            }
            None => panic!("DL HARQ {} vanished during the allocation", harq_id.0),
        };

        self.grid[0].result.dl.dl_pdcchs[self.pdcch.0].dci = DlDciPayload {
            time_resource: self.pdsch.td_index,
            crbs,
            mcs,
            harq_id,
            ndi,
            rv,
            k1: self.uci.k1,
            pucch_res_indicator: self.uci.pucch_res_indicator.unwrap_or(0),
            dai: self.uci.harq_bit_idx % 4,
        };
        let rnti = self.ue.crnti();
        let slot_alloc = &mut self.grid[self.pdsch.offset];
        slot_alloc.dl_res_grid.fill(GrantInfo::new(self.pdsch.symbols, crbs));
        slot_alloc.result.dl.ue_grants.push(DlMsgAlloc {
            ue_index: self.ue.ue_index(),
            pdsch: PdschInformation {
                rnti,
                crbs,
                symbols: self.pdsch.symbols,
                mcs,
                tbs_bytes,
                harq_id,
                is_new_data: true,
                rv,
            },
            lc_grants: pdu.lc_grants,
            conres_ce: pdu.conres_ce,
            is_fallback: self.is_fallback,
        });
        self.ue.set_last_pdsch_slot(pdsch_slot);
        self.finalized = true;
        debug!(
            "{} DL newtx h={} mcs={} crbs={} tbs={} used={} slot={}",
            self.ue.ue_index(),
            harq_id.0,
            mcs,
            crbs,
            tbs_bytes,
            pdu.nof_bytes,
            pdsch_slot
        );
        tbs_bytes
    }
}

impl Drop for DlNewTxGrantBuilder<'_> {
    fn drop(&mut self) {
        if !self.finalized && !std::thread::panicking() {
            error!("{} DL grant builder dropped without PDSCH parameters", self.ue.ue_index());
            panic!("DL grant builder dropped without set_pdsch_params");
        }
    }
}

/// Pending new UL transmission with its PDCCH reserved.
///
/// Must be finalized with [`UlNewTxGrantBuilder::set_pusch_params`].
pub struct UlNewTxGrantBuilder<'a> {
    cfg: &'a CellConfiguration,
    grid: &'a mut CellResourceAllocator,
    uci: &'a mut (dyn UciAllocator + Send),
    ue: &'a mut Ue,
    pdcch: UlPdcchIndex,
    pusch: PuschPlacement,
    harq_id: HarqId,
    crb_limits: CrbInterval,
    sizing: GrantSizing,
    finalized: bool,
}

impl UlNewTxGrantBuilder<'_> {
    /// Slot of the PUSCH
    pub fn pusch_slot(&self) -> SlotPoint {
        self.grid.slot_tx() + self.pusch.offset
    }

    /// CRBs already used in the PUSCH symbols, PUCCH regions included
    pub fn used_crbs(&self) -> BoundedBitmap {
        self.grid[self.pusch.offset]
            .ul_res_grid
            .used_crbs_within(self.pusch.symbols, self.crb_limits)
    }

    /// CRBs for the pending bytes, at most `max_nof_rbs` long
    pub fn recommended_crbs(&self, used: &BoundedBitmap, max_nof_rbs: u32) -> CrbInterval {
        self.sizing.pick(used, max_nof_rbs)
    }

    /// Commit the PUSCH on `crbs`, moving the UCI of the slot onto it. Returns
    /// the TBS in bytes.
    pub fn set_pusch_params(mut self, crbs: CrbInterval) -> u32 {
        let used = self.used_crbs();
        if crbs.is_empty() || !self.crb_limits.contains_interval(&crbs) || used.any_in(crbs.start() as usize, crbs.stop() as usize) {
            error!("{} invalid PUSCH CRBs {} within {}", self.ue.ue_index(), crbs, self.crb_limits);
            panic!("PUSCH CRBs {} are not free", crbs);
        }
        let pusch_slot = self.pusch_slot();
        let mcs = self.sizing.params.mcs;
        let tbs_bytes = compute_tbs_bytes(&self.sizing.params, crbs.length());
        let harq_id = self.harq_id;
        let tb = TransportBlockInfo {
            mcs,
            tbs_bytes,
            nof_prbs: crbs.length(),
            is_fallback: self.ue.is_fallback(),
        };
        let max_retxs = self.cfg.expert.max_nof_ul_harq_retxs;
        let (ndi, rv) = match self.ue.ul_harqs.get_mut(harq_id) {
            Some(harq) => {
                harq.new_tx(pusch_slot, pusch_slot, tb, max_retxs);
                (harq.ndi(), harq.rv())
            }
            None => panic!("UL HARQ {} vanished during the allocation", harq_id.0),
        };
        self.ue.ul_lc.handle_ul_grant(tbs_bytes);

        self.grid[0].result.dl.ul_pdcchs[self.pdcch.0].dci = UlDciPayload {
            time_resource: self.pusch.td_index,
            crbs,
            mcs,
            harq_id,
            ndi,
            rv,
        };
        let mut info = PuschInformation {
            rnti: self.ue.crnti(),
            crbs,
            symbols: self.pusch.symbols,
            mcs,
            tbs_bytes,
            harq_id,
            is_new_data: true,
            rv,
            uci: None,
        };
        let pusch = self.pusch;
        commit_pusch(&mut *self.grid, &mut *self.uci, &mut *self.ue, &pusch, &mut info);
        self.finalized = true;
        debug!(
            "{} UL newtx h={} mcs={} crbs={} tbs={} slot={}",
            self.ue.ue_index(),
            harq_id.0,
            mcs,
            crbs,
            tbs_bytes,
            pusch_slot
        );
        tbs_bytes
    }
}

impl Drop for UlNewTxGrantBuilder<'_> {
    fn drop(&mut self) {
        if !self.finalized && !std::thread::panicking() {
            error!("{} UL grant builder dropped without PUSCH parameters", self.ue.ue_index());
            panic!("UL grant builder dropped without set_pusch_params");
        }
    }
}

/// Write a PUSCH into its slot, taking over the UCI the UE had on PUCCH
fn commit_pusch(
    grid: &mut CellResourceAllocator,
    uci: &mut (dyn UciAllocator + Send),
    ue: &mut Ue,
    pusch: &PuschPlacement,
    info: &mut PuschInformation,
) {
    let slot_alloc = &mut grid[pusch.offset];
    let pusch_slot = slot_alloc.slot();
    uci.multiplex_uci_on_pusch(info, slot_alloc, ue.cfg(), ue.crnti());
    slot_alloc.ul_res_grid.fill(GrantInfo::new(pusch.symbols, info.crbs));
    slot_alloc.result.ul.puschs.push(UlSchedInfo {
        ue_index: Some(ue.ue_index()),
        pusch: info.clone(),
        is_msg3: false,
    });
    ue.set_last_pusch_slot(pusch_slot);
}
