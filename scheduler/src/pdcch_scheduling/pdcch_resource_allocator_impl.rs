//! PDCCH Resource Allocator
//!
//! Places DCIs on PDCCH candidates of the configured search spaces and records
//! them in the slot result

use super::pdcch_slot_allocator::{PdcchAllocRequest, PdcchRef, PdcchSlotAllocator};
use super::{DlPdcchIndex, PdcchResourceAllocator, UlPdcchIndex, SLOT_ALLOCATOR_RING_SIZE};
use crate::cell::CellSlotResourceAllocator;
use crate::config::{CellConfiguration, SearchSpaceConfiguration, SearchSpaceId, SearchSpaceType, UeCellConfiguration};
use crate::result::{
    DciContext, DciDlFormat, DciRntiType, DciUlFormat, DlDciPayload, PdcchDlInformation, PdcchUlInformation,
    UlDciPayload,
};
use crate::support::pdcch_candidates::{candidate_cces, ue_specific_hash, AggregationLevel};
use crate::support::SlotRing;
use common::interval::{CceInterval, CrbInterval};
use common::slot_point::SlotPoint;
use common::types::Rnti;
use std::sync::Arc;
use tracing::{debug, error, trace};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Dl,
    Ul,
}

/// Production PDCCH resource allocator
pub struct PdcchResourceAllocatorImpl {
    cfg: Arc<CellConfiguration>,
    slots: SlotRing<PdcchSlotAllocator>,
}

impl PdcchResourceAllocatorImpl {
    /// Create the allocator for a cell
    pub fn new(cfg: Arc<CellConfiguration>) -> Self {
        Self {
            cfg,
            slots: SlotRing::new(SLOT_ALLOCATOR_RING_SIZE),
        }
    }

    fn logical_rnti_type(rnti: Rnti) -> DciRntiType {
        if rnti == Rnti::SI_RNTI {
            DciRntiType::SiRnti
        } else if rnti == Rnti::P_RNTI {
            DciRntiType::PRnti
        } else if rnti.is_ra_rnti() {
            DciRntiType::RaRnti
        } else {
            DciRntiType::TcRnti
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn alloc_pdcch(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        rnti: Rnti,
        rnti_type: DciRntiType,
        ss: &SearchSpaceConfiguration,
        aggr_lvl: AggregationLevel,
        dir: Direction,
    ) -> Option<PdcchRef> {
        let sl = slot_alloc.slot();
        if !self.cfg.is_dl_enabled(sl) || !ss.is_monitored(sl) {
            trace!("rnti={} ss={} not monitored in slot {}", rnti, ss.id, sl);
            return None;
        }
        let coreset = self.cfg.coreset(ss.coreset_id)?;
        let is_ue_specific = ss.kind == SearchSpaceType::UeSpecific;
        let hash = if is_ue_specific {
            ue_specific_hash(rnti, coreset.id, sl.slot_index())
        } else {
            0
        };
        let candidates = candidate_cces(coreset.nof_cces(), aggr_lvl, ss.nof_candidates(aggr_lvl), hash);
        if candidates.is_empty() {
            trace!("rnti={} ss={} has no {} candidates", rnti, ss.id, aggr_lvl);
            return None;
        }

        let pdcch = match dir {
            Direction::Dl => PdcchRef::Dl(slot_alloc.result.dl.dl_pdcchs.len()),
            Direction::Ul => PdcchRef::Ul(slot_alloc.result.dl.ul_pdcchs.len()),
        };
        let outcome = self.slots.get_mut(sl).alloc(PdcchAllocRequest {
            pdcch,
            coreset,
            aggr_lvl,
            candidates,
            movable: is_ue_specific,
        });
        let Some(outcome) = outcome else {
            debug!("rnti={} no free PDCCH candidate in ss={} {} slot={}", rnti, ss.id, aggr_lvl, sl);
            return None;
        };

        for (moved, cce) in outcome.moved {
            let cces = CceInterval::from_length(cce, aggr_lvl_of(slot_alloc, moved).nof_cces());
            let ctx = match moved {
                PdcchRef::Dl(i) => &mut slot_alloc.result.dl.dl_pdcchs[i].ctx,
                PdcchRef::Ul(i) => &mut slot_alloc.result.dl.ul_pdcchs[i].ctx,
            };
            ctx.cces = cces;
            ctx.crbs = coreset_crbs(&self.cfg, ctx.coreset_id, cces);
            trace!("rnti={} PDCCH moved to CCEs {}", ctx.rnti, cces);
        }

        let cces = CceInterval::from_length(outcome.cce, aggr_lvl.nof_cces());
        let ctx = DciContext {
            rnti,
            rnti_type,
            coreset_id: coreset.id,
            ss_id: ss.id,
            aggr_lvl,
            cces,
            coreset_nof_cces: coreset.nof_cces(),
            crbs: coreset.cces_to_crbs(cces.start(), cces.length()),
            symbols: coreset.symbols(),
        };
        match dir {
            Direction::Dl => slot_alloc.result.dl.dl_pdcchs.push(PdcchDlInformation {
                ctx,
                format: if is_ue_specific { DciDlFormat::F1_1 } else { DciDlFormat::F1_0 },
                dci: DlDciPayload::default(),
            }),
            Direction::Ul => slot_alloc.result.dl.ul_pdcchs.push(PdcchUlInformation {
                ctx,
                format: if is_ue_specific { DciUlFormat::F0_1 } else { DciUlFormat::F0_0 },
                dci: UlDciPayload::default(),
            }),
        }
        Some(pdcch)
    }

    fn common_search_space(&self, ss_id: SearchSpaceId) -> Option<SearchSpaceConfiguration> {
        match self.cfg.search_space(ss_id) {
            Some(ss) if ss.kind == SearchSpaceType::Common => Some(ss.clone()),
            _ => {
                error!("Search space {} is not a common search space", ss_id);
                None
            }
        }
    }

    fn ue_search_space(&self, ue_cfg: &UeCellConfiguration, ss_id: SearchSpaceId) -> Option<SearchSpaceConfiguration> {
        let monitored = ue_cfg.ue_search_space == Some(ss_id) || ss_id == self.cfg.common_search_space;
        if !monitored {
            error!("Search space {} is not monitored by the UE", ss_id);
            return None;
        }
        self.cfg.search_space(ss_id).cloned()
    }

    fn ue_rnti_type(ss: &SearchSpaceConfiguration, ue_cfg: &UeCellConfiguration) -> DciRntiType {
        if ss.kind == SearchSpaceType::Common && !ue_cfg.has_dedicated_pucch() {
            DciRntiType::TcRnti
        } else {
            DciRntiType::CRnti
        }
    }
}

fn aggr_lvl_of(slot_alloc: &CellSlotResourceAllocator, pdcch: PdcchRef) -> AggregationLevel {
    match pdcch {
        PdcchRef::Dl(i) => slot_alloc.result.dl.dl_pdcchs[i].ctx.aggr_lvl,
        PdcchRef::Ul(i) => slot_alloc.result.dl.ul_pdcchs[i].ctx.aggr_lvl,
    }
}

fn coreset_crbs(cfg: &CellConfiguration, coreset_id: u8, cces: CceInterval) -> CrbInterval {
    cfg.coreset(coreset_id)
        .map(|cs| cs.cces_to_crbs(cces.start(), cces.length()))
        .unwrap_or_default()
}

impl PdcchResourceAllocator for PdcchResourceAllocatorImpl {
    fn slot_indication(&mut self, sl_tx: SlotPoint) {
        let nof_crbs = self.cfg.nof_dl_crbs;
        self.slots.slot_indication(sl_tx, |s| s.reset(nof_crbs));
    }

    fn alloc_dl_pdcch_common(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        rnti: Rnti,
        ss_id: SearchSpaceId,
        aggr_lvl: AggregationLevel,
    ) -> Option<DlPdcchIndex> {
        let ss = self.common_search_space(ss_id)?;
        let rnti_type = Self::logical_rnti_type(rnti);
        match self.alloc_pdcch(slot_alloc, rnti, rnti_type, &ss, aggr_lvl, Direction::Dl)? {
            PdcchRef::Dl(i) => Some(DlPdcchIndex(i)),
            PdcchRef::Ul(_) => None,
        }
    }

    fn alloc_ul_pdcch_common(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        rnti: Rnti,
        ss_id: SearchSpaceId,
        aggr_lvl: AggregationLevel,
    ) -> Option<UlPdcchIndex> {
        let ss = self.common_search_space(ss_id)?;
        let rnti_type = Self::logical_rnti_type(rnti);
        match self.alloc_pdcch(slot_alloc, rnti, rnti_type, &ss, aggr_lvl, Direction::Ul)? {
            PdcchRef::Ul(i) => Some(UlPdcchIndex(i)),
            PdcchRef::Dl(_) => None,
        }
    }

    fn alloc_dl_pdcch_ue(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        rnti: Rnti,
        ue_cfg: &UeCellConfiguration,
        ss_id: SearchSpaceId,
        aggr_lvl: AggregationLevel,
    ) -> Option<DlPdcchIndex> {
        let ss = self.ue_search_space(ue_cfg, ss_id)?;
        let rnti_type = Self::ue_rnti_type(&ss, ue_cfg);
        match self.alloc_pdcch(slot_alloc, rnti, rnti_type, &ss, aggr_lvl, Direction::Dl)? {
            PdcchRef::Dl(i) => Some(DlPdcchIndex(i)),
            PdcchRef::Ul(_) => None,
        }
    }

    fn alloc_ul_pdcch_ue(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        rnti: Rnti,
        ue_cfg: &UeCellConfiguration,
        ss_id: SearchSpaceId,
        aggr_lvl: AggregationLevel,
    ) -> Option<UlPdcchIndex> {
        let ss = self.ue_search_space(ue_cfg, ss_id)?;
        let rnti_type = Self::ue_rnti_type(&ss, ue_cfg);
        match self.alloc_pdcch(slot_alloc, rnti, rnti_type, &ss, aggr_lvl, Direction::Ul)? {
            PdcchRef::Ul(i) => Some(UlPdcchIndex(i)),
            PdcchRef::Dl(_) => None,
        }
    }

    fn cancel_last_pdcch(&mut self, slot_alloc: &mut CellSlotResourceAllocator) {
        let sl = slot_alloc.slot();
        let Some(last) = self.slots.get_mut(sl).cancel_last() else {
            error!("No PDCCH to cancel in slot {}", sl);
            panic!("cancel_last_pdcch called without a PDCCH allocated in slot {}", sl);
        };
        let (list_len, idx) = match last {
            PdcchRef::Dl(i) => (slot_alloc.result.dl.dl_pdcchs.len(), i),
            PdcchRef::Ul(i) => (slot_alloc.result.dl.ul_pdcchs.len(), i),
        };
        assert_eq!(idx + 1, list_len, "Cancelled PDCCH is not the last of its list in slot {}", sl);
        match last {
            PdcchRef::Dl(_) => {
                slot_alloc.result.dl.dl_pdcchs.pop();
            }
            PdcchRef::Ul(_) => {
                slot_alloc.result.dl.ul_pdcchs.pop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellResourceAllocator;
    use common::types::{SubcarrierSpacing, UeIndex};

    struct Bench {
        cfg: Arc<CellConfiguration>,
        res: CellResourceAllocator,
        pdcch: PdcchResourceAllocatorImpl,
    }

    fn bench() -> Bench {
        let cfg = Arc::new(CellConfiguration::default());
        let mut res = CellResourceAllocator::new(cfg.clone());
        let mut pdcch = PdcchResourceAllocatorImpl::new(cfg.clone());
        let sl = SlotPoint::new(SubcarrierSpacing::Scs15, 0, 1);
        res.slot_indication(sl);
        pdcch.slot_indication(sl);
        Bench { cfg, res, pdcch }
    }

    fn cces_disjoint(list: &[DciContext]) -> bool {
        list.iter().enumerate().all(|(i, a)| {
            list[i + 1..].iter().all(|b| a.coreset_id != b.coreset_id || !a.cces.overlaps(&b.cces))
        })
    }

    #[test]
    fn test_common_pdcch_allocation() {
        let mut b = bench();
        let idx = b.pdcch.alloc_dl_pdcch_common(&mut b.res[0], Rnti::SI_RNTI, 0, AggregationLevel::N4).unwrap();
        assert_eq!(idx, DlPdcchIndex(0));
        let pdcch = &b.res[0].result.dl.dl_pdcchs[0];
        assert_eq!(pdcch.ctx.rnti_type, DciRntiType::SiRnti);
        assert_eq!(pdcch.format, DciDlFormat::F1_0);
        assert_eq!(pdcch.ctx.cces, CceInterval::new(0, 4));
    }

    #[test]
    fn test_common_search_space_exhaustion() {
        let mut b = bench();
        // SS1 has 2 AL4 candidates.
        assert!(b.pdcch.alloc_dl_pdcch_common(&mut b.res[0], Rnti(1), 1, AggregationLevel::N4).is_some());
        assert!(b.pdcch.alloc_dl_pdcch_common(&mut b.res[0], Rnti(2), 1, AggregationLevel::N4).is_some());
        assert!(b.pdcch.alloc_dl_pdcch_common(&mut b.res[0], Rnti(3), 1, AggregationLevel::N4).is_none());
        assert_eq!(b.res[0].result.dl.dl_pdcchs.len(), 2);
    }

    #[test]
    fn test_ue_pdcchs_do_not_overlap() {
        let mut b = bench();
        let mut nof_ok = 0;
        for i in 0..8u16 {
            let ue_cfg = UeCellConfiguration::default_for(&b.cfg, UeIndex(i));
            if b.pdcch.alloc_dl_pdcch_ue(&mut b.res[0], Rnti(0x4601 + i), &ue_cfg, 2, AggregationLevel::N2).is_some() {
                nof_ok += 1;
            }
        }
        assert!(nof_ok >= 4);
        let ctxs: Vec<DciContext> = b.res[0].result.dl.dl_pdcchs.iter().map(|p| p.ctx.clone()).collect();
        assert!(cces_disjoint(&ctxs));
        for ctx in &ctxs {
            assert!(CrbInterval::new(0, 48).contains_interval(&ctx.crbs));
            assert_eq!(ctx.rnti_type, DciRntiType::CRnti);
        }
    }

    #[test]
    fn test_cancel_last_pdcch() {
        let mut b = bench();
        let ue_cfg = UeCellConfiguration::default_for(&b.cfg, UeIndex(0));
        b.pdcch.alloc_dl_pdcch_ue(&mut b.res[0], Rnti(0x4601), &ue_cfg, 2, AggregationLevel::N4).unwrap();
        b.pdcch.alloc_ul_pdcch_ue(&mut b.res[0], Rnti(0x4601), &ue_cfg, 2, AggregationLevel::N4).unwrap();
        b.pdcch.cancel_last_pdcch(&mut b.res[0]);
        assert_eq!(b.res[0].result.dl.ul_pdcchs.len(), 0);
        assert_eq!(b.res[0].result.dl.dl_pdcchs.len(), 1);
        b.pdcch.cancel_last_pdcch(&mut b.res[0]);
        assert!(b.res[0].result.dl.dl_pdcchs.is_empty());
    }

    #[test]
    #[should_panic]
    fn test_cancel_without_pdcch_panics() {
        let mut b = bench();
        b.pdcch.cancel_last_pdcch(&mut b.res[0]);
    }

    #[test]
    fn test_fallback_ue_uses_tc_rnti() {
        let mut b = bench();
        let ue_cfg = UeCellConfiguration::fallback(&b.cfg);
        b.pdcch.alloc_dl_pdcch_ue(&mut b.res[0], Rnti(0x4601), &ue_cfg, 1, AggregationLevel::N4).unwrap();
        assert_eq!(b.res[0].result.dl.dl_pdcchs[0].ctx.rnti_type, DciRntiType::TcRnti);
        // A fallback UE does not monitor the UE-specific search space.
        assert!(b.pdcch.alloc_dl_pdcch_ue(&mut b.res[0], Rnti(0x4601), &ue_cfg, 2, AggregationLevel::N4).is_none());
    }
}
