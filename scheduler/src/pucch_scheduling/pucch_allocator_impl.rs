//! PUCCH Allocator
//!
//! Keeps, per slot of the lookahead window, the UCI each UE reports on PUCCH and
//! rebuilds the UE's dedicated PUCCH PDUs whenever that UCI changes. A change is
//! committed only if the new PDUs avoid every other PUCCH and PUSCH of the slot.

use super::pucch_multiplexer::{multiplex, DedicatedUci};
use super::{pucch_collides_with_puschs, pucchs_collide, PucchAllocator};
use crate::cell::{CellSlotResourceAllocator, RING_ALLOCATOR_SIZE};
use crate::config::{CellConfiguration, UeCellConfiguration};
use crate::result::{DciContext, PucchInformation, PucchResources, PucchUciBits};
use crate::support::pucch_common::{
    common_pucch_resource, common_pucch_resource_set, r_pucch, CommonPucchResourceSet, NOF_COMMON_PUCCH_RESOURCES,
    NOF_PUCCH_RES_INDICATORS,
};
use crate::support::SlotRing;
use common::slot_point::SlotPoint;
use common::types::Rnti;
use std::sync::Arc;
use tracing::{debug, trace};

/// PUCCH state of a UE in one slot
#[derive(Debug, Clone)]
struct UePucchState {
    rnti: Rnti,
    uci: DedicatedUci,
    /// PRI of the dedicated HARQ-ACK resource
    pri: Option<u8>,
    /// PRI of the common HARQ-ACK grant
    common_pri: Option<u8>,
}

impl UePucchState {
    fn new(rnti: Rnti) -> Self {
        Self {
            rnti,
            uci: DedicatedUci::default(),
            pri: None,
            common_pri: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.uci.is_empty() && self.common_pri.is_none()
    }
}

#[derive(Debug, Default)]
struct PucchSlotState {
    ues: Vec<UePucchState>,
}

impl PucchSlotState {
    fn ue(&self, rnti: Rnti) -> UePucchState {
        self.ues
            .iter()
            .find(|u| u.rnti == rnti)
            .cloned()
            .unwrap_or_else(|| UePucchState::new(rnti))
    }

    fn store(&mut self, state: UePucchState) {
        self.ues.retain(|u| u.rnti != state.rnti);
        if !state.is_empty() {
            self.ues.push(state);
        }
    }
}

/// Dedicated PDUs to replace the UE's current ones, plus an optional common PDU
struct PucchCommit<'c> {
    rnti: Rnti,
    ue_cfg: &'c UeCellConfiguration,
    uci: DedicatedUci,
    pri: Option<u8>,
    common: Option<(PucchInformation, u8)>,
}

/// Production PUCCH allocator
pub struct PucchAllocatorImpl {
    cfg: Arc<CellConfiguration>,
    common_set: Option<&'static CommonPucchResourceSet>,
    slots: SlotRing<PucchSlotState>,
}

impl PucchAllocatorImpl {
    /// Create the allocator for a cell
    pub fn new(cfg: Arc<CellConfiguration>) -> Self {
        Self {
            common_set: common_pucch_resource_set(cfg.pucch_resource_common),
            slots: SlotRing::new(RING_ALLOCATOR_SIZE),
            cfg,
        }
    }

    fn common_pdu(&self, rnti: Rnti, dci: &DciContext, pri: u8) -> Option<PucchInformation> {
        let set = self.common_set?;
        let r = r_pucch(dci.cces.start(), dci.coreset_nof_cces, pri);
        if r >= NOF_COMMON_PUCCH_RESOURCES {
            return None;
        }
        let res = common_pucch_resource(set, r, self.cfg.nof_ul_crbs);
        Some(PucchInformation {
            rnti,
            format: res.format,
            resources: PucchResources {
                prbs: res.first_hop(),
                second_hop_prbs: Some(res.second_hop()),
                symbols: res.symbols,
                initial_cyclic_shift: res.initial_cyclic_shift,
                time_domain_occ: 0,
            },
            uci_bits: PucchUciBits {
                harq_ack_nof_bits: 1,
                ..Default::default()
            },
            is_common: true,
        })
    }

    /// PRIs to try: the one already in use first, then the others
    fn pri_candidates(&self, ue_cfg: &UeCellConfiguration, preserved: Option<u8>) -> Vec<u8> {
        let nof_pris = ue_cfg
            .pucch
            .as_ref()
            .map(|p| p.res_set0.len().max(p.res_set1.len()) as u8)
            .unwrap_or(0)
            .min(NOF_PUCCH_RES_INDICATORS);
        preserved
            .into_iter()
            .chain((0..nof_pris).filter(|p| Some(*p) != preserved))
            .collect()
    }

    /// Whether `pdus` can be added to the slot once the dedicated PDUs of
    /// `replacing` are removed
    fn fits(&self, slot_alloc: &CellSlotResourceAllocator, pdus: &[PucchInformation], replacing: Option<Rnti>) -> bool {
        let is_replaced = |p: &PucchInformation| Some(p.rnti) == replacing && !p.is_common;
        let collides = pdus.iter().any(|pdu| {
            pucch_collides_with_puschs(pdu, slot_alloc)
                || slot_alloc
                    .result
                    .ul
                    .pucchs
                    .iter()
                    .filter(|p| !is_replaced(p))
                    .any(|p| pucchs_collide(pdu, p))
        });
        if collides {
            return false;
        }

        let ul = &slot_alloc.result.ul;
        let nof_pucchs = ul.pucchs.iter().filter(|p| !is_replaced(p)).count() + pdus.len();
        let expert = &self.cfg.expert;
        nof_pucchs <= expert.max_pucchs_per_slot as usize
            && nof_pucchs + ul.puschs.len() <= expert.max_ul_grants_per_slot as usize
    }

    fn commit(&mut self, slot_alloc: &mut CellSlotResourceAllocator, req: PucchCommit<'_>) -> bool {
        let Some(grants) = multiplex(&self.cfg.pucch_resources, req.ue_cfg, &req.uci, req.pri) else {
            return false;
        };
        let mut pdus: Vec<PucchInformation> = grants.iter().map(|g| g.to_pdu(req.rnti)).collect();
        if let Some((common, _)) = &req.common {
            pdus.push(common.clone());
        }
        if !self.fits(slot_alloc, &pdus, Some(req.rnti)) {
            return false;
        }

        let rnti = req.rnti;
        let pucchs = &mut slot_alloc.result.ul.pucchs;
        pucchs.retain(|p| p.rnti != rnti || p.is_common);
        pucchs.extend(pdus);

        let slot_state = self.slots.get_mut(slot_alloc.slot());
        let mut state = slot_state.ue(rnti);
        state.uci = req.uci;
        state.pri = if req.uci.harq_ack_nof_bits > 0 { req.pri } else { None };
        if let Some((_, pri)) = req.common {
            state.common_pri = Some(pri);
        }
        slot_state.store(state);
        true
    }
}

impl PucchAllocator for PucchAllocatorImpl {
    fn slot_indication(&mut self, sl_tx: SlotPoint) {
        self.slots.slot_indication(sl_tx, |s| s.ues.clear());
    }

    fn alloc_common_harq_ack(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        rnti: Rnti,
        dci: &DciContext,
    ) -> Option<u8> {
        let sl = slot_alloc.slot();
        if !self.cfg.is_ul_enabled(sl) {
            return None;
        }
        let mut state = self.slots.get(sl).ue(rnti);
        if state.common_pri.is_some() {
            debug!("rnti={} already holds a common PUCCH in slot {}", rnti, sl);
            return None;
        }

        for pri in 0..NOF_PUCCH_RES_INDICATORS {
            let Some(pdu) = self.common_pdu(rnti, dci, pri) else {
                continue;
            };
            if !self.fits(slot_alloc, std::slice::from_ref(&pdu), None) {
                continue;
            }
            trace!("rnti={} common PUCCH prbs={} pri={} slot={}", rnti, pdu.resources.prbs, pri, sl);
            slot_alloc.result.ul.pucchs.push(pdu);
            state.common_pri = Some(pri);
            self.slots.get_mut(sl).store(state);
            return Some(pri);
        }
        debug!("rnti={} no common PUCCH resource available in slot {}", rnti, sl);
        None
    }

    fn alloc_common_and_ded_harq_ack(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        rnti: Rnti,
        ue_cfg: &UeCellConfiguration,
        dci: &DciContext,
    ) -> Option<u8> {
        let sl = slot_alloc.slot();
        if !self.cfg.is_ul_enabled(sl) {
            return None;
        }
        let state = self.slots.get(sl).ue(rnti);
        if state.common_pri.is_some() {
            debug!("rnti={} already holds a common PUCCH in slot {}", rnti, sl);
            return None;
        }
        let uci = DedicatedUci {
            harq_ack_nof_bits: state.uci.harq_ack_nof_bits + 1,
            ..state.uci
        };

        for pri in self.pri_candidates(ue_cfg, state.pri) {
            let Some(common) = self.common_pdu(rnti, dci, pri) else {
                continue;
            };
            let req = PucchCommit {
                rnti,
                ue_cfg,
                uci,
                pri: Some(pri),
                common: Some((common, pri)),
            };
            if self.commit(slot_alloc, req) {
                trace!("rnti={} common and dedicated PUCCH pri={} slot={}", rnti, pri, sl);
                return Some(pri);
            }
        }
        debug!("rnti={} no common and dedicated PUCCH pair available in slot {}", rnti, sl);
        None
    }

    fn alloc_ded_harq_ack(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        rnti: Rnti,
        ue_cfg: &UeCellConfiguration,
    ) -> Option<u8> {
        let sl = slot_alloc.slot();
        if !self.cfg.is_ul_enabled(sl) || !ue_cfg.has_dedicated_pucch() {
            return None;
        }
        let state = self.slots.get(sl).ue(rnti);
        let uci = DedicatedUci {
            harq_ack_nof_bits: state.uci.harq_ack_nof_bits + 1,
            ..state.uci
        };
        // A DCI pointing to a slot with a common grant must keep its PRI.
        let candidates = match state.common_pri {
            Some(pri) => vec![pri],
            None => self.pri_candidates(ue_cfg, state.pri),
        };

        for pri in candidates {
            let req = PucchCommit {
                rnti,
                ue_cfg,
                uci,
                pri: Some(pri),
                common: None,
            };
            if self.commit(slot_alloc, req) {
                trace!("rnti={} HARQ-ACK bits={} pri={} slot={}", rnti, uci.harq_ack_nof_bits, pri, sl);
                return Some(pri);
            }
        }
        debug!(
            "rnti={} no dedicated PUCCH for {} HARQ-ACK bits in slot {}",
            rnti, uci.harq_ack_nof_bits, sl
        );
        None
    }

    fn alloc_sr_opportunity(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        rnti: Rnti,
        ue_cfg: &UeCellConfiguration,
    ) -> bool {
        let sl = slot_alloc.slot();
        if ue_cfg.sr.is_none() || !self.cfg.is_ul_enabled(sl) {
            return false;
        }
        let state = self.slots.get(sl).ue(rnti);
        if state.uci.sr {
            return true;
        }
        let req = PucchCommit {
            rnti,
            ue_cfg,
            uci: DedicatedUci { sr: true, ..state.uci },
            pri: state.pri,
            common: None,
        };
        let ok = self.commit(slot_alloc, req);
        if !ok {
            debug!("rnti={} SR opportunity not allocated in slot {}", rnti, sl);
        }
        ok
    }

    fn alloc_csi_opportunity(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        rnti: Rnti,
        ue_cfg: &UeCellConfiguration,
        csi_part1_bits: u32,
    ) -> bool {
        let sl = slot_alloc.slot();
        if ue_cfg.csi_report.is_none() || csi_part1_bits == 0 || !self.cfg.is_ul_enabled(sl) {
            return false;
        }
        let state = self.slots.get(sl).ue(rnti);
        if state.uci.csi_part1_nof_bits > 0 {
            return true;
        }
        let req = PucchCommit {
            rnti,
            ue_cfg,
            uci: DedicatedUci {
                csi_part1_nof_bits: csi_part1_bits,
                ..state.uci
            },
            pri: state.pri,
            common: None,
        };
        let ok = self.commit(slot_alloc, req);
        if !ok {
            debug!("rnti={} CSI opportunity not allocated in slot {}", rnti, sl);
        }
        ok
    }

    fn remove_ue_uci_from_pucch(&mut self, slot_alloc: &mut CellSlotResourceAllocator, rnti: Rnti) -> PucchUciBits {
        let sl = slot_alloc.slot();
        let slot_state = self.slots.get_mut(sl);
        let state = slot_state.ue(rnti);
        slot_state.ues.retain(|u| u.rnti != rnti);
        slot_alloc.result.ul.pucchs.retain(|p| p.rnti != rnti);

        // Common and dedicated grants of a fallback DCI report the same bit.
        let common_bits = state.common_pri.map_or(0, |_| 1);
        PucchUciBits {
            harq_ack_nof_bits: state.uci.harq_ack_nof_bits.max(common_bits),
            sr_nof_bits: state.uci.sr as u32,
            csi_part1_nof_bits: state.uci.csi_part1_nof_bits,
        }
    }

    fn remove_periodic_uci(
        &mut self,
        slot_alloc: &mut CellSlotResourceAllocator,
        rnti: Rnti,
        ue_cfg: &UeCellConfiguration,
    ) {
        let sl = slot_alloc.slot();
        let state = self.slots.get(sl).ue(rnti);
        if !state.uci.sr && state.uci.csi_part1_nof_bits == 0 {
            return;
        }
        let uci = DedicatedUci {
            sr: false,
            csi_part1_nof_bits: 0,
            ..state.uci
        };
        if uci.harq_ack_nof_bits == 0 {
            slot_alloc.result.ul.pucchs.retain(|p| p.rnti != rnti || p.is_common);
            self.slots.get_mut(sl).store(UePucchState { uci, pri: None, ..state });
            return;
        }
        let req = PucchCommit {
            rnti,
            ue_cfg,
            uci,
            pri: state.pri,
            common: None,
        };
        if !self.commit(slot_alloc, req) {
            debug!("rnti={} periodic UCI kept in slot {}, HARQ-ACK PUCCH not rebuilt", rnti, sl);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellResourceAllocator;
    use crate::config::pucch_config::default_pool::*;
    use crate::result::{DciRntiType, PuschInformation, UlSchedInfo};
    use crate::support::AggregationLevel;
    use common::interval::{CceInterval, CrbInterval, OfdmSymbolRange};
    use common::types::{HarqId, SubcarrierSpacing, UeIndex};

    const K1: u32 = 4;

    struct Bench {
        cfg: Arc<CellConfiguration>,
        res: CellResourceAllocator,
        pucch: PucchAllocatorImpl,
    }

    impl Bench {
        fn new(cfg: CellConfiguration) -> Self {
            let cfg = Arc::new(cfg);
            let mut res = CellResourceAllocator::new(cfg.clone());
            let mut pucch = PucchAllocatorImpl::new(cfg.clone());
            let sl = SlotPoint::new(SubcarrierSpacing::Scs15, 0, 0);
            res.slot_indication(sl);
            pucch.slot_indication(sl);
            Self { cfg, res, pucch }
        }

        fn ue_cfg(&self, idx: u16) -> UeCellConfiguration {
            UeCellConfiguration::default_for(&self.cfg, UeIndex(idx))
        }

        fn pucchs(&self, rnti: Rnti) -> Vec<PucchInformation> {
            self.res[K1]
                .result
                .ul
                .pucchs
                .iter()
                .filter(|p| p.rnti == rnti)
                .cloned()
                .collect()
        }
    }

    fn dci(rnti: Rnti, first_cce: u32) -> DciContext {
        DciContext {
            rnti,
            rnti_type: DciRntiType::TcRnti,
            coreset_id: 0,
            ss_id: 1,
            aggr_lvl: AggregationLevel::N4,
            cces: CceInterval::from_length(first_cce, 4),
            coreset_nof_cces: 16,
            crbs: CrbInterval::new(4, 28),
            symbols: OfdmSymbolRange::new(0, 2),
        }
    }

    #[test]
    fn test_common_harq_ack_resource() {
        let mut b = Bench::new(CellConfiguration::default());
        let rnti = Rnti(0x4601);
        let pri = b.pucch.alloc_common_harq_ack(&mut b.res[K1], rnti, &dci(rnti, 0));
        assert_eq!(pri, Some(0));
        let pdus = b.pucchs(rnti);
        assert_eq!(pdus.len(), 1);
        assert!(pdus[0].is_common);
        assert_eq!(pdus[0].resources.prbs, CrbInterval::new(0, 1));
        assert_eq!(pdus[0].resources.second_hop_prbs, Some(CrbInterval::new(51, 52)));

        // Only one common grant per UE and slot.
        assert!(b.pucch.alloc_common_harq_ack(&mut b.res[K1], rnti, &dci(rnti, 8)).is_none());
    }

    #[test]
    fn test_common_harq_ack_skips_used_resource() {
        let mut b = Bench::new(CellConfiguration::default());
        let (ue1, ue2) = (Rnti(0x4601), Rnti(0x4602));
        assert_eq!(b.pucch.alloc_common_harq_ack(&mut b.res[K1], ue1, &dci(ue1, 0)), Some(0));
        // CCE 4 maps to the same r_PUCCH as CCE 0 for PRI 0.
        assert_eq!(b.pucch.alloc_common_harq_ack(&mut b.res[K1], ue2, &dci(ue2, 4)), Some(1));
        let pdus = &b.res[K1].result.ul.pucchs;
        assert!(!pucchs_collide(&pdus[0], &pdus[1]));
    }

    #[test]
    fn test_dedicated_harq_ack_grows_into_set1() {
        let mut b = Bench::new(CellConfiguration::default());
        let ue_cfg = b.ue_cfg(0);
        let rnti = Rnti(0x4601);
        let pri = b.pucch.alloc_ded_harq_ack(&mut b.res[K1], rnti, &ue_cfg).unwrap();
        assert_eq!(b.pucch.alloc_ded_harq_ack(&mut b.res[K1], rnti, &ue_cfg), Some(pri));
        assert_eq!(b.pucch.alloc_ded_harq_ack(&mut b.res[K1], rnti, &ue_cfg), Some(pri));

        let pdus = b.pucchs(rnti);
        assert_eq!(pdus.len(), 1);
        assert_eq!(pdus[0].uci_bits.harq_ack_nof_bits, 3);
        let set1_res = ue_cfg.pucch.as_ref().unwrap().res_set1[pri as usize];
        let expected = b.cfg.pucch_resources.iter().find(|r| r.res_id == set1_res).unwrap();
        assert_eq!(pdus[0].resources.prbs.start(), expected.starting_prb);
    }

    #[test]
    fn test_sr_then_harq_keeps_harq_bits() {
        let mut b = Bench::new(CellConfiguration::default());
        let ue_cfg = b.ue_cfg(0);
        let rnti = Rnti(0x4601);
        assert!(b.pucch.alloc_sr_opportunity(&mut b.res[K1], rnti, &ue_cfg));
        assert!(b.pucch.alloc_sr_opportunity(&mut b.res[K1], rnti, &ue_cfg));
        assert_eq!(b.pucchs(rnti).len(), 1);

        b.pucch.alloc_ded_harq_ack(&mut b.res[K1], rnti, &ue_cfg).unwrap();
        let pdus = b.pucchs(rnti);
        assert_eq!(pdus.len(), 2);
        assert!(pdus.iter().all(|p| p.uci_bits.harq_ack_nof_bits == 1));
        assert_eq!(pdus.iter().map(|p| p.uci_bits.sr_nof_bits).sum::<u32>(), 1);
    }

    #[test]
    fn test_common_harq_then_sr_keeps_harq_bits() {
        let mut b = Bench::new(CellConfiguration::default());
        let ue_cfg = b.ue_cfg(0);
        let rnti = Rnti(0x4601);
        b.pucch.alloc_common_harq_ack(&mut b.res[K1], rnti, &dci(rnti, 0)).unwrap();
        assert!(b.pucch.alloc_sr_opportunity(&mut b.res[K1], rnti, &ue_cfg));

        let pdus = b.pucchs(rnti);
        assert!(pdus.len() <= 2);
        let harq: u32 = pdus.iter().map(|p| p.uci_bits.harq_ack_nof_bits).sum();
        assert_eq!(harq, 1);
        for (i, a) in pdus.iter().enumerate() {
            for other in &pdus[i + 1..] {
                assert!(!pucchs_collide(a, other));
            }
        }
    }

    #[test]
    fn test_common_and_dedicated_share_pri() {
        let mut b = Bench::new(CellConfiguration::default());
        let ue_cfg = b.ue_cfg(0);
        let rnti = Rnti(0x4601);
        let pri = b
            .pucch
            .alloc_common_and_ded_harq_ack(&mut b.res[K1], rnti, &ue_cfg, &dci(rnti, 0))
            .unwrap();
        let pdus = b.pucchs(rnti);
        assert_eq!(pdus.len(), 2);
        assert_eq!(pdus.iter().filter(|p| p.is_common).count(), 1);
        // A later DCI for the same slot must keep the PRI of the common grant.
        assert_eq!(b.pucch.alloc_ded_harq_ack(&mut b.res[K1], rnti, &ue_cfg), Some(pri));

        let bits = b.pucch.remove_ue_uci_from_pucch(&mut b.res[K1], rnti);
        assert_eq!(bits.harq_ack_nof_bits, 2);
        assert!(b.pucchs(rnti).is_empty());
    }

    #[test]
    fn test_shared_sr_resource_is_not_reused() {
        let mut b = Bench::new(CellConfiguration::default());
        let ue_a = b.ue_cfg(0);
        let ue_b = b.ue_cfg(NOF_SR_RESOURCES);
        assert_eq!(ue_a.sr.as_ref().unwrap().pucch_res_id, ue_b.sr.as_ref().unwrap().pucch_res_id);
        assert!(b.pucch.alloc_sr_opportunity(&mut b.res[K1], Rnti(0x4601), &ue_a));
        assert!(!b.pucch.alloc_sr_opportunity(&mut b.res[K1], Rnti(0x4602), &ue_b));
        assert_eq!(b.res[K1].result.ul.pucchs.len(), 1);
    }

    #[test]
    fn test_pusch_collision_leaves_slot_unchanged() {
        let mut b = Bench::new(CellConfiguration::default());
        let ue_cfg = b.ue_cfg(0);
        b.res[K1].result.ul.puschs.push(UlSchedInfo {
            ue_index: None,
            pusch: PuschInformation {
                rnti: Rnti(0x4700),
                crbs: CrbInterval::new(0, 52),
                symbols: OfdmSymbolRange::new(0, 14),
                mcs: 0,
                tbs_bytes: 100,
                harq_id: HarqId(0),
                is_new_data: true,
                rv: 0,
                uci: None,
            },
            is_msg3: true,
        });
        assert!(b.pucch.alloc_ded_harq_ack(&mut b.res[K1], Rnti(0x4601), &ue_cfg).is_none());
        assert!(!b.pucch.alloc_csi_opportunity(&mut b.res[K1], Rnti(0x4601), &ue_cfg, 4));
        assert!(b.res[K1].result.ul.pucchs.is_empty());
    }

    #[test]
    fn test_max_pucchs_per_slot() {
        let mut cfg = CellConfiguration::default();
        cfg.expert.max_pucchs_per_slot = 1;
        let mut b = Bench::new(cfg);
        let (ue_a, ue_b) = (b.ue_cfg(0), b.ue_cfg(1));
        assert!(b.pucch.alloc_ded_harq_ack(&mut b.res[K1], Rnti(0x4601), &ue_a).is_some());
        assert!(b.pucch.alloc_ded_harq_ack(&mut b.res[K1], Rnti(0x4602), &ue_b).is_none());
        // Growing the existing grant does not add a PDU.
        assert!(b.pucch.alloc_ded_harq_ack(&mut b.res[K1], Rnti(0x4601), &ue_a).is_some());
    }

    #[test]
    fn test_csi_merges_with_harq() {
        let mut b = Bench::new(CellConfiguration::default());
        let ue_cfg = b.ue_cfg(0);
        let rnti = Rnti(0x4601);
        assert!(b.pucch.alloc_csi_opportunity(&mut b.res[K1], rnti, &ue_cfg, 4));
        assert_eq!(b.pucchs(rnti)[0].resources.prbs.start(), 38);
        let pri = b.pucch.alloc_ded_harq_ack(&mut b.res[K1], rnti, &ue_cfg).unwrap();
        let pdus = b.pucchs(rnti);
        assert_eq!(pdus.len(), 1);
        assert_eq!(pdus[0].uci_bits.csi_part1_nof_bits, 4);
        assert_eq!(pdus[0].uci_bits.harq_ack_nof_bits, 1);
        let set1_res = ue_cfg.pucch.as_ref().unwrap().res_set1[pri as usize];
        assert!(set1_res >= RES_SET1_FIRST_ID && set1_res < SR_FIRST_ID);

        let bits = b.pucch.remove_ue_uci_from_pucch(&mut b.res[K1], rnti);
        assert_eq!(bits, PucchUciBits { harq_ack_nof_bits: 1, sr_nof_bits: 0, csi_part1_nof_bits: 4 });
    }

    #[test]
    fn test_periodic_uci_removal_keeps_harq_ack() {
        let mut b = Bench::new(CellConfiguration::default());
        let ue_cfg = b.ue_cfg(0);
        let rnti = Rnti(0x4601);
        let pri = b
            .pucch
            .alloc_common_and_ded_harq_ack(&mut b.res[K1], rnti, &ue_cfg, &dci(rnti, 0))
            .unwrap();
        assert!(b.pucch.alloc_sr_opportunity(&mut b.res[K1], rnti, &ue_cfg));

        b.pucch.remove_periodic_uci(&mut b.res[K1], rnti, &ue_cfg);
        let pdus = b.pucchs(rnti);
        assert_eq!(pdus.iter().filter(|p| p.is_common).count(), 1);
        assert!(pdus.iter().all(|p| p.uci_bits.sr_nof_bits == 0));
        assert!(pdus.iter().any(|p| !p.is_common && p.uci_bits.harq_ack_nof_bits == 1));
        assert_eq!(b.pucch.alloc_ded_harq_ack(&mut b.res[K1], rnti, &ue_cfg), Some(pri));
    }

    #[test]
    fn test_periodic_uci_removal_without_harq_ack() {
        let mut b = Bench::new(CellConfiguration::default());
        let ue_cfg = b.ue_cfg(0);
        let rnti = Rnti(0x4601);
        assert!(b.pucch.alloc_sr_opportunity(&mut b.res[K1], rnti, &ue_cfg));
        assert!(b.pucch.alloc_csi_opportunity(&mut b.res[K1], rnti, &ue_cfg, 4));

        b.pucch.remove_periodic_uci(&mut b.res[K1], rnti, &ue_cfg);
        assert!(b.pucchs(rnti).is_empty());
        let bits = b.pucch.remove_ue_uci_from_pucch(&mut b.res[K1], rnti);
        assert!(bits.is_empty());
        assert!(b.pucch.alloc_sr_opportunity(&mut b.res[K1], rnti, &ue_cfg));
    }
}
