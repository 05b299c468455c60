//! Randomised invariant checks over long scheduling runs
//!
//! Several UEs receive random DL and UL traffic and random HARQ feedback. Every
//! slot result is checked for resource collisions and grant consistency, and
//! once traffic stops all buffers must drain.

mod common;

use crate::common::{always_ack, TestBench};
use ::common::interval::{CrbInterval, OfdmSymbolRange};
use ::common::slot_point::SlotPoint;
use ::common::types::{Lcg, Lcid, Rnti};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scheduler::config::cell_config::TddPattern;
use scheduler::config::expert_config::PolicyKind;
use scheduler::result::{PucchInformation, SchedResult};
use scheduler::{CellConfiguration, UeCellConfiguration};
use std::collections::{BTreeMap, BTreeSet, HashMap};

const NOF_CONNECTED_UES: u16 = 4;
const NOF_FALLBACK_UES: u16 = 2;
const TRAFFIC_SLOTS: u32 = 600;
const DRAIN_SLOTS: u32 = 600;

fn overlaps(a: (CrbInterval, OfdmSymbolRange), b: (CrbInterval, OfdmSymbolRange)) -> bool {
    a.0.overlaps(&b.0) && a.1.overlaps(&b.1)
}

/// Frequency/time footprint of a PUCCH, one entry per hop
fn pucch_footprint(pucch: &PucchInformation) -> Vec<(CrbInterval, OfdmSymbolRange)> {
    let res = &pucch.resources;
    match res.second_hop_prbs {
        None => vec![(res.prbs, res.symbols)],
        Some(second) => {
            let mid = res.symbols.start() + res.symbols.length() / 2;
            vec![
                (res.prbs, OfdmSymbolRange::new(res.symbols.start(), mid)),
                (second, OfdmSymbolRange::new(mid, res.symbols.stop())),
            ]
        }
    }
}

fn pucchs_collide(a: &PucchInformation, b: &PucchInformation) -> bool {
    if a.format == b.format && a.format.is_small_payload() && a.resources.is_code_multiplexed_with(&b.resources) {
        return false;
    }
    let fb = pucch_footprint(b);
    pucch_footprint(a).iter().any(|ga| fb.iter().any(|gb| overlaps(*ga, *gb)))
}

/// Per-slot invariants and cross-slot bookkeeping
struct Checker {
    cfg: CellConfiguration,
    last_pdsch: BTreeMap<Rnti, SlotPoint>,
    last_pusch: BTreeMap<Rnti, SlotPoint>,
    /// PUSCHs announced by an UL DCI, by slot
    expected_puschs: HashMap<SlotPoint, Vec<Rnti>>,
    granted_drb_bytes: BTreeMap<Rnti, u64>,
}

impl Checker {
    fn new(cfg: CellConfiguration) -> Self {
        Self {
            cfg,
            last_pdsch: BTreeMap::new(),
            last_pusch: BTreeMap::new(),
            expected_puschs: HashMap::new(),
            granted_drb_bytes: BTreeMap::new(),
        }
    }

    fn check(&mut self, result: &SchedResult) {
        let sl = result.slot;
        self.check_pdcchs(result);
        self.check_dl_grants(result);
        self.check_ul_resources(result);

        // UL DCIs announce PUSCHs k2 slots later, in non-decreasing order per UE.
        for pdcch in &result.dl.ul_pdcchs {
            let k2 = self.cfg.pusch_td_alloc_list[pdcch.dci.time_resource as usize].k2;
            let pusch_slot = sl + k2 as u32;
            if let Some(last) = self.last_pusch.insert(pdcch.ctx.rnti, pusch_slot) {
                assert!(last <= pusch_slot, "PUSCH order for rnti={} {} -> {}", pdcch.ctx.rnti, last, pusch_slot);
            }
            self.expected_puschs.entry(pusch_slot).or_default().push(pdcch.ctx.rnti);
        }
        if let Some(expected) = self.expected_puschs.remove(&sl) {
            for rnti in expected {
                assert!(result.ul.pusch_for(rnti).is_some(), "UL DCI for rnti={} without PUSCH in {}", rnti, sl);
            }
        }
    }

    fn check_pdcchs(&self, result: &SchedResult) {
        let ctxs: Vec<_> = result
            .dl
            .dl_pdcchs
            .iter()
            .map(|p| &p.ctx)
            .chain(result.dl.ul_pdcchs.iter().map(|p| &p.ctx))
            .collect();
        for (i, a) in ctxs.iter().enumerate() {
            for b in &ctxs[i + 1..] {
                if a.coreset_id == b.coreset_id {
                    assert!(!a.cces.overlaps(&b.cces), "CCE overlap in {}: {} vs {}", result.slot, a.cces, b.cces);
                }
            }
        }
    }

    fn check_dl_grants(&mut self, result: &SchedResult) {
        let mut seen = BTreeSet::new();
        for grant in &result.dl.ue_grants {
            let rnti = grant.pdsch.rnti;
            assert!(seen.insert(rnti), "two PDSCHs for rnti={} in {}", rnti, result.slot);
            assert!(
                result.dl.dl_pdcchs.iter().any(|p| p.ctx.rnti == rnti),
                "PDSCH for rnti={} without DCI",
                rnti
            );
            if let Some(last) = self.last_pdsch.insert(rnti, result.slot) {
                assert!(last < result.slot);
            }
            let drb: u32 = grant
                .lc_grants
                .iter()
                .filter(|lc| lc.lcid == Lcid::MIN_DRB)
                .map(|lc| lc.nof_bytes)
                .sum();
            *self.granted_drb_bytes.entry(rnti).or_default() += drb as u64;
        }
        // Every UE DCI was completed with its PDSCH, none was left behind.
        for pdcch in &result.dl.dl_pdcchs {
            let rnti = pdcch.ctx.rnti;
            if rnti.0 >= Rnti::MIN_CRNTI.0 && rnti.0 <= Rnti::MAX_CRNTI.0 {
                assert!(seen.contains(&rnti), "DL DCI for rnti={} without PDSCH", rnti);
            }
        }
    }

    fn check_ul_resources(&self, result: &SchedResult) {
        let puschs = &result.ul.puschs;
        let pucchs = &result.ul.pucchs;

        let mut seen = BTreeSet::new();
        for (i, a) in puschs.iter().enumerate() {
            assert!(seen.insert(a.pusch.rnti), "two PUSCHs for rnti={}", a.pusch.rnti);
            for b in &puschs[i + 1..] {
                assert!(!overlaps((a.pusch.crbs, a.pusch.symbols), (b.pusch.crbs, b.pusch.symbols)));
            }
            for pucch in pucchs {
                assert!(
                    pucch_footprint(pucch)
                        .iter()
                        .all(|g| !overlaps(*g, (a.pusch.crbs, a.pusch.symbols))),
                    "PUCCH rnti={} overlaps PUSCH rnti={} in {}",
                    pucch.rnti,
                    a.pusch.rnti,
                    result.slot
                );
                // UCI goes on the PUSCH when the UE has one.
                assert_ne!(pucch.rnti, a.pusch.rnti, "UCI on PUCCH and PUSCH in {}", result.slot);
            }
        }
        for (i, a) in pucchs.iter().enumerate() {
            for b in &pucchs[i + 1..] {
                if a.rnti != b.rnti {
                    assert!(!pucchs_collide(a, b), "PUCCH collision {} / {} in {}", a.rnti, b.rnti, result.slot);
                }
            }
        }
    }
}

fn run_random_traffic(cfg: CellConfiguration, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut bench = TestBench::new(cfg.clone());
    let mut checker = Checker::new(cfg.clone());

    let mut rntis = Vec::new();
    for idx in 0..NOF_CONNECTED_UES {
        rntis.push(bench.add_ue(idx, UeCellConfiguration::default_for(&cfg, ::common::types::UeIndex(idx))));
    }
    for idx in NOF_CONNECTED_UES..NOF_CONNECTED_UES + NOF_FALLBACK_UES {
        rntis.push(bench.add_ue(idx, UeCellConfiguration::fallback(&cfg)));
    }
    let nof_ues = NOF_CONNECTED_UES + NOF_FALLBACK_UES;
    let mut added_drb_bytes: BTreeMap<Rnti, u64> = BTreeMap::new();

    let mut ack_rng = StdRng::seed_from_u64(seed ^ 0x5eed);
    let mut random_ack = move |_: Rnti| ack_rng.gen_bool(0.9);
    for _ in 0..TRAFFIC_SLOTS {
        let idx = rng.gen_range(0..nof_ues);
        if rng.gen_bool(0.2) {
            let bytes = rng.gen_range(1..3000);
            if idx < NOF_CONNECTED_UES {
                let pending = bench.ue(idx).dl_lc.pending_bytes_of(Lcid::MIN_DRB);
                bench.push_dl_buffer(idx, Lcid::MIN_DRB, pending + bytes);
                *added_drb_bytes.entry(rntis[idx as usize]).or_default() += bytes as u64;
            } else {
                let pending = bench.ue(idx).dl_lc.pending_bytes_of(Lcid::SRB1);
                bench.push_dl_buffer(idx, Lcid::SRB1, pending + bytes % 500);
            }
        }
        if rng.gen_bool(0.1) && idx < NOF_CONNECTED_UES {
            bench.push_bsr(idx, Lcg(1), rng.gen_range(0..5000));
        }
        let result = bench.run_slot_with_feedback(&mut random_ack);
        checker.check(&result);
    }

    for _ in 0..DRAIN_SLOTS {
        let result = bench.run_slot_with_feedback(&mut always_ack);
        checker.check(&result);
    }
    for idx in 0..nof_ues {
        let ue = bench.ue(idx);
        assert_eq!(ue.dl_lc.pending_bytes(), 0, "DL buffer of UE {} not drained", idx);
        assert_eq!(ue.ul_lc.pending_bytes(0), 0, "UL buffer of UE {} not drained", idx);
        assert!(!ue.dl_harqs.has_pending_retx());
    }
    for (rnti, added) in &added_drb_bytes {
        assert_eq!(checker.granted_drb_bytes.get(rnti).copied().unwrap_or(0), *added);
    }
}

#[test]
fn test_invariants_round_robin_fdd() {
    run_random_traffic(CellConfiguration::default(), 1);
}

#[test]
fn test_invariants_proportional_fair_fdd() {
    let mut cfg = CellConfiguration::default();
    cfg.expert.policy = PolicyKind::ProportionalFair;
    run_random_traffic(cfg, 2);
}

#[test]
fn test_invariants_tdd() {
    let cfg = CellConfiguration {
        tdd_pattern: Some(TddPattern {
            period_slots: 10,
            nof_dl_slots: 7,
            nof_ul_slots: 2,
        }),
        ..Default::default()
    };
    run_random_traffic(cfg, 3);
}
