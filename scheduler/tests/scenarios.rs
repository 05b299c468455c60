//! End-to-end scheduling scenarios through the `MacScheduler` interface

mod common;

use crate::common::{always_ack, TestBench};
use ::common::interval::{CceInterval, CrbInterval, OfdmSymbolRange};
use ::common::slot_point::SlotPoint;
use ::common::types::{Lcg, Lcid, Rnti, SubcarrierSpacing, UeIndex};
use scheduler::cell::CellResources;
use scheduler::common_scheduling::ra_scheduler::ra_rnti;
use scheduler::config::cell_config::TddPattern;
use scheduler::indications::{PagingIndication, RachIndication, RachOccasion, RachPreamble, UeReconfigurationRequest};
use scheduler::result::{DciContext, DciRntiType, PucchInformation};
use scheduler::support::AggregationLevel;
use scheduler::uci_scheduling::UciAllocator;
use scheduler::{CellConfiguration, UeCellConfiguration};
use std::sync::Arc;

/// Slots a single fallback UE may wait for its first grant
const MAX_TEST_RUN_SLOTS_PER_UE: u32 = 40;

fn msg4_cell(max_msg4_mcs: u8) -> CellConfiguration {
    let mut cfg = CellConfiguration::default();
    cfg.expert.max_msg4_mcs = max_msg4_mcs;
    cfg
}

#[test]
fn test_srb0_msg4_is_delivered_with_tc_rnti() {
    let mut bench = TestBench::new(msg4_cell(2));
    let cfg = UeCellConfiguration::fallback(&bench.cfg);
    let rnti = bench.add_ue(0, cfg);
    bench.push_dl_buffer(0, Lcid::SRB0, 101);

    let mut delivered = false;
    for _ in 0..MAX_TEST_RUN_SLOTS_PER_UE {
        let result = bench.run_slot_with_feedback(&mut always_ack);
        let Some(grant) = result.dl.ue_grants.iter().find(|g| g.ue_index == UeIndex(0)) else {
            continue;
        };
        let pdcch = result
            .dl
            .dl_pdcchs
            .iter()
            .find(|p| p.ctx.rnti == rnti)
            .expect("PDSCH without PDCCH");
        assert_eq!(pdcch.ctx.rnti_type, DciRntiType::TcRnti);
        assert!(grant.pdsch.mcs <= 2);
        assert!(grant.pdsch.tbs_bytes >= 101);
        delivered = true;
        break;
    }
    assert!(delivered, "Msg4 not scheduled within {} slots", MAX_TEST_RUN_SLOTS_PER_UE);
    assert_eq!(bench.ue(0).dl_lc.pending_bytes_of(Lcid::SRB0), 0);
}

#[test]
fn test_srb0_that_never_fits_does_not_block_other_ue() {
    let mut bench = TestBench::new(msg4_cell(2));
    let cfg = UeCellConfiguration::fallback(&bench.cfg);
    let small = bench.add_ue(0, cfg.clone());
    let large = bench.add_ue(1, cfg);
    bench.push_dl_buffer(0, Lcid::SRB0, 99);
    bench.push_dl_buffer(1, Lcid::SRB0, 450);

    let mut small_served = false;
    for _ in 0..MAX_TEST_RUN_SLOTS_PER_UE * 2 {
        let result = bench.run_slot_with_feedback(&mut always_ack);
        small_served |= result.dl.ue_grants.iter().any(|g| g.pdsch.rnti == small);
        assert!(result.dl.dl_pdcchs.iter().all(|p| p.ctx.rnti != large));
        assert!(result.dl.ue_grants.iter().all(|g| g.pdsch.rnti != large));
    }
    assert!(small_served);
    assert_eq!(bench.ue(0).dl_lc.pending_bytes_of(Lcid::SRB0), 0);
    assert_eq!(bench.ue(1).dl_lc.pending_bytes_of(Lcid::SRB0), 450);
}

fn harq_bits(pucchs: &[PucchInformation], rnti: Rnti) -> u32 {
    pucchs
        .iter()
        .filter(|p| p.rnti == rnti)
        .map(|p| p.uci_bits.harq_ack_nof_bits)
        .max()
        .unwrap_or(0)
}

/// HARQ-ACK of a Msg4 on the common PUCCH, then the first SR occasion of the
/// dedicated configuration lands in the same slot
#[test]
fn test_sr_added_to_common_harq_ack_slot() {
    let cell = Arc::new(CellConfiguration::default());
    let mut res = CellResources::new(cell.clone());
    res.slot_indication(SlotPoint::from_count(SubcarrierSpacing::Scs15, 0));

    let rnti = Rnti(0x4601);
    let fallback_cfg = UeCellConfiguration::fallback(&cell);
    let ue_cfg = UeCellConfiguration::default_for(&cell, UeIndex(0));
    let dci = DciContext {
        rnti,
        rnti_type: DciRntiType::TcRnti,
        coreset_id: 0,
        ss_id: cell.common_search_space,
        aggr_lvl: AggregationLevel::N4,
        cces: CceInterval::new(0, 4),
        coreset_nof_cces: 16,
        crbs: CrbInterval::new(4, 28),
        symbols: OfdmSymbolRange::new(0, 2),
    };
    let alloc = res
        .uci
        .alloc_uci_harq_ue(&mut res.grid, rnti, &fallback_cfg, 0, &[4], Some(&dci))
        .expect("HARQ-ACK allocated");
    assert!(alloc.pucch_res_indicator.is_some());
    let before = harq_bits(&res.grid[4].result.ul.pucchs, rnti);
    assert_eq!(before, 1);

    res.uci.uci_allocate_sr_opportunity(&mut res.grid[4], rnti, &ue_cfg);

    let pucchs: Vec<_> = res.grid[4]
        .result
        .ul
        .pucchs
        .iter()
        .filter(|p| p.rnti == rnti)
        .cloned()
        .collect();
    assert!(!pucchs.is_empty() && pucchs.len() <= 2);
    assert_eq!(harq_bits(&pucchs, rnti), before);
    assert_eq!(pucchs.iter().map(|p| p.uci_bits.sr_nof_bits).max(), Some(1));
}

#[test]
fn test_paging_retries_follow_drx_cycle() {
    let mut cfg = CellConfiguration::default();
    cfg.expert.max_paging_retries = 3;
    let mut bench = TestBench::new(cfg);
    let drx_cycle = 128;
    let s_tmsi = 0x0042_1234_5678;
    bench
        .sched
        .handle_paging_indication(&PagingIndication {
            cell_id: bench.cell_id(),
            s_tmsi,
            paging_drx_cycle_rf: Some(drx_cycle),
        })
        .unwrap();

    let slots_per_frame = bench.next_slot().nof_slots_per_frame();
    let mut paged_at = Vec::new();
    for _ in 0..(3 + 1) * drx_cycle * slots_per_frame {
        let result = bench.run_slot();
        let hits = result
            .dl
            .paging
            .iter()
            .filter(|p| p.records.iter().any(|r| r.s_tmsi == s_tmsi))
            .count();
        assert!(hits <= 1);
        if hits == 1 {
            paged_at.push(result.slot);
        }
    }
    assert_eq!(paged_at.len(), 3);
    for pair in paged_at.windows(2) {
        assert_eq!((pair[1] - pair[0]) as u32, drx_cycle * slots_per_frame);
    }
}

#[test]
fn test_random_access_to_msg4() {
    let mut bench = TestBench::new(CellConfiguration::default());
    let tc_rnti = Rnti(0x4650);
    let prach_slot = bench.next_slot();
    bench.run_slot();
    bench
        .sched
        .handle_rach_indication(&RachIndication {
            cell_id: bench.cell_id(),
            slot_rx: prach_slot,
            occasions: vec![RachOccasion {
                start_symbol: 0,
                frequency_index: 0,
                preambles: vec![RachPreamble { preamble_id: 12, tc_rnti, timing_advance: 3 }],
            }],
        })
        .unwrap();

    // RAR, then Msg3 answered with a good CRC.
    let mut rar_seen = false;
    let mut msg3_seen = false;
    for _ in 0..40 {
        let result = bench.run_slot_with_feedback(&mut always_ack);
        if let Some(rar) = result.dl.rars.first() {
            assert_eq!(rar.ra_rnti, ra_rnti(prach_slot.slot_index(), 0, 0));
            assert_eq!(rar.grants[0].tc_rnti, tc_rnti);
            rar_seen = true;
        }
        if result.ul.puschs.iter().any(|p| p.is_msg3 && p.pusch.rnti == tc_rnti) {
            msg3_seen = true;
        }
    }
    assert!(rar_seen && msg3_seen);
    let cell = bench.sched.cell(bench.cell_id()).unwrap();
    assert_eq!(cell.ra().nof_pending_rars(), 0);
    assert_eq!(cell.ra().nof_pending_msg3s(), 0);

    // Upper layers create the UE on the TC-RNTI and send the RRC Setup.
    let fallback = UeCellConfiguration::fallback(&bench.cfg);
    bench.add_ue_with_rnti(0, tc_rnti, fallback);
    bench.push_conres(0);
    bench.push_dl_buffer(0, Lcid::SRB0, 60);
    let mut msg4 = None;
    for _ in 0..MAX_TEST_RUN_SLOTS_PER_UE {
        let result = bench.run_slot_with_feedback(&mut always_ack);
        if let Some(g) = result.dl.ue_grants.iter().find(|g| g.pdsch.rnti == tc_rnti) {
            msg4 = Some(g.clone());
            break;
        }
    }
    let msg4 = msg4.expect("Msg4 scheduled");
    assert!(msg4.conres_ce && msg4.is_fallback);
    assert_eq!(bench.ue(0).dl_lc.pending_bytes(), 0);
}

#[test]
fn test_reconfigured_ue_leaves_fallback() {
    let mut bench = TestBench::new(CellConfiguration::default());
    let fallback = UeCellConfiguration::fallback(&bench.cfg);
    let rnti = bench.add_ue(0, fallback);
    assert!(bench.ue(0).is_fallback());

    let dedicated = UeCellConfiguration::default_for(&bench.cfg, UeIndex(0));
    bench
        .sched
        .handle_ue_reconfiguration_request(UeReconfigurationRequest {
            ue_index: UeIndex(0),
            cfg: dedicated,
        })
        .unwrap();
    bench.run_slot();
    assert!(!bench.ue(0).is_fallback());

    bench.push_dl_buffer(0, Lcid::MIN_DRB, 2000);
    let mut ue_ss_used = false;
    for _ in 0..40 {
        let result = bench.run_slot_with_feedback(&mut always_ack);
        for pdcch in result.dl.dl_pdcchs.iter().filter(|p| p.ctx.rnti == rnti) {
            assert_eq!(pdcch.ctx.rnti_type, DciRntiType::CRnti);
            assert_eq!(Some(pdcch.ctx.ss_id), bench.ue(0).cfg().ue_search_space);
            ue_ss_used = true;
        }
    }
    assert!(ue_ss_used);
    assert_eq!(bench.ue(0).dl_lc.pending_bytes(), 0);
}

/// A reconfiguration lands while the HARQ-ACK of a PDSCH is pending. The ACK
/// must still be reported in its k1 slot and close the HARQ process.
#[test]
fn test_reconfiguration_keeps_pending_harq_ack() {
    let mut bench = TestBench::new(CellConfiguration::default());
    let rnti = bench.add_ue(0, UeCellConfiguration::default_for(&bench.cfg, UeIndex(0)));
    bench.push_dl_buffer(0, Lcid::MIN_DRB, 100);

    let mut ack_slot = None;
    for _ in 0..20 {
        let result = bench.run_slot();
        if let Some(pdcch) = result.dl.dl_pdcchs.iter().find(|p| p.ctx.rnti == rnti) {
            ack_slot = Some(result.slot + pdcch.dci.k1 as u32);
            break;
        }
    }
    let ack_slot = ack_slot.expect("PDSCH scheduled");
    assert!(ack_slot > bench.next_slot());
    assert_eq!(bench.ue(0).dl_harqs.nof_waiting_ack(), 1);

    // New SR and PUCCH resources, as if the UE moved to another resource group.
    let new_cfg = UeCellConfiguration::default_for(&bench.cfg, UeIndex(1));
    bench
        .sched
        .handle_ue_reconfiguration_request(UeReconfigurationRequest { ue_index: UeIndex(0), cfg: new_cfg })
        .unwrap();

    let mut reported = 0;
    while bench.next_slot() <= ack_slot {
        let result = bench.run_slot_with_feedback(&mut always_ack);
        if result.slot == ack_slot {
            reported = harq_bits(&result.ul.pucchs, rnti)
                + result
                    .ul
                    .pusch_for(rnti)
                    .and_then(|p| p.pusch.uci)
                    .map_or(0, |uci| uci.harq_ack_nof_bits);
        }
    }
    assert!(bench.notifier.configured.lock().unwrap().contains(&(UeIndex(0), true)));
    assert_eq!(reported, 1);
    assert_eq!(bench.ue(0).dl_harqs.nof_waiting_ack(), 0);
    assert!(!bench.ue(0).dl_harqs.has_pending_retx());
}

/// In TDD, low-CQI UEs take the largest aggregation level and a CORESET fits
/// few of them. DL-heavy UEs must not keep a UL-only UE off the PDCCH.
#[test]
fn test_tdd_ul_gets_pdcch_under_dl_load() {
    let cfg = CellConfiguration {
        tdd_pattern: Some(TddPattern {
            period_slots: 10,
            nof_dl_slots: 7,
            nof_ul_slots: 2,
        }),
        ..Default::default()
    };
    let mut bench = TestBench::new(cfg);
    let mut rntis = Vec::new();
    for idx in 0..3 {
        rntis.push(bench.add_ue(idx, UeCellConfiguration::default_for(&bench.cfg, UeIndex(idx))));
    }
    bench.push_bsr(0, Lcg(1), 2000);

    let mut ul_dcis = 0;
    let mut dl_dcis = [0; 3];
    for _ in 0..40 {
        // Keep the DL of UEs 1 and 2 backlogged.
        for idx in 1..3 {
            bench.push_dl_buffer(idx, Lcid::MIN_DRB, 100_000);
        }
        let result = bench.run_slot_with_feedback(&mut always_ack);
        ul_dcis += result.dl.ul_pdcchs.iter().filter(|p| p.ctx.rnti == rntis[0]).count();
        for (i, rnti) in rntis.iter().enumerate() {
            dl_dcis[i] += result.dl.dl_pdcchs.iter().filter(|p| p.ctx.rnti == *rnti).count();
        }
    }
    assert!(ul_dcis > 0, "UL of rnti={} never scheduled", rntis[0]);
    assert!(dl_dcis[1] > 0 && dl_dcis[2] > 0);
}
