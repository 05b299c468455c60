//! RA Scheduler
//!
//! Random access responses and Msg3. Detected preambles wait for a RAR inside
//! their RA response window; each RAR grant reserves the Msg3 PUSCH at
//! k0 + k2 + Δ after the RAR (TS 38.214 §6.1.2.1). Msg3 is tracked by its own
//! HARQ process until it is decoded or dropped; retransmissions are granted
//! with DCI 0_0 scrambled by the TC-RNTI.

use super::{commit_common_pdsch, find_common_pdsch, COMMON_AGGREGATION_LEVEL};
use crate::cell::{CellResources, GrantInfo};
use crate::config::CellConfiguration;
use crate::indications::{RachIndication, RachPreamble};
use crate::result::{PuschInformation, RarInformation, RarUlGrant, UlDciPayload, UlSchedInfo};
use crate::support::mcs_tbs::{compute_tbs_bytes, TbsParameters};
use crate::ue_context::{HarqEntity, HarqFeedbackOutcome, TransportBlockInfo};
use crate::ue_scheduling::UnmatchedCrc;
use common::interval::{CrbInterval, OfdmSymbolRange};
use common::slot_point::SlotInterval;
use common::types::{HarqId, Rnti};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// MAC subheader plus MAC RAR, per preamble
const RAR_BYTES_PER_GRANT: u32 = 8;

/// Upper bound of grants multiplexed in one RAR
const MAX_GRANTS_PER_RAR: usize = 16;

/// Number of OFDM symbols in a slot, for the RA-RNTI formula
const RA_RNTI_SYMBOLS: u16 = 14;

/// Number of slots in a frame at the largest SCS, for the RA-RNTI formula
const RA_RNTI_SLOTS: u16 = 80;

/// RA-RNTI of a PRACH occasion (TS 38.321 §5.1.3), normal UL carrier
pub fn ra_rnti(slot_index: u32, start_symbol: u8, frequency_index: u8) -> Rnti {
    let t_id = slot_index as u16 % RA_RNTI_SLOTS;
    Rnti(1 + start_symbol as u16 + RA_RNTI_SYMBOLS * t_id + RA_RNTI_SYMBOLS * RA_RNTI_SLOTS * frequency_index as u16)
}

#[derive(Debug, Clone)]
struct PendingRar {
    ra_rnti: Rnti,
    window: SlotInterval,
    preambles: Vec<RachPreamble>,
}

#[derive(Debug, Clone)]
struct Msg3Process {
    tc_rnti: Rnti,
    harq: HarqEntity,
}

/// Msg3 PUSCH placement relative to the current slot
#[derive(Debug, Clone, Copy)]
struct Msg3Placement {
    offset: u32,
    td_index: u8,
    symbols: OfdmSymbolRange,
}

pub struct RaScheduler {
    cfg: Arc<CellConfiguration>,
    pending_rars: VecDeque<PendingRar>,
    msg3s: Vec<Msg3Process>,
}

impl RaScheduler {
    pub fn new(cfg: Arc<CellConfiguration>) -> Self {
        Self {
            cfg,
            pending_rars: VecDeque::new(),
            msg3s: Vec::new(),
        }
    }

    /// Number of RA procedures waiting for a RAR
    pub fn nof_pending_rars(&self) -> usize {
        self.pending_rars.len()
    }

    /// Number of Msg3 waiting for decoding or retransmission
    pub fn nof_pending_msg3s(&self) -> usize {
        self.msg3s.len()
    }

    pub fn handle_rach_indication(&mut self, ind: &RachIndication) {
        let window_start = ind.slot_rx + 1;
        let window = SlotInterval::new(window_start, window_start + self.cfg.ra.ra_resp_window_slots);
        for occasion in &ind.occasions {
            if occasion.preambles.is_empty() {
                continue;
            }
            let ra_rnti = ra_rnti(ind.slot_rx.slot_index(), occasion.start_symbol, occasion.frequency_index);
            info!(
                "RACH slot={} ra-rnti={} preambles={}",
                ind.slot_rx,
                ra_rnti,
                occasion.preambles.len()
            );
            match self.pending_rars.iter_mut().find(|r| r.ra_rnti == ra_rnti && r.window == window) {
                Some(rar) => rar.preambles.extend_from_slice(&occasion.preambles),
                None => self.pending_rars.push_back(PendingRar {
                    ra_rnti,
                    window,
                    preambles: occasion.preambles.clone(),
                }),
            }
        }
    }

    /// Msg3 CRC, for a TC-RNTI that is not a UE yet
    pub fn handle_crc(&mut self, crc: &UnmatchedCrc) {
        let Some(pos) = self.msg3s.iter().position(|m| m.tc_rnti == crc.pdu.rnti) else {
            debug!("CRC for unknown rnti={} dropped", crc.pdu.rnti);
            return;
        };
        let outcome = self.msg3s[pos].harq.ack_info(crc.slot_rx, 0, crc.pdu.tb_crc_ok);
        match outcome {
            Some((_, HarqFeedbackOutcome::Acked { .. })) => {
                info!("Msg3 tc-rnti={} decoded", crc.pdu.rnti);
                self.msg3s.remove(pos);
            }
            Some((_, HarqFeedbackOutcome::Discarded)) => {
                warn!("Msg3 tc-rnti={} dropped after max retransmissions", crc.pdu.rnti);
                self.msg3s.remove(pos);
            }
            Some((_, HarqFeedbackOutcome::Nacked)) => debug!("Msg3 tc-rnti={} NACK", crc.pdu.rnti),
            None => {}
        }
    }

    pub fn run_slot(&mut self, res: &mut CellResources) {
        let sl_tx = res.slot_tx();
        self.msg3s.retain_mut(|m| {
            m.harq.slot_indication(sl_tx);
            let alive = m.harq.find_empty().is_none();
            if !alive {
                warn!("Msg3 tc-rnti={} dropped, no CRC received", m.tc_rnti);
            }
            alive
        });
        if !self.cfg.is_dl_enabled(sl_tx) {
            return;
        }
        self.schedule_msg3_retxs(res);
        self.schedule_rars(res);
    }

    /// First PUSCH time resource landing on a UL slot, `extra_delay` slots after k2
    fn msg3_placement(&self, res: &CellResources, extra_delay: u32) -> Option<Msg3Placement> {
        let sl_tx = res.slot_tx();
        self.cfg
            .pusch_td_alloc_list
            .iter()
            .enumerate()
            .map(|(idx, td)| Msg3Placement {
                offset: extra_delay + td.k2 as u32,
                td_index: idx as u8,
                symbols: td.symbols,
            })
            .find(|p| p.offset <= res.grid.max_slot_offset() && self.cfg.is_ul_enabled(sl_tx + p.offset))
    }

    fn pusch_limits(&self) -> CrbInterval {
        let carrier = CrbInterval::new(0, self.cfg.nof_ul_crbs);
        self.cfg
            .expert
            .pusch_crb_limits
            .map_or(carrier, |limits| limits.intersect(&carrier))
    }

    fn schedule_msg3_retxs(&mut self, res: &mut CellResources) {
        let Some(placement) = self.msg3_placement(res, 0) else {
            return;
        };
        let pusch_slot = res.slot_tx() + placement.offset;
        let limits = self.pusch_limits();
        for m in self.msg3s.iter_mut() {
            let Some(harq_id) = m.harq.find_pending_retx() else { continue };
            let Some(tb) = m.harq.get(harq_id).map(|h| *h.tb()) else { continue };
            let slot_alloc = &res.grid[placement.offset];
            if slot_alloc.result.ul.puschs.len() >= self.cfg.expert.max_puschs_per_slot as usize {
                return;
            }
            let used = slot_alloc.ul_res_grid.used_crbs_within(placement.symbols, limits);
            let Some(crbs) = used.first_free_interval(tb.nof_prbs, tb.nof_prbs) else {
                trace!("No UL space for Msg3 retx of tc-rnti={}", m.tc_rnti);
                continue;
            };
            let Some(pdcch) = res.pdcch.alloc_ul_pdcch_common(
                &mut res.grid[0],
                m.tc_rnti,
                self.cfg.common_search_space,
                COMMON_AGGREGATION_LEVEL,
            ) else {
                debug!("No PDCCH for Msg3 retx of tc-rnti={}", m.tc_rnti);
                return;
            };
            let Some(harq) = m.harq.get_mut(harq_id) else { continue };
            harq.new_retx(pusch_slot, pusch_slot);
            let (ndi, rv) = (harq.ndi(), harq.rv());
            res.grid[0].result.dl.ul_pdcchs[pdcch.0].dci = UlDciPayload {
                time_resource: placement.td_index,
                crbs,
                mcs: tb.mcs,
                harq_id,
                ndi,
                rv,
            };
            let slot_alloc = &mut res.grid[placement.offset];
            slot_alloc.ul_res_grid.fill(GrantInfo::new(placement.symbols, crbs));
            slot_alloc.result.ul.puschs.push(UlSchedInfo {
                ue_index: None,
                pusch: PuschInformation {
                    rnti: m.tc_rnti,
                    crbs,
                    symbols: placement.symbols,
                    mcs: tb.mcs,
                    tbs_bytes: tb.tbs_bytes,
                    harq_id,
                    is_new_data: false,
                    rv,
                    uci: None,
                },
                is_msg3: true,
            });
            debug!("Msg3 retx tc-rnti={} rv={} slot={}", m.tc_rnti, rv, pusch_slot);
        }
    }

    fn schedule_rars(&mut self, res: &mut CellResources) {
        let sl_tx = res.slot_tx();
        while let Some(rar) = self.pending_rars.front() {
            if rar.window.contains(sl_tx) || sl_tx < rar.window.start() {
                break;
            }
            warn!("RAR window expired for ra-rnti={}, {} preambles dropped", rar.ra_rnti, rar.preambles.len());
            self.pending_rars.pop_front();
        }

        let mut idx = 0;
        while idx < self.pending_rars.len() {
            if !self.pending_rars[idx].window.contains(sl_tx) {
                idx += 1;
                continue;
            }
            match self.allocate_rar(res, idx) {
                RarOutcome::Served(nof_grants) => {
                    let rar = &mut self.pending_rars[idx];
                    rar.preambles.drain(..nof_grants);
                    if rar.preambles.is_empty() {
                        self.pending_rars.remove(idx);
                        continue;
                    }
                    idx += 1;
                }
                RarOutcome::NoPdcch => return,
                RarOutcome::NoSpace => idx += 1,
            }
        }
    }

    fn allocate_rar(&mut self, res: &mut CellResources, rar_idx: usize) -> RarOutcome {
        let sl_tx = res.slot_tx();
        let Some(k0) = self
            .cfg
            .pdsch_td_alloc_list
            .iter()
            .map(|td| td.k0 as u32)
            .find(|k0| self.cfg.is_dl_enabled(sl_tx + *k0))
        else {
            return RarOutcome::NoSpace;
        };
        let Some(msg3) = self.msg3_placement(res, k0 + self.cfg.msg3_delta() as u32) else {
            return RarOutcome::NoSpace;
        };
        let ra = &self.cfg.ra;
        let rar = &self.pending_rars[rar_idx];

        // Msg3 CRBs first, then the RAR PDSCH for as many grants as fit.
        let msg3_alloc = &res.grid[msg3.offset];
        let pusch_room = (self.cfg.expert.max_puschs_per_slot as usize).saturating_sub(msg3_alloc.result.ul.puschs.len());
        let mut used = msg3_alloc.ul_res_grid.used_crbs_within(msg3.symbols, self.pusch_limits());
        let mut msg3_crbs = Vec::new();
        for _ in 0..rar.preambles.len().min(MAX_GRANTS_PER_RAR).min(pusch_room) {
            let Some(crbs) = used.first_free_interval(ra.msg3_nof_rbs, ra.msg3_nof_rbs) else { break };
            used.fill(crbs.start() as usize, crbs.stop() as usize, true);
            msg3_crbs.push(crbs);
        }
        let Some(pdsch) = (1..=msg3_crbs.len())
            .rev()
            .find_map(|n| find_common_pdsch(res, n as u32 * RAR_BYTES_PER_GRANT, ra.rar_mcs))
        else {
            trace!("No room for RAR ra-rnti={} in slot {}", rar.ra_rnti, sl_tx);
            return RarOutcome::NoSpace;
        };
        let nof_grants = msg3_crbs
            .len()
            .min((pdsch.tbs_bytes / RAR_BYTES_PER_GRANT) as usize);

        let ra_rnti = rar.ra_rnti;
        let Some(pdcch) = res.pdcch.alloc_dl_pdcch_common(
            &mut res.grid[0],
            ra_rnti,
            self.cfg.common_search_space,
            COMMON_AGGREGATION_LEVEL,
        ) else {
            debug!("No PDCCH for RAR ra-rnti={} in slot {}", ra_rnti, sl_tx);
            return RarOutcome::NoPdcch;
        };
        let pdsch_info = commit_common_pdsch(res, pdcch, &pdsch, ra_rnti);

        let msg3_slot = sl_tx + msg3.offset;
        let params = TbsParameters::new(ra.msg3_mcs, msg3.symbols);
        let mut grants = Vec::with_capacity(nof_grants);
        for (preamble, crbs) in self.pending_rars[rar_idx].preambles.iter().zip(msg3_crbs).take(nof_grants) {
            let tbs_bytes = compute_tbs_bytes(&params, crbs.length());
            let slot_alloc = &mut res.grid[msg3.offset];
            slot_alloc.ul_res_grid.fill(GrantInfo::new(msg3.symbols, crbs));
            slot_alloc.result.ul.puschs.push(UlSchedInfo {
                ue_index: None,
                pusch: PuschInformation {
                    rnti: preamble.tc_rnti,
                    crbs,
                    symbols: msg3.symbols,
                    mcs: ra.msg3_mcs,
                    tbs_bytes,
                    harq_id: HarqId(0),
                    is_new_data: true,
                    rv: 0,
                    uci: None,
                },
                is_msg3: true,
            });

            let mut harq = HarqEntity::new(1, self.cfg.expert.harq_feedback_timeout_slots);
            if let Some(h) = harq.get_mut(HarqId(0)) {
                let tb = TransportBlockInfo {
                    mcs: ra.msg3_mcs,
                    tbs_bytes,
                    nof_prbs: crbs.length(),
                    is_fallback: true,
                };
                h.new_tx(msg3_slot, msg3_slot, tb, ra.max_msg3_harq_retxs);
            }
            self.msg3s.retain(|m| m.tc_rnti != preamble.tc_rnti);
            self.msg3s.push(Msg3Process { tc_rnti: preamble.tc_rnti, harq });

            grants.push(RarUlGrant {
                preamble_id: preamble.preamble_id,
                tc_rnti: preamble.tc_rnti,
                timing_advance: preamble.timing_advance,
                crbs,
                mcs: ra.msg3_mcs,
                msg3_slot,
            });
        }
        debug!(
            "RAR ra-rnti={} slot={} grants={} msg3_slot={}",
            ra_rnti,
            sl_tx,
            grants.len(),
            msg3_slot
        );
        res.grid[pdsch.offset].result.dl.rars.push(RarInformation {
            ra_rnti,
            pdsch: pdsch_info,
            grants,
        });
        RarOutcome::Served(nof_grants)
    }
}

enum RarOutcome {
    Served(usize),
    NoPdcch,
    NoSpace,
}
