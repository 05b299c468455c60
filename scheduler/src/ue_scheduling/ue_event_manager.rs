//! UE Event Manager
//!
//! Queues UE configuration requests and feedback as they arrive and applies them
//! at the start of the next slot, before any allocation. Each event is applied
//! exactly once, in arrival order.

use crate::cell::CellResources;
use crate::config::CellConfiguration;
use crate::indications::{
    CrcPdu, DlBufferStateIndication, DlMacCe, DlMacCeIndication, UciIndication, UciPdu, UeCreationRequest,
    UeReconfigurationRequest, UlBsrIndication, UlCrcIndication,
};
use crate::mac_scheduler::SchedulerConfigNotifier;
use crate::policy::SchedulerPolicy;
use crate::uci_scheduling::UciScheduler;
use crate::ue_context::{HarqFeedbackOutcome, Ue, UeRepository};
use common::slot_point::SlotPoint;
use common::types::UeIndex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Event waiting for the next slot
#[derive(Debug, Clone)]
pub enum UeEvent {
    Create(UeCreationRequest),
    Reconfigure(UeReconfigurationRequest),
    Remove(UeIndex),
    DlBufferState(DlBufferStateIndication),
    DlMacCe(DlMacCeIndication),
    Bsr(UlBsrIndication),
    Crc { slot_rx: SlotPoint, pdu: CrcPdu },
    Uci { slot_rx: SlotPoint, pdu: UciPdu },
}

/// Scheduler state touched by UE events
pub struct UeEventContext<'a> {
    pub res: &'a mut CellResources,
    pub ues: &'a mut UeRepository,
    pub uci_sched: &'a UciScheduler,
    pub policy: &'a mut (dyn SchedulerPolicy + Send),
    pub notifier: &'a dyn SchedulerConfigNotifier,
}

/// CRC that matched no UE, a Msg3 candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnmatchedCrc {
    pub slot_rx: SlotPoint,
    pub pdu: CrcPdu,
}

pub struct UeEventManager {
    cfg: Arc<CellConfiguration>,
    pending: VecDeque<UeEvent>,
}

impl UeEventManager {
    pub fn new(cfg: Arc<CellConfiguration>) -> Self {
        Self {
            cfg,
            pending: VecDeque::new(),
        }
    }

    pub fn push(&mut self, ev: UeEvent) {
        self.pending.push_back(ev);
    }

    pub fn nof_pending(&self) -> usize {
        self.pending.len()
    }

    pub fn handle_crc_indication(&mut self, ind: &UlCrcIndication) {
        for pdu in &ind.crcs {
            self.push(UeEvent::Crc { slot_rx: ind.slot_rx, pdu: *pdu });
        }
    }

    pub fn handle_uci_indication(&mut self, ind: &UciIndication) {
        for pdu in &ind.ucis {
            self.push(UeEvent::Uci { slot_rx: ind.slot_rx, pdu: pdu.clone() });
        }
    }

    /// Apply every queued event. CRCs of unknown RNTIs are handed back.
    pub fn run(&mut self, ctx: &mut UeEventContext<'_>) -> Vec<UnmatchedCrc> {
        let mut unmatched = Vec::new();
        while let Some(ev) = self.pending.pop_front() {
            match ev {
                UeEvent::Create(req) => self.create_ue(ctx, req),
                UeEvent::Reconfigure(req) => self.reconfigure_ue(ctx, req),
                UeEvent::Remove(ue_index) => Self::remove_ue(ctx, ue_index),
                UeEvent::DlBufferState(ind) => match ctx.ues.get_mut(ind.ue_index) {
                    Some(ue) => ue.dl_lc.handle_dl_buffer_status(ind.lcid, ind.pending_bytes),
                    None => warn!("{} DL buffer state for unknown UE", ind.ue_index),
                },
                UeEvent::DlMacCe(ind) => match (ctx.ues.get_mut(ind.ue_index), ind.ce) {
                    (Some(ue), DlMacCe::ConRes) => ue.dl_lc.handle_conres_ce(),
                    (None, _) => warn!("{} DL MAC CE for unknown UE", ind.ue_index),
                },
                UeEvent::Bsr(ind) => match ctx.ues.get_mut(ind.ue_index) {
                    Some(ue) => ind.reports.iter().for_each(|r| ue.ul_lc.handle_bsr(r.lcg, r.nof_bytes)),
                    None => warn!("{} BSR for unknown UE", ind.ue_index),
                },
                UeEvent::Crc { slot_rx, pdu } => match ctx.ues.find_by_rnti_mut(pdu.rnti) {
                    Some(ue) => Self::handle_crc(ue, slot_rx, &pdu),
                    None => unmatched.push(UnmatchedCrc { slot_rx, pdu }),
                },
                UeEvent::Uci { slot_rx, pdu } => match ctx.ues.find_by_rnti_mut(pdu.rnti) {
                    Some(ue) => Self::handle_uci(ue, slot_rx, &pdu),
                    None => debug!("UCI for unknown rnti={}", pdu.rnti),
                },
            }
        }
        unmatched
    }

    fn create_ue(&self, ctx: &mut UeEventContext<'_>, req: UeCreationRequest) {
        let ue = Ue::new(req.ue_index, req.crnti, req.cfg, &self.cfg.expert);
        if let Err(ue) = ctx.ues.add_ue(ue) {
            warn!("{} rnti={} creation rejected, index or RNTI in use", ue.ue_index(), ue.crnti());
            ctx.notifier.on_ue_config_complete(req.ue_index, false);
            return;
        }
        if let Some(ue) = ctx.ues.get(req.ue_index) {
            ctx.uci_sched.add_ue(&mut ctx.res.grid, &mut *ctx.res.uci, ue);
        }
        ctx.policy.add_ue(req.ue_index);
        ctx.notifier.on_ue_config_complete(req.ue_index, true);
    }

    fn reconfigure_ue(&self, ctx: &mut UeEventContext<'_>, req: UeReconfigurationRequest) {
        let Some(ue) = ctx.ues.get_mut(req.ue_index) else {
            warn!("{} reconfiguration of unknown UE", req.ue_index);
            ctx.notifier.on_ue_config_complete(req.ue_index, false);
            return;
        };
        // SR and CSI of the old configuration are replaced over the whole window.
        // HARQ-ACKs already signalled in a DCI stay where they are.
        if ue.cfg().sr.is_some() || ue.cfg().csi_report.is_some() {
            ctx.res.uci.remove_periodic_uci(&mut ctx.res.grid, ue.crnti(), ue.cfg());
        }
        ue.handle_reconfiguration(req.cfg);
        ctx.uci_sched.add_ue(&mut ctx.res.grid, &mut *ctx.res.uci, ue);
        ctx.notifier.on_ue_config_complete(req.ue_index, true);
    }

    fn remove_ue(ctx: &mut UeEventContext<'_>, ue_index: UeIndex) {
        match ctx.ues.remove_ue(ue_index) {
            Some(ue) => {
                ctx.res.uci.remove_ue(&mut ctx.res.grid, ue.crnti());
                ctx.policy.rem_ue(ue_index);
                info!("{} rnti={} removed", ue_index, ue.crnti());
            }
            None => warn!("{} removal of unknown UE", ue_index),
        }
        ctx.notifier.on_ue_delete_response(ue_index);
    }

    fn handle_crc(ue: &mut Ue, slot_rx: SlotPoint, pdu: &CrcPdu) {
        let Some((harq_id, outcome)) = ue.ul_harqs.ack_info(slot_rx, 0, pdu.tb_crc_ok) else {
            return;
        };
        if harq_id != pdu.harq_id {
            warn!("{} CRC for h={} matched h={}", ue.ue_index(), pdu.harq_id.0, harq_id.0);
        }
        if outcome == HarqFeedbackOutcome::Discarded {
            warn!("{} UL h={} discarded after max retransmissions", ue.ue_index(), harq_id.0);
        }
    }

    fn handle_uci(ue: &mut Ue, slot_rx: SlotPoint, pdu: &UciPdu) {
        for (bit_idx, ack) in pdu.harq_acks.iter().enumerate() {
            let Some((harq_id, outcome)) = ue.dl_harqs.ack_info(slot_rx, bit_idx as u8, *ack) else {
                continue;
            };
            if outcome == HarqFeedbackOutcome::Discarded {
                warn!("{} DL h={} discarded after max retransmissions", ue.ue_index(), harq_id.0);
            }
        }
        if pdu.sr_detected {
            ue.ul_lc.handle_sr();
        }
        if let Some(cqi) = pdu.cqi {
            ue.handle_csi_report(cqi);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UeCellConfiguration;
    use crate::policy::RoundRobin;
    use crate::ue_context::HarqState;
    use common::types::{CellId, HarqId, Lcg, Lcid, Rnti, SubcarrierSpacing};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        created: Mutex<Vec<(UeIndex, bool)>>,
        deleted: Mutex<Vec<UeIndex>>,
    }

    impl SchedulerConfigNotifier for RecordingNotifier {
        fn on_ue_config_complete(&self, ue_index: UeIndex, success: bool) {
            self.created.lock().unwrap().push((ue_index, success));
        }

        fn on_ue_delete_response(&self, ue_index: UeIndex) {
            self.deleted.lock().unwrap().push(ue_index);
        }
    }

    struct Bench {
        cfg: Arc<CellConfiguration>,
        res: CellResources,
        ues: UeRepository,
        uci_sched: UciScheduler,
        policy: RoundRobin,
        notifier: RecordingNotifier,
        events: UeEventManager,
    }

    impl Bench {
        fn new() -> Self {
            let cfg = Arc::new(CellConfiguration::default());
            let mut res = CellResources::new(cfg.clone());
            res.slot_indication(SlotPoint::from_count(SubcarrierSpacing::Scs15, 0));
            Self {
                res,
                ues: UeRepository::new(),
                uci_sched: UciScheduler::new(cfg.clone()),
                policy: RoundRobin::new(),
                notifier: RecordingNotifier::default(),
                events: UeEventManager::new(cfg.clone()),
                cfg,
            }
        }

        fn run(&mut self) -> Vec<UnmatchedCrc> {
            let mut ctx = UeEventContext {
                res: &mut self.res,
                ues: &mut self.ues,
                uci_sched: &self.uci_sched,
                policy: &mut self.policy,
                notifier: &self.notifier,
            };
            self.events.run(&mut ctx)
        }
    }

    #[test]
    fn test_events_applied_once_in_order() {
        let mut b = Bench::new();
        let cfg = UeCellConfiguration::fallback(&b.cfg);
        b.events.push(UeEvent::Create(UeCreationRequest { ue_index: UeIndex(0), crnti: Rnti(0x4601), cfg }));
        b.events.push(UeEvent::DlBufferState(DlBufferStateIndication {
            ue_index: UeIndex(0),
            lcid: Lcid::SRB0,
            pending_bytes: 100,
        }));
        b.events.push(UeEvent::Bsr(UlBsrIndication {
            ue_index: UeIndex(0),
            reports: vec![crate::indications::BsrReport { lcg: Lcg(0), nof_bytes: 20 }],
        }));
        assert_eq!(b.events.nof_pending(), 3);
        b.run();
        assert_eq!(b.events.nof_pending(), 0);
        let ue = b.ues.get(UeIndex(0)).unwrap();
        assert_eq!(ue.dl_lc.pending_bytes_of(Lcid::SRB0), 100);
        assert!(ue.ul_lc.pending_bytes(0) > 0);
        assert_eq!(*b.notifier.created.lock().unwrap(), vec![(UeIndex(0), true)]);

        b.run();
        assert_eq!(b.notifier.created.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_rnti_rejected() {
        let mut b = Bench::new();
        for idx in 0..2 {
            let cfg = UeCellConfiguration::fallback(&b.cfg);
            b.events.push(UeEvent::Create(UeCreationRequest { ue_index: UeIndex(idx), crnti: Rnti(0x4601), cfg }));
        }
        b.run();
        assert_eq!(b.ues.len(), 1);
        assert_eq!(
            *b.notifier.created.lock().unwrap(),
            vec![(UeIndex(0), true), (UeIndex(1), false)]
        );
    }

    #[test]
    fn test_reconfiguration_places_sr() {
        let mut b = Bench::new();
        let cfg = UeCellConfiguration::fallback(&b.cfg);
        b.events.push(UeEvent::Create(UeCreationRequest { ue_index: UeIndex(1), crnti: Rnti(0x4602), cfg }));
        b.run();
        assert!((0..64).all(|off| b.res.grid[off].result.ul.pucchs.is_empty()));

        let cfg = UeCellConfiguration::default_for(&b.cfg, UeIndex(1));
        b.events.push(UeEvent::Reconfigure(UeReconfigurationRequest { ue_index: UeIndex(1), cfg }));
        b.run();
        assert!(!b.ues.get(UeIndex(1)).unwrap().is_fallback());
        assert!(b.res.grid[1].result.ul.pucchs.iter().any(|p| p.rnti == Rnti(0x4602) && p.uci_bits.sr_nof_bits > 0));

        b.events.push(UeEvent::Remove(UeIndex(1)));
        b.run();
        assert!(b.ues.is_empty());
        assert!((0..64).all(|off| b.res.grid[off].result.ul.pucchs.is_empty()));
        assert_eq!(*b.notifier.deleted.lock().unwrap(), vec![UeIndex(1)]);
    }

    #[test]
    fn test_feedback_routing() {
        let mut b = Bench::new();
        let cfg = UeCellConfiguration::default_for(&b.cfg, UeIndex(0));
        b.events.push(UeEvent::Create(UeCreationRequest { ue_index: UeIndex(0), crnti: Rnti(0x4601), cfg }));
        b.run();

        let sl = SlotPoint::from_count(SubcarrierSpacing::Scs15, 4);
        let ue = b.ues.get_mut(UeIndex(0)).unwrap();
        let tb = crate::ue_context::TransportBlockInfo { mcs: 10, tbs_bytes: 100, nof_prbs: 5, is_fallback: false };
        ue.ul_harqs.get_mut(HarqId(0)).unwrap().new_tx(sl, sl, tb, 4);

        b.events.handle_crc_indication(&UlCrcIndication {
            cell_id: CellId(0),
            slot_rx: sl,
            crcs: vec![
                CrcPdu { rnti: Rnti(0x4601), harq_id: HarqId(0), tb_crc_ok: false },
                CrcPdu { rnti: Rnti(0x4700), harq_id: HarqId(0), tb_crc_ok: true },
            ],
        });
        b.events.handle_uci_indication(&UciIndication {
            cell_id: CellId(0),
            slot_rx: sl,
            ucis: vec![UciPdu { rnti: Rnti(0x4601), harq_acks: vec![], sr_detected: true, cqi: Some(12) }],
        });
        let unmatched = b.run();
        assert_eq!(unmatched.len(), 1);
        assert_eq!(unmatched[0].pdu.rnti, Rnti(0x4700));

        let ue = b.ues.get(UeIndex(0)).unwrap();
        assert_eq!(ue.ul_harqs.get(HarqId(0)).unwrap().state(), HarqState::PendingRetx);
        assert!(ue.ul_lc.is_sr_pending());
        assert_eq!(ue.cqi(), 12);
    }
}
