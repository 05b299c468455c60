//! Shared bench for the scheduler integration tests
//!
//! Drives a `MacScheduler` with one cell slot by slot and closes the HARQ loop
//! by answering every PUCCH and PUSCH of a slot with UCI and CRC indications.

#![allow(dead_code)]

use scheduler::indications::{
    BsrReport, CrcPdu, DlBufferStateIndication, DlMacCe, DlMacCeIndication, UciIndication, UciPdu,
    UeCreationRequest, UlBsrIndication, UlCrcIndication,
};
use scheduler::result::SchedResult;
use scheduler::ue_context::Ue;
use scheduler::{CellConfiguration, MacScheduler, SchedulerConfigNotifier, UeCellConfiguration};
use common::slot_point::SlotPoint;
use common::types::{CellId, Lcg, Lcid, Rnti, UeIndex};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct Notifications {
    pub configured: Mutex<Vec<(UeIndex, bool)>>,
    pub deleted: Mutex<Vec<UeIndex>>,
}

impl SchedulerConfigNotifier for Notifications {
    fn on_ue_config_complete(&self, ue_index: UeIndex, success: bool) {
        self.configured.lock().unwrap().push((ue_index, success));
    }

    fn on_ue_delete_response(&self, ue_index: UeIndex) {
        self.deleted.lock().unwrap().push(ue_index);
    }
}

/// Feedback given to the grants of a slot
pub type AckFn = dyn FnMut(Rnti) -> bool;

pub struct TestBench {
    pub cfg: CellConfiguration,
    pub sched: MacScheduler,
    pub notifier: Arc<Notifications>,
    next_count: u32,
}

impl TestBench {
    pub fn new(cfg: CellConfiguration) -> Self {
        let notifier = Arc::new(Notifications::default());
        let mut sched = MacScheduler::new(notifier.clone());
        sched.add_cell(cfg.clone()).expect("valid cell configuration");
        Self {
            cfg,
            sched,
            notifier,
            next_count: 0,
        }
    }

    pub fn cell_id(&self) -> CellId {
        self.cfg.cell_id
    }

    /// Slot the next call to `run_slot` schedules
    pub fn next_slot(&self) -> SlotPoint {
        SlotPoint::from_count(self.cfg.scs_common, self.next_count)
    }

    /// Schedule the next slot without any feedback
    pub fn run_slot(&mut self) -> SchedResult {
        let sl = self.next_slot();
        self.next_count += 1;
        self.sched
            .slot_indication(sl, self.cell_id())
            .expect("cell is active")
            .clone()
    }

    /// Schedule the next slot and answer its UL grants. `ack` decides the
    /// HARQ-ACK and CRC outcome per RNTI.
    pub fn run_slot_with_feedback(&mut self, ack: &mut AckFn) -> SchedResult {
        let result = self.run_slot();
        self.send_feedback(&result, ack);
        result
    }

    pub fn send_feedback(&mut self, result: &SchedResult, ack: &mut AckFn) {
        // One UCI per RNTI. A common and a dedicated PUCCH of a fallback DCI
        // report the same bit.
        let mut harq_bits: BTreeMap<Rnti, u32> = BTreeMap::new();
        for pucch in &result.ul.pucchs {
            let bits = harq_bits.entry(pucch.rnti).or_default();
            *bits = (*bits).max(pucch.uci_bits.harq_ack_nof_bits);
        }
        let mut crcs = Vec::new();
        for grant in &result.ul.puschs {
            let pusch = &grant.pusch;
            if let Some(uci) = pusch.uci {
                *harq_bits.entry(pusch.rnti).or_default() += uci.harq_ack_nof_bits;
            }
            crcs.push(CrcPdu {
                rnti: pusch.rnti,
                harq_id: pusch.harq_id,
                tb_crc_ok: ack(pusch.rnti),
            });
        }
        let ucis: Vec<UciPdu> = harq_bits
            .into_iter()
            .filter(|(_, bits)| *bits > 0)
            .map(|(rnti, bits)| UciPdu {
                rnti,
                harq_acks: (0..bits).map(|_| ack(rnti)).collect(),
                ..Default::default()
            })
            .collect();

        let cell_id = self.cell_id();
        if !crcs.is_empty() {
            let ind = UlCrcIndication { cell_id, slot_rx: result.slot, crcs };
            self.sched.handle_crc_indication(&ind).expect("cell is active");
        }
        if !ucis.is_empty() {
            let ind = UciIndication { cell_id, slot_rx: result.slot, ucis };
            self.sched.handle_uci_indication(&ind).expect("cell is active");
        }
    }

    /// Create a UE and run the slot that applies the creation
    pub fn add_ue(&mut self, idx: u16, cfg: UeCellConfiguration) -> Rnti {
        let crnti = Rnti(0x4601 + idx);
        self.add_ue_with_rnti(idx, crnti, cfg);
        crnti
    }

    pub fn add_ue_with_rnti(&mut self, idx: u16, crnti: Rnti, cfg: UeCellConfiguration) {
        let req = UeCreationRequest { ue_index: UeIndex(idx), crnti, cfg };
        self.sched
            .handle_ue_creation_request(self.cell_id(), req)
            .expect("UE creation accepted");
        self.run_slot();
        assert!(self
            .notifier
            .configured
            .lock()
            .unwrap()
            .contains(&(UeIndex(idx), true)));
    }

    pub fn ue(&self, idx: u16) -> &Ue {
        self.sched
            .cell(self.cell_id())
            .and_then(|c| c.ues().get(UeIndex(idx)))
            .expect("UE exists")
    }

    pub fn push_dl_buffer(&mut self, idx: u16, lcid: Lcid, pending_bytes: u32) {
        let ind = DlBufferStateIndication { ue_index: UeIndex(idx), lcid, pending_bytes };
        self.sched.handle_dl_buffer_state_indication(ind).expect("UE exists");
    }

    pub fn push_conres(&mut self, idx: u16) {
        let ind = DlMacCeIndication { ue_index: UeIndex(idx), ce: DlMacCe::ConRes };
        self.sched.handle_dl_mac_ce_indication(ind).expect("UE exists");
    }

    pub fn push_bsr(&mut self, idx: u16, lcg: Lcg, nof_bytes: u32) {
        let ind = UlBsrIndication {
            ue_index: UeIndex(idx),
            reports: vec![BsrReport { lcg, nof_bytes }],
        };
        self.sched.handle_ul_bsr_indication(ind).expect("UE exists");
    }
}

/// Always acknowledge
pub fn always_ack(_: Rnti) -> bool {
    true
}
