//! Cell Scheduler
//!
//! Orchestrates the scheduling of one cell. On every slot indication the ring
//! is advanced, queued events are applied, and the common channels are placed
//! before the UEs share what is left of the grid.

use crate::cell::CellResources;
use crate::common_scheduling::{CsiRsScheduler, PagingScheduler, RaScheduler, SibScheduler, SsbScheduler};
use crate::config::CellConfiguration;
use crate::indications::{
    DlBufferStateIndication, DlMacCeIndication, PagingIndication, RachIndication, UciIndication,
    UeCreationRequest, UeReconfigurationRequest, UlBsrIndication, UlCrcIndication,
};
use crate::logging::log_sched_result;
use crate::mac_scheduler::SchedulerConfigNotifier;
use crate::result::SchedResult;
use crate::ue_context::UeRepository;
use crate::ue_scheduling::{UeEvent, UeScheduler};
use common::slot_point::SlotPoint;
use common::types::{CellId, UeIndex};
use std::sync::Arc;
use tracing::{info, trace};

pub struct CellScheduler {
    cfg: Arc<CellConfiguration>,
    res: CellResources,
    ssb: SsbScheduler,
    csi_rs: CsiRsScheduler,
    sib: SibScheduler,
    paging: PagingScheduler,
    ra: RaScheduler,
    ue_sched: UeScheduler,
    notifier: Arc<dyn SchedulerConfigNotifier + Send + Sync>,
}

impl CellScheduler {
    /// Create the scheduler of a validated cell
    pub fn new(cfg: Arc<CellConfiguration>, notifier: Arc<dyn SchedulerConfigNotifier + Send + Sync>) -> Self {
        Self::with_resources(CellResources::new(cfg.clone()), notifier)
    }

    /// Create the scheduler on custom control channel allocators
    pub fn with_resources(res: CellResources, notifier: Arc<dyn SchedulerConfigNotifier + Send + Sync>) -> Self {
        let cfg = res.cfg.clone();
        info!(
            "Cell {:?} scheduler created: pci={:?} dl_crbs={} ul_crbs={} {:?}",
            cfg.cell_id,
            cfg.pci,
            cfg.nof_dl_crbs,
            cfg.nof_ul_crbs,
            cfg.duplex_mode()
        );
        Self {
            ssb: SsbScheduler::new(cfg.clone()),
            csi_rs: CsiRsScheduler::new(cfg.clone()),
            sib: SibScheduler::new(cfg.clone()),
            paging: PagingScheduler::new(cfg.clone()),
            ra: RaScheduler::new(cfg.clone()),
            ue_sched: UeScheduler::new(cfg.clone()),
            cfg,
            res,
            notifier,
        }
    }

    pub fn cell_id(&self) -> CellId {
        self.cfg.cell_id
    }

    pub fn cfg(&self) -> &Arc<CellConfiguration> {
        &self.cfg
    }

    pub fn resources(&self) -> &CellResources {
        &self.res
    }

    pub fn ues(&self) -> &UeRepository {
        self.ue_sched.ues()
    }

    pub fn ra(&self) -> &RaScheduler {
        &self.ra
    }

    pub fn paging(&self) -> &PagingScheduler {
        &self.paging
    }

    pub fn handle_ue_creation(&mut self, req: UeCreationRequest) {
        self.ue_sched.push_event(UeEvent::Create(req));
    }

    pub fn handle_ue_reconfiguration(&mut self, req: UeReconfigurationRequest) {
        self.ue_sched.push_event(UeEvent::Reconfigure(req));
    }

    pub fn handle_ue_removal(&mut self, ue_index: UeIndex) {
        self.ue_sched.push_event(UeEvent::Remove(ue_index));
    }

    pub fn handle_dl_buffer_state(&mut self, ind: DlBufferStateIndication) {
        self.ue_sched.push_event(UeEvent::DlBufferState(ind));
    }

    pub fn handle_dl_mac_ce(&mut self, ind: DlMacCeIndication) {
        self.ue_sched.push_event(UeEvent::DlMacCe(ind));
    }

    pub fn handle_ul_bsr(&mut self, ind: UlBsrIndication) {
        self.ue_sched.push_event(UeEvent::Bsr(ind));
    }

    pub fn handle_crc_indication(&mut self, ind: &UlCrcIndication) {
        self.ue_sched.events().handle_crc_indication(ind);
    }

    pub fn handle_uci_indication(&mut self, ind: &UciIndication) {
        self.ue_sched.events().handle_uci_indication(ind);
    }

    pub fn handle_rach_indication(&mut self, ind: &RachIndication) {
        self.ra.handle_rach_indication(ind);
    }

    pub fn handle_paging_indication(&mut self, ind: &PagingIndication) {
        self.paging.handle_paging_information(ind);
    }

    /// Schedule slot `sl_tx` and return its result
    pub fn run_slot(&mut self, sl_tx: SlotPoint) -> &SchedResult {
        self.res.slot_indication(sl_tx);

        let unmatched = self.ue_sched.process_events(&mut self.res, self.notifier.as_ref());
        for crc in &unmatched {
            self.ra.handle_crc(crc);
        }
        self.ue_sched.handle_harq_timeouts(sl_tx);

        self.ssb.run_slot(&mut self.res.grid);
        self.csi_rs.run_slot(&mut self.res.grid);
        self.sib.run_slot(&mut self.res);
        self.paging.run_slot(&mut self.res);
        self.ra.run_slot(&mut self.res);

        self.ue_sched.run_slot(&mut self.res);

        let result = &self.res.grid[0].result;
        if !result.is_empty() {
            log_sched_result(self.cfg.cell_id, result);
        } else {
            trace!("Cell {:?} slot {}: nothing scheduled", self.cfg.cell_id, sl_tx);
        }
        result
    }
}
