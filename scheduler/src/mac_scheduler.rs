//! MAC Scheduler
//!
//! Top-level scheduler of the gNB MAC. Owns one [`CellScheduler`] per active cell
//! and routes configuration requests and PHY/MAC indications to the cell they
//! belong to. Each call to [`MacScheduler::slot_indication`] returns the result of
//! the slot, valid until the next call for that cell.

use crate::cell_scheduler::CellScheduler;
use crate::config::CellConfiguration;
use crate::indications::{
    DlBufferStateIndication, DlMacCeIndication, PagingIndication, RachIndication, UciIndication,
    UeCreationRequest, UeReconfigurationRequest, UlBsrIndication, UlCrcIndication,
};
use crate::result::SchedResult;
use crate::SchedulerError;
use common::slot_point::SlotPoint;
use common::types::{CellId, UeIndex};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

/// Completion of UE configuration procedures, reported to the upper layers
pub trait SchedulerConfigNotifier {
    /// A UE creation or reconfiguration was applied (or rejected)
    fn on_ue_config_complete(&self, ue_index: UeIndex, success: bool);

    /// A UE was removed and no longer appears in any result
    fn on_ue_delete_response(&self, ue_index: UeIndex);
}

pub struct MacScheduler {
    cells: BTreeMap<CellId, CellScheduler>,
    ue_cells: HashMap<UeIndex, CellId>,
    notifier: Arc<dyn SchedulerConfigNotifier + Send + Sync>,
}

impl MacScheduler {
    pub fn new(notifier: Arc<dyn SchedulerConfigNotifier + Send + Sync>) -> Self {
        Self {
            cells: BTreeMap::new(),
            ue_cells: HashMap::new(),
            notifier,
        }
    }

    /// Activate a cell. The configuration is validated and frozen.
    pub fn add_cell(&mut self, cfg: CellConfiguration) -> Result<(), SchedulerError> {
        if self.cells.contains_key(&cfg.cell_id) {
            return Err(SchedulerError::DuplicateCell(cfg.cell_id));
        }
        cfg.validate()?;
        let cell_id = cfg.cell_id;
        self.cells.insert(cell_id, CellScheduler::new(Arc::new(cfg), self.notifier.clone()));
        info!("Cell {:?} added", cell_id);
        Ok(())
    }

    /// Deactivate a cell together with its UEs
    pub fn remove_cell(&mut self, cell_id: CellId) -> Result<(), SchedulerError> {
        self.cells.remove(&cell_id).ok_or(SchedulerError::UnknownCell(cell_id))?;
        self.ue_cells.retain(|_, c| *c != cell_id);
        info!("Cell {:?} removed", cell_id);
        Ok(())
    }

    pub fn nof_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn cell(&self, cell_id: CellId) -> Option<&CellScheduler> {
        self.cells.get(&cell_id)
    }

    /// Queue the creation of a UE. Completion is reported through the notifier
    /// once the next slot of the cell is processed.
    pub fn handle_ue_creation_request(&mut self, cell_id: CellId, req: UeCreationRequest) -> Result<(), SchedulerError> {
        if self.ue_cells.contains_key(&req.ue_index) {
            return Err(SchedulerError::DuplicateUe(req.ue_index));
        }
        let cell = self.cells.get_mut(&cell_id).ok_or(SchedulerError::UnknownCell(cell_id))?;
        req.cfg.validate(cell.cfg())?;
        self.ue_cells.insert(req.ue_index, cell_id);
        cell.handle_ue_creation(req);
        Ok(())
    }

    pub fn handle_ue_reconfiguration_request(&mut self, req: UeReconfigurationRequest) -> Result<(), SchedulerError> {
        let cell = self.cell_of_ue(req.ue_index)?;
        req.cfg.validate(cell.cfg())?;
        cell.handle_ue_reconfiguration(req);
        Ok(())
    }

    pub fn handle_ue_removal_request(&mut self, ue_index: UeIndex) -> Result<(), SchedulerError> {
        self.cell_of_ue(ue_index)?.handle_ue_removal(ue_index);
        self.ue_cells.remove(&ue_index);
        Ok(())
    }

    pub fn handle_dl_buffer_state_indication(&mut self, ind: DlBufferStateIndication) -> Result<(), SchedulerError> {
        self.cell_of_ue(ind.ue_index)?.handle_dl_buffer_state(ind);
        Ok(())
    }

    pub fn handle_dl_mac_ce_indication(&mut self, ind: DlMacCeIndication) -> Result<(), SchedulerError> {
        self.cell_of_ue(ind.ue_index)?.handle_dl_mac_ce(ind);
        Ok(())
    }

    pub fn handle_ul_bsr_indication(&mut self, ind: UlBsrIndication) -> Result<(), SchedulerError> {
        self.cell_of_ue(ind.ue_index)?.handle_ul_bsr(ind);
        Ok(())
    }

    pub fn handle_crc_indication(&mut self, ind: &UlCrcIndication) -> Result<(), SchedulerError> {
        self.cell_mut(ind.cell_id)?.handle_crc_indication(ind);
        Ok(())
    }

    pub fn handle_uci_indication(&mut self, ind: &UciIndication) -> Result<(), SchedulerError> {
        self.cell_mut(ind.cell_id)?.handle_uci_indication(ind);
        Ok(())
    }

    pub fn handle_rach_indication(&mut self, ind: &RachIndication) -> Result<(), SchedulerError> {
        self.cell_mut(ind.cell_id)?.handle_rach_indication(ind);
        Ok(())
    }

    pub fn handle_paging_indication(&mut self, ind: &PagingIndication) -> Result<(), SchedulerError> {
        self.cell_mut(ind.cell_id)?.handle_paging_indication(ind);
        Ok(())
    }

    /// Schedule slot `sl_tx` of a cell
    pub fn slot_indication(&mut self, sl_tx: SlotPoint, cell_id: CellId) -> Result<&SchedResult, SchedulerError> {
        Ok(self.cell_mut(cell_id)?.run_slot(sl_tx))
    }

    fn cell_mut(&mut self, cell_id: CellId) -> Result<&mut CellScheduler, SchedulerError> {
        self.cells.get_mut(&cell_id).ok_or(SchedulerError::UnknownCell(cell_id))
    }

    fn cell_of_ue(&mut self, ue_index: UeIndex) -> Result<&mut CellScheduler, SchedulerError> {
        let Some(cell_id) = self.ue_cells.get(&ue_index).copied() else {
            warn!("{} is not attached to any cell", ue_index);
            return Err(SchedulerError::UnknownUe(ue_index));
        };
        self.cell_mut(cell_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UeCellConfiguration;
    use common::types::{Lcid, Rnti, SubcarrierSpacing};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Notifications {
        configured: Mutex<Vec<(UeIndex, bool)>>,
        deleted: Mutex<Vec<UeIndex>>,
    }

    impl SchedulerConfigNotifier for Notifications {
        fn on_ue_config_complete(&self, ue_index: UeIndex, success: bool) {
            self.configured.lock().unwrap().push((ue_index, success));
        }

        fn on_ue_delete_response(&self, ue_index: UeIndex) {
            self.deleted.lock().unwrap().push(ue_index);
        }
    }

    fn sched() -> (Arc<Notifications>, MacScheduler) {
        let notifier = Arc::new(Notifications::default());
        let mut sched = MacScheduler::new(notifier.clone());
        sched.add_cell(CellConfiguration::default()).unwrap();
        (notifier, sched)
    }

    fn slot(count: u32) -> SlotPoint {
        SlotPoint::from_count(SubcarrierSpacing::Scs15, count)
    }

    #[test]
    fn test_cell_lifecycle() {
        let (_, mut sched) = sched();
        assert_eq!(sched.add_cell(CellConfiguration::default()), Err(SchedulerError::DuplicateCell(CellId(0))));

        let mut bad = CellConfiguration::default();
        bad.cell_id = CellId(1);
        bad.nof_dl_crbs = 0;
        assert!(matches!(sched.add_cell(bad), Err(SchedulerError::InvalidConfiguration(..))));

        assert_eq!(sched.slot_indication(slot(0), CellId(0)).unwrap().slot, slot(0));
        assert!(matches!(sched.slot_indication(slot(0), CellId(3)), Err(SchedulerError::UnknownCell(_))));

        sched.remove_cell(CellId(0)).unwrap();
        assert_eq!(sched.nof_cells(), 0);
    }

    #[test]
    fn test_ue_creation_acknowledged_on_next_slot() {
        let (notifier, mut sched) = sched();
        let cell_cfg = CellConfiguration::default();
        let req = UeCreationRequest {
            ue_index: UeIndex(0),
            crnti: Rnti(0x4601),
            cfg: UeCellConfiguration::default_for(&cell_cfg, UeIndex(0)),
        };
        sched.handle_ue_creation_request(CellId(0), req.clone()).unwrap();
        assert_eq!(
            sched.handle_ue_creation_request(CellId(0), req),
            Err(SchedulerError::DuplicateUe(UeIndex(0)))
        );
        assert!(notifier.configured.lock().unwrap().is_empty());

        sched.slot_indication(slot(0), CellId(0)).unwrap();
        assert_eq!(*notifier.configured.lock().unwrap(), vec![(UeIndex(0), true)]);
        assert!(sched.cell(CellId(0)).unwrap().ues().contains(UeIndex(0)));

        sched.handle_ue_removal_request(UeIndex(0)).unwrap();
        sched.slot_indication(slot(1), CellId(0)).unwrap();
        assert_eq!(*notifier.deleted.lock().unwrap(), vec![UeIndex(0)]);
        assert!(sched.cell(CellId(0)).unwrap().ues().is_empty());
    }

    #[test]
    fn test_indications_for_unknown_ue_rejected() {
        let (_, mut sched) = sched();
        let ind = DlBufferStateIndication { ue_index: UeIndex(7), lcid: Lcid::SRB1, pending_bytes: 10 };
        assert_eq!(sched.handle_dl_buffer_state_indication(ind), Err(SchedulerError::UnknownUe(UeIndex(7))));
        assert_eq!(sched.handle_ue_removal_request(UeIndex(7)), Err(SchedulerError::UnknownUe(UeIndex(7))));
    }
}
