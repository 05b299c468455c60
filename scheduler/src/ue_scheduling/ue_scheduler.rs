//! UE Scheduler
//!
//! Per-slot scheduling of the UEs of a cell. Queued UE events are applied
//! first, then HARQ feedback timeouts. After the common channels are placed by
//! the cell scheduler, the periodic UCI is refreshed, fallback UEs are served,
//! and the policy distributes what is left among connected-mode UEs.
//!
//! DL and UL DCIs share the PDCCH. In slots that can schedule a PUSCH the
//! direction served first alternates, so that a loaded DL cannot hold every
//! CCE of the slots UL depends on.

use super::ue_cell_grid_allocator::UeCellGridAllocator;
use super::ue_event_manager::{UeEvent, UeEventContext, UeEventManager, UnmatchedCrc};
use super::ue_fallback_scheduler::UeFallbackScheduler;
use crate::cell::CellResources;
use crate::config::CellConfiguration;
use crate::mac_scheduler::SchedulerConfigNotifier;
use crate::policy::{create_policy, next_pusch_slot, SchedulerPolicy, UeSchedContext};
use crate::uci_scheduling::UciScheduler;
use crate::ue_context::UeRepository;
use common::slot_point::SlotPoint;
use std::sync::Arc;

pub struct UeScheduler {
    ues: UeRepository,
    events: UeEventManager,
    grid_alloc: UeCellGridAllocator,
    fallback: UeFallbackScheduler,
    policy: Box<dyn SchedulerPolicy + Send>,
    uci_sched: UciScheduler,
    /// Serve UL before DL in the next slot that can schedule a PUSCH
    ul_first: bool,
}

/// Whether the current slot carries a PDCCH that can schedule a PUSCH
fn can_schedule_pusch(res: &CellResources) -> bool {
    res.cfg.is_dl_enabled(res.slot_tx()) && next_pusch_slot(res).is_some()
}

impl UeScheduler {
    pub fn new(cfg: Arc<CellConfiguration>) -> Self {
        Self {
            ues: UeRepository::new(),
            events: UeEventManager::new(cfg.clone()),
            grid_alloc: UeCellGridAllocator::new(cfg.clone()),
            fallback: UeFallbackScheduler::new(cfg.clone()),
            policy: create_policy(&cfg),
            uci_sched: UciScheduler::new(cfg),
            ul_first: false,
        }
    }

    pub fn ues(&self) -> &UeRepository {
        &self.ues
    }

    pub fn events(&mut self) -> &mut UeEventManager {
        &mut self.events
    }

    pub fn push_event(&mut self, ev: UeEvent) {
        self.events.push(ev);
    }

    /// Apply queued events. Returns the CRCs that belong to no UE.
    pub fn process_events(
        &mut self,
        res: &mut CellResources,
        notifier: &dyn SchedulerConfigNotifier,
    ) -> Vec<UnmatchedCrc> {
        let mut ctx = UeEventContext {
            res,
            ues: &mut self.ues,
            uci_sched: &self.uci_sched,
            policy: self.policy.as_mut(),
            notifier,
        };
        self.events.run(&mut ctx)
    }

    /// Expire HARQ processes whose feedback never arrived
    pub fn handle_harq_timeouts(&mut self, sl_tx: SlotPoint) {
        for ue in self.ues.iter_mut() {
            ue.slot_indication(sl_tx);
        }
    }

    /// Allocate UE grants in the current slot
    pub fn run_slot(&mut self, res: &mut CellResources) {
        self.uci_sched.run_slot(&mut res.grid, &mut *res.uci, &self.ues);

        self.fallback.run_slot(&self.grid_alloc, res, &mut self.ues);

        let mut ctx = UeSchedContext {
            grid_alloc: &self.grid_alloc,
            res: &mut *res,
            ues: &mut self.ues,
        };
        let ul_schedulable = can_schedule_pusch(ctx.res);
        if ul_schedulable && self.ul_first {
            self.policy.ul_sched(&mut ctx);
            self.policy.dl_sched(&mut ctx);
        } else {
            self.policy.dl_sched(&mut ctx);
            self.policy.ul_sched(&mut ctx);
        }
        if ul_schedulable {
            self.ul_first = !self.ul_first;
        }

        self.grid_alloc.post_process_results(res);
    }
}
