//! UE Context
//!
//! Scheduler view of one UE in its serving cell: configuration, HARQ processes,
//! buffer state and channel quality.

use super::harq::HarqEntity;
use super::logical_channels::{DlLogicalChannelManager, UlLogicalChannelManager};
use crate::config::{SchedulerExpertConfig, UeCellConfiguration};
use crate::support::mcs_tbs::cqi_to_mcs;
use common::slot_point::SlotPoint;
use common::types::{Rnti, UeIndex};
use tracing::{debug, info};

/// Scheduler context of a UE
#[derive(Debug, Clone)]
pub struct Ue {
    ue_index: UeIndex,
    crnti: Rnti,
    cfg: UeCellConfiguration,
    pub dl_harqs: HarqEntity,
    pub ul_harqs: HarqEntity,
    pub dl_lc: DlLogicalChannelManager,
    pub ul_lc: UlLogicalChannelManager,
    /// Last wideband CQI reported
    cqi: u8,
    last_pdsch_slot: Option<SlotPoint>,
    last_pusch_slot: Option<SlotPoint>,
}

impl Ue {
    /// Create a UE from its configuration
    pub fn new(ue_index: UeIndex, crnti: Rnti, cfg: UeCellConfiguration, expert: &SchedulerExpertConfig) -> Self {
        info!("{} rnti={} created, fallback={}", ue_index, crnti, !cfg.has_dedicated_pucch());
        Self {
            dl_harqs: HarqEntity::new(cfg.nof_dl_harq_processes, expert.harq_feedback_timeout_slots),
            ul_harqs: HarqEntity::new(cfg.nof_ul_harq_processes, expert.harq_feedback_timeout_slots),
            dl_lc: DlLogicalChannelManager::new(&cfg.logical_channels),
            ul_lc: UlLogicalChannelManager::new(&cfg.logical_channels),
            cqi: expert.initial_cqi,
            last_pdsch_slot: None,
            last_pusch_slot: None,
            ue_index,
            crnti,
            cfg,
        }
    }

    pub fn ue_index(&self) -> UeIndex {
        self.ue_index
    }

    pub fn crnti(&self) -> Rnti {
        self.crnti
    }

    pub fn cfg(&self) -> &UeCellConfiguration {
        &self.cfg
    }

    /// Apply a new dedicated configuration. HARQ processes keep running.
    pub fn handle_reconfiguration(&mut self, cfg: UeCellConfiguration) {
        debug!("{} reconfigured, dedicated_pucch={}", self.ue_index, cfg.has_dedicated_pucch());
        self.dl_lc.configure(&cfg.logical_channels);
        self.ul_lc.configure(&cfg.logical_channels);
        self.cfg = cfg;
    }

    /// Whether the UE is only reachable with DCI 1_0/0_0 in a common search space
    pub fn is_fallback(&self) -> bool {
        !self.cfg.has_dedicated_pucch() || self.cfg.ue_search_space.is_none()
    }

    pub fn cqi(&self) -> u8 {
        self.cqi
    }

    /// Store a wideband CQI report. Out of range reports are ignored.
    pub fn handle_csi_report(&mut self, cqi: u8) {
        if (1..=15).contains(&cqi) {
            self.cqi = cqi;
        }
    }

    /// DL MCS derived from the last CQI, within the expert limits
    pub fn dl_mcs(&self, expert: &SchedulerExpertConfig) -> u8 {
        expert.dl_mcs.clamp(cqi_to_mcs(self.cqi).unwrap_or(expert.dl_mcs.min))
    }

    /// UL MCS, following the DL channel quality in absence of UL measurements
    pub fn ul_mcs(&self, expert: &SchedulerExpertConfig) -> u8 {
        expert.ul_mcs.clamp(cqi_to_mcs(self.cqi).unwrap_or(expert.ul_mcs.min))
    }

    pub fn last_pdsch_slot(&self) -> Option<SlotPoint> {
        self.last_pdsch_slot
    }

    pub fn set_last_pdsch_slot(&mut self, sl: SlotPoint) {
        self.last_pdsch_slot = Some(sl);
    }

    pub fn last_pusch_slot(&self) -> Option<SlotPoint> {
        self.last_pusch_slot
    }

    pub fn set_last_pusch_slot(&mut self, sl: SlotPoint) {
        self.last_pusch_slot = Some(sl);
    }

    /// Whether the UE has DL data or retransmissions to schedule
    pub fn has_dl_work(&self) -> bool {
        self.dl_lc.has_pending_bytes() || self.dl_harqs.has_pending_retx()
    }

    /// Whether the UE has UL data or retransmissions to schedule
    pub fn has_ul_work(&self, sr_grant_bytes: u32) -> bool {
        self.ul_lc.pending_bytes(sr_grant_bytes) > 0 || self.ul_harqs.has_pending_retx()
    }

    /// Expire HARQ processes without feedback
    pub fn slot_indication(&mut self, sl: SlotPoint) {
        self.dl_harqs.slot_indication(sl);
        self.ul_harqs.slot_indication(sl);
    }
}
