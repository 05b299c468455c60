//! Scheduler Expert Configuration
//!
//! Tunables that do not come from RRC but shape the scheduling decisions

use crate::support::pdcch_candidates::AggregationLevel;
use crate::{invalid_cfg, SchedulerError};
use common::interval::CrbInterval;
use serde::{Deserialize, Serialize};

/// Scheduling policy used for UEs in connected mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Time-domain round-robin
    #[default]
    RoundRobin,
    /// QoS-aware proportional fair
    ProportionalFair,
}

/// Inclusive range of RBs per grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RbLimits {
    pub min: u32,
    pub max: u32,
}

impl RbLimits {
    /// Clamp a number of RBs into the range
    pub fn clamp(&self, nof_rbs: u32) -> u32 {
        nof_rbs.clamp(self.min, self.max)
    }
}

/// Inclusive MCS range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct McsLimits {
    pub min: u8,
    pub max: u8,
}

impl McsLimits {
    /// Clamp an MCS into the range
    pub fn clamp(&self, mcs: u8) -> u8 {
        mcs.clamp(self.min, self.max)
    }
}

/// Scheduler expert configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerExpertConfig {
    /// Policy for connected-mode UEs
    pub policy: PolicyKind,
    /// Proportional fair fairness coefficient
    pub pf_fairness_coeff: f64,
    /// PDSCH RBs per UE grant
    pub pdsch_nof_rbs: RbLimits,
    /// PUSCH RBs per UE grant
    pub pusch_nof_rbs: RbLimits,
    /// CRBs where UE PDSCHs may be allocated
    pub pdsch_crb_limits: Option<CrbInterval>,
    /// CRBs where UE PUSCHs may be allocated
    pub pusch_crb_limits: Option<CrbInterval>,
    /// DL MCS range
    pub dl_mcs: McsLimits,
    /// UL MCS range
    pub ul_mcs: McsLimits,
    /// Maximum MCS for Msg4 and other fallback PDSCHs
    pub max_msg4_mcs: u8,
    /// CQI assumed before the first CSI report
    pub initial_cqi: u8,
    /// PDCCH aggregation level used when no CQI based choice is possible
    pub ue_pdcch_aggregation_level: AggregationLevel,
    /// Maximum UE PDSCHs per slot
    pub max_pdschs_per_slot: u32,
    /// Maximum UE PUSCHs per slot
    pub max_puschs_per_slot: u32,
    /// Maximum PUCCH PDUs per slot
    pub max_pucchs_per_slot: u32,
    /// Maximum UL grants (PUCCH + PUSCH) per slot
    pub max_ul_grants_per_slot: u32,
    /// Maximum HARQ-ACK bits reported in one UCI occasion
    pub max_harq_ack_bits_per_uci: u8,
    /// Maximum DL HARQ retransmissions
    pub max_nof_dl_harq_retxs: u8,
    /// Maximum UL HARQ retransmissions
    pub max_nof_ul_harq_retxs: u8,
    /// Maximum Msg4 HARQ retransmissions
    pub max_msg4_harq_retxs: u8,
    /// Slots to wait for HARQ feedback past its expected slot before assuming NACK
    pub harq_feedback_timeout_slots: u32,
    /// Number of times a paging record is transmitted
    pub max_paging_retries: u32,
    /// UL bytes granted on a Scheduling Request before any BSR
    pub sr_grant_bytes: u32,
}

impl Default for SchedulerExpertConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::RoundRobin,
            pf_fairness_coeff: 2.0,
            pdsch_nof_rbs: RbLimits { min: 1, max: 275 },
            pusch_nof_rbs: RbLimits { min: 1, max: 275 },
            pdsch_crb_limits: None,
            pusch_crb_limits: None,
            dl_mcs: McsLimits { min: 0, max: 28 },
            ul_mcs: McsLimits { min: 0, max: 28 },
            max_msg4_mcs: 9,
            initial_cqi: 3,
            ue_pdcch_aggregation_level: AggregationLevel::N4,
            max_pdschs_per_slot: 8,
            max_puschs_per_slot: 8,
            max_pucchs_per_slot: 31,
            max_ul_grants_per_slot: 32,
            max_harq_ack_bits_per_uci: 8,
            max_nof_dl_harq_retxs: 4,
            max_nof_ul_harq_retxs: 4,
            max_msg4_harq_retxs: 4,
            harq_feedback_timeout_slots: 16,
            max_paging_retries: 2,
            sr_grant_bytes: 512,
        }
    }
}

impl SchedulerExpertConfig {
    /// Validate the tunables against the carrier
    pub fn validate(&self, nof_dl_crbs: u32, nof_ul_crbs: u32) -> Result<(), SchedulerError> {
        for (name, rbs) in [("pdsch", self.pdsch_nof_rbs), ("pusch", self.pusch_nof_rbs)] {
            if rbs.min == 0 || rbs.min > rbs.max {
                return Err(invalid_cfg("expert", format!("invalid {} RB limits [{}, {}]", name, rbs.min, rbs.max)));
            }
        }
        if let Some(lims) = &self.pdsch_crb_limits {
            if lims.is_empty() || lims.stop() > nof_dl_crbs {
                return Err(invalid_cfg("expert", format!("PDSCH CRB limits {} outside the carrier", lims)));
            }
        }
        if let Some(lims) = &self.pusch_crb_limits {
            if lims.is_empty() || lims.stop() > nof_ul_crbs {
                return Err(invalid_cfg("expert", format!("PUSCH CRB limits {} outside the carrier", lims)));
            }
        }
        for (name, mcs) in [("dl", self.dl_mcs), ("ul", self.ul_mcs)] {
            if mcs.min > mcs.max || mcs.max > 28 {
                return Err(invalid_cfg("expert", format!("invalid {} MCS range [{}, {}]", name, mcs.min, mcs.max)));
            }
        }
        if self.max_msg4_mcs > 28 || self.initial_cqi > 15 {
            return Err(invalid_cfg("expert", "Msg4 MCS must be <= 28 and CQI <= 15"));
        }
        if self.max_pdschs_per_slot == 0 || self.max_puschs_per_slot == 0 || self.max_pucchs_per_slot == 0 {
            return Err(invalid_cfg("expert", "per-slot grant limits must be positive"));
        }
        if self.max_harq_ack_bits_per_uci == 0 {
            return Err(invalid_cfg("expert", "at least one HARQ-ACK bit per UCI is required"));
        }
        if self.pf_fairness_coeff < 0.0 {
            return Err(invalid_cfg("expert", "fairness coefficient cannot be negative"));
        }
        Ok(())
    }
}
