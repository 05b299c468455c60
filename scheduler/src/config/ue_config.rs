//! UE Cell Configuration
//!
//! Dedicated configuration of a UE in a cell. A UE without a dedicated PUCCH
//! configuration can only be served in fallback mode (DCI 1_0, common PUCCH).

use super::cell_config::{CellConfiguration, SearchSpaceId, SearchSpaceType};
use super::pucch_config::{
    default_pool, find_pucch_resource, CsiReportConfiguration, PucchConfig, PucchMaxCodeRate,
    SrConfiguration,
};
use crate::{invalid_cfg, SchedulerError};
use common::types::{CellId, Lcg, Lcid, UeIndex};
use serde::{Deserialize, Serialize};

/// Default number of HARQ processes per direction
pub const DEFAULT_NOF_HARQ_PROCESSES: u8 = 8;

/// Maximum number of HARQ processes per direction
pub const MAX_NOF_HARQ_PROCESSES: u8 = 16;

/// Lowest logical channel priority value (highest number)
pub const MAX_LC_PRIORITY: u8 = 16;

/// Logical channel configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalChannelConfig {
    /// Logical channel identifier
    pub lcid: Lcid,
    /// Logical channel group reported in BSRs
    pub lcg: Lcg,
    /// Priority, 1 is the highest
    pub priority: u8,
}

/// UE dedicated configuration in a serving cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UeCellConfiguration {
    /// Serving cell
    pub cell_id: CellId,
    /// UE-specific search space, absent before RRC reconfiguration
    #[serde(default)]
    pub ue_search_space: Option<SearchSpaceId>,
    /// Dedicated PUCCH configuration
    #[serde(default)]
    pub pucch: Option<PucchConfig>,
    /// Scheduling request resource
    #[serde(default)]
    pub sr: Option<SrConfiguration>,
    /// Periodic CSI report on PUCCH
    #[serde(default)]
    pub csi_report: Option<CsiReportConfiguration>,
    /// PDSCH-to-HARQ-ACK delays (k1)
    pub k1_candidates: Vec<u8>,
    /// Number of DL HARQ processes
    #[serde(default = "default_nof_harqs")]
    pub nof_dl_harq_processes: u8,
    /// Number of UL HARQ processes
    #[serde(default = "default_nof_harqs")]
    pub nof_ul_harq_processes: u8,
    /// Configured logical channels
    pub logical_channels: Vec<LogicalChannelConfig>,
}

fn default_nof_harqs() -> u8 {
    DEFAULT_NOF_HARQ_PROCESSES
}

fn srb_channels() -> Vec<LogicalChannelConfig> {
    vec![
        LogicalChannelConfig { lcid: Lcid::SRB0, lcg: Lcg(0), priority: 1 },
        LogicalChannelConfig { lcid: Lcid::SRB1, lcg: Lcg(0), priority: 1 },
    ]
}

impl UeCellConfiguration {
    /// Configuration of a UE created by random access, before RRC reconfiguration
    pub fn fallback(cell_cfg: &CellConfiguration) -> Self {
        Self {
            cell_id: cell_cfg.cell_id,
            ue_search_space: None,
            pucch: None,
            sr: None,
            csi_report: None,
            k1_candidates: cell_cfg.dl_harq_k1_candidates.clone(),
            nof_dl_harq_processes: DEFAULT_NOF_HARQ_PROCESSES,
            nof_ul_harq_processes: DEFAULT_NOF_HARQ_PROCESSES,
            logical_channels: srb_channels(),
        }
    }

    /// Full dedicated configuration built on the default PUCCH pool.
    ///
    /// SR and CSI resources are spread over the pool and over the periodicity by
    /// UE index so that UEs do not compete for the same occasions.
    pub fn default_for(cell_cfg: &CellConfiguration, ue_index: UeIndex) -> Self {
        use default_pool::*;

        let idx = ue_index.0;
        let sr_period = 40;
        let csi_period = 80;
        let mut logical_channels = srb_channels();
        logical_channels.push(LogicalChannelConfig { lcid: Lcid::SRB2, lcg: Lcg(0), priority: 3 });
        logical_channels.push(LogicalChannelConfig { lcid: Lcid::MIN_DRB, lcg: Lcg(1), priority: 8 });

        Self {
            cell_id: cell_cfg.cell_id,
            ue_search_space: cell_cfg
                .search_spaces
                .iter()
                .find(|ss| ss.kind == SearchSpaceType::UeSpecific)
                .map(|ss| ss.id),
            pucch: Some(PucchConfig {
                res_set0: (0..8).map(|i| RES_SET0_FIRST_ID + i).collect(),
                res_set1: (0..8).map(|i| RES_SET1_FIRST_ID + i).collect(),
                max_code_rate: PucchMaxCodeRate::Dot35,
                simultaneous_harq_ack_csi: true,
            }),
            sr: Some(SrConfiguration {
                period_slots: sr_period,
                offset: idx as u32 % sr_period,
                pucch_res_id: SR_FIRST_ID + idx % NOF_SR_RESOURCES,
            }),
            csi_report: Some(CsiReportConfiguration {
                period_slots: csi_period,
                offset: idx as u32 % csi_period,
                pucch_res_id: CSI_FIRST_ID + idx % NOF_CSI_RESOURCES,
                csi_part1_bits: 4,
            }),
            k1_candidates: cell_cfg.dl_harq_k1_candidates.clone(),
            nof_dl_harq_processes: DEFAULT_NOF_HARQ_PROCESSES,
            nof_ul_harq_processes: DEFAULT_NOF_HARQ_PROCESSES,
            logical_channels,
        }
    }

    /// Whether a dedicated PUCCH configuration exists
    pub fn has_dedicated_pucch(&self) -> bool {
        self.pucch.is_some()
    }

    /// Configuration of a logical channel
    pub fn logical_channel(&self, lcid: Lcid) -> Option<&LogicalChannelConfig> {
        self.logical_channels.iter().find(|lc| lc.lcid == lcid)
    }

    /// Validate against the serving cell configuration
    pub fn validate(&self, cell_cfg: &CellConfiguration) -> Result<(), SchedulerError> {
        if self.cell_id != cell_cfg.cell_id {
            return Err(invalid_cfg("ue", format!("UE configured for cell {:?}, not {:?}", self.cell_id, cell_cfg.cell_id)));
        }
        if let Some(ss_id) = self.ue_search_space {
            if cell_cfg.search_space(ss_id).is_none() {
                return Err(invalid_cfg("ue", format!("unknown search space {}", ss_id)));
            }
        }
        if self.k1_candidates.is_empty() || self.k1_candidates.contains(&0) {
            return Err(invalid_cfg("ue", "k1 candidates must be non-empty and positive"));
        }
        for nof in [self.nof_dl_harq_processes, self.nof_ul_harq_processes] {
            if nof == 0 || nof > MAX_NOF_HARQ_PROCESSES {
                return Err(invalid_cfg("ue", format!("invalid number of HARQ processes {}", nof)));
            }
        }
        for (i, lc) in self.logical_channels.iter().enumerate() {
            if lc.lcid > Lcid::MAX_LCID || lc.lcg.0 as usize >= Lcg::MAX_NOF_LCGS {
                return Err(invalid_cfg("ue", format!("invalid logical channel {:?}", lc.lcid)));
            }
            if lc.priority == 0 || lc.priority > MAX_LC_PRIORITY {
                return Err(invalid_cfg("ue", format!("invalid priority {} for {:?}", lc.priority, lc.lcid)));
            }
            if self.logical_channels[..i].iter().any(|other| other.lcid == lc.lcid) {
                return Err(invalid_cfg("ue", format!("duplicate logical channel {:?}", lc.lcid)));
            }
        }

        let pool = &cell_cfg.pucch_resources;
        match &self.pucch {
            Some(pucch) => pucch.validate(pool)?,
            None if self.sr.is_some() || self.csi_report.is_some() => {
                return Err(invalid_cfg("ue", "SR and CSI need a dedicated PUCCH configuration"));
            }
            None => {}
        }
        if let Some(sr) = &self.sr {
            match find_pucch_resource(pool, sr.pucch_res_id) {
                Some(res) if res.format.is_small_payload() => {}
                _ => return Err(invalid_cfg("ue", format!("SR resource {} must be a format 0/1 resource", sr.pucch_res_id))),
            }
            if sr.period_slots == 0 {
                return Err(invalid_cfg("ue", "SR periodicity cannot be zero"));
            }
        }
        if let Some(csi) = &self.csi_report {
            match find_pucch_resource(pool, csi.pucch_res_id) {
                Some(res) if !res.format.is_small_payload() => {}
                _ => return Err(invalid_cfg("ue", format!("CSI resource {} must be a format 2/3/4 resource", csi.pucch_res_id))),
            }
            if csi.period_slots == 0 {
                return Err(invalid_cfg("ue", "CSI periodicity cannot be zero"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ue_config_is_valid() {
        let cell = CellConfiguration::default();
        for i in 0..20 {
            let ue = UeCellConfiguration::default_for(&cell, UeIndex(i));
            ue.validate(&cell).unwrap();
        }
        let ue = UeCellConfiguration::default_for(&cell, UeIndex(3));
        assert_eq!(ue.ue_search_space, Some(2));
        assert_eq!(ue.sr.as_ref().unwrap().offset, 3);
        assert_eq!(ue.sr.as_ref().unwrap().pucch_res_id, default_pool::SR_FIRST_ID + 3);
    }

    #[test]
    fn test_fallback_config_has_no_dedicated_pucch() {
        let cell = CellConfiguration::default();
        let ue = UeCellConfiguration::fallback(&cell);
        assert!(!ue.has_dedicated_pucch());
        assert!(ue.validate(&cell).is_ok());
        assert!(ue.logical_channel(Lcid::SRB0).is_some());
    }

    #[test]
    fn test_sr_without_pucch_rejected() {
        let cell = CellConfiguration::default();
        let mut ue = UeCellConfiguration::default_for(&cell, UeIndex(0));
        ue.pucch = None;
        assert!(ue.validate(&cell).is_err());
    }
}
