//! 5G NR MAC Slot Scheduler
//!
//! Per-cell resource-grid allocation engine of the gNodeB MAC layer. For every slot
//! it decides which UEs get which PDSCH/PUSCH resources, which PDCCH candidates carry
//! their DCIs and where their uplink control information (HARQ-ACK, SR, CSI) is sent,
//! producing an immutable [`result::SchedResult`] for the PHY.

pub mod cell;
pub mod cell_scheduler;
pub mod common_scheduling;
pub mod config;
pub mod indications;
pub mod logging;
pub mod mac_scheduler;
pub mod pdcch_scheduling;
pub mod policy;
pub mod pucch_scheduling;
pub mod result;
pub mod support;
pub mod uci_scheduling;
pub mod ue_context;
pub mod ue_scheduling;

use common::types::{CellId, UeIndex};
use thiserror::Error;

pub use cell_scheduler::CellScheduler;
pub use config::{CellConfiguration, SchedulerExpertConfig, UeCellConfiguration};
pub use mac_scheduler::{MacScheduler, SchedulerConfigNotifier};
pub use result::SchedResult;

/// Errors reported by the scheduler configuration interface
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Invalid {0} configuration: {1}")]
    InvalidConfiguration(&'static str, String),

    #[error("Cell {0:?} already exists")]
    DuplicateCell(CellId),

    #[error("Cell {0:?} not found")]
    UnknownCell(CellId),

    #[error("UE {0} already exists")]
    DuplicateUe(UeIndex),

    #[error("UE {0} not found")]
    UnknownUe(UeIndex),
}

/// Shorthand for configuration validation failures
pub(crate) fn invalid_cfg(section: &'static str, reason: impl Into<String>) -> SchedulerError {
    SchedulerError::InvalidConfiguration(section, reason.into())
}
