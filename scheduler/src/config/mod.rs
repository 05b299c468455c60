//! Scheduler Configuration
//!
//! Cell, UE and expert configuration consumed by the scheduler

pub mod cell_config;
pub mod expert_config;
pub mod pucch_config;
pub mod ue_config;

pub use cell_config::{
    CellConfiguration, CoresetConfiguration, CoresetId, PdschTimeDomainResource,
    PuschTimeDomainResource, SearchSpaceConfiguration, SearchSpaceId, SearchSpaceType, TddPattern,
};
pub use expert_config::{PolicyKind, SchedulerExpertConfig};
pub use pucch_config::{PucchConfig, PucchFormat, PucchResource};
pub use ue_config::{LogicalChannelConfig, UeCellConfiguration};
