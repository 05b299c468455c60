//! UE Scheduling
//!
//! Grant allocation for UEs: the compound PDCCH/UCI/PDSCH/PUSCH allocator,
//! the fallback scheduler for UEs without dedicated configuration, the event
//! queue, and the per-slot driver.

pub mod ue_cell_grid_allocator;
pub mod ue_event_manager;
pub mod ue_fallback_scheduler;
pub mod ue_scheduler;

pub use ue_cell_grid_allocator::{
    AllocStatus, DlLcSelection, DlNewTxGrantBuilder, UeCellGridAllocator, UeNewTxDlGrantRequest,
    UeNewTxUlGrantRequest, UeRetxDlGrantRequest, UeRetxUlGrantRequest, UlNewTxGrantBuilder,
};
pub use ue_event_manager::{UeEvent, UeEventManager, UnmatchedCrc};
pub use ue_fallback_scheduler::UeFallbackScheduler;
pub use ue_scheduler::UeScheduler;
