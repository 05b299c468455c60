//! UE Context
//!
//! Per-UE scheduling state: HARQ processes, logical channel buffers and the
//! repository of UEs of a cell

pub mod harq;
pub mod logical_channels;
pub mod ue;
pub mod ue_repository;

pub use harq::{HarqEntity, HarqFeedbackOutcome, HarqProcess, HarqState, TransportBlockInfo};
pub use ue::Ue;
pub use ue_repository::UeRepository;
