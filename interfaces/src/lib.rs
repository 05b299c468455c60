//! Baseband Boundary Interfaces
//!
//! Contracts between the MAC/PHY upper layers and the radio side: sample
//! buffers drawn from a bounded pool, radio event notifications, the baseband
//! lifecycle and a task executor for work outside the slot loop. A loopback
//! gateway implements the transmitter side in memory.

pub mod baseband_fsm;
pub mod buffer_pool;
pub mod loopback;
pub mod radio_notifier;
pub mod task_executor;

pub use baseband_fsm::{BasebandFsm, BasebandState};
pub use buffer_pool::{BufferPool, SampleBuffer};
pub use loopback::{BasebandTransmitter, LoopbackGateway, LoopbackReceiver, TxMetadata};
pub use radio_notifier::{CountingRadioNotifier, RadioEvent, RadioEventKind, RadioNotificationHandler, RadioStats};
pub use task_executor::{TaskExecutor, TokioTaskExecutor};

use thiserror::Error;

/// Interface errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("Buffer pool exhausted ({0} buffers in use)")]
    PoolExhausted(usize),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Interface not running")]
    NotRunning,

    #[error("Buffer of {actual} samples does not match the {expected} samples per block")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("Executor rejected task: {0}")]
    ExecutorClosed(String),
}
