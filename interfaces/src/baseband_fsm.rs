//! Baseband Lifecycle
//!
//! The baseband loop runs `idle -> running -> wait_stop -> stopped`. A stop
//! request moves a running loop to `wait_stop`; the loop acknowledges it on
//! its next iteration by moving to `stopped`. Transitions are compare-and-swap
//! on a single atomic so the controlling thread and the loop never race, and
//! any transition out of order is a programming error.

use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::Notify;
use tracing::{error, info};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasebandState {
    Idle = 0,
    Running = 1,
    WaitStop = 2,
    Stopped = 3,
}

impl BasebandState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::WaitStop,
            _ => Self::Stopped,
        }
    }
}

#[derive(Debug)]
pub struct BasebandFsm {
    state: AtomicU8,
    stopped: Notify,
}

impl Default for BasebandFsm {
    fn default() -> Self {
        Self::new()
    }
}

impl BasebandFsm {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(BasebandState::Idle as u8),
            stopped: Notify::new(),
        }
    }

    pub fn state(&self) -> BasebandState {
        BasebandState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the loop should keep processing
    pub fn is_running(&self) -> bool {
        self.state() == BasebandState::Running
    }

    pub fn start(&self) {
        self.transition(BasebandState::Idle, BasebandState::Running);
        info!("Baseband started");
    }

    /// Ask a running loop to stop. Stopping a loop that never started goes
    /// straight to `stopped`.
    pub fn request_stop(&self) {
        let idle = BasebandState::Idle as u8;
        if self
            .state
            .compare_exchange(idle, BasebandState::Stopped as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.stopped.notify_waiters();
            return;
        }
        self.transition(BasebandState::Running, BasebandState::WaitStop);
        info!("Baseband stop requested");
    }

    /// Called by the loop when it sees `wait_stop`. Returns false while running.
    pub fn acknowledge_stop(&self) -> bool {
        match self.state() {
            BasebandState::Running => false,
            _ => {
                self.transition(BasebandState::WaitStop, BasebandState::Stopped);
                self.stopped.notify_waiters();
                info!("Baseband stopped");
                true
            }
        }
    }

    /// Wait until the loop has acknowledged the stop
    pub async fn wait_stop(&self) {
        loop {
            let notified = self.stopped.notified();
            if self.state() == BasebandState::Stopped {
                return;
            }
            notified.await;
        }
    }

    fn transition(&self, from: BasebandState, to: BasebandState) {
        if let Err(actual) = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
        {
            let actual = BasebandState::from_u8(actual);
            error!("Illegal baseband transition {:?} -> {:?} from {:?}", from, to, actual);
            panic!("illegal baseband transition to {:?} from {:?}", to, actual);
        }
    }
}
