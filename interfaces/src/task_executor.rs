//! Task Executor
//!
//! Runs work that must stay off the slot loop (statistics, configuration
//! acknowledgements, logging of large results) on a tokio worker. Tasks of
//! one executor run one at a time in submission order.

use crate::InterfaceError;
use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub type Task = Box<dyn FnOnce() + Send + 'static>;

#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Enqueue without waiting. Fails when the queue is full or closed.
    fn execute(&self, task: Task) -> Result<(), InterfaceError>;

    /// Enqueue, waiting for room in the queue
    async fn execute_async(&self, task: Task) -> Result<(), InterfaceError>;
}

pub struct TokioTaskExecutor {
    name: String,
    tx: mpsc::Sender<Task>,
    worker: JoinHandle<usize>,
}

impl TokioTaskExecutor {
    /// Spawn the worker on `handle` with room for `queue_size` pending tasks
    pub fn new(handle: &Handle, name: impl Into<String>, queue_size: usize) -> Result<Self, InterfaceError> {
        if queue_size == 0 {
            return Err(InterfaceError::InvalidConfig("executor queue size must be positive".into()));
        }
        let name = name.into();
        let (tx, mut rx) = mpsc::channel::<Task>(queue_size);
        let worker_name = name.clone();
        let worker = handle.spawn(async move {
            let mut nof_tasks = 0;
            while let Some(task) = rx.recv().await {
                task();
                nof_tasks += 1;
            }
            debug!("Executor {} drained after {} tasks", worker_name, nof_tasks);
            nof_tasks
        });
        Ok(Self { name, tx, worker })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Close the queue, run what is left and return the number of tasks run
    pub async fn shutdown(self) -> usize {
        drop(self.tx);
        match self.worker.await {
            Ok(n) => n,
            Err(e) => {
                warn!("Executor {} worker failed: {}", self.name, e);
                0
            }
        }
    }
}

#[async_trait]
impl TaskExecutor for TokioTaskExecutor {
    fn execute(&self, task: Task) -> Result<(), InterfaceError> {
        self.tx.try_send(task).map_err(|e| {
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "queue closed",
            };
            warn!("Executor {} dropped a task: {}", self.name, reason);
            InterfaceError::ExecutorClosed(format!("{}: {}", self.name, reason))
        })
    }

    async fn execute_async(&self, task: Task) -> Result<(), InterfaceError> {
        self.tx
            .send(task)
            .await
            .map_err(|_| InterfaceError::ExecutorClosed(format!("{}: queue closed", self.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_tasks_run_in_order() {
        let exec = TokioTaskExecutor::new(&Handle::current(), "test", 16).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..10 {
            let seen = seen.clone();
            exec.execute_async(Box::new(move || seen.lock().unwrap().push(i)))
                .await
                .unwrap();
        }
        assert_eq!(exec.shutdown().await, 10);
        assert_eq!(*seen.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_full_queue_rejects() {
        // The worker cannot run until this task yields, so the queue fills up.
        let exec = TokioTaskExecutor::new(&Handle::current(), "small", 2).unwrap();
        assert!(exec.execute(Box::new(|| {})).is_ok());
        assert!(exec.execute(Box::new(|| {})).is_ok());
        assert!(matches!(exec.execute(Box::new(|| {})), Err(InterfaceError::ExecutorClosed(_))));
        assert_eq!(exec.shutdown().await, 2);
    }

    #[test]
    fn test_zero_queue_rejected() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        assert!(TokioTaskExecutor::new(rt.handle(), "bad", 0).is_err());
    }
}
