// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime hands dispatched tasks to an `ExecutorBackend` instead of
//! spawning them itself. This makes it easy to wrap the production backend
//! in tests (for example to record dispatch order).
//!
//! - `RealExecutorBackend` is the default implementation. It forwards
//!   dispatched tasks over a channel to the worker loop in
//!   [`executor_loop`](super::executor_loop).
//! - Tests can provide their own `ExecutorBackend`, as long as every
//!   dispatched task is eventually started (or cancelled).

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::errors::{Result, TaskweaveError};
use crate::exec::RunEnv;
use crate::task::TaskHandle;

use super::executor_loop::spawn_worker_loop;

/// Trait abstracting how dispatched tasks are executed.
pub trait ExecutorBackend: Send {
    /// Start the given tasks, in order.
    fn dispatch(
        &mut self,
        tasks: Vec<TaskHandle>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Production backend: forwards tasks to the worker loop.
pub struct RealExecutorBackend {
    tx: mpsc::UnboundedSender<TaskHandle>,
}

impl RealExecutorBackend {
    /// Spawn the worker loop immediately. Must be called inside a tokio
    /// runtime.
    pub fn new(env: RunEnv) -> Self {
        let tx = spawn_worker_loop(env);
        Self { tx }
    }
}

impl ExecutorBackend for RealExecutorBackend {
    fn dispatch(
        &mut self,
        tasks: Vec<TaskHandle>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.tx.clone();

        Box::pin(async move {
            for task in tasks {
                tx.send(task)
                    .map_err(|_| TaskweaveError::ExecutorShutDown)?;
            }
            Ok(())
        })
    }
}
