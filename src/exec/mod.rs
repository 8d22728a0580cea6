// src/exec/mod.rs

//! Task execution layer.
//!
//! This module is responsible for actually running task bodies once the
//! scheduler hands them a worker slot.
//!
//! - [`backend`] provides the `ExecutorBackend` trait and the concrete
//!   `RealExecutorBackend` used in production, which tests can wrap or
//!   replace.
//! - [`executor_loop`] owns the worker loop that spawns one runner per task.
//! - [`task_runner`] runs a single task according to its discipline.
//! - [`affinity`] is the dedicated thread for designated work and callbacks.
//! - [`retention`] keeps callback-bearing tasks alive until delivery.

use std::any::Any;

use crate::config::Timing;
use crate::executor::{Executor, WeakExecutor};

pub mod affinity;
pub mod backend;
pub mod executor_loop;
pub mod retention;
pub mod task_runner;

pub use affinity::AffinityContext;
pub use backend::{ExecutorBackend, RealExecutorBackend};
pub use executor_loop::spawn_worker_loop;
pub use retention::RetentionSet;

/// Everything a running task may need from its executor.
///
/// Handed to backend factories by [`Executor::with_backend`].
#[derive(Clone, Debug)]
pub struct RunEnv {
    pub(crate) executor: WeakExecutor,
    pub(crate) affinity: AffinityContext,
    pub(crate) timing: Timing,
}

impl RunEnv {
    pub fn executor(&self) -> Option<Executor> {
        self.executor.upgrade()
    }

    pub fn affinity(&self) -> &AffinityContext {
        &self.affinity
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
