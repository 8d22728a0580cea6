// src/engine/mod.rs

//! Executor engine.
//!
//! This module ties together:
//! - the pure scheduler core
//! - the event loop that reacts to:
//!   - task submissions
//!   - tasks (local or foreign) becoming terminal
//!   - shutdown requests
//!
//! The pure core state machine lives in [`core`]; the async/IO shell that
//! owns the task handles is implemented in [`runtime`].

use std::fmt;

use tokio::sync::oneshot;

use crate::dag::TaskInfo;
use crate::task::TaskHandle;
use crate::types::TaskId;

/// Events consumed by the pure core.
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// New tasks, already stripped down to ids and edges.
    Submitted(Vec<TaskInfo>),
    /// A task reached a terminal state.
    Resolved(TaskId),
    /// Cancel everything outstanding and stop once idle.
    ShutdownRequested,
}

/// Events flowing into the runtime shell from executor handles and from
/// terminal listeners registered on tasks.
pub enum RuntimeEvent {
    Submit(Vec<TaskHandle>),
    Resolved(TaskId),
    /// `None` when sent from `Drop` (nobody waits for the acknowledgement).
    Shutdown(Option<oneshot::Sender<()>>),
}

impl fmt::Debug for RuntimeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeEvent::Submit(tasks) => f
                .debug_tuple("Submit")
                .field(&tasks.iter().map(TaskHandle::id).collect::<Vec<_>>())
                .finish(),
            RuntimeEvent::Resolved(id) => f.debug_tuple("Resolved").field(id).finish(),
            RuntimeEvent::Shutdown(ack) => f
                .debug_tuple("Shutdown")
                .field(&ack.is_some())
                .finish(),
        }
    }
}

pub mod core;
pub mod event_handlers;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::Runtime;
