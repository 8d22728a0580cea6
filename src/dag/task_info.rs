// src/dag/task_info.rs

//! Task metadata and scheduling state tracked by the scheduler core.

use std::collections::HashSet;

use crate::types::TaskId;

/// Scheduling state of a tracked task (internal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunState {
    /// Submitted, waiting on at least one dependency.
    Pending,
    /// All dependencies resolved; queued for a worker slot.
    Ready,
    /// Handed to the executor backend.
    Running,
}

/// Public, read-only view of a task's scheduling state.
///
/// Exposed for tests and diagnostics without leaking the internal
/// `RunState` type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRunState {
    /// Never submitted here, or already resolved and forgotten.
    NotTracked,
    Pending,
    Ready,
    Running,
}

impl From<Option<RunState>> for TaskRunState {
    fn from(state: Option<RunState>) -> Self {
        match state {
            None => TaskRunState::NotTracked,
            Some(RunState::Pending) => TaskRunState::Pending,
            Some(RunState::Ready) => TaskRunState::Ready,
            Some(RunState::Running) => TaskRunState::Running,
        }
    }
}

/// What the scheduler needs to know about a submitted task.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub id: TaskId,
    pub label: String,
    /// Direct dependencies, in declaration order.
    pub deps: Vec<TaskId>,

    /// Dependencies not yet resolved.
    pub(crate) unmet: HashSet<TaskId>,
    pub(crate) run_state: RunState,
}

impl TaskInfo {
    pub fn new(id: TaskId, label: impl Into<String>, deps: Vec<TaskId>) -> Self {
        Self {
            id,
            label: label.into(),
            unmet: deps.iter().copied().collect(),
            deps,
            run_state: RunState::Pending,
        }
    }
}
