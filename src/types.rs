// src/types.rs

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a task.
///
/// Two handles refer to the same task exactly when their ids are equal; the
/// scheduler graph keys every record by this id instead of holding the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a task.
///
/// - `Pending`: created or submitted, waiting on dependencies.
/// - `Ready`: every dependency is terminal; waiting for a worker slot.
/// - `Running`: a worker picked it up.
/// - `Finished` / `Cancelled`: terminal. Dependents treat both as satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Pending,
    Ready,
    Running,
    Finished,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Finished | TaskState::Cancelled)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Ready => "ready",
            TaskState::Running => "running",
            TaskState::Finished => "finished",
            TaskState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// How a task's body is executed once a worker picks it up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discipline {
    /// Body returns the output directly on a blocking worker.
    Sync,
    /// Body starts external work and returns; the worker slot is held until
    /// someone calls `finish` or `cancel`.
    Deferred,
    /// Like `Deferred`, but the body runs on the affinity context.
    Affinity,
    /// Body is a future driven by the tokio runtime.
    Future,
}

/// Where an [`Operation`](crate::task::Operation) wants its `execute` to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Affinity {
    #[default]
    Pool,
    Designated,
}

impl FromStr for Affinity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pool" => Ok(Affinity::Pool),
            "designated" | "affinity" | "main" => Ok(Affinity::Designated),
            other => Err(format!(
                "invalid affinity: {other} (expected \"pool\" or \"designated\")"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_ids_are_unique_and_increasing() {
        let a = TaskId::next();
        let b = TaskId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn terminal_states() {
        assert!(TaskState::Finished.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(!TaskState::Pending.is_terminal());
    }

    #[test]
    fn affinity_parses_aliases() {
        assert_eq!("main".parse::<Affinity>(), Ok(Affinity::Designated));
        assert_eq!(" Pool ".parse::<Affinity>(), Ok(Affinity::Pool));
        assert!("gpu".parse::<Affinity>().is_err());
    }
}
