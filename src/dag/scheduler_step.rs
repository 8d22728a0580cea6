// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::types::TaskId;

/// Structured result of a single scheduler "step".
///
/// Tests drive the scheduler by hand and assert on these; the engine turns
/// them into commands for the executor shell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStep {
    /// Tasks whose dependencies all resolved during this step.
    pub newly_ready: Vec<TaskId>,
    /// Tasks handed a worker slot during this step, in dispatch order.
    pub dispatched: Vec<TaskId>,
    /// Dependencies unknown to this scheduler; the shell must report their
    /// resolution back with [`Scheduler::resolve`](crate::dag::Scheduler::resolve).
    pub watch: Vec<TaskId>,
    /// Tracked tasks that were resolved (and forgotten) during this step.
    pub resolved: Vec<TaskId>,
    /// Whether nothing is outstanding after this step.
    pub idle: bool,
}
