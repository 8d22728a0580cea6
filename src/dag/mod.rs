// src/dag/mod.rs

//! Dependency graph and scheduling.
//!
//! - [`graph`] holds the arena of outstanding tasks keyed by id.
//! - [`scheduler`] contains the pure state machine that decides which
//!   tasks are ready and which get a worker slot.
//! - [`task_info`] provides per-task scheduling metadata.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`batching`] wires whole sequences of tasks (chains, batches).

pub mod batching;
pub mod graph;
pub mod scheduler;
pub mod scheduler_step;
pub mod task_info;

pub use batching::{TaskSliceExt, batched, chained};
pub use graph::TaskGraph;
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
pub use task_info::{TaskInfo, TaskRunState};
