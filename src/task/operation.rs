// src/task/operation.rs

use crate::task::{Finisher, TaskContext};
use crate::types::Affinity;

/// A struct-based task body.
///
/// `execute` starts the work and eventually completes it through the
/// [`Finisher`], possibly from another thread. Wrap an operation with
/// [`Task::from_operation`](crate::Task::from_operation); the operation value
/// stays reachable from dependents through `typed_dependency`.
pub trait Operation: Send + Sync + 'static {
    type Output: Send + Sync + 'static;

    fn execute(&self, finisher: Finisher<Self::Output>, cx: &TaskContext);

    /// Where `execute` runs. Defaults to the worker pool.
    fn affinity(&self) -> Affinity {
        Affinity::Pool
    }

    /// Label for logs; `None` keeps the default `task-<id>`.
    fn label(&self) -> Option<String> {
        None
    }

    /// Called right before `execute`.
    fn will_start(&self, _cx: &TaskContext) {}

    /// Called with the output right before it is published. Not called on
    /// cancellation.
    fn will_finish(&self, _output: Option<&Self::Output>) {}
}
