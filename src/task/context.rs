// src/task/context.rs

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use crate::config::Timing;
use crate::exec::{AffinityContext, RunEnv};
use crate::executor::Executor;
use crate::task::{Dependency, ErasedOutcome, Outcome, first_capability, first_output};
use crate::types::{TaskId, TaskState};

/// What a running body can see: its own identity, its dependencies'
/// outputs, and the executor it runs on.
#[derive(Clone)]
pub struct TaskContext {
    outcome: Arc<dyn ErasedOutcome>,
    dependencies: Arc<[Dependency]>,
    env: RunEnv,
}

impl TaskContext {
    pub(crate) fn new(
        outcome: Arc<dyn ErasedOutcome>,
        dependencies: Vec<Dependency>,
        env: RunEnv,
    ) -> Self {
        Self {
            outcome,
            dependencies: dependencies.into(),
            env,
        }
    }

    pub fn id(&self) -> TaskId {
        self.outcome.id()
    }

    pub fn label(&self) -> &str {
        self.outcome.label()
    }

    pub fn is_cancelled(&self) -> bool {
        self.outcome.state() == TaskState::Cancelled
    }

    /// Finished or cancelled. Long-running bodies poll this to stop early.
    pub fn is_terminal(&self) -> bool {
        self.outcome.state().is_terminal()
    }

    pub fn dependency_ids(&self) -> Vec<TaskId> {
        self.dependencies.iter().map(Dependency::id).collect()
    }

    /// First published output of type `U` among the direct dependencies, in
    /// the order they were declared.
    pub fn output_from_dependency<U: 'static>(&self) -> Option<&U> {
        first_output(&self.dependencies)
    }

    /// Whether any direct dependency produces a `U`, published or not.
    pub fn has_dependency_producing<U: 'static>(&self) -> bool {
        self.dependencies
            .iter()
            .any(|dep| dep.outcome.output_type() == TypeId::of::<U>())
    }

    /// First dependency built from an operation of type `C`.
    pub fn typed_dependency<C: Send + Sync + 'static>(&self) -> Option<Arc<C>> {
        first_capability(&self.dependencies)
    }

    /// The executor running this task, if it is still alive.
    pub fn executor(&self) -> Option<Executor> {
        self.env.executor.upgrade()
    }

    pub fn affinity(&self) -> &AffinityContext {
        &self.env.affinity
    }

    pub fn timing(&self) -> &Timing {
        &self.env.timing
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("id", &self.id())
            .field("label", &self.label())
            .field("dependencies", &self.dependency_ids())
            .finish()
    }
}

/// Completes a deferred task. Cloneable and `Send`, so it can be moved into
/// whatever callback eventually produces the result.
pub struct Finisher<T> {
    outcome: Arc<Outcome<T>>,
}

impl<T: Send + Sync + 'static> Finisher<T> {
    pub(crate) fn new(outcome: Arc<Outcome<T>>) -> Self {
        Self { outcome }
    }

    pub fn id(&self) -> TaskId {
        self.outcome.id()
    }

    /// Publish `output`. Returns `false` if the task was already terminal.
    pub fn finish(&self, output: T) -> bool {
        self.outcome.finish(Some(output))
    }

    pub fn finish_with(&self, output: Option<T>) -> bool {
        self.outcome.finish(output)
    }

    /// Finish without publishing an output.
    pub fn finish_empty(&self) -> bool {
        self.outcome.finish(None)
    }

    pub fn cancel(&self) -> bool {
        self.outcome.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.outcome.state() == TaskState::Cancelled
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.state().is_terminal()
    }
}

impl<T> Clone for Finisher<T> {
    fn clone(&self) -> Self {
        Self {
            outcome: self.outcome.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> fmt::Debug for Finisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Finisher")
            .field("task", &self.outcome.label())
            .finish()
    }
}

/// Typed, read-only view of another task's output.
pub struct Input<T> {
    outcome: Arc<Outcome<T>>,
}

impl<T: Send + Sync + 'static> Input<T> {
    pub(crate) fn new(outcome: Arc<Outcome<T>>) -> Self {
        Self { outcome }
    }

    /// Id of the producing task.
    pub fn source(&self) -> TaskId {
        self.outcome.id()
    }

    pub fn is_available(&self) -> bool {
        self.outcome.output().is_some()
    }

    pub fn get(&self) -> Option<&T> {
        self.outcome.output()
    }
}

impl<T> Clone for Input<T> {
    fn clone(&self) -> Self {
        Self {
            outcome: self.outcome.clone(),
        }
    }
}
