// src/task/outcome.rs

//! Shared completion record of a task.
//!
//! An [`Outcome`] is the only part of a task that other tasks hold on to:
//! dependents keep the outcome of each dependency (to read its output), the
//! executor registers terminal listeners on it, and [`Finisher`]s publish
//! through it. It never references the task body, so dependency edges cannot
//! form ownership cycles.
//!
//! [`Finisher`]: crate::task::Finisher

use std::any::{Any, TypeId};
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};

use tokio::sync::watch;
use tracing::debug;

use crate::task::lock;
use crate::types::{TaskId, TaskState};

/// Callback run once when a task reaches a terminal state.
pub(crate) type Listener = Box<dyn FnOnce() + Send>;

/// Hook invoked right before an output is published.
pub(crate) type FinishHook<T> = Box<dyn Fn(Option<&T>) + Send + Sync>;

/// One-shot gate: starts closed, opens exactly once, never closes again.
#[derive(Debug)]
pub(crate) struct Gate {
    tx: watch::Sender<bool>,
}

impl Gate {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub(crate) fn open(&self) {
        self.tx.send_replace(true);
    }

    pub(crate) fn is_open(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the gate is open (immediately if it already is).
    pub(crate) async fn opened(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|open| *open).await;
    }
}

pub(crate) struct Outcome<T> {
    id: TaskId,
    default_label: String,
    label: OnceLock<String>,
    state: Mutex<TaskState>,
    /// Set by whoever wins the right to make the task terminal.
    claimed: AtomicBool,
    output: OnceLock<T>,
    gate: Gate,
    /// `None` once the listeners have fired.
    listeners: Mutex<Option<Vec<Listener>>>,
    cancel_hooks: Mutex<Vec<Listener>>,
    will_finish: Option<FinishHook<T>>,
}

impl<T: Send + Sync + 'static> Outcome<T> {
    pub(crate) fn new(id: TaskId, will_finish: Option<FinishHook<T>>) -> Self {
        Self {
            id,
            default_label: format!("task-{}", id.as_u64()),
            label: OnceLock::new(),
            state: Mutex::new(TaskState::Pending),
            claimed: AtomicBool::new(false),
            output: OnceLock::new(),
            gate: Gate::new(),
            listeners: Mutex::new(Some(Vec::new())),
            cancel_hooks: Mutex::new(Vec::new()),
            will_finish,
        }
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn label(&self) -> &str {
        self.label
            .get()
            .map(String::as_str)
            .unwrap_or(&self.default_label)
    }

    /// Set a human-readable label. Only the first call has an effect.
    pub(crate) fn set_label(&self, label: String) -> bool {
        self.label.set(label).is_ok()
    }

    pub(crate) fn state(&self) -> TaskState {
        *lock(&self.state)
    }

    pub(crate) fn output(&self) -> Option<&T> {
        self.output.get()
    }

    pub(crate) fn gate(&self) -> &Gate {
        &self.gate
    }

    /// Pending -> Ready. Any other state is left alone.
    pub(crate) fn mark_ready(&self) {
        let mut state = lock(&self.state);
        if *state == TaskState::Pending {
            *state = TaskState::Ready;
        }
    }

    /// Pending/Ready -> Running. Returns `false` if the task is already
    /// terminal (or about to be), in which case its body must not run.
    pub(crate) fn mark_running(&self) -> bool {
        let mut state = lock(&self.state);
        if self.claimed.load(Ordering::Acquire) || state.is_terminal() {
            return false;
        }
        *state = TaskState::Running;
        true
    }

    /// Publish `output` and move to `Finished`.
    ///
    /// Returns `false` (and changes nothing) if the task was already
    /// finished or cancelled.
    pub(crate) fn finish(&self, output: Option<T>) -> bool {
        if self.claimed.swap(true, Ordering::AcqRel) {
            debug!(
                task = %self.label(),
                id = %self.id,
                "finish on a terminal task; ignoring"
            );
            return false;
        }

        if let Some(hook) = &self.will_finish {
            hook(output.as_ref());
        }

        let has_output = output.is_some();
        if let Some(value) = output {
            let _ = self.output.set(value);
        }
        *lock(&self.state) = TaskState::Finished;

        debug!(task = %self.label(), id = %self.id, has_output, "task finished");
        self.settle();
        true
    }

    /// Move to `Cancelled` with no output, running cancellation hooks first.
    pub(crate) fn cancel(&self) -> bool {
        if self.claimed.swap(true, Ordering::AcqRel) {
            return false;
        }
        *lock(&self.state) = TaskState::Cancelled;
        debug!(task = %self.label(), id = %self.id, "task cancelled");

        let hooks = mem::take(&mut *lock(&self.cancel_hooks));
        for hook in hooks {
            hook();
        }

        self.settle();
        true
    }

    /// Run `hook` when (and only if) the task gets cancelled.
    pub(crate) fn on_cancel(&self, hook: Listener) {
        let mut hooks = lock(&self.cancel_hooks);
        if self.state() == TaskState::Cancelled {
            drop(hooks);
            hook();
        } else {
            hooks.push(hook);
        }
    }

    /// Run `listener` once the task is terminal; immediately if it already is.
    pub(crate) fn on_terminal(&self, listener: Listener) {
        let mut listeners = lock(&self.listeners);
        match listeners.as_mut() {
            Some(pending) => pending.push(listener),
            None => {
                drop(listeners);
                listener();
            }
        }
    }

    fn settle(&self) {
        self.gate.open();
        let fired = lock(&self.listeners).take().unwrap_or_default();
        for listener in fired {
            listener();
        }
    }
}

/// Type-erased view of an [`Outcome`], used wherever the output type of a
/// task is not statically known (dependency lists, the executor).
pub(crate) trait ErasedOutcome: Send + Sync {
    fn id(&self) -> TaskId;
    fn label(&self) -> &str;
    fn state(&self) -> TaskState;
    fn output_type(&self) -> TypeId;
    fn output_any(&self) -> Option<&(dyn Any + Send + Sync)>;
    fn gate(&self) -> &Gate;
    fn on_terminal(&self, listener: Listener);
    fn cancel(&self) -> bool;
}

impl<T: Send + Sync + 'static> ErasedOutcome for Outcome<T> {
    fn id(&self) -> TaskId {
        Outcome::id(self)
    }

    fn label(&self) -> &str {
        Outcome::label(self)
    }

    fn state(&self) -> TaskState {
        Outcome::state(self)
    }

    fn output_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn output_any(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.output
            .get()
            .map(|value| value as &(dyn Any + Send + Sync))
    }

    fn gate(&self) -> &Gate {
        Outcome::gate(self)
    }

    fn on_terminal(&self, listener: Listener) {
        Outcome::on_terminal(self, listener)
    }

    fn cancel(&self) -> bool {
        Outcome::cancel(self)
    }
}
