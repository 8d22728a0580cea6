// src/exec/retention.rs

//! Retention of fire-and-forget tasks until their completion callback has
//! been delivered.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use tracing::{debug, error, warn};

use crate::exec::{AffinityContext, panic_message};
use crate::task::{TaskHandle, lock};
use crate::types::TaskId;

/// Per-executor set of tasks with a pending completion callback.
#[derive(Clone, Default)]
pub struct RetentionSet {
    inner: Arc<Mutex<HashMap<TaskId, TaskHandle>>>,
}

impl RetentionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `task` alive. Returns `false` if it was already retained.
    pub fn retain(&self, task: TaskHandle) -> bool {
        lock(&self.inner).insert(task.id(), task).is_none()
    }

    pub fn get(&self, id: TaskId) -> Option<TaskHandle> {
        lock(&self.inner).get(&id).cloned()
    }

    pub fn contains(&self, id: TaskId) -> bool {
        lock(&self.inner).contains_key(&id)
    }

    pub fn release(&self, id: TaskId) -> bool {
        lock(&self.inner).remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).is_empty()
    }
}

/// If `task` carries a completion callback, retain it and arrange for the
/// callback to run on `affinity` once the task is terminal, releasing the
/// retention entry right after.
pub(crate) fn arm_completion(task: &TaskHandle, retention: &RetentionSet, affinity: &AffinityContext) {
    if !task.0.has_callback() {
        return;
    }

    let id = task.id();
    retention.retain(task.clone());

    let retention = retention.clone();
    let affinity = affinity.clone();
    task.0.outcome().on_terminal(Box::new(move || {
        let delivery = retention.clone();
        let delivered = affinity.dispatch(move || {
            deliver(&delivery, id);
        });
        if !delivered {
            warn!(%id, "affinity context is gone; releasing task without its callback");
            retention.release(id);
        }
    }));
}

fn deliver(retention: &RetentionSet, id: TaskId) {
    let callback = retention.get(id).and_then(|task| task.0.take_callback());
    if let Some(callback) = callback {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
            error!(
                %id,
                panic = %panic_message(payload.as_ref()),
                "completion callback panicked"
            );
        }
    }
    retention.release(id);
    debug!(%id, retained = retention.len(), "completion delivered");
}
