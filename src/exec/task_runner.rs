// src/exec/task_runner.rs

//! Runs a single task according to its discipline.

use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error, warn};

use crate::exec::{RunEnv, panic_message};
use crate::task::{Body, Task};

/// Run `task` to completion.
///
/// - A task that is already terminal (cancelled while Ready) never runs its
///   body.
/// - Sync bodies run on the blocking pool; a panic cancels the task.
/// - Deferred and affinity bodies only *start* the work; the runner then
///   holds the worker slot until the task's gate opens.
/// - Future bodies race against the gate, so cancellation drops the future.
pub(crate) async fn run_task<T: Send + Sync + 'static>(task: Task<T>, env: RunEnv) {
    if !task.outcome().mark_running() {
        debug!(
            task = %task.label(),
            id = %task.id(),
            "task terminal before start; skipping body"
        );
        return;
    }

    let Some(body) = task.take_body() else {
        warn!(task = %task.label(), id = %task.id(), "task has no body left to run; cancelling");
        task.cancel();
        return;
    };

    debug!(
        task = %task.label(),
        id = %task.id(),
        discipline = ?task.discipline(),
        "task started"
    );

    let cx = task.context(env.clone());
    let finisher = task.finisher();

    match body {
        Body::Sync(body) => {
            match tokio::task::spawn_blocking(move || body(&cx)).await {
                Ok(output) => {
                    finisher.finish_with(output);
                }
                Err(err) => {
                    let reason = if err.is_panic() {
                        panic_message(err.into_panic().as_ref())
                    } else {
                        err.to_string()
                    };
                    error!(task = %task.label(), id = %task.id(), panic = %reason, "sync body panicked; cancelling task");
                    finisher.cancel();
                }
            }
        }

        Body::Deferred(start) => {
            let handed = finisher.clone();
            let started = tokio::task::spawn_blocking(move || start(handed, &cx)).await;
            if let Err(err) = started {
                let reason = if err.is_panic() {
                    panic_message(err.into_panic().as_ref())
                } else {
                    err.to_string()
                };
                error!(task = %task.label(), id = %task.id(), panic = %reason, "deferred body panicked; cancelling task");
                finisher.cancel();
            }
            task.outcome().gate().opened().await;
        }

        Body::Affinity(start) => {
            let handed = finisher.clone();
            let label = task.label().to_string();
            let dispatched = env.affinity.dispatch(move || {
                let guard = handed.clone();
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| start(handed, &cx))) {
                    error!(
                        task = %label,
                        panic = %panic_message(payload.as_ref()),
                        "affinity body panicked; cancelling task"
                    );
                    guard.cancel();
                }
            });
            if !dispatched {
                warn!(task = %task.label(), id = %task.id(), "affinity context is gone; cancelling task");
                finisher.cancel();
            }
            task.outcome().gate().opened().await;
        }

        Body::Future(body) => {
            let future = body(cx);
            tokio::select! {
                output = future => {
                    finisher.finish_with(output);
                }
                _ = task.outcome().gate().opened() => {
                    debug!(task = %task.label(), id = %task.id(), "task terminal while running; dropping future");
                }
            }
        }
    }
}
