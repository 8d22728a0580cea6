// src/exec/executor_loop.rs

//! Worker loop that runs dispatched tasks.

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::exec::{RunEnv, panic_message};
use crate::task::TaskHandle;

/// Spawn the background worker loop.
///
/// The returned sender is what [`RealExecutorBackend`](super::RealExecutorBackend)
/// forwards dispatched tasks to. Each task runs in its own tokio task; the
/// scheduler already enforces the concurrency ceiling, so the loop never
/// holds tasks back.
pub fn spawn_worker_loop(env: RunEnv) -> mpsc::UnboundedSender<TaskHandle> {
    let (tx, mut rx) = mpsc::unbounded_channel::<TaskHandle>();

    tokio::spawn(async move {
        debug!("worker loop started");

        while let Some(task) = rx.recv().await {
            spawn_runner(task, env.clone());
        }

        info!("worker loop finished (channel closed)");
    });

    tx
}

/// Run one task, cancelling it if its runner dies without making it
/// terminal (a panicking future body, or the runtime shutting down).
fn spawn_runner(task: TaskHandle, env: RunEnv) {
    tokio::spawn(async move {
        let runner = tokio::spawn(task.0.start(env));
        match runner.await {
            Ok(()) => {
                debug!(task = %task.label(), id = %task.id(), "task runner finished");
            }
            Err(err) if err.is_panic() => {
                let reason = panic_message(err.into_panic().as_ref());
                error!(
                    task = %task.label(),
                    id = %task.id(),
                    panic = %reason,
                    "task runner panicked; cancelling task"
                );
                task.cancel();
            }
            Err(err) => {
                warn!(
                    task = %task.label(),
                    id = %task.id(),
                    error = %err,
                    "task runner aborted; cancelling task"
                );
                task.cancel();
            }
        }
    });
}
