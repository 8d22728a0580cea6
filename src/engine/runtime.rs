// src/engine/runtime.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::dag::TaskInfo;
use crate::exec::ExecutorBackend;
use crate::task::{ErasedOutcome, TaskHandle};
use crate::types::TaskId;

use super::core::CoreRuntime;
use super::{CoreCommand, CoreEvent, RuntimeEvent};

/// Drives the scheduler core in response to [`RuntimeEvent`]s, and
/// delegates running tasks to an [`ExecutorBackend`].
///
/// This is the IO shell around [`CoreRuntime`], which contains all the
/// scheduling semantics. The shell owns what the core must not see: the
/// task handles, the terminal listeners, and the backend.
pub struct Runtime<E: ExecutorBackend> {
    name: String,
    core: CoreRuntime,
    event_rx: mpsc::UnboundedReceiver<RuntimeEvent>,
    /// Cloned into terminal listeners so resolutions come back as events.
    event_tx: mpsc::UnboundedSender<RuntimeEvent>,
    backend: E,
    /// Handles of every outstanding task submitted here.
    tasks: HashMap<TaskId, TaskHandle>,
    /// Dependency outcomes seen in the current submission, so foreign ones
    /// can be watched.
    pending_watch: HashMap<TaskId, Arc<dyn ErasedOutcome>>,
    shutdown_acks: Vec<oneshot::Sender<()>>,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("name", &self.name)
            .field("core", &self.core)
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(
        name: impl Into<String>,
        core: CoreRuntime,
        event_rx: mpsc::UnboundedReceiver<RuntimeEvent>,
        event_tx: mpsc::UnboundedSender<RuntimeEvent>,
        backend: E,
    ) -> Self {
        Self {
            name: name.into(),
            core,
            event_rx,
            event_tx,
            backend,
            tasks: HashMap::new(),
            pending_watch: HashMap::new(),
            shutdown_acks: Vec::new(),
        }
    }

    /// Main event loop.
    ///
    /// - Consumes `RuntimeEvent`s from `event_rx`.
    /// - Translates them into `CoreEvent`s for the pure core.
    /// - Executes the commands returned by the core.
    ///
    /// Returns once a shutdown has drained every outstanding task.
    pub async fn run(mut self) {
        info!(executor = %self.name, "executor runtime started");

        while let Some(event) = self.event_rx.recv().await {
            debug!(executor = %self.name, ?event, "runtime received event");

            let core_event = match event {
                RuntimeEvent::Submit(tasks) => CoreEvent::Submitted(self.register(tasks)),
                RuntimeEvent::Resolved(id) => CoreEvent::Resolved(id),
                RuntimeEvent::Shutdown(ack) => {
                    self.shutdown_acks.extend(ack);
                    CoreEvent::ShutdownRequested
                }
            };

            let step = self.core.step(core_event);
            for command in step.commands {
                self.execute_command(command).await;
            }
            self.pending_watch.clear();

            if !step.keep_running {
                info!(executor = %self.name, "executor drained; stopping runtime");
                break;
            }
        }

        for ack in self.shutdown_acks.drain(..) {
            let _ = ack.send(());
        }
        info!(executor = %self.name, "executor runtime exiting");
    }

    /// Take ownership of submitted handles and hook their resolution back
    /// into the event loop.
    fn register(&mut self, tasks: Vec<TaskHandle>) -> Vec<TaskInfo> {
        let mut infos = Vec::with_capacity(tasks.len());

        for task in tasks {
            let id = task.id();
            let deps = task.0.dependencies();
            for dep in &deps {
                self.pending_watch
                    .entry(dep.id())
                    .or_insert_with(|| dep.outcome.clone());
            }
            infos.push(TaskInfo::new(
                id,
                task.label(),
                deps.iter().map(|dep| dep.id()).collect(),
            ));

            let tx = self.event_tx.clone();
            task.0.outcome().on_terminal(Box::new(move || {
                let _ = tx.send(RuntimeEvent::Resolved(id));
            }));
            self.tasks.insert(id, task);
        }

        infos
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) {
        match command {
            CoreCommand::MarkReady(ids) => {
                for id in ids {
                    if let Some(task) = self.tasks.get(&id) {
                        task.0.mark_ready();
                    }
                }
            }
            CoreCommand::Dispatch(ids) => self.dispatch(ids).await,
            CoreCommand::Watch(ids) => {
                for id in ids {
                    let Some(outcome) = self.pending_watch.remove(&id) else {
                        warn!(executor = %self.name, dependency = %id, "no outcome to watch for foreign dependency");
                        continue;
                    };
                    debug!(executor = %self.name, dependency = %outcome.label(), "watching dependency submitted elsewhere");
                    let tx = self.event_tx.clone();
                    outcome.on_terminal(Box::new(move || {
                        let _ = tx.send(RuntimeEvent::Resolved(id));
                    }));
                }
            }
            CoreCommand::Cancel(ids) => {
                for id in ids {
                    if let Some(task) = self.tasks.get(&id) {
                        task.cancel();
                    }
                }
            }
            CoreCommand::Forget(ids) => {
                for id in ids {
                    self.tasks.remove(&id);
                }
            }
        }
    }

    async fn dispatch(&mut self, ids: Vec<TaskId>) {
        let tasks: Vec<TaskHandle> = ids
            .iter()
            .filter_map(|id| self.tasks.get(id).cloned())
            .collect();
        if tasks.is_empty() {
            return;
        }

        let labels: Vec<&str> = tasks.iter().map(TaskHandle::label).collect();
        debug!(executor = %self.name, ?labels, "dispatching ready tasks");

        if let Err(err) = self.backend.dispatch(tasks.clone()).await {
            error!(executor = %self.name, error = %err, "backend failed to dispatch; cancelling tasks");
            for task in tasks {
                task.cancel();
            }
        }
    }
}
