// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use tracing::debug;

use crate::dag::{Scheduler, SchedulerStep, TaskInfo};
use crate::types::TaskId;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Flip these tasks to Ready (all dependencies resolved).
    MarkReady(Vec<TaskId>),
    /// Hand these tasks to the executor backend, in order.
    Dispatch(Vec<TaskId>),
    /// Report back when these dependencies, submitted elsewhere, resolve.
    Watch(Vec<TaskId>),
    /// Cancel these tasks.
    Cancel(Vec<TaskId>),
    /// Drop the shell's handles for these resolved tasks.
    Forget(Vec<TaskId>),
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone, Default)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

/// Handle newly submitted tasks.
///
/// While shutting down, submissions are not tracked; they are cancelled
/// straight away.
pub fn handle_submitted(
    scheduler: &mut Scheduler,
    shutting_down: bool,
    tasks: Vec<TaskInfo>,
) -> CoreStep {
    if shutting_down {
        let ids: Vec<TaskId> = tasks.iter().map(|info| info.id).collect();
        debug!(count = ids.len(), "submission during shutdown; cancelling");
        return CoreStep {
            commands: vec![CoreCommand::Cancel(ids)],
            keep_running: true,
        };
    }

    let step = scheduler.submit(tasks);
    CoreStep {
        commands: commands_from(step),
        keep_running: true,
    }
}

/// Handle a task becoming terminal.
pub fn handle_resolved(scheduler: &mut Scheduler, shutting_down: bool, id: TaskId) -> CoreStep {
    let step = scheduler.resolve(id);
    let idle = step.idle;
    CoreStep {
        commands: commands_from(step),
        keep_running: !(shutting_down && idle),
    }
}

/// Handle a shutdown request: cancel everything outstanding.
///
/// The loop keeps running until the cancellations come back as
/// resolutions and the scheduler is idle.
pub fn handle_shutdown(scheduler: &mut Scheduler) -> CoreStep {
    let outstanding = scheduler.begin_drain();
    debug!(outstanding = outstanding.len(), "shutdown requested");

    let mut commands = Vec::new();
    if !outstanding.is_empty() {
        commands.push(CoreCommand::Cancel(outstanding));
    }
    CoreStep {
        commands,
        keep_running: !scheduler.is_idle(),
    }
}

fn commands_from(step: SchedulerStep) -> Vec<CoreCommand> {
    let mut commands = Vec::new();
    if !step.resolved.is_empty() {
        commands.push(CoreCommand::Forget(step.resolved));
    }
    if !step.watch.is_empty() {
        commands.push(CoreCommand::Watch(step.watch));
    }
    if !step.newly_ready.is_empty() {
        commands.push(CoreCommand::MarkReady(step.newly_ready));
    }
    if !step.dispatched.is_empty() {
        commands.push(CoreCommand::Dispatch(step.dispatched));
    }
    commands
}
