// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`CoreEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from the executor's channel
//! - translating task handles into [`TaskInfo`](crate::dag::TaskInfo)
//! - dispatching tasks to the backend, cancelling, watching
//!
//! The core is unit tested without any Tokio, channels or task bodies.

use crate::dag::Scheduler;
use crate::engine::CoreEvent;
use crate::engine::event_handlers::{
    CoreStep, handle_resolved, handle_shutdown, handle_submitted,
};

/// Pure core runtime state.
///
/// It has **no** channels, no Tokio types, and does not run any task.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    shutting_down: bool,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler,
            shutting_down: false,
        }
    }

    /// Expose whether the scheduler is idle (for tests).
    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Handle a single event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: CoreEvent) -> CoreStep {
        match event {
            CoreEvent::Submitted(tasks) => {
                handle_submitted(&mut self.scheduler, self.shutting_down, tasks)
            }
            CoreEvent::Resolved(id) => {
                handle_resolved(&mut self.scheduler, self.shutting_down, id)
            }
            CoreEvent::ShutdownRequested => {
                self.shutting_down = true;
                handle_shutdown(&mut self.scheduler)
            }
        }
    }
}
