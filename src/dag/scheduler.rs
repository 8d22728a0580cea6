// src/dag/scheduler.rs

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::dag::graph::TaskGraph;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::task_info::{RunState, TaskInfo, TaskRunState};
use crate::types::TaskId;

/// Pure scheduling state machine: no tasks, no threads, only ids.
///
/// It is responsible for:
/// - tracking submitted tasks and the dependencies they are still waiting on
/// - moving tasks to Ready once every dependency has resolved
/// - handing Ready tasks worker slots in FIFO order, up to the ceiling
/// - forgetting tasks once they resolve (finish or cancel)
#[derive(Debug)]
pub struct Scheduler {
    graph: TaskGraph,
    ready: VecDeque<TaskId>,
    running: usize,
    max_concurrent: Option<usize>,
    /// Set on shutdown: nothing new is dispatched.
    draining: bool,
}

impl Scheduler {
    /// `None` means unbounded; `Some(0)` is treated as `Some(1)`.
    pub fn new(max_concurrent: Option<usize>) -> Self {
        Self {
            graph: TaskGraph::new(),
            ready: VecDeque::new(),
            running: 0,
            max_concurrent: max_concurrent.map(|max| max.max(1)),
            draining: false,
        }
    }

    pub fn max_concurrent(&self) -> Option<usize> {
        self.max_concurrent
    }

    /// `true` when no submitted task is outstanding.
    pub fn is_idle(&self) -> bool {
        self.graph.is_empty()
    }

    pub fn is_draining(&self) -> bool {
        self.draining
    }

    pub fn running_count(&self) -> usize {
        self.running
    }

    pub fn outstanding(&self) -> Vec<TaskId> {
        self.graph.ids()
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Read-only view of a task's scheduling state.
    pub fn run_state_of(&self, id: TaskId) -> TaskRunState {
        self.graph.get(id).map(|info| info.run_state).into()
    }

    /// Track a batch of newly submitted tasks.
    ///
    /// All records are inserted before any edge is connected, so tasks in
    /// the same batch may depend on each other in any order.
    pub fn submit(&mut self, tasks: Vec<TaskInfo>) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        let mut accepted = Vec::with_capacity(tasks.len());

        for info in tasks {
            let id = info.id;
            if self.graph.is_resolved(id) {
                debug!(task = %info.label, %id, "submitted task already resolved; not tracking");
                step.resolved.push(id);
                continue;
            }
            if !self.graph.insert(info) {
                warn!(%id, "task submitted twice; ignoring duplicate");
                continue;
            }
            accepted.push(id);
        }

        for id in accepted {
            step.watch.extend(self.graph.connect(id));
            let met = self
                .graph
                .get(id)
                .is_some_and(|info| info.unmet.is_empty());
            if met {
                self.make_ready(id, &mut step);
            }
        }

        self.pump(&mut step);
        step.idle = self.is_idle();
        step
    }

    /// A task (tracked or foreign) reached a terminal state.
    ///
    /// Duplicate notifications are ignored.
    pub fn resolve(&mut self, id: TaskId) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        let Some(resolution) = self.graph.resolve(id) else {
            step.idle = self.is_idle();
            return step;
        };

        if let Some(record) = resolution.record {
            if record.run_state == RunState::Running {
                self.running = self.running.saturating_sub(1);
            }
            debug!(task = %record.label, %id, "task resolved");
            step.resolved.push(id);
        }

        for waiter in resolution.waiters {
            let Some(info) = self.graph.get_mut(waiter) else {
                continue;
            };
            info.unmet.remove(&id);
            if info.unmet.is_empty() && info.run_state == RunState::Pending {
                self.make_ready(waiter, &mut step);
            }
        }

        self.pump(&mut step);
        step.idle = self.is_idle();
        step
    }

    /// Stop dispatching and return every outstanding task so the caller can
    /// cancel it.
    pub fn begin_drain(&mut self) -> Vec<TaskId> {
        if !self.draining {
            debug!(outstanding = self.graph.len(), "scheduler draining");
        }
        self.draining = true;
        self.ready.clear();
        self.graph.ids()
    }

    fn make_ready(&mut self, id: TaskId, step: &mut SchedulerStep) {
        if self.draining {
            return;
        }
        if let Some(info) = self.graph.get_mut(id) {
            info.run_state = RunState::Ready;
            self.ready.push_back(id);
            step.newly_ready.push(id);
        }
    }

    fn has_capacity(&self) -> bool {
        self.max_concurrent.is_none_or(|max| self.running < max)
    }

    fn pump(&mut self, step: &mut SchedulerStep) {
        if self.draining {
            return;
        }
        while self.has_capacity() {
            let Some(id) = self.ready.pop_front() else {
                break;
            };
            let Some(info) = self.graph.get_mut(id) else {
                // Resolved (cancelled) while queued.
                continue;
            };
            if info.run_state != RunState::Ready {
                continue;
            }
            info.run_state = RunState::Running;
            self.running += 1;
            step.dispatched.push(id);
        }
    }
}
