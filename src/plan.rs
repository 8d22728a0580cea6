// src/plan.rs

//! Running a validated [`PlanFile`] on a fresh executor.
//!
//! Every `[task.<name>]` entry becomes one task: a [`Wait`] when it has a
//! `wait` duration, an instant task otherwise, on the affinity context when
//! `affinity = true`. `after` lists become dependency edges and the whole
//! plan is queued in one submission.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::{PlanFile, TaskSpec};
use crate::errors::{Result, TaskweaveError};
use crate::executor::{Executor, QueueOptions};
use crate::primitives::Wait;
use crate::task::{Task, lock};
use crate::types::TaskState;

/// How one plan entry ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedTask {
    pub name: String,
    pub state: TaskState,
}

/// Result of [`run_plan`].
#[derive(Debug, Clone)]
pub struct PlanReport {
    pub executor: String,
    /// Plan entries in the order their completion callbacks ran.
    pub order: Vec<CompletedTask>,
    pub elapsed: Duration,
}

impl PlanReport {
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(|entry| entry.name.as_str()).collect()
    }

    pub fn finished_count(&self) -> usize {
        self.order
            .iter()
            .filter(|entry| entry.state == TaskState::Finished)
            .count()
    }
}

/// Run `plan` to completion. `max_concurrent` overrides the plan's own
/// ceiling when given.
pub async fn run_plan(plan: &PlanFile, max_concurrent: Option<usize>) -> Result<PlanReport> {
    let mut config = plan.executor_config();
    if max_concurrent.is_some() {
        config = config.with_max_concurrent(max_concurrent);
    }
    let executor = Executor::new(config)?;

    let order: Arc<Mutex<Vec<CompletedTask>>> = Arc::new(Mutex::new(Vec::new()));
    let tasks: HashMap<&str, Task<()>> = plan
        .task
        .iter()
        .map(|(name, spec)| (name.as_str(), build_task(name, spec, &order)))
        .collect();

    for (name, spec) in &plan.task {
        let Some(task) = tasks.get(name.as_str()) else {
            continue;
        };
        for dep in &spec.after {
            let dependency = tasks
                .get(dep.as_str())
                .ok_or_else(|| TaskweaveError::TaskNotFound(dep.clone()))?;
            task.after(dependency);
        }
    }

    // Dependencies first, so batch edges agree with `after` edges.
    let submission: Vec<Task<()>> = plan
        .submission_order()
        .iter()
        .filter_map(|name| tasks.get(name.as_str()).cloned())
        .collect();

    let (done_tx, done_rx) = oneshot::channel();
    let mut options = QueueOptions::new().on_complete(move |_| {
        let _ = done_tx.send(());
    });
    options = match plan.executor.batch_size {
        Some(size) => options.batch_size(size),
        None => options.unbatched(),
    };

    info!(
        executor = %executor.name(),
        tasks = submission.len(),
        "running plan"
    );
    let started = Instant::now();
    executor.queue(submission, options)?;
    done_rx
        .await
        .map_err(|_| TaskweaveError::ExecutorShutDown)?;
    let elapsed = started.elapsed();

    executor.shutdown().await;

    let order = std::mem::take(&mut *lock(&order));
    info!(
        executor = %executor.name(),
        elapsed_ms = elapsed.as_millis() as u64,
        "plan complete"
    );
    Ok(PlanReport {
        executor: executor.name().to_string(),
        order,
        elapsed,
    })
}

fn build_task(name: &str, spec: &TaskSpec, order: &Arc<Mutex<Vec<CompletedTask>>>) -> Task<()> {
    let wait = spec.wait_duration();
    let task = match (spec.affinity, wait) {
        (false, Some(duration)) => Wait::new(duration).into_task(),
        (false, None) => Task::sync(|_| Some(())),
        (true, wait) => Task::sync_on_affinity(move |_| {
            if let Some(duration) = wait {
                std::thread::sleep(duration);
            }
            Some(())
        }),
    }
    .named(name);

    let order = order.clone();
    task.then(move |task, _| {
        debug!(task = %task.label(), state = ?task.state(), "plan task done");
        lock(&order).push(CompletedTask {
            name: task.label().to_string(),
            state: task.state(),
        });
    });
    task
}

/// Print the plan without executing it.
pub fn print_dry_run(plan: &PlanFile) {
    let section = &plan.executor;
    println!("taskweave dry-run");
    println!("  executor.name = {}", section.name);
    match section.max_concurrent {
        Some(n) => println!("  executor.max_concurrent = {n}"),
        None => println!("  executor.max_concurrent = unbounded"),
    }
    match section.batch_size {
        Some(n) => println!("  executor.batch_size = {n}"),
        None => println!("  executor.batch_size = none"),
    }
    println!();

    println!("tasks ({}):", plan.task.len());
    for (name, spec) in &plan.task {
        println!("  - {name}");
        if let Some(wait) = &spec.wait {
            println!("      wait: {wait}");
        }
        if !spec.after.is_empty() {
            println!("      after: {:?}", spec.after);
        }
        if spec.affinity {
            println!("      affinity: true");
        }
    }

    debug!("dry-run complete (no execution)");
}

/// Print a finished run.
pub fn print_report(report: &PlanReport) {
    println!(
        "{}: {} of {} tasks finished in {:.3}s",
        report.executor,
        report.finished_count(),
        report.order.len(),
        report.elapsed.as_secs_f64()
    );
    for (position, entry) in report.order.iter().enumerate() {
        println!("  {:>3}. {} ({:?})", position + 1, entry.name, entry.state);
    }
}
