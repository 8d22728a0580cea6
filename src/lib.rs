// src/lib.rs

//! taskweave: dependency-aware task scheduling on tokio.
//!
//! Build [`Task`]s, wire them with `after`/`before`, and submit them to an
//! [`Executor`]. A task starts once every dependency is finished or
//! cancelled; outputs flow to dependents through typed inputs or
//! `output_from_dependency`.

pub mod cli;
pub mod collab;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod executor;
pub mod logging;
pub mod plan;
pub mod primitives;
pub mod task;
pub mod types;

use anyhow::Result;
use tracing::{info, warn};

pub use crate::config::{ExecutorConfig, Timing};
pub use crate::dag::{TaskSliceExt, batched, chained};
pub use crate::errors::TaskweaveError;
pub use crate::executor::{Executor, QueueOptions, WeakExecutor};
pub use crate::task::{Dependable, Finisher, Input, Operation, Task, TaskContext, TaskHandle};
pub use crate::types::{Affinity, Discipline, TaskId, TaskState};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::plan::{print_dry_run, print_report, run_plan};

/// High-level entry point used by `main.rs`.
///
/// Loads and validates the plan, then either prints it (`--dry-run`) or
/// runs it and prints the completion order. Ctrl-C abandons the run; the
/// dropped executor cancels whatever is still outstanding.
pub async fn run(args: CliArgs) -> Result<()> {
    let plan = load_and_validate(&args.plan)?;

    if args.dry_run {
        print_dry_run(&plan);
        return Ok(());
    }

    info!(plan = %args.plan.display(), tasks = plan.task.len(), "loaded plan");

    tokio::select! {
        report = run_plan(&plan, args.max_concurrent) => {
            print_report(&report?);
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            warn!("interrupted; cancelling outstanding tasks");
        }
    }
    Ok(())
}
