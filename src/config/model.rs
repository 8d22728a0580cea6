// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::config::duration::parse_duration;
use crate::config::executor::{ExecutorConfig, Timing};

/// Plan file exactly as read from TOML, before validation.
///
/// ```toml
/// [executor]
/// name = "nightly"
/// max_concurrent = 4
/// batch_size = 10
///
/// [task.fetch]
/// wait = "200ms"
///
/// [task.index]
/// after = ["fetch"]
/// affinity = true
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPlanFile {
    /// Executor settings from `[executor]`.
    #[serde(default)]
    pub executor: ExecutorSection,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskSpec>,
}

/// A plan file that passed validation. Build with `PlanFile::try_from`.
#[derive(Debug, Clone)]
pub struct PlanFile {
    pub executor: ExecutorSection,
    pub task: BTreeMap<String, TaskSpec>,
    order: Vec<String>,
}

impl PlanFile {
    pub(crate) fn new_unchecked(
        executor: ExecutorSection,
        task: BTreeMap<String, TaskSpec>,
        order: Vec<String>,
    ) -> Self {
        Self {
            executor,
            task,
            order,
        }
    }

    /// Task names in submission order: every task comes after everything
    /// it names in `after`, ties broken by name.
    pub fn submission_order(&self) -> &[String] {
        &self.order
    }

    /// Executor configuration described by `[executor]`.
    ///
    /// Plans only batch when `batch_size` is given explicitly; their
    /// ordering otherwise comes from `after` edges alone.
    pub fn executor_config(&self) -> ExecutorConfig {
        let defaults = Timing::default();
        let section = &self.executor;
        let timing = Timing {
            observe_min_interval: parse_or(&section.observe_min_interval, defaults.observe_min_interval),
            repeat_min_interval: parse_or(&section.repeat_min_interval, defaults.repeat_min_interval),
            wait_poll_interval: parse_or(&section.wait_poll_interval, defaults.wait_poll_interval),
        };

        ExecutorConfig::named(section.name.clone())
            .with_max_concurrent(section.max_concurrent)
            .with_batch_size(section.batch_size)
            .with_timing(timing)
    }
}

fn parse_or(value: &Option<String>, fallback: Duration) -> Duration {
    value
        .as_deref()
        .and_then(|s| parse_duration(s).ok())
        .unwrap_or(fallback)
}

/// `[executor]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorSection {
    #[serde(default = "default_executor_name")]
    pub name: String,

    /// Concurrency ceiling; absent means unbounded.
    #[serde(default)]
    pub max_concurrent: Option<usize>,

    /// Batch size used when queueing the plan; absent means no batching.
    #[serde(default)]
    pub batch_size: Option<usize>,

    #[serde(default)]
    pub observe_min_interval: Option<String>,

    #[serde(default)]
    pub repeat_min_interval: Option<String>,

    #[serde(default)]
    pub wait_poll_interval: Option<String>,
}

fn default_executor_name() -> String {
    "plan".to_string()
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            name: default_executor_name(),
            max_concurrent: None,
            batch_size: None,
            observe_min_interval: None,
            repeat_min_interval: None,
            wait_poll_interval: None,
        }
    }
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TaskSpec {
    /// How long the task holds its worker slot, e.g. `"200ms"`. Absent means
    /// the task finishes immediately.
    #[serde(default)]
    pub wait: Option<String>,

    /// Dependency list: this task waits for all tasks listed here.
    #[serde(default)]
    pub after: Vec<String>,

    /// Run on the affinity context instead of the worker pool.
    #[serde(default)]
    pub affinity: bool,
}

impl TaskSpec {
    /// Parsed `wait`. Only meaningful on a validated plan.
    pub fn wait_duration(&self) -> Option<Duration> {
        self.wait.as_deref().and_then(|s| parse_duration(s).ok())
    }
}
