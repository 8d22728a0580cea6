#![allow(dead_code)]

use std::collections::BTreeMap;

use taskweave::config::{ExecutorSection, PlanFile, RawPlanFile, TaskSpec};

/// Builder for `PlanFile` to simplify test setup.
pub struct PlanFileBuilder {
    plan: RawPlanFile,
}

impl PlanFileBuilder {
    pub fn new() -> Self {
        Self {
            plan: RawPlanFile {
                executor: ExecutorSection::default(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskSpec) -> Self {
        self.plan.task.insert(name.to_string(), task);
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.plan.executor.name = name.to_string();
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.plan.executor.max_concurrent = Some(max);
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.plan.executor.batch_size = Some(size);
        self
    }

    pub fn with_wait_poll_interval(mut self, interval: &str) -> Self {
        self.plan.executor.wait_poll_interval = Some(interval.to_string());
        self
    }

    /// The unvalidated plan, for exercising validation errors.
    pub fn raw(self) -> RawPlanFile {
        self.plan
    }

    pub fn build(self) -> PlanFile {
        PlanFile::try_from(self.plan).expect("Failed to build valid plan from builder")
    }
}

impl Default for PlanFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskSpec`.
pub struct TaskSpecBuilder {
    task: TaskSpec,
}

impl TaskSpecBuilder {
    pub fn new() -> Self {
        Self {
            task: TaskSpec::default(),
        }
    }

    pub fn wait(mut self, duration: &str) -> Self {
        self.task.wait = Some(duration.to_string());
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn on_affinity(mut self) -> Self {
        self.task.affinity = true;
        self
    }

    pub fn build(self) -> TaskSpec {
        self.task
    }
}

impl Default for TaskSpecBuilder {
    fn default() -> Self {
        Self::new()
    }
}
