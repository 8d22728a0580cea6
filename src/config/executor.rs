// src/config/executor.rs

use std::time::Duration;

/// Default number of tasks per batch in [`Executor::queue`](crate::Executor::queue).
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Timing floors and poll intervals for the timer-driven primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Lower bound for `Observe` intervals.
    pub observe_min_interval: Duration,
    /// Lower bound for `Repeat` intervals.
    pub repeat_min_interval: Duration,
    /// How often `Wait` re-checks its predicate.
    pub wait_poll_interval: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            observe_min_interval: Duration::from_millis(20),
            repeat_min_interval: Duration::from_millis(100),
            wait_poll_interval: Duration::from_millis(10),
        }
    }
}

/// Settings for one [`Executor`](crate::Executor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Used in logs and as the affinity thread name prefix.
    pub name: String,
    /// `None` = unbounded, `Some(1)` = strictly serial.
    pub max_concurrent: Option<usize>,
    /// Default batch size for `queue`; `None` disables batching.
    pub batch_size: Option<usize>,
    pub timing: Timing,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            name: "taskweave".to_string(),
            max_concurrent: None,
            batch_size: Some(DEFAULT_BATCH_SIZE),
            timing: Timing::default(),
        }
    }
}

impl ExecutorConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// One task at a time.
    pub fn serial() -> Self {
        Self::default().with_max_concurrent(Some(1))
    }

    pub fn with_max_concurrent(mut self, max: Option<usize>) -> Self {
        self.max_concurrent = max;
        self
    }

    pub fn with_batch_size(mut self, size: Option<usize>) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }
}
