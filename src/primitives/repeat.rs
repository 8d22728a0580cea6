// src/primitives/repeat.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::primitives::Predicate;
use crate::task::Task;

/// Runs a block on the affinity context every `interval` until the task is
/// cancelled, `duration` elapses, or `until` returns true.
///
/// The interval is floored at the executor's `repeat_min_interval`. The
/// task output is the number of times the block was dispatched.
pub struct Repeat {
    block: Arc<dyn Fn() + Send + Sync>,
    interval: Option<Duration>,
    duration: Option<Duration>,
    until: Option<Predicate>,
}

impl Repeat {
    pub fn new<F>(block: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            block: Arc::new(block),
            interval: None,
            duration: None,
            until: None,
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Stop once `duration` has elapsed since the task started.
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Stop as soon as `predicate` returns true (checked before each tick).
    pub fn until<F>(mut self, predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.until = Some(Box::new(predicate));
        self
    }

    pub fn into_task(self) -> Task<u64> {
        let Repeat {
            block,
            interval,
            duration,
            until,
        } = self;

        Task::future(move |cx| async move {
            let floor = cx.timing().repeat_min_interval;
            let period = interval.unwrap_or(floor).max(floor);
            let started = Instant::now();
            let mut ticks = 0_u64;

            loop {
                let expired = duration.is_some_and(|d| started.elapsed() >= d);
                let satisfied = until.as_ref().is_some_and(|p| p());
                if expired || satisfied || cx.is_terminal() {
                    break;
                }

                sleep(period).await;

                let block = block.clone();
                if !cx.affinity().dispatch(move || block()) {
                    break;
                }
                ticks += 1;
            }

            debug!(task = %cx.label(), ticks, "repeat stopped");
            Some(ticks)
        })
    }
}
