// src/primitives/wait.rs

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::primitives::Predicate;
use crate::task::Task;

/// A task that holds its worker slot until a duration elapses or a
/// predicate becomes true, whichever comes first.
///
/// The predicate is polled every `wait_poll_interval` of the executor's
/// timing configuration. Compose with `cancel` for early release.
pub struct Wait {
    duration: Option<Duration>,
    until: Option<Predicate>,
}

impl Wait {
    /// Wait for `duration`.
    pub fn new(duration: Duration) -> Self {
        Self {
            duration: Some(duration),
            until: None,
        }
    }

    /// Wait until `predicate` returns true.
    pub fn until<F>(predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            duration: None,
            until: Some(Box::new(predicate)),
        }
    }

    /// Also stop when `predicate` returns true.
    pub fn or_until<F>(mut self, predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.until = Some(Box::new(predicate));
        self
    }

    /// Also stop once `duration` has elapsed.
    pub fn at_most(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn into_task(self) -> Task<()> {
        let Wait { duration, until } = self;

        Task::future(move |cx| async move {
            let started = Instant::now();
            let deadline = duration.map(|d| started + d);

            match until {
                None => {
                    if let Some(deadline) = deadline {
                        tokio::time::sleep_until(deadline).await;
                    }
                }
                Some(predicate) => {
                    let poll = cx.timing().wait_poll_interval;
                    loop {
                        if predicate() {
                            break;
                        }
                        let nap = match deadline {
                            Some(deadline) => {
                                let now = Instant::now();
                                if now >= deadline {
                                    break;
                                }
                                poll.min(deadline - now)
                            }
                            None => poll,
                        };
                        sleep(nap).await;
                    }
                }
            }

            debug!(
                task = %cx.label(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "wait elapsed"
            );
            Some(())
        })
    }
}
