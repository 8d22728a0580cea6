// src/primitives/observe.rs

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use crate::errors::Result;
use crate::exec::AffinityContext;
use crate::executor::Executor;
use crate::primitives::Predicate;
use crate::task::{Task, lock};

type Reader<V> = Box<dyn Fn() -> V + Send + Sync>;
type Update<V> = Box<dyn FnMut(&V, &V) + Send>;

/// Polls a value at an interval and reports changes.
///
/// `read` is evaluated once at construction to seed the last observed
/// value. After [`start`](Observe::start), every tick evaluates `read` on
/// the affinity context and calls `update(new, old)` when the value
/// differs from the last one observed.
pub struct Observe<V> {
    read: Reader<V>,
    initial: V,
    interval: Option<Duration>,
    until: Option<Predicate>,
}

impl<V: PartialEq + Send + 'static> Observe<V> {
    pub fn new<F>(read: F) -> Self
    where
        F: Fn() -> V + Send + Sync + 'static,
    {
        let initial = read();
        Self {
            read: Box::new(read),
            initial,
            interval: None,
            until: None,
        }
    }

    /// Tick interval, floored at the executor's `observe_min_interval`.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// End the observation once `predicate` returns true.
    pub fn until<F>(mut self, predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.until = Some(Box::new(predicate));
        self
    }

    /// Submit the observation to `executor`.
    pub fn start<U>(self, executor: &Executor, update: U) -> Result<Observer<V>>
    where
        U: FnMut(&V, &V) + Send + 'static,
    {
        let Observe {
            read,
            initial,
            interval,
            until,
        } = self;

        let state = Arc::new(ObserveState {
            read,
            last: Mutex::new(initial),
            update: Mutex::new(Box::new(update)),
        });

        let ticker = state.clone();
        let task = Task::future(move |cx| async move {
            let floor = cx.timing().observe_min_interval;
            let period = interval.unwrap_or(floor).max(floor);
            let mut ticks = 0_u64;

            loop {
                if until.as_ref().is_some_and(|p| p()) || cx.is_terminal() {
                    break;
                }
                sleep(period).await;

                let state = ticker.clone();
                let probe = cx.clone();
                let dispatched = cx.affinity().dispatch(move || {
                    if !probe.is_terminal() {
                        state.evaluate(false);
                    }
                });
                if !dispatched {
                    break;
                }
                ticks += 1;
            }

            debug!(task = %cx.label(), ticks, "observation ended");
            Some(())
        });

        executor.submit(&task)?;
        Ok(Observer {
            task,
            state,
            affinity: executor.affinity().clone(),
        })
    }
}

struct ObserveState<V> {
    read: Reader<V>,
    last: Mutex<V>,
    update: Mutex<Update<V>>,
}

impl<V: PartialEq> ObserveState<V> {
    /// Read the current value; report it if it changed (or if `force`).
    fn evaluate(&self, force: bool) {
        let next = (self.read)();
        let mut last = lock(&self.last);
        if force || *last != next {
            let mut update = lock(&self.update);
            (*update)(&next, &*last);
        }
        *last = next;
    }
}

/// Handle to a running observation.
pub struct Observer<V> {
    task: Task<()>,
    state: Arc<ObserveState<V>>,
    affinity: AffinityContext,
}

impl<V: PartialEq + Send + 'static> Observer<V> {
    /// Force one evaluation that calls `update(current, last)` even if the
    /// value did not change. No-op once the observation has ended.
    pub fn trigger(&self) -> &Self {
        let state = self.state.clone();
        let task = self.task.clone();
        self.affinity.dispatch(move || {
            if !task.state().is_terminal() {
                state.evaluate(true);
            }
        });
        self
    }

    /// End the observation.
    pub fn stop(&self) -> bool {
        self.task.cancel()
    }

    pub fn task(&self) -> &Task<()> {
        &self.task
    }

    pub async fn finished(&self) {
        self.task.finished().await
    }
}
