// src/executor.rs

//! The executor: an explicit, cloneable context that owns one scheduler
//! event loop, one affinity thread and one retention set.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::config::ExecutorConfig;
use crate::dag::{Scheduler, batched};
use crate::engine::{CoreRuntime, Runtime, RuntimeEvent};
use crate::errors::{Result, TaskweaveError};
use crate::exec::retention::arm_completion;
use crate::exec::{AffinityContext, ExecutorBackend, RealExecutorBackend, RetentionSet, RunEnv};
use crate::task::{Dependable, Task, TaskHandle};

type CompletionCallback = Box<dyn FnOnce(&[TaskHandle]) + Send>;

#[derive(Debug, Clone, Copy, Default)]
enum BatchSize {
    #[default]
    Configured,
    Fixed(usize),
    Unbatched,
}

/// Options for [`Executor::queue`].
#[derive(Default)]
pub struct QueueOptions {
    batch_size: BatchSize,
    on_complete: Option<CompletionCallback>,
}

impl QueueOptions {
    /// Batch with the executor's configured size, no completion callback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Batch with `size` tasks per batch (0 behaves like 1).
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = BatchSize::Fixed(size);
        self
    }

    /// Submit without adding batch edges.
    pub fn unbatched(mut self) -> Self {
        self.batch_size = BatchSize::Unbatched;
        self
    }

    /// Run `callback` on the affinity context once every queued task is
    /// terminal. It receives the queued tasks in their original order.
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&[TaskHandle]) + Send + 'static,
    {
        self.on_complete = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for QueueOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueOptions")
            .field("batch_size", &self.batch_size)
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

struct Shared {
    config: ExecutorConfig,
    events: mpsc::UnboundedSender<RuntimeEvent>,
    affinity: AffinityContext,
    retention: RetentionSet,
    accepting: AtomicBool,
}

impl Drop for Shared {
    fn drop(&mut self) {
        // Last handle gone: cancel whatever is left and stop the loop.
        let _ = self.events.send(RuntimeEvent::Shutdown(None));
    }
}

/// Handle to a running executor. Clones share the same executor.
#[derive(Clone)]
pub struct Executor {
    shared: Arc<Shared>,
}

/// Non-owning executor handle, held by running tasks.
#[derive(Clone)]
pub struct WeakExecutor(Weak<Shared>);

impl WeakExecutor {
    pub fn upgrade(&self) -> Option<Executor> {
        self.0.upgrade().map(|shared| Executor { shared })
    }
}

impl fmt::Debug for WeakExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakExecutor")
            .field("alive", &(self.0.strong_count() > 0))
            .finish()
    }
}

impl Executor {
    /// Start an executor on the current tokio runtime.
    pub fn new(config: ExecutorConfig) -> Result<Self> {
        Self::with_backend(config, RealExecutorBackend::new)
    }

    /// Executor with the default configuration and a ceiling of one.
    pub fn serial() -> Result<Self> {
        Self::new(ExecutorConfig::serial())
    }

    /// Start an executor whose dispatched tasks go to the backend built by
    /// `make_backend`.
    pub fn with_backend<E, F>(config: ExecutorConfig, make_backend: F) -> Result<Self>
    where
        E: ExecutorBackend + 'static,
        F: FnOnce(RunEnv) -> E,
    {
        let runtime = Handle::try_current()?;
        let affinity = AffinityContext::spawn(format!("{}-affinity", config.name))?;
        let (tx, rx) = mpsc::unbounded_channel();

        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let env = RunEnv {
                executor: WeakExecutor(weak.clone()),
                affinity: affinity.clone(),
                timing: config.timing,
            };
            let backend = make_backend(env);
            let core = CoreRuntime::new(Scheduler::new(config.max_concurrent));
            let event_loop = Runtime::new(config.name.clone(), core, rx, tx.clone(), backend);
            runtime.spawn(event_loop.run());

            Shared {
                config,
                events: tx,
                affinity,
                retention: RetentionSet::new(),
                accepting: AtomicBool::new(true),
            }
        });

        info!(
            executor = %shared.config.name,
            max_concurrent = ?shared.config.max_concurrent,
            batch_size = ?shared.config.batch_size,
            "executor started"
        );
        Ok(Self { shared })
    }

    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.shared.config
    }

    pub fn affinity(&self) -> &AffinityContext {
        &self.shared.affinity
    }

    /// Number of tasks kept alive until their completion callback runs.
    pub fn retained_count(&self) -> usize {
        self.shared.retention.len()
    }

    pub fn is_accepting(&self) -> bool {
        self.shared.accepting.load(Ordering::Acquire)
    }

    pub fn downgrade(&self) -> WeakExecutor {
        WeakExecutor(Arc::downgrade(&self.shared))
    }

    /// Submit a single task.
    pub fn submit<D: Dependable + ?Sized>(&self, task: &D) -> Result<()> {
        self.enqueue(vec![task.handle()])
    }

    /// Submit a sequence of tasks in one atomic enqueue.
    ///
    /// The tasks are batched (see [`QueueOptions`]) and followed by a
    /// barrier task that depends on all of them; the completion callback,
    /// if any, runs when the barrier finishes. Returns the submitted
    /// handles: the original tasks followed by the barrier.
    pub fn queue<I>(&self, tasks: I, options: QueueOptions) -> Result<Vec<TaskHandle>>
    where
        I: IntoIterator,
        I::Item: Dependable,
    {
        let tasks: Vec<TaskHandle> = tasks.into_iter().map(|task| task.handle()).collect();

        // Reject before any edges are added to the caller's tasks.
        self.check_submittable(&tasks)?;

        let batch_size = match options.batch_size {
            BatchSize::Configured => self.shared.config.batch_size,
            BatchSize::Fixed(size) => Some(size),
            BatchSize::Unbatched => None,
        };
        if let Some(size) = batch_size {
            batched(&tasks, size);
        }

        let barrier = Task::<()>::sync(|_| None).named(format!("{}-barrier", self.name()));
        barrier.after_all(&tasks);
        if let Some(on_complete) = options.on_complete {
            let all = tasks.clone();
            barrier.then(move |_, _| on_complete(&all));
        }

        debug!(
            executor = %self.name(),
            count = tasks.len(),
            batch_size = ?batch_size,
            "queueing tasks"
        );

        let mut submitted = tasks;
        submitted.push(barrier.handle());
        self.enqueue(submitted.clone())?;
        Ok(submitted)
    }

    /// Cancel every outstanding task, wait until the scheduler is idle and
    /// stop the event loop. Later submissions fail with `ExecutorShutDown`.
    pub async fn shutdown(&self) {
        self.shared.accepting.store(false, Ordering::Release);

        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .shared
            .events
            .send(RuntimeEvent::Shutdown(Some(ack_tx)))
            .is_err()
        {
            debug!(executor = %self.name(), "executor already stopped");
            return;
        }
        let _ = ack_rx.await;
        info!(executor = %self.name(), "executor shut down");
    }

    fn check_submittable(&self, tasks: &[TaskHandle]) -> Result<()> {
        if !self.is_accepting() {
            return Err(TaskweaveError::ExecutorShutDown);
        }

        let mut seen = HashSet::with_capacity(tasks.len());
        match tasks
            .iter()
            .find(|task| task.0.is_submitted() || !seen.insert(task.id()))
        {
            Some(task) => Err(TaskweaveError::AlreadySubmitted(task.id())),
            None => Ok(()),
        }
    }

    fn enqueue(&self, tasks: Vec<TaskHandle>) -> Result<()> {
        self.check_submittable(&tasks)?;

        for task in &tasks {
            if !task.0.mark_submitted() {
                return Err(TaskweaveError::AlreadySubmitted(task.id()));
            }
            arm_completion(task, &self.shared.retention, &self.shared.affinity);
        }

        self.shared
            .events
            .send(RuntimeEvent::Submit(tasks))
            .map_err(|mpsc::error::SendError(event)| {
                // The loop is gone; settle the tasks so callbacks still fire.
                if let RuntimeEvent::Submit(tasks) = event {
                    for task in tasks {
                        task.cancel();
                    }
                }
                TaskweaveError::ExecutorShutDown
            })
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("name", &self.name())
            .field("max_concurrent", &self.shared.config.max_concurrent)
            .field("retained", &self.retained_count())
            .finish()
    }
}
