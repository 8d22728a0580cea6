use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use taskweave::config::ExecutorConfig;
use taskweave::errors::Result;
use taskweave::exec::{ExecutorBackend, RealExecutorBackend, RunEnv};
use taskweave::{Executor, TaskHandle};

/// Labels of dispatched tasks, in dispatch order.
pub type DispatchLog = Arc<Mutex<Vec<String>>>;

/// Wraps the production backend and records every dispatch before
/// forwarding it, so tests see the order the scheduler released tasks in.
pub struct RecordingBackend {
    inner: RealExecutorBackend,
    dispatched: DispatchLog,
}

impl RecordingBackend {
    pub fn new(env: RunEnv, dispatched: DispatchLog) -> Self {
        Self {
            inner: RealExecutorBackend::new(env),
            dispatched,
        }
    }
}

impl ExecutorBackend for RecordingBackend {
    fn dispatch(
        &mut self,
        tasks: Vec<TaskHandle>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        {
            let mut log = self.dispatched.lock().unwrap();
            log.extend(tasks.iter().map(|task| task.label().to_string()));
        }
        self.inner.dispatch(tasks)
    }
}

/// Executor whose dispatches are recorded in the returned log.
pub fn recording_executor(config: ExecutorConfig) -> (Executor, DispatchLog) {
    let log: DispatchLog = Arc::new(Mutex::new(Vec::new()));
    let backend_log = log.clone();
    let executor = Executor::with_backend(config, move |env| RecordingBackend::new(env, backend_log))
        .expect("executor should start inside a tokio runtime");
    (executor, log)
}
