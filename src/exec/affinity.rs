// src/exec/affinity.rs

//! The affinity context: one dedicated, named OS thread running jobs in
//! FIFO order, one at a time.
//!
//! Affinity-discipline task bodies, Observe evaluations, Repeat blocks and
//! every completion callback run here. The thread exits once the last
//! [`AffinityContext`] handle is dropped and the queue is empty.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::errors::Result;
use crate::exec::panic_message;

type Job = Box<dyn FnOnce() + Send>;

struct AffinityInner {
    name: String,
    thread: ThreadId,
    tx: mpsc::UnboundedSender<Job>,
}

/// Cloneable handle to an affinity thread.
#[derive(Clone)]
pub struct AffinityContext {
    inner: Arc<AffinityInner>,
}

impl AffinityContext {
    /// Start a new affinity thread called `name`.
    pub fn spawn(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        let thread_name = name.clone();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            debug!(context = %thread_name, "affinity context started");
            while let Some(job) = rx.blocking_recv() {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                    error!(
                        context = %thread_name,
                        panic = %panic_message(payload.as_ref()),
                        "job panicked on affinity context"
                    );
                }
            }
            debug!(context = %thread_name, "affinity context stopped");
        })?;

        Ok(Self {
            inner: Arc::new(AffinityInner {
                name,
                thread: handle.thread().id(),
                tx,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Queue `job`. Returns `false` if the thread is gone.
    pub fn dispatch<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.tx.send(Box::new(job)).is_ok()
    }

    /// Whether the calling thread is this context's thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.inner.thread
    }
}

impl fmt::Debug for AffinityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AffinityContext")
            .field("name", &self.inner.name)
            .finish()
    }
}
