// src/primitives/compound.rs

use tracing::{debug, warn};

use crate::executor::QueueOptions;
use crate::task::{Dependable, Task, TaskHandle};

/// A group of child tasks behaving like a single task.
///
/// When the compound runs, it queues its children on the executor running
/// it (without batch edges) and finishes once all of them are terminal.
/// Cancelling the compound cancels every child.
pub struct Compound {
    children: Vec<TaskHandle>,
}

impl Compound {
    pub fn new<I>(children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Dependable,
    {
        Self {
            children: children.into_iter().map(|child| child.handle()).collect(),
        }
    }

    pub fn children(&self) -> &[TaskHandle] {
        &self.children
    }

    pub fn into_task(self) -> Task<()> {
        let cascade = self.children.clone();
        let children = self.children;

        let task = Task::deferred(move |finisher, cx| {
            let Some(executor) = cx.executor() else {
                warn!(task = %cx.label(), "executor gone before compound started; cancelling");
                finisher.cancel();
                return;
            };

            debug!(task = %cx.label(), children = children.len(), "queueing compound children");
            let done = finisher.clone();
            let options = QueueOptions::new()
                .unbatched()
                .on_complete(move |_| {
                    done.finish_empty();
                });

            if let Err(err) = executor.queue(children, options) {
                warn!(task = %cx.label(), error = %err, "failed to queue compound children; cancelling");
                finisher.cancel();
            }
        });

        task.on_cancel(move || {
            for child in &cascade {
                child.cancel();
            }
        });
        task
    }
}
