// src/dag/batching.rs

//! Sequence helpers: chain or batch a whole slice of tasks at once.

use crate::task::TaskHandle;

/// Each task starts after its predecessor in `tasks`.
pub fn chained(tasks: &[TaskHandle]) -> &[TaskHandle] {
    for pair in tasks.windows(2) {
        pair[1].after(&pair[0]);
    }
    tasks
}

/// Split `tasks` into chunks of `size` (0 is treated as 1); every task of a
/// chunk starts after every task of the previous chunk.
pub fn batched(tasks: &[TaskHandle], size: usize) -> &[TaskHandle] {
    let chunks: Vec<&[TaskHandle]> = tasks.chunks(size.max(1)).collect();
    for pair in chunks.windows(2) {
        for task in pair[1] {
            task.after_all(pair[0]);
        }
    }
    tasks
}

/// Method-call form of [`chained`] and [`batched`].
pub trait TaskSliceExt {
    fn chained(&self) -> &Self;
    fn batched(&self, size: usize) -> &Self;
}

impl TaskSliceExt for [TaskHandle] {
    fn chained(&self) -> &Self {
        chained(self)
    }

    fn batched(&self, size: usize) -> &Self {
        batched(self, size)
    }
}
