use std::sync::{Arc, Mutex};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Start,
    End,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub label: String,
    pub mark: Mark,
    pub at: Instant,
}

/// Shared start/end recorder for ordering assertions across threads.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    entries: Arc<Mutex<Vec<Entry>>>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, label: &str) {
        self.push(label, Mark::Start);
    }

    pub fn end(&self, label: &str) {
        self.push(label, Mark::End);
    }

    /// Record `label` around `f`.
    pub fn span<T>(&self, label: &str, f: impl FnOnce() -> T) -> T {
        self.start(label);
        let out = f();
        self.end(label);
        out
    }

    fn push(&self, label: &str, mark: Mark) {
        self.entries.lock().unwrap().push(Entry {
            label: label.to_string(),
            mark,
            at: Instant::now(),
        });
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.entries.lock().unwrap().clone()
    }

    /// Labels in the order they started.
    pub fn starts(&self) -> Vec<String> {
        self.labels_with(Mark::Start)
    }

    /// Labels in the order they ended.
    pub fn ends(&self) -> Vec<String> {
        self.labels_with(Mark::End)
    }

    fn labels_with(&self, mark: Mark) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.mark == mark)
            .map(|entry| entry.label.clone())
            .collect()
    }

    fn position(&self, label: &str, mark: Mark) -> Option<usize> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .position(|entry| entry.label == label && entry.mark == mark)
    }

    /// `first` ended before `second` started.
    pub fn ended_before_started(&self, first: &str, second: &str) -> bool {
        match (self.position(first, Mark::End), self.position(second, Mark::Start)) {
            (Some(end), Some(start)) => end < start,
            _ => false,
        }
    }

    /// Largest number of spans open at the same time.
    pub fn max_overlap(&self) -> usize {
        let mut open = 0usize;
        let mut max = 0usize;
        for entry in self.entries.lock().unwrap().iter() {
            match entry.mark {
                Mark::Start => {
                    open += 1;
                    max = max.max(open);
                }
                Mark::End => open = open.saturating_sub(1),
            }
        }
        max
    }
}
