// src/dag/graph.rs

use std::collections::{HashMap, HashSet};

use crate::dag::task_info::TaskInfo;
use crate::types::TaskId;

/// What [`TaskGraph::resolve`] removed.
#[derive(Debug)]
pub(crate) struct Resolution {
    /// The tracked record, if the resolved id was submitted here.
    pub record: Option<TaskInfo>,
    /// Tracked tasks that were waiting on the resolved id.
    pub waiters: Vec<TaskId>,
}

/// Arena of outstanding tasks keyed by [`TaskId`].
///
/// Edges are plain ids: a record lists its dependencies, and `waiters` maps
/// every unresolved dependency to the tracked tasks blocked on it. Resolved
/// ids are remembered so late submissions and duplicate notifications are
/// answered without the task itself.
#[derive(Debug, Default)]
pub struct TaskGraph {
    records: HashMap<TaskId, TaskInfo>,
    waiters: HashMap<TaskId, Vec<TaskId>>,
    resolved: HashSet<TaskId>,
    /// Dependencies not tracked here whose resolution was requested from
    /// the shell.
    watched: HashSet<TaskId>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of outstanding (tracked, unresolved) tasks.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn is_resolved(&self, id: TaskId) -> bool {
        self.resolved.contains(&id)
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskInfo> {
        self.records.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskInfo> {
        self.records.get_mut(&id)
    }

    /// Outstanding ids in submission-independent (ascending) order.
    pub fn ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.records.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Immediate dependencies of a tracked task.
    pub fn dependencies_of(&self, id: TaskId) -> &[TaskId] {
        self.records
            .get(&id)
            .map(|info| info.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Tracked tasks currently blocked on `id`.
    pub fn waiters_of(&self, id: TaskId) -> &[TaskId] {
        self.waiters
            .get(&id)
            .map(|w| w.as_slice())
            .unwrap_or(&[])
    }

    /// Start tracking `info`. Returns `false` if the id is already tracked
    /// or already resolved.
    pub(crate) fn insert(&mut self, info: TaskInfo) -> bool {
        if self.records.contains_key(&info.id) || self.resolved.contains(&info.id) {
            return false;
        }
        self.records.insert(info.id, info);
        true
    }

    /// Register a freshly inserted task as a waiter on each of its unresolved
    /// dependencies. Dependencies that are already resolved are dropped from
    /// its unmet set.
    ///
    /// Returns the dependencies that are neither tracked nor resolved and
    /// were not watched before; the caller must arrange to hear about them.
    pub(crate) fn connect(&mut self, id: TaskId) -> Vec<TaskId> {
        let Some(info) = self.records.get_mut(&id) else {
            return Vec::new();
        };

        let resolved = &self.resolved;
        info.unmet.retain(|dep| !resolved.contains(dep));

        let pending: Vec<TaskId> = info
            .deps
            .iter()
            .copied()
            .filter(|dep| info.unmet.contains(dep))
            .collect();

        let mut foreign = Vec::new();
        for dep in pending {
            let list = self.waiters.entry(dep).or_default();
            if !list.contains(&id) {
                list.push(id);
            }
            if !self.records.contains_key(&dep) && self.watched.insert(dep) {
                foreign.push(dep);
            }
        }
        foreign
    }

    /// Mark `id` resolved. Returns `None` if it already was.
    pub(crate) fn resolve(&mut self, id: TaskId) -> Option<Resolution> {
        if !self.resolved.insert(id) {
            return None;
        }
        self.watched.remove(&id);
        Some(Resolution {
            record: self.records.remove(&id),
            waiters: self.waiters.remove(&id).unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: TaskId, deps: &[TaskId]) -> TaskInfo {
        TaskInfo::new(id, format!("t{}", id.as_u64()), deps.to_vec())
    }

    #[test]
    fn connect_reports_foreign_dependencies_once() {
        let mut graph = TaskGraph::new();
        let foreign = TaskId::next();
        let a = TaskId::next();
        let b = TaskId::next();

        graph.insert(info(a, &[foreign]));
        graph.insert(info(b, &[foreign]));

        assert_eq!(graph.connect(a), vec![foreign]);
        assert!(graph.connect(b).is_empty());
        assert_eq!(graph.waiters_of(foreign), &[a, b]);
    }

    #[test]
    fn resolved_dependencies_are_met_on_connect() {
        let mut graph = TaskGraph::new();
        let dep = TaskId::next();
        let a = TaskId::next();

        assert!(graph.resolve(dep).is_some());
        graph.insert(info(a, &[dep]));
        assert!(graph.connect(a).is_empty());
        assert!(graph.get(a).unwrap().unmet.is_empty());
    }

    #[test]
    fn resolve_is_idempotent_and_blocks_reinsertion() {
        let mut graph = TaskGraph::new();
        let a = TaskId::next();
        graph.insert(info(a, &[]));

        let first = graph.resolve(a).expect("first resolution");
        assert!(first.record.is_some());
        assert!(graph.resolve(a).is_none());
        assert!(!graph.insert(info(a, &[])));
        assert!(graph.is_empty());
    }
}
