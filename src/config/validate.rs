// src/config/validate.rs

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::duration::parse_duration;
use crate::config::model::{PlanFile, RawPlanFile, TaskSpec};
use crate::errors::{Result, TaskweaveError};

impl TryFrom<RawPlanFile> for PlanFile {
    type Error = TaskweaveError;

    fn try_from(raw: RawPlanFile) -> std::result::Result<Self, Self::Error> {
        validate_plan(&raw)?;
        let order = submission_order(&raw.task);
        Ok(PlanFile::new_unchecked(raw.executor, raw.task, order))
    }
}

/// Run every check on a raw plan.
pub fn validate_plan(plan: &RawPlanFile) -> Result<()> {
    ensure_has_tasks(plan)?;
    validate_executor(plan)?;
    validate_task_dependencies(plan)?;
    validate_task_durations(plan)?;
    validate_dag(plan)?;
    Ok(())
}

fn ensure_has_tasks(plan: &RawPlanFile) -> Result<()> {
    if plan.task.is_empty() {
        return Err(TaskweaveError::ConfigError(
            "plan must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_executor(plan: &RawPlanFile) -> Result<()> {
    let section = &plan.executor;

    if section.max_concurrent == Some(0) {
        return Err(TaskweaveError::ConfigError(
            "[executor].max_concurrent must be >= 1 (got 0)".to_string(),
        ));
    }
    if section.batch_size == Some(0) {
        return Err(TaskweaveError::ConfigError(
            "[executor].batch_size must be >= 1 (got 0)".to_string(),
        ));
    }

    let durations = [
        ("observe_min_interval", &section.observe_min_interval),
        ("repeat_min_interval", &section.repeat_min_interval),
        ("wait_poll_interval", &section.wait_poll_interval),
    ];
    for (key, value) in durations {
        if let Some(value) = value {
            parse_duration(value).map_err(|e| {
                TaskweaveError::ConfigError(format!("[executor].{key}: {e}"))
            })?;
        }
    }

    Ok(())
}

fn validate_task_dependencies(plan: &RawPlanFile) -> Result<()> {
    for (name, task) in plan.task.iter() {
        for dep in task.after.iter() {
            if dep == name {
                return Err(TaskweaveError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    name
                )));
            }
            if !plan.task.contains_key(dep) {
                return Err(TaskweaveError::TaskNotFound(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
        }
    }
    Ok(())
}

fn validate_task_durations(plan: &RawPlanFile) -> Result<()> {
    for (name, task) in plan.task.iter() {
        if let Some(wait) = &task.wait {
            parse_duration(wait).map_err(|e| {
                TaskweaveError::ConfigError(format!("task '{}': invalid `wait`: {}", name, e))
            })?;
        }
    }
    Ok(())
}

fn dependency_graph(tasks: &BTreeMap<String, TaskSpec>) -> DiGraphMap<&str, ()> {
    // Edge direction: dep -> task
    // For:
    //   [task.B]
    //   after = ["A"]
    // we add edge A -> B.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in tasks.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in tasks.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }
    graph
}

/// Kahn's algorithm with the smallest ready name first, so the order is
/// stable across runs. Batch edges follow this order and can therefore
/// never point against an `after` edge. Expects an acyclic graph.
fn submission_order(tasks: &BTreeMap<String, TaskSpec>) -> Vec<String> {
    let graph = dependency_graph(tasks);
    let mut indegree: BTreeMap<&str, usize> = graph
        .nodes()
        .map(|node| (node, graph.neighbors_directed(node, Direction::Incoming).count()))
        .collect();
    let mut ready: BinaryHeap<Reverse<&str>> = indegree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(node, _)| Reverse(*node))
        .collect();

    let mut order = Vec::with_capacity(tasks.len());
    while let Some(Reverse(node)) = ready.pop() {
        order.push(node.to_string());
        for next in graph.neighbors_directed(node, Direction::Outgoing) {
            if let Some(degree) = indegree.get_mut(next) {
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(next));
                }
            }
        }
    }
    order
}

fn validate_dag(plan: &RawPlanFile) -> Result<()> {
    let graph = dependency_graph(&plan.task);

    // A topological sort will fail if there is a cycle.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(TaskweaveError::DagCycle(format!(
                "cycle detected in plan involving task '{}'",
                node
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::config::model::{ExecutorSection, TaskSpec};

    fn raw(tasks: &[(&str, &[&str])]) -> RawPlanFile {
        let task: BTreeMap<String, TaskSpec> = tasks
            .iter()
            .map(|(name, after)| {
                (
                    name.to_string(),
                    TaskSpec {
                        after: after.iter().map(|s| s.to_string()).collect(),
                        ..TaskSpec::default()
                    },
                )
            })
            .collect();
        RawPlanFile {
            executor: ExecutorSection::default(),
            task,
        }
    }

    #[test]
    fn accepts_a_simple_chain() {
        let plan = PlanFile::try_from(raw(&[("a", &[]), ("b", &["a"])])).unwrap();
        assert_eq!(plan.task.len(), 2);
        assert_eq!(plan.executor_config().batch_size, None);
    }

    #[test]
    fn rejects_cycles() {
        let err = PlanFile::try_from(raw(&[("a", &["b"]), ("b", &["a"])])).unwrap_err();
        assert!(matches!(err, TaskweaveError::DagCycle(_)));
    }

    #[test]
    fn rejects_unknown_and_self_dependencies() {
        let err = PlanFile::try_from(raw(&[("a", &["ghost"])])).unwrap_err();
        assert!(matches!(err, TaskweaveError::TaskNotFound(_)));

        let err = PlanFile::try_from(raw(&[("a", &["a"])])).unwrap_err();
        assert!(matches!(err, TaskweaveError::ConfigError(_)));
    }

    #[test]
    fn rejects_zero_ceilings_and_bad_durations() {
        let mut plan = raw(&[("a", &[])]);
        plan.executor.max_concurrent = Some(0);
        assert!(PlanFile::try_from(plan).is_err());

        let mut plan = raw(&[("a", &[])]);
        plan.executor.batch_size = Some(0);
        assert!(PlanFile::try_from(plan).is_err());

        let mut plan = raw(&[("a", &[])]);
        plan.executor.repeat_min_interval = Some("fast".into());
        assert!(PlanFile::try_from(plan).is_err());

        let mut plan = raw(&[("a", &[])]);
        plan.task.get_mut("a").unwrap().wait = Some("10".into());
        assert!(PlanFile::try_from(plan).is_err());
    }

    #[test]
    fn submission_order_respects_after_edges() {
        let plan = PlanFile::try_from(raw(&[
            ("a", &["c"]),
            ("b", &[]),
            ("c", &["d"]),
            ("d", &[]),
            ("e", &["a", "b"]),
        ]))
        .unwrap();
        assert_eq!(plan.submission_order(), ["b", "d", "c", "a", "e"]);

        let plan = PlanFile::try_from(raw(&[("x", &[]), ("y", &[]), ("z", &[])])).unwrap();
        assert_eq!(plan.submission_order(), ["x", "y", "z"]);
    }

    #[test]
    fn rejects_empty_plans() {
        let err = PlanFile::try_from(raw(&[])).unwrap_err();
        assert!(matches!(err, TaskweaveError::ConfigError(_)));
    }
}
