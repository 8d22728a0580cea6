// tests/plan_config.rs

use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;

use taskweave::TaskState;
use taskweave::config::{PlanFile, load_and_validate, load_from_path};
use taskweave::errors::TaskweaveError;
use taskweave::plan::run_plan;
use taskweave_test_utils::builders::{PlanFileBuilder, TaskSpecBuilder};
use taskweave_test_utils::{init_tracing, with_timeout};

fn write_plan(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp plan");
    file.write_all(contents.as_bytes()).expect("write temp plan");
    file
}

#[test]
fn loads_a_full_plan_file() {
    let file = write_plan(
        r#"
[executor]
name = "nightly"
max_concurrent = 4
batch_size = 2
observe_min_interval = "50ms"
wait_poll_interval = "5ms"

[task.fetch]
wait = "200ms"

[task.index]
after = ["fetch"]
affinity = true
"#,
    );

    let plan = load_and_validate(file.path()).unwrap();
    assert_eq!(plan.task.len(), 2);
    assert_eq!(plan.task["fetch"].wait_duration(), Some(Duration::from_millis(200)));
    assert_eq!(plan.task["index"].after, vec!["fetch".to_string()]);
    assert!(plan.task["index"].affinity);

    let config = plan.executor_config();
    assert_eq!(config.name, "nightly");
    assert_eq!(config.max_concurrent, Some(4));
    assert_eq!(config.batch_size, Some(2));
    assert_eq!(config.timing.observe_min_interval, Duration::from_millis(50));
    assert_eq!(config.timing.wait_poll_interval, Duration::from_millis(5));
    assert_eq!(config.timing.repeat_min_interval, Duration::from_millis(100));
}

#[test]
fn empty_sections_fall_back_to_defaults() {
    let file = write_plan("[task.only]\n");
    let plan = load_and_validate(file.path()).unwrap();

    assert_eq!(plan.executor.name, "plan");
    let config = plan.executor_config();
    assert_eq!(config.max_concurrent, None);
    assert_eq!(config.batch_size, None);
}

#[test]
fn rejects_invalid_plans() {
    let cycle = write_plan("[task.a]\nafter = [\"b\"]\n[task.b]\nafter = [\"a\"]\n");
    assert!(matches!(
        load_and_validate(cycle.path()),
        Err(TaskweaveError::DagCycle(_))
    ));

    let unknown = write_plan("[task.a]\nafter = [\"ghost\"]\n");
    assert!(matches!(
        load_and_validate(unknown.path()),
        Err(TaskweaveError::TaskNotFound(_))
    ));

    let own = write_plan("[task.a]\nafter = [\"a\"]\n");
    assert!(matches!(
        load_and_validate(own.path()),
        Err(TaskweaveError::ConfigError(_))
    ));

    let zero = write_plan("[executor]\nmax_concurrent = 0\n[task.a]\n");
    assert!(matches!(
        load_and_validate(zero.path()),
        Err(TaskweaveError::ConfigError(_))
    ));

    let bad_wait = write_plan("[task.a]\nwait = \"soon\"\n");
    assert!(matches!(
        load_and_validate(bad_wait.path()),
        Err(TaskweaveError::ConfigError(_))
    ));

    let empty = write_plan("[executor]\nname = \"idle\"\n");
    assert!(matches!(
        load_and_validate(empty.path()),
        Err(TaskweaveError::ConfigError(_))
    ));
}

#[test]
fn malformed_toml_and_missing_files_are_reported() {
    let broken = write_plan("[task.a\n");
    assert!(matches!(
        load_from_path(broken.path()),
        Err(TaskweaveError::TomlError(_))
    ));
    assert!(matches!(
        load_from_path("/definitely/not/here/Taskweave.toml"),
        Err(TaskweaveError::IoError(_))
    ));
}

#[test]
fn builder_rejects_cycles_through_try_from() {
    let raw = PlanFileBuilder::new()
        .with_task("a", TaskSpecBuilder::new().after("c").build())
        .with_task("b", TaskSpecBuilder::new().after("a").build())
        .with_task("c", TaskSpecBuilder::new().after("b").build())
        .raw();
    assert!(matches!(PlanFile::try_from(raw), Err(TaskweaveError::DagCycle(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_plan_completes_in_dependency_order() {
    init_tracing();
    let plan = PlanFileBuilder::new()
        .with_name("chain")
        .with_task("build", TaskSpecBuilder::new().wait("30ms").build())
        .with_task("alpha", TaskSpecBuilder::new().after("build").build())
        .with_task("deploy", TaskSpecBuilder::new().after("alpha").on_affinity().build())
        .build();

    let report = with_timeout(run_plan(&plan, None)).await.unwrap();

    assert_eq!(report.executor, "chain");
    assert_eq!(report.names(), vec!["build", "alpha", "deploy"]);
    assert_eq!(report.finished_count(), 3);
    assert!(report.order.iter().all(|entry| entry.state == TaskState::Finished));
    assert!(report.elapsed >= Duration::from_millis(25));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_plan_honours_batches_and_overrides() {
    init_tracing();
    let mut builder = PlanFileBuilder::new().with_batch_size(2).with_max_concurrent(8);
    for name in ["a", "b", "c", "d", "e"] {
        builder = builder.with_task(name, TaskSpecBuilder::new().wait("20ms").build());
    }
    let plan = builder.build();

    let report = with_timeout(run_plan(&plan, Some(1))).await.unwrap();

    // With a ceiling of one and batches of two in name order, completion
    // follows the sorted task names.
    assert_eq!(report.names(), vec!["a", "b", "c", "d", "e"]);
    assert!(report.elapsed >= Duration::from_millis(90));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn batches_follow_after_edges_against_name_order() {
    init_tracing();
    let file = write_plan(
        r#"
[executor]
batch_size = 1

[task.a]
after = ["b"]

[task.b]
wait = "10ms"

[task.c]
after = ["a"]

[task.d]
"#,
    );
    let plan = load_and_validate(file.path()).unwrap();
    assert_eq!(plan.submission_order(), ["b", "a", "c", "d"]);

    let report = with_timeout(run_plan(&plan, None)).await.unwrap();
    assert_eq!(report.names(), vec!["b", "a", "c", "d"]);
    assert_eq!(report.finished_count(), 4);
}
