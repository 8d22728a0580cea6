// tests/scheduler_ordering.rs

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;

use taskweave::{
    Dependable, Executor, ExecutorConfig, QueueOptions, Task, TaskHandle, TaskSliceExt, TaskState,
};
use taskweave_test_utils::recording_backend::recording_executor;
use taskweave_test_utils::timeline::Timeline;
use taskweave_test_utils::{init_tracing, with_timeout};

/// Sync task that records its span on `timeline` and sleeps `ms` inside it.
fn timed(timeline: &Timeline, label: &str, ms: u64) -> Task<()> {
    let timeline = timeline.clone();
    let name = label.to_string();
    Task::sync(move |_| {
        timeline.span(&name, || std::thread::sleep(Duration::from_millis(ms)));
        Some(())
    })
    .named(label)
}

fn unbounded() -> Executor {
    Executor::new(ExecutorConfig::named("ordering")).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dependent_starts_after_dependency_is_done() {
    init_tracing();
    let executor = unbounded();
    let timeline = Timeline::new();

    let a = timed(&timeline, "a", 50);
    let b = timed(&timeline, "b", 0);
    b.after(&a);

    executor
        .queue([b.handle(), a.handle()], QueueOptions::new().unbatched())
        .unwrap();
    with_timeout(b.finished()).await;

    assert_eq!(a.state(), TaskState::Finished);
    assert!(timeline.ended_before_started("a", "b"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn chained_sequence_starts_in_chain_order() {
    init_tracing();
    let executor = unbounded();
    let timeline = Timeline::new();

    let labels = ["one", "two", "three", "four", "five"];
    let tasks: Vec<TaskHandle> = labels
        .iter()
        .map(|label| timed(&timeline, label, 5).handle())
        .collect();
    tasks.chained();

    executor
        .queue(tasks.clone(), QueueOptions::new().unbatched())
        .unwrap();
    with_timeout(tasks[4].finished()).await;

    assert_eq!(timeline.starts(), labels.map(String::from).to_vec());
    assert_eq!(timeline.max_overlap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn batches_never_overlap() {
    init_tracing();
    let executor = unbounded();
    let timeline = Timeline::new();

    let labels: Vec<String> = (0..9).map(|i| format!("t{i}")).collect();
    let tasks: Vec<Task<()>> = labels
        .iter()
        .map(|label| timed(&timeline, label, 20))
        .collect();

    let (done_tx, done_rx) = oneshot::channel();
    executor
        .queue(
            tasks.clone(),
            QueueOptions::new().batch_size(3).on_complete(move |_| {
                let _ = done_tx.send(());
            }),
        )
        .unwrap();
    with_timeout(done_rx).await.unwrap();

    for batch in 0..2 {
        for earlier in &labels[batch * 3..batch * 3 + 3] {
            for later in &labels[(batch + 1) * 3..(batch + 1) * 3 + 3] {
                assert!(
                    timeline.ended_before_started(earlier, later),
                    "{later} started before {earlier} ended"
                );
            }
        }
    }
    // Tasks inside a batch do run side by side.
    assert!(timeline.max_overlap() > 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn batch_of_one_is_strictly_serial() {
    init_tracing();
    let executor = unbounded();
    let timeline = Timeline::new();

    let tasks: Vec<Task<()>> = (0..4)
        .map(|i| timed(&timeline, &format!("s{i}"), 5))
        .collect();
    executor
        .queue(tasks.clone(), QueueOptions::new().batch_size(1))
        .unwrap();
    with_timeout(tasks[3].finished()).await;

    assert_eq!(timeline.starts(), vec!["s0", "s1", "s2", "s3"]);
    assert_eq!(timeline.max_overlap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn completion_callback_sees_all_tasks_finished() {
    init_tracing();
    let executor = unbounded();
    let fired = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<Task<usize>> = (0..25).map(|i| Task::sync(move |_| Some(i))).collect();

    let (done_tx, done_rx) = oneshot::channel();
    let calls = fired.clone();
    executor
        .queue(
            tasks.clone(),
            QueueOptions::new().batch_size(10).on_complete(move |all| {
                calls.fetch_add(1, Ordering::SeqCst);
                let states: Vec<TaskState> = all.iter().map(TaskHandle::state).collect();
                let _ = done_tx.send((all.len(), states));
            }),
        )
        .unwrap();

    let (count, states) = with_timeout(done_rx).await.unwrap();
    assert_eq!(count, 25);
    assert!(states.iter().all(|state| *state == TaskState::Finished));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    for (i, task) in tasks.iter().enumerate() {
        assert_eq!(task.output(), Some(&i));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ceiling_limits_parallelism() {
    init_tracing();
    let executor = Executor::new(ExecutorConfig::named("capped").with_max_concurrent(Some(2))).unwrap();
    let timeline = Timeline::new();

    let tasks: Vec<Task<()>> = (0..8)
        .map(|i| timed(&timeline, &format!("c{i}"), 15))
        .collect();

    let (done_tx, done_rx) = oneshot::channel();
    executor
        .queue(
            tasks,
            QueueOptions::new().unbatched().on_complete(move |_| {
                let _ = done_tx.send(());
            }),
        )
        .unwrap();
    with_timeout(done_rx).await.unwrap();

    assert!(timeline.max_overlap() <= 2);
    assert_eq!(timeline.ends().len(), 8);
}

#[tokio::test]
async fn dispatch_follows_dependency_order() {
    init_tracing();
    let (executor, log) = recording_executor(ExecutorConfig::serial());

    let first = Task::sync(|_| Some(1)).named("first");
    let second = Task::sync(|_| Some(2)).named("second");
    let third = Task::sync(|_| Some(3)).named("third");
    third.after(&second);
    second.after(&first);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let (done_tx, done_rx) = oneshot::channel();
    let record = seen.clone();
    executor
        .queue(
            [third.handle(), second.handle(), first.handle()],
            QueueOptions::new().unbatched().on_complete(move |all| {
                record
                    .lock()
                    .unwrap()
                    .extend(all.iter().map(|task| task.label().to_string()));
                let _ = done_tx.send(());
            }),
        )
        .unwrap();
    with_timeout(done_rx).await.unwrap();

    let dispatched = log.lock().unwrap().clone();
    assert_eq!(&dispatched[..3], &["first", "second", "third"]);
    assert_eq!(dispatched.last().map(String::as_str), Some("taskweave-barrier"));
    assert_eq!(*seen.lock().unwrap(), vec!["third", "second", "first"]);
}
