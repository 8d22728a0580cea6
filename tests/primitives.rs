// tests/primitives.rs

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use taskweave::primitives::{Compound, Observe, Repeat, Wait};
use taskweave::{Executor, ExecutorConfig, Task, TaskState};
use taskweave_test_utils::{init_tracing, with_timeout};

fn unbounded() -> Executor {
    Executor::new(ExecutorConfig::named("primitives")).unwrap()
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    with_timeout(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}

#[tokio::test]
async fn observe_reports_a_change_once() {
    init_tracing();
    let executor = unbounded();
    let value = Arc::new(AtomicI32::new(3));
    let updates = Arc::new(Mutex::new(Vec::new()));

    let reads = Arc::new(AtomicUsize::new(0));

    let source = value.clone();
    let counter = reads.clone();
    let seen = updates.clone();
    let observer = Observe::new(move || {
        let current = source.load(Ordering::SeqCst);
        counter.fetch_add(1, Ordering::SeqCst);
        current
    })
    .interval(Duration::from_millis(20))
    .start(&executor, move |new: &i32, old: &i32| {
        seen.lock().unwrap().push((*new, *old));
    })
    .unwrap();

    // One read seeds the value, the next is the first tick.
    eventually(|| reads.load(Ordering::SeqCst) >= 2).await;
    assert!(updates.lock().unwrap().is_empty());
    value.store(7, Ordering::SeqCst);

    eventually(|| !updates.lock().unwrap().is_empty()).await;
    // A few more ticks without changes must not report anything.
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(observer.stop());
    with_timeout(observer.finished()).await;

    assert_eq!(*updates.lock().unwrap(), vec![(7, 3)]);
    assert_eq!(observer.task().state(), TaskState::Cancelled);
}

#[tokio::test]
async fn observe_trigger_forces_an_update() {
    init_tracing();
    let executor = unbounded();
    let updates = Arc::new(Mutex::new(Vec::new()));

    let seen = updates.clone();
    let observer = Observe::new(|| 5)
        .interval(Duration::from_secs(60))
        .start(&executor, move |new: &i32, old: &i32| {
            seen.lock().unwrap().push((*new, *old));
        })
        .unwrap();

    observer.trigger();
    eventually(|| !updates.lock().unwrap().is_empty()).await;
    observer.stop();

    assert_eq!(*updates.lock().unwrap(), vec![(5, 5)]);
}

#[tokio::test]
async fn observe_until_ends_the_observation() {
    init_tracing();
    let executor = unbounded();
    let done = Arc::new(AtomicBool::new(false));

    let flag = done.clone();
    let observer = Observe::new(|| 0)
        .until(move || flag.load(Ordering::SeqCst))
        .start(&executor, |_: &i32, _: &i32| {})
        .unwrap();

    done.store(true, Ordering::SeqCst);
    with_timeout(observer.finished()).await;
    assert_eq!(observer.task().state(), TaskState::Finished);
}

#[tokio::test]
async fn wait_holds_for_its_duration() {
    init_tracing();
    let executor = unbounded();

    let wait = Wait::new(Duration::from_millis(200)).into_task();
    let started = Instant::now();
    wait.queue(&executor).unwrap();
    with_timeout(wait.finished()).await;

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(200), "finished early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(400), "finished late: {elapsed:?}");
    assert_eq!(wait.state(), TaskState::Finished);
}

#[tokio::test]
async fn wait_ends_when_its_predicate_holds() {
    init_tracing();
    let executor = unbounded();
    let ready = Arc::new(AtomicBool::new(false));

    let flag = ready.clone();
    let wait = Wait::until(move || flag.load(Ordering::SeqCst))
        .at_most(Duration::from_secs(30))
        .into_task();
    let started = Instant::now();
    wait.queue(&executor).unwrap();

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(wait.state(), TaskState::Running);
    ready.store(true, Ordering::SeqCst);
    with_timeout(wait.finished()).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(wait.state(), TaskState::Finished);
}

#[tokio::test]
async fn wait_can_be_cancelled_early() {
    init_tracing();
    let executor = unbounded();

    let wait = Wait::new(Duration::from_secs(60)).into_task();
    let after = Task::sync(|_| Some(1));
    after.after(&wait);
    wait.queue(&executor).unwrap();
    after.queue(&executor).unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    wait.cancel();
    with_timeout(after.finished()).await;

    assert_eq!(wait.state(), TaskState::Cancelled);
    assert_eq!(after.output(), Some(&1));
}

#[tokio::test]
async fn repeat_runs_until_its_duration_elapses() {
    init_tracing();
    let executor = unbounded();
    let runs = Arc::new(AtomicUsize::new(0));

    let counter = runs.clone();
    let repeat = Repeat::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
    .interval(Duration::from_millis(100))
    .duration(Duration::from_millis(350))
    .into_task();
    repeat.queue(&executor).unwrap();
    with_timeout(repeat.finished()).await;

    let ticks = repeat.output().copied().unwrap_or(0);
    assert!((2..=4).contains(&ticks), "unexpected tick count {ticks}");
    eventually(|| runs.load(Ordering::SeqCst) as u64 == ticks).await;
}

#[tokio::test]
async fn repeat_interval_is_floored() {
    init_tracing();
    let executor = unbounded();

    let repeat = Repeat::new(|| {})
        .interval(Duration::from_millis(1))
        .duration(Duration::from_millis(250))
        .into_task();
    repeat.queue(&executor).unwrap();
    with_timeout(repeat.finished()).await;

    // 100ms floor: at most three ticks fit into 250ms.
    assert!(repeat.output().copied().unwrap_or(0) <= 3);
}

#[tokio::test]
async fn repeat_stops_on_predicate_or_cancel() {
    init_tracing();
    let executor = unbounded();
    let runs = Arc::new(AtomicUsize::new(0));

    let counter = runs.clone();
    let probe = runs.clone();
    let until = Repeat::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
    .until(move || probe.load(Ordering::SeqCst) >= 2)
    .into_task();
    until.queue(&executor).unwrap();
    with_timeout(until.finished()).await;
    assert_eq!(until.state(), TaskState::Finished);
    assert!(runs.load(Ordering::SeqCst) >= 2);

    let endless = Repeat::new(|| {}).into_task();
    endless.queue(&executor).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(endless.cancel());
    with_timeout(endless.finished()).await;
    assert_eq!(endless.state(), TaskState::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn compound_finishes_after_its_children() {
    init_tracing();
    let executor = unbounded();
    let order = Arc::new(Mutex::new(Vec::new()));

    let children: Vec<Task<()>> = (0..3)
        .map(|i| {
            let order = order.clone();
            Task::sync(move |_| {
                std::thread::sleep(Duration::from_millis(10));
                order.lock().unwrap().push(i);
                Some(())
            })
        })
        .collect();

    let compound = Compound::new(children.clone()).into_task().named("compound");
    let after = Task::sync({
        let order = order.clone();
        move |_| Some(order.lock().unwrap().len())
    });
    after.after(&compound);

    compound.queue(&executor).unwrap();
    after.queue(&executor).unwrap();
    with_timeout(after.finished()).await;

    assert_eq!(compound.state(), TaskState::Finished);
    assert!(children.iter().all(|child| child.state() == TaskState::Finished));
    assert_eq!(after.output(), Some(&3));
}

#[tokio::test]
async fn cancelling_a_compound_cancels_its_children() {
    init_tracing();
    let executor = unbounded();

    let slow = Wait::until(|| false).into_task();
    let quick = Task::sync(|_| Some(()));
    let compound = Compound::new([slow.clone()]).into_task();
    let nested = Compound::new([quick.clone()]).into_task();

    compound.queue(&executor).unwrap();
    nested.queue(&executor).unwrap();
    eventually(|| slow.state() == TaskState::Running).await;
    with_timeout(nested.finished()).await;

    assert!(compound.cancel());
    with_timeout(slow.finished()).await;

    assert_eq!(compound.state(), TaskState::Cancelled);
    assert_eq!(slow.state(), TaskState::Cancelled);
    assert_eq!(quick.state(), TaskState::Finished);
}
