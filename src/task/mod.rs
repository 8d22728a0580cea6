// src/task/mod.rs

//! Tasks: typed units of work with dependency edges and a one-shot output.
//!
//! A [`Task<T>`] is a cheap, cloneable handle. Its body runs at most once,
//! its output is published at most once, and it becomes terminal by either
//! finishing or being cancelled. Dependency edges are wired with
//! [`Task::after`] / [`Task::before`] before the task is submitted to an
//! [`Executor`](crate::Executor).
//!
//! [`TaskHandle`] is the type-erased form used wherever tasks of different
//! output types are mixed (queues, dependency lists, batching helpers).

mod context;
mod operation;
mod outcome;

pub use context::{Finisher, Input, TaskContext};
pub use operation::Operation;
pub(crate) use outcome::{ErasedOutcome, FinishHook, Gate, Listener, Outcome};

use std::any::{Any, TypeId};
use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::errors::Result;
use crate::exec::RunEnv;
use crate::executor::Executor;
use crate::types::{Affinity, Discipline, TaskId, TaskState};

/// Lock a std mutex, recovering the data if a panicking holder poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
pub(crate) type Capability = Arc<dyn Any + Send + Sync>;

pub(crate) type SyncBody<T> = Box<dyn FnOnce(&TaskContext) -> Option<T> + Send>;
pub(crate) type DeferredBody<T> = Box<dyn FnOnce(Finisher<T>, &TaskContext) + Send>;
pub(crate) type FutureBody<T> = Box<dyn FnOnce(TaskContext) -> BoxFuture<Option<T>> + Send>;

pub(crate) enum Body<T> {
    Sync(SyncBody<T>),
    Deferred(DeferredBody<T>),
    Affinity(DeferredBody<T>),
    Future(FutureBody<T>),
}

type Callback<T> = Box<dyn FnOnce(&Task<T>, Option<&T>) + Send>;

/// Non-owning edge to a dependency: its shared outcome plus the optional
/// capability object it was built from.
#[derive(Clone)]
pub(crate) struct Dependency {
    pub(crate) outcome: Arc<dyn ErasedOutcome>,
    pub(crate) capability: Option<Capability>,
}

impl Dependency {
    pub(crate) fn id(&self) -> TaskId {
        self.outcome.id()
    }
}

/// First published output of type `U` among `deps`, in declaration order.
pub(crate) fn first_output<U: 'static>(deps: &[Dependency]) -> Option<&U> {
    deps.iter()
        .filter(|dep| dep.outcome.output_type() == TypeId::of::<U>())
        .find_map(|dep| dep.outcome.output_any()?.downcast_ref::<U>())
}

/// First dependency whose capability object is a `C`.
pub(crate) fn first_capability<C: Send + Sync + 'static>(deps: &[Dependency]) -> Option<Arc<C>> {
    deps.iter()
        .find_map(|dep| dep.capability.clone()?.downcast::<C>().ok())
}

#[derive(Default)]
struct Wiring {
    dependencies: Vec<Dependency>,
    dependents: Vec<TaskId>,
    submitted: bool,
}

struct TaskInner<T> {
    id: TaskId,
    discipline: Discipline,
    outcome: Arc<Outcome<T>>,
    wiring: Mutex<Wiring>,
    body: Mutex<Option<Body<T>>>,
    callback: Mutex<Option<Callback<T>>>,
    capability: Option<Capability>,
}

/// A unit of schedulable work producing an optional `T`.
pub struct Task<T> {
    inner: Arc<TaskInner<T>>,
}

impl<T: Send + Sync + 'static> Task<T> {
    fn build(
        discipline: Discipline,
        body: Body<T>,
        capability: Option<Capability>,
        will_finish: Option<FinishHook<T>>,
    ) -> Self {
        let id = TaskId::next();
        Self {
            inner: Arc::new(TaskInner {
                id,
                discipline,
                outcome: Arc::new(Outcome::new(id, will_finish)),
                wiring: Mutex::new(Wiring::default()),
                body: Mutex::new(Some(body)),
                callback: Mutex::new(None),
                capability,
            }),
        }
    }

    /// Body computes the output directly on a blocking worker.
    pub fn sync<F>(body: F) -> Self
    where
        F: FnOnce(&TaskContext) -> Option<T> + Send + 'static,
    {
        Self::build(Discipline::Sync, Body::Sync(Box::new(body)), None, None)
    }

    /// Sync task reading the output of `dependency` through a typed input.
    ///
    /// The edge `dependency -> task` is wired here.
    pub fn sync_from<U, F>(dependency: &Task<U>, body: F) -> Self
    where
        U: Send + Sync + 'static,
        F: FnOnce(Option<&U>, &TaskContext) -> Option<T> + Send + 'static,
    {
        let input = dependency.input();
        let task = Self::sync(move |cx| body(input.get(), cx));
        task.after(dependency);
        task
    }

    /// Body starts external work and hands the [`Finisher`] to whoever will
    /// complete it. The worker slot stays occupied until then.
    pub fn deferred<F>(body: F) -> Self
    where
        F: FnOnce(Finisher<T>, &TaskContext) + Send + 'static,
    {
        Self::build(
            Discipline::Deferred,
            Body::Deferred(Box::new(body)),
            None,
            None,
        )
    }

    /// Deferred task whose body runs on the executor's affinity context.
    pub fn on_affinity<F>(body: F) -> Self
    where
        F: FnOnce(Finisher<T>, &TaskContext) + Send + 'static,
    {
        Self::build(
            Discipline::Affinity,
            Body::Affinity(Box::new(body)),
            None,
            None,
        )
    }

    /// Sync-style body executed on the affinity context.
    pub fn sync_on_affinity<F>(body: F) -> Self
    where
        F: FnOnce(&TaskContext) -> Option<T> + Send + 'static,
    {
        Self::on_affinity(move |finisher, cx| {
            finisher.finish_with(body(cx));
        })
    }

    /// Body is a future on the tokio runtime. Cancellation drops it.
    pub fn future<F, Fut>(body: F) -> Self
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Option<T>> + Send + 'static,
    {
        let body: FutureBody<T> = Box::new(move |cx| Box::pin(body(cx)));
        Self::build(Discipline::Future, Body::Future(body), None, None)
    }

    /// Wrap a struct-based [`Operation`]. The operation value becomes the
    /// task's capability, reachable from dependents via
    /// [`Task::typed_dependency`].
    pub fn from_operation<O>(operation: O) -> Self
    where
        O: Operation<Output = T>,
    {
        let op = Arc::new(operation);
        let label = op.label();

        let hook_op = op.clone();
        let will_finish: FinishHook<T> = Box::new(move |output| hook_op.will_finish(output));

        let run_op = op.clone();
        let start: DeferredBody<T> = Box::new(move |finisher, cx| {
            run_op.will_start(cx);
            run_op.execute(finisher, cx);
        });

        let (discipline, body) = match op.affinity() {
            Affinity::Pool => (Discipline::Deferred, Body::Deferred(start)),
            Affinity::Designated => (Discipline::Affinity, Body::Affinity(start)),
        };

        let capability: Capability = op;
        let task = Self::build(discipline, body, Some(capability), Some(will_finish));
        if let Some(label) = label {
            task.inner.outcome.set_label(label);
        }
        task
    }

    /// Give the task a human-readable label used in logs.
    pub fn named(self, label: impl Into<String>) -> Self {
        let label = label.into();
        if !self.inner.outcome.set_label(label.clone()) {
            debug!(task = %self.label(), ignored = %label, "task already labelled");
        }
        self
    }

    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    pub fn label(&self) -> &str {
        self.inner.outcome.label()
    }

    pub fn state(&self) -> TaskState {
        self.inner.outcome.state()
    }

    pub fn discipline(&self) -> Discipline {
        self.inner.discipline
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == TaskState::Cancelled
    }

    /// The published output. Only meaningful once the task is terminal.
    pub fn output(&self) -> Option<&T> {
        self.inner.outcome.output()
    }

    /// Publish `output` and finish the task. Returns `false` if the task was
    /// already terminal.
    pub fn finish(&self, output: T) -> bool {
        self.inner.outcome.finish(Some(output))
    }

    /// Cancel the task. No-op (returns `false`) on a terminal task.
    pub fn cancel(&self) -> bool {
        self.inner.outcome.cancel()
    }

    /// A handle that can finish this task from anywhere.
    pub fn finisher(&self) -> Finisher<T> {
        Finisher::new(self.inner.outcome.clone())
    }

    /// Typed read access to this task's output, for wiring into a dependent.
    pub fn input(&self) -> Input<T> {
        Input::new(self.inner.outcome.clone())
    }

    /// Resolves once the task is finished or cancelled.
    pub async fn finished(&self) {
        self.inner.outcome.gate().opened().await
    }

    /// This task starts only after `dependency` is terminal.
    pub fn after<D: Dependable + ?Sized>(&self, dependency: &D) -> &Self {
        link(&self.handle(), &dependency.handle());
        self
    }

    pub fn after_all<I>(&self, dependencies: I) -> &Self
    where
        I: IntoIterator,
        I::Item: Dependable,
    {
        let me = self.handle();
        for dependency in dependencies {
            link(&me, &dependency.handle());
        }
        self
    }

    /// `dependent` starts only after this task is terminal.
    pub fn before<D: Dependable + ?Sized>(&self, dependent: &D) -> &Self {
        link(&dependent.handle(), &self.handle());
        self
    }

    pub fn before_all<I>(&self, dependents: I) -> &Self
    where
        I: IntoIterator,
        I::Item: Dependable,
    {
        let me = self.handle();
        for dependent in dependents {
            link(&dependent.handle(), &me);
        }
        self
    }

    pub fn dependencies(&self) -> Vec<TaskId> {
        lock(&self.inner.wiring)
            .dependencies
            .iter()
            .map(Dependency::id)
            .collect()
    }

    pub fn dependents(&self) -> Vec<TaskId> {
        lock(&self.inner.wiring).dependents.clone()
    }

    /// First published output of type `U` among the direct dependencies.
    pub fn output_from_dependency<U: Clone + 'static>(&self) -> Option<U> {
        let wiring = lock(&self.inner.wiring);
        first_output::<U>(&wiring.dependencies).cloned()
    }

    /// First dependency built from an operation of type `C`.
    pub fn typed_dependency<C: Send + Sync + 'static>(&self) -> Option<Arc<C>> {
        let wiring = lock(&self.inner.wiring);
        first_capability::<C>(&wiring.dependencies)
    }

    /// Register the completion callback, delivered on the affinity context
    /// once the task is terminal. Replaces any earlier callback.
    pub fn then<F>(&self, callback: F) -> &Self
    where
        F: FnOnce(&Task<T>, Option<&T>) + Send + 'static,
    {
        if lock(&self.inner.wiring).submitted {
            warn!(task = %self.label(), "completion callback set after submission; ignoring");
            return self;
        }
        let previous = lock(&self.inner.callback).replace(Box::new(callback));
        if previous.is_some() {
            debug!(task = %self.label(), "completion callback replaced");
        }
        self
    }

    /// Run `hook` if the task is ever cancelled.
    pub fn on_cancel<F>(&self, hook: F) -> &Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.outcome.on_cancel(Box::new(hook));
        self
    }

    /// Submit this task alone to `executor`.
    pub fn queue(&self, executor: &Executor) -> Result<()> {
        executor.submit(self)
    }

    pub(crate) fn take_body(&self) -> Option<Body<T>> {
        lock(&self.inner.body).take()
    }

    pub(crate) fn outcome(&self) -> &Arc<Outcome<T>> {
        &self.inner.outcome
    }

    pub(crate) fn context(&self, env: RunEnv) -> TaskContext {
        let dependencies = lock(&self.inner.wiring).dependencies.clone();
        TaskContext::new(self.inner.outcome.clone(), dependencies, env)
    }
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> PartialEq for Task<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl<T> Eq for Task<T> {}

impl<T> Hash for Task<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl<T: Send + Sync + 'static> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id())
            .field("label", &self.label())
            .field("state", &self.state())
            .field("discipline", &self.discipline())
            .finish()
    }
}

/// Erased view of a task used by the executor and by mixed-type wiring.
pub(crate) trait Runnable: Send + Sync {
    fn id(&self) -> TaskId;
    fn label(&self) -> &str;
    fn state(&self) -> TaskState;
    fn outcome(&self) -> Arc<dyn ErasedOutcome>;
    fn capability(&self) -> Option<Capability>;
    fn dependencies(&self) -> Vec<Dependency>;
    fn dependents(&self) -> Vec<TaskId>;
    fn add_dependency(&self, dependency: Dependency) -> bool;
    fn add_dependent(&self, id: TaskId);
    fn is_submitted(&self) -> bool;
    fn mark_submitted(&self) -> bool;
    fn mark_ready(&self);
    fn cancel(&self) -> bool;
    fn has_callback(&self) -> bool;
    fn take_callback(&self) -> Option<Box<dyn FnOnce() + Send>>;
    fn start(&self, env: RunEnv) -> BoxFuture<()>;
    fn as_any(&self) -> &dyn Any;
}

impl<T: Send + Sync + 'static> Runnable for Task<T> {
    fn id(&self) -> TaskId {
        self.inner.id
    }

    fn label(&self) -> &str {
        self.inner.outcome.label()
    }

    fn state(&self) -> TaskState {
        self.inner.outcome.state()
    }

    fn outcome(&self) -> Arc<dyn ErasedOutcome> {
        self.inner.outcome.clone()
    }

    fn capability(&self) -> Option<Capability> {
        self.inner.capability.clone()
    }

    fn dependencies(&self) -> Vec<Dependency> {
        lock(&self.inner.wiring).dependencies.clone()
    }

    fn dependents(&self) -> Vec<TaskId> {
        lock(&self.inner.wiring).dependents.clone()
    }

    fn add_dependency(&self, dependency: Dependency) -> bool {
        let mut wiring = lock(&self.inner.wiring);
        if wiring.submitted {
            warn!(
                task = %self.inner.outcome.label(),
                dependency = %dependency.outcome.label(),
                "dependency added after submission; ignoring"
            );
            return false;
        }
        if wiring
            .dependencies
            .iter()
            .any(|existing| existing.id() == dependency.id())
        {
            return false;
        }
        wiring.dependencies.push(dependency);
        true
    }

    fn add_dependent(&self, id: TaskId) {
        let mut wiring = lock(&self.inner.wiring);
        if !wiring.dependents.contains(&id) {
            wiring.dependents.push(id);
        }
    }

    fn is_submitted(&self) -> bool {
        lock(&self.inner.wiring).submitted
    }

    fn mark_submitted(&self) -> bool {
        let mut wiring = lock(&self.inner.wiring);
        !std::mem::replace(&mut wiring.submitted, true)
    }

    fn mark_ready(&self) {
        self.inner.outcome.mark_ready();
    }

    fn cancel(&self) -> bool {
        self.inner.outcome.cancel()
    }

    fn has_callback(&self) -> bool {
        lock(&self.inner.callback).is_some()
    }

    fn take_callback(&self) -> Option<Box<dyn FnOnce() + Send>> {
        let callback = lock(&self.inner.callback).take()?;
        let task = self.clone();
        Some(Box::new(move || {
            let output = task.output();
            callback(&task, output);
        }))
    }

    fn start(&self, env: RunEnv) -> BoxFuture<()> {
        Box::pin(crate::exec::task_runner::run_task(self.clone(), env))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Anything that can stand on either side of a dependency edge.
pub trait Dependable {
    fn handle(&self) -> TaskHandle;
}

impl<T: Send + Sync + 'static> Dependable for Task<T> {
    fn handle(&self) -> TaskHandle {
        TaskHandle(Arc::new(self.clone()))
    }
}

impl Dependable for TaskHandle {
    fn handle(&self) -> TaskHandle {
        self.clone()
    }
}

impl<D: Dependable + ?Sized> Dependable for &D {
    fn handle(&self) -> TaskHandle {
        (**self).handle()
    }
}

/// Wire `dependent` to start after `dependency`.
pub(crate) fn link(dependent: &TaskHandle, dependency: &TaskHandle) {
    if dependent.id() == dependency.id() {
        warn!(task = %dependent.label(), "a task cannot depend on itself; ignoring");
        return;
    }
    let edge = Dependency {
        outcome: dependency.0.outcome(),
        capability: dependency.0.capability(),
    };
    if dependent.0.add_dependency(edge) {
        dependency.0.add_dependent(dependent.id());
    }
}

/// Type-erased, cloneable task handle. Compares and hashes by task id.
#[derive(Clone)]
pub struct TaskHandle(pub(crate) Arc<dyn Runnable>);

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.0.id()
    }

    pub fn label(&self) -> &str {
        self.0.label()
    }

    pub fn state(&self) -> TaskState {
        self.0.state()
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn cancel(&self) -> bool {
        self.0.cancel()
    }

    pub async fn finished(&self) {
        let outcome = self.0.outcome();
        outcome.gate().opened().await
    }

    /// Clone of the output if the task published one of type `U`.
    pub fn output<U: Clone + 'static>(&self) -> Option<U> {
        let outcome = self.0.outcome();
        let value = outcome.output_any()?.downcast_ref::<U>().cloned();
        value
    }

    /// Recover the typed task behind this handle.
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Task<T>> {
        self.0.as_any().downcast_ref::<Task<T>>().cloned()
    }

    pub fn after<D: Dependable + ?Sized>(&self, dependency: &D) -> &Self {
        link(self, &dependency.handle());
        self
    }

    pub fn after_all<I>(&self, dependencies: I) -> &Self
    where
        I: IntoIterator,
        I::Item: Dependable,
    {
        for dependency in dependencies {
            link(self, &dependency.handle());
        }
        self
    }

    pub fn before<D: Dependable + ?Sized>(&self, dependent: &D) -> &Self {
        link(&dependent.handle(), self);
        self
    }

    pub fn before_all<I>(&self, dependents: I) -> &Self
    where
        I: IntoIterator,
        I::Item: Dependable,
    {
        for dependent in dependents {
            link(&dependent.handle(), self);
        }
        self
    }

    pub fn dependencies(&self) -> Vec<TaskId> {
        self.0.dependencies().iter().map(Dependency::id).collect()
    }

    pub fn dependents(&self) -> Vec<TaskId> {
        self.0.dependents()
    }

    pub fn queue(&self, executor: &Executor) -> Result<()> {
        executor.submit(self)
    }
}

impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for TaskHandle {}

impl Hash for TaskHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id())
            .field("label", &self.label())
            .field("state", &self.state())
            .finish()
    }
}
