// src/collab/resource.rs

//! Bootstrapping of long-lived resources (stores, connection pools, ...)
//! as a task, with a single discard-and-retry on failure.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};

use crate::task::{Finisher, Operation, TaskContext, lock};

/// Completion callback handed to [`ResourceLoader::load`].
pub type LoadDone<R> = Box<dyn FnOnce(anyhow::Result<R>) + Send>;

/// Loads a resource asynchronously.
///
/// `load` may call `done` from any thread, exactly once. `discard` removes
/// whatever a failed load left behind so that a second attempt starts
/// clean.
pub trait ResourceLoader: Send + Sync + 'static {
    type Resource: Send + Sync + 'static;

    fn load(&self, done: LoadDone<Self::Resource>);

    fn discard(&self) -> anyhow::Result<()>;
}

struct Registered<R> {
    by_name: HashMap<String, Arc<R>>,
    default: Option<Arc<R>>,
}

/// Initialized resources by name. The most recently added one is the
/// default.
pub struct ResourceRegistry<R> {
    inner: Arc<Mutex<Registered<R>>>,
}

impl<R> ResourceRegistry<R> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registered {
                by_name: HashMap::new(),
                default: None,
            })),
        }
    }

    pub fn add(&self, name: impl Into<String>, resource: Arc<R>) {
        let mut registered = lock(&self.inner);
        registered.default = Some(resource.clone());
        registered.by_name.insert(name.into(), resource);
    }

    pub fn get(&self, name: &str) -> Option<Arc<R>> {
        lock(&self.inner).by_name.get(name).cloned()
    }

    pub fn default_resource(&self) -> Option<Arc<R>> {
        lock(&self.inner).default.clone()
    }

    /// The resource called `name`, or the default when no name is given.
    pub fn select(&self, name: Option<&str>) -> Option<Arc<R>> {
        match name {
            Some(name) => self.get(name),
            None => self.default_resource(),
        }
    }

    /// Make an already registered resource the default.
    pub fn set_default(&self, name: &str) -> bool {
        let mut registered = lock(&self.inner);
        match registered.by_name.get(name).cloned() {
            Some(resource) => {
                registered.default = Some(resource);
                true
            }
            None => false,
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.inner).by_name.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R> Default for ResourceRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Clone for ResourceRegistry<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R> fmt::Debug for ResourceRegistry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("names", &self.names())
            .finish()
    }
}

/// Attempts made before initialization is given up.
const MAX_ATTEMPTS: u32 = 2;

/// Operation that loads a resource, registers it under `name` and
/// publishes it as the task output.
///
/// A failed load is followed by `discard` and one more attempt. If that
/// fails too, the task is cancelled.
pub struct InitializeResource<L: ResourceLoader> {
    name: String,
    loader: Arc<L>,
    registry: ResourceRegistry<L::Resource>,
}

impl<L: ResourceLoader> InitializeResource<L> {
    pub fn new(name: impl Into<String>, loader: L, registry: ResourceRegistry<L::Resource>) -> Self {
        Self {
            name: name.into(),
            loader: Arc::new(loader),
            registry,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &ResourceRegistry<L::Resource> {
        &self.registry
    }
}

impl<L: ResourceLoader> Operation for InitializeResource<L> {
    type Output = Arc<L::Resource>;

    fn execute(&self, finisher: Finisher<Self::Output>, _cx: &TaskContext) {
        attempt_load(
            self.loader.clone(),
            self.registry.clone(),
            self.name.clone(),
            finisher,
            1,
        );
    }

    fn label(&self) -> Option<String> {
        Some(format!("initialize-{}", self.name))
    }
}

fn attempt_load<L: ResourceLoader>(
    loader: Arc<L>,
    registry: ResourceRegistry<L::Resource>,
    name: String,
    finisher: Finisher<Arc<L::Resource>>,
    attempt: u32,
) {
    let retry_loader = loader.clone();
    loader.load(Box::new(move |result| match result {
        Ok(resource) => {
            let resource = Arc::new(resource);
            registry.add(name.clone(), resource.clone());
            info!(resource = %name, attempt, "resource initialized");
            finisher.finish(resource);
        }
        Err(err) if attempt < MAX_ATTEMPTS => {
            warn!(resource = %name, attempt, error = %err, "resource load failed; discarding and retrying");
            match retry_loader.discard() {
                Ok(()) => attempt_load(retry_loader, registry, name, finisher, attempt + 1),
                Err(discard_err) => {
                    error!(resource = %name, error = %discard_err, "failed to discard resource; cancelling");
                    finisher.cancel();
                }
            }
        }
        Err(err) => {
            error!(resource = %name, attempt, error = %err, "resource initialization failed; cancelling");
            finisher.cancel();
        }
    }));
}
