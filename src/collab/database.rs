// src/collab/database.rs

//! Persistence collaborator contract and the operations built on it.
//!
//! A [`Database`] exposes two execution contexts: a view context that is
//! only touched from the affinity context, and a background context for
//! writes and bulk reads on the worker pool. Records are addressed by an
//! [`Identifier`] or matched by predicate.

use std::fmt;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, warn};

use crate::task::{Finisher, Operation, TaskContext, lock};
use crate::types::Affinity;

/// Typed failure reported by a store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Stable identity of a stored record: the id assigned by a remote
/// service, the id assigned locally before upload, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Identifier {
    pub remote: Option<String>,
    pub local: Option<String>,
}

impl Identifier {
    pub fn remote(id: impl Into<String>) -> Self {
        Self {
            remote: Some(id.into()),
            local: None,
        }
    }

    pub fn local(id: impl Into<String>) -> Self {
        Self {
            remote: None,
            local: Some(id.into()),
        }
    }

    pub fn with_local(mut self, id: impl Into<String>) -> Self {
        self.local = Some(id.into());
        self
    }

    /// Whether both identify the same record. Remote ids decide when both
    /// sides carry one; otherwise local ids do. Empty ids never match.
    pub fn matches(&self, other: &Identifier) -> bool {
        fn present(id: &Option<String>) -> Option<&str> {
            id.as_deref().filter(|id| !id.is_empty())
        }

        if let (Some(a), Some(b)) = (present(&self.remote), present(&other.remote)) {
            return a == b;
        }
        match (present(&self.local), present(&other.local)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// A stored record that knows its own identity.
pub trait Identifiable {
    fn identifier(&self) -> Identifier;
}

pub trait Database: Send + Sync + 'static {
    type Context: Send + Sync;
    type Record: Identifiable + Clone + Send + Sync + 'static;

    fn view_context(&self) -> &Self::Context;

    fn background_context(&self) -> &Self::Context;

    fn has_changes(&self, context: &Self::Context) -> bool;

    /// Persist pending changes in `context`.
    fn save(&self, context: &Self::Context) -> Result<(), StoreError>;

    fn fetch(&self, context: &Self::Context, identifier: &Identifier) -> Option<Self::Record>;

    /// Every record in `context` for which `predicate` holds.
    fn fetch_matching(
        &self,
        context: &Self::Context,
        predicate: &dyn Fn(&Self::Record) -> bool,
    ) -> Vec<Self::Record>;

    /// Insert a new record carrying `identifier` into `context`.
    fn create(&self, context: &Self::Context, identifier: &Identifier) -> Self::Record;

    /// Remove the record with `identifier`. Returns `false` if there was none.
    fn delete(&self, context: &Self::Context, identifier: &Identifier) -> bool;

    fn fetch_or_create(&self, context: &Self::Context, identifier: &Identifier) -> Self::Record {
        match self.fetch(context, identifier) {
            Some(record) => record,
            None => self.create(context, identifier),
        }
    }
}

/// Save `context` if it has pending changes; a clean context is a no-op.
pub fn save_changes<D: Database + ?Sized>(
    database: &D,
    context: &D::Context,
) -> Result<(), StoreError> {
    if !database.has_changes(context) {
        return Ok(());
    }
    database.save(context)
}

type WriteFn<C> = Box<dyn FnOnce(&C) -> Result<(), StoreError> + Send>;

/// Runs a write closure against the background context, then saves.
///
/// Finishes with the combined result; a failed write or save is reported
/// through the output, never by cancelling.
pub struct DatabaseWrite<D: Database> {
    database: Arc<D>,
    write: Mutex<Option<WriteFn<D::Context>>>,
}

impl<D: Database> DatabaseWrite<D> {
    pub fn new<F>(database: Arc<D>, write: F) -> Self
    where
        F: FnOnce(&D::Context) -> Result<(), StoreError> + Send + 'static,
    {
        Self {
            database,
            write: Mutex::new(Some(Box::new(write))),
        }
    }

    pub fn database(&self) -> &Arc<D> {
        &self.database
    }
}

impl<D: Database> Operation for DatabaseWrite<D> {
    type Output = Result<(), StoreError>;

    fn execute(&self, finisher: Finisher<Self::Output>, cx: &TaskContext) {
        let Some(write) = lock(&self.write).take() else {
            warn!(task = %cx.label(), "database write already consumed; cancelling");
            finisher.cancel();
            return;
        };

        let context = self.database.background_context();
        let result = write(context).and_then(|()| save_changes(&*self.database, context));
        match &result {
            Ok(()) => debug!(task = %cx.label(), "database write saved"),
            Err(err) => warn!(task = %cx.label(), error = %err, "database write failed"),
        }
        finisher.finish(result);
    }
}

impl<D: Database> fmt::Debug for DatabaseWrite<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseWrite")
            .field("pending", &lock(&self.write).is_some())
            .finish()
    }
}

type FetchFn<C, T> = Box<dyn Fn(&C) -> Option<T> + Send + Sync>;

/// Synchronous read from one of the database's contexts.
///
/// By default the fetch runs against the view context on the affinity
/// context; [`DatabaseFetch::in_background`] moves it to the background
/// context on the worker pool.
pub struct DatabaseFetch<D: Database, T> {
    database: Arc<D>,
    fetch: FetchFn<D::Context, T>,
    on_view: bool,
}

impl<D: Database, T: Send + Sync + 'static> DatabaseFetch<D, T> {
    pub fn new<F>(database: Arc<D>, fetch: F) -> Self
    where
        F: Fn(&D::Context) -> Option<T> + Send + Sync + 'static,
    {
        Self {
            database,
            fetch: Box::new(fetch),
            on_view: true,
        }
    }

    pub fn in_background(mut self) -> Self {
        self.on_view = false;
        self
    }
}

impl<D: Database, T: Send + Sync + 'static> Operation for DatabaseFetch<D, T> {
    type Output = T;

    fn execute(&self, finisher: Finisher<T>, _cx: &TaskContext) {
        let context = if self.on_view {
            self.database.view_context()
        } else {
            self.database.background_context()
        };
        finisher.finish_with((self.fetch)(context));
    }

    fn affinity(&self) -> Affinity {
        if self.on_view {
            Affinity::Designated
        } else {
            Affinity::Pool
        }
    }
}

/// Re-reads records produced by a dependency, so a consumer gets copies
/// from the view context instead of the ones another context handed out.
///
/// Identifiers come from the first dependency producing
/// `Vec<D::Record>` unless given explicitly. Without such a dependency the
/// task cancels; an empty or missing list finishes with an empty vec.
pub struct DatabaseRefetch<D: Database> {
    database: Arc<D>,
    identifiers: Option<Vec<Identifier>>,
}

impl<D: Database> DatabaseRefetch<D> {
    pub fn new(database: Arc<D>) -> Self {
        Self {
            database,
            identifiers: None,
        }
    }

    pub fn with_identifiers(mut self, identifiers: Vec<Identifier>) -> Self {
        self.identifiers = Some(identifiers);
        self
    }
}

impl<D: Database> Operation for DatabaseRefetch<D> {
    type Output = Vec<D::Record>;

    fn execute(&self, finisher: Finisher<Self::Output>, cx: &TaskContext) {
        let identifiers = match &self.identifiers {
            Some(identifiers) => identifiers.clone(),
            None => {
                if !cx.has_dependency_producing::<Vec<D::Record>>() {
                    debug!(task = %cx.label(), "no dependency produces records; cancelling");
                    finisher.cancel();
                    return;
                }
                cx.output_from_dependency::<Vec<D::Record>>()
                    .map(|records| records.iter().map(Identifiable::identifier).collect())
                    .unwrap_or_default()
            }
        };
        if identifiers.is_empty() {
            finisher.finish(Vec::new());
            return;
        }

        let context = if cx.affinity().is_current() {
            self.database.view_context()
        } else {
            self.database.background_context()
        };
        let records: Vec<D::Record> = identifiers
            .iter()
            .filter_map(|identifier| self.database.fetch(context, identifier))
            .collect();
        debug!(
            task = %cx.label(),
            requested = identifiers.len(),
            found = records.len(),
            "records refetched"
        );
        finisher.finish(records);
    }

    fn affinity(&self) -> Affinity {
        Affinity::Designated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::executor::Executor;
    use crate::task::{Dependable, Task};
    use crate::types::{Discipline, TaskState};

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: Identifier,
        title: String,
    }

    impl Identifiable for Row {
        fn identifier(&self) -> Identifier {
            self.id.clone()
        }
    }

    #[derive(Default)]
    struct Scratch {
        rows: Mutex<Vec<Row>>,
        dirty: Mutex<bool>,
    }

    #[derive(Default)]
    struct MemoryStore {
        view: Scratch,
        background: Scratch,
        saves: AtomicUsize,
    }

    impl MemoryStore {
        fn insert(context: &Scratch, title: &str) {
            lock(&context.rows).push(Row {
                id: Identifier::local(title),
                title: title.to_string(),
            });
            *lock(&context.dirty) = true;
        }

        fn seeded(titles: &[&str]) -> Arc<Self> {
            let store = Self::default();
            for title in titles {
                Self::insert(store.background_context(), title);
            }
            save_changes(&store, store.background_context()).unwrap();
            Arc::new(store)
        }
    }

    impl Database for MemoryStore {
        type Context = Scratch;
        type Record = Row;

        fn view_context(&self) -> &Scratch {
            &self.view
        }

        fn background_context(&self) -> &Scratch {
            &self.background
        }

        fn has_changes(&self, context: &Scratch) -> bool {
            *lock(&context.dirty)
        }

        fn save(&self, context: &Scratch) -> Result<(), StoreError> {
            if lock(&context.rows).iter().any(|row| row.title.is_empty()) {
                return Err(StoreError::Validation("empty row".into()));
            }
            self.saves.fetch_add(1, Ordering::SeqCst);
            *lock(&context.dirty) = false;
            let rows = lock(&context.rows).clone();
            *lock(&self.view.rows) = rows;
            Ok(())
        }

        fn fetch(&self, context: &Scratch, identifier: &Identifier) -> Option<Row> {
            lock(&context.rows)
                .iter()
                .find(|row| row.id.matches(identifier))
                .cloned()
        }

        fn fetch_matching(&self, context: &Scratch, predicate: &dyn Fn(&Row) -> bool) -> Vec<Row> {
            lock(&context.rows)
                .iter()
                .filter(|row| predicate(row))
                .cloned()
                .collect()
        }

        fn create(&self, context: &Scratch, identifier: &Identifier) -> Row {
            let row = Row {
                id: identifier.clone(),
                title: String::from("untitled"),
            };
            lock(&context.rows).push(row.clone());
            *lock(&context.dirty) = true;
            row
        }

        fn delete(&self, context: &Scratch, identifier: &Identifier) -> bool {
            let mut rows = lock(&context.rows);
            let before = rows.len();
            rows.retain(|row| !row.id.matches(identifier));
            let removed = rows.len() != before;
            if removed {
                *lock(&context.dirty) = true;
            }
            removed
        }
    }

    #[test]
    fn identifiers_prefer_remote_then_local() {
        let both = Identifier::remote("r1").with_local("l1");
        assert!(both.matches(&Identifier::remote("r1")));
        assert!(both.matches(&Identifier::local("l1")));
        assert!(!both.matches(&Identifier::remote("r2").with_local("l1")));
        assert!(!Identifier::default().matches(&Identifier::default()));
        assert!(!Identifier::local("").matches(&Identifier::local("")));
    }

    #[test]
    fn fetch_or_create_and_delete_by_identifier() {
        let store = MemoryStore::default();
        let context = store.background_context();
        MemoryStore::insert(context, "alpha");

        let found = store.fetch_or_create(context, &Identifier::local("alpha"));
        assert_eq!(found.title, "alpha");
        let created = store.fetch_or_create(context, &Identifier::remote("beta"));
        assert_eq!(created.title, "untitled");
        assert_eq!(lock(&context.rows).len(), 2);

        let titled = store.fetch_matching(context, &|row: &Row| row.title == "alpha");
        assert_eq!(titled.len(), 1);

        assert!(store.delete(context, &Identifier::remote("beta")));
        assert!(!store.delete(context, &Identifier::remote("beta")));
        assert!(store.fetch(context, &Identifier::remote("beta")).is_none());
    }

    #[test]
    fn clean_context_is_not_saved() {
        let store = MemoryStore::default();
        assert_eq!(save_changes(&store, store.background_context()), Ok(()));
        assert_eq!(store.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn write_saves_and_view_sees_rows() {
        let executor = Executor::serial().unwrap();
        let store = Arc::new(MemoryStore::default());

        let write = Task::from_operation(DatabaseWrite::new(store.clone(), |cx: &Scratch| {
            MemoryStore::insert(cx, "alpha");
            Ok(())
        }));
        let fetch = Task::from_operation(DatabaseFetch::new(store.clone(), |cx: &Scratch| {
            Some(lock(&cx.rows).len())
        }));
        assert_eq!(fetch.discipline(), Discipline::Affinity);
        fetch.after(&write);

        executor.queue([write.handle(), fetch.handle()], Default::default()).unwrap();
        fetch.finished().await;

        assert_eq!(write.output(), Some(&Ok(())));
        assert_eq!(fetch.output(), Some(&1));
        assert_eq!(store.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn validation_failure_is_published_not_cancelled() {
        let executor = Executor::serial().unwrap();
        let store = Arc::new(MemoryStore::default());

        let write = Task::from_operation(DatabaseWrite::new(store.clone(), |cx: &Scratch| {
            MemoryStore::insert(cx, "");
            Ok(())
        }));
        write.queue(&executor).unwrap();
        write.finished().await;

        assert_eq!(write.state(), TaskState::Finished);
        assert!(matches!(write.output(), Some(Err(StoreError::Validation(_)))));
        assert_eq!(store.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn refetch_reads_dependency_records_from_the_view() {
        let executor = Executor::serial().unwrap();
        let store = MemoryStore::seeded(&["alpha", "beta", "gamma"]);
        // Diverge the background copy so the view read is observable.
        lock(&store.background.rows)[0].title = "stale".into();

        let source = store.clone();
        let produce = Task::sync(move |_| {
            let mut rows = source.fetch_matching(source.background_context(), &|row: &Row| {
                row.title != "beta"
            });
            rows.push(Row {
                id: Identifier::local("missing"),
                title: "missing".into(),
            });
            Some(rows)
        });
        let refetch = Task::from_operation(DatabaseRefetch::new(store.clone()));
        assert_eq!(refetch.discipline(), Discipline::Affinity);
        refetch.after(&produce);

        executor
            .queue([produce.handle(), refetch.handle()], Default::default())
            .unwrap();
        refetch.finished().await;

        let titles: Vec<&str> = refetch
            .output()
            .unwrap()
            .iter()
            .map(|row| row.title.as_str())
            .collect();
        assert_eq!(titles, vec!["alpha", "gamma"]);
    }

    #[tokio::test]
    async fn refetch_without_a_record_dependency_cancels() {
        let executor = Executor::serial().unwrap();
        let store = MemoryStore::seeded(&["alpha"]);

        let unrelated = Task::sync(|_| Some(1_u32));
        let refetch = Task::from_operation(DatabaseRefetch::new(store.clone()));
        refetch.after(&unrelated);

        executor
            .queue([unrelated.handle(), refetch.handle()], Default::default())
            .unwrap();
        refetch.finished().await;

        assert_eq!(refetch.state(), TaskState::Cancelled);
        assert_eq!(refetch.output(), None);
    }

    #[tokio::test]
    async fn refetch_of_nothing_finishes_empty() {
        let executor = Executor::serial().unwrap();
        let store = MemoryStore::seeded(&["alpha"]);

        let produce = Task::<Vec<Row>>::sync(|_| None);
        let refetch = Task::from_operation(DatabaseRefetch::new(store.clone()));
        refetch.after(&produce);
        let explicit = Task::from_operation(
            DatabaseRefetch::new(store).with_identifiers(vec![Identifier::local("alpha")]),
        );

        executor
            .queue(
                [produce.handle(), refetch.handle(), explicit.handle()],
                Default::default(),
            )
            .unwrap();
        refetch.finished().await;
        explicit.finished().await;

        assert_eq!(refetch.state(), TaskState::Finished);
        assert_eq!(refetch.output(), Some(&Vec::new()));
        assert_eq!(explicit.output().map(Vec::len), Some(1));
    }
}
