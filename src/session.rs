//! The task editing session: the recurrence/hierarchy engine.
//!
//! One session covers one open task-editing interaction, from open to
//! close/submit/cancel. The session owns the draft form state exclusively,
//! tracks the recurring-parent dimension through its state machine
//! (`Closed -> Open(no-parent) | Open(parent-loading) -> Open(parent-loaded)
//! -> Closed`), and reconciles recurrence edits between a child instance and
//! its parent.
//!
//! Async loads (parent task, intelligence flag, available tags) are
//! cooperative: each spawned task captures the session epoch at spawn time
//! and re-checks "still open, same epoch" before applying its result, so
//! completions that race with `close()` are discarded rather than aborted.

use crate::analyzer::{self, Suggestions};
use crate::error::{StoreError, StoreResult};
use crate::store::TaskStore;
use crate::types::{Priority, RecurrenceField, Task, TaskPayload, TaskStatus};
use chrono::NaiveDate;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Observable session state. The parent dimension is terminal at `NoParent`
/// for tasks without a back-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    OpenNoParent,
    OpenParentLoading,
    OpenParentLoaded,
}

/// Name of the user-level flag gating the task-name analyzer.
pub const INTELLIGENCE_FLAG: &str = "task_intelligence";

#[derive(Debug)]
enum ParentSlot {
    None,
    Loading,
    Loaded(Task),
}

struct SessionInner {
    open: bool,
    /// Bumped on every close; spawned loads only apply results for the epoch
    /// they were started under.
    epoch: u64,
    payload: TaskPayload,
    parent: ParentSlot,
    /// Analyzer gate. Defaults to enabled until (and unless) the flag load
    /// says otherwise; flag-load failure keeps the default.
    intelligence_enabled: bool,
    available_tags: Vec<String>,
}

/// An open task-editing session over a [`TaskStore`].
///
/// Dropping the session releases the "modal open" claim on every exit path;
/// `close()` does the same explicitly.
pub struct EditSession<S: TaskStore> {
    store: Arc<S>,
    inner: Arc<Mutex<SessionInner>>,
}

impl<S: TaskStore> EditSession<S> {
    /// Open an editing session for an existing task.
    ///
    /// With `recurring_parent_id` absent, the parent dimension starts (and
    /// stays) `NoParent`; otherwise it starts `Loading` until
    /// [`spawn_parent_load`](Self::spawn_parent_load) resolves.
    pub fn open(store: Arc<S>, task: &Task) -> Self {
        let parent = if task.recurring_parent_id.is_some() {
            ParentSlot::Loading
        } else {
            ParentSlot::None
        };
        debug!(task_id = %task.id, has_parent_ref = task.recurring_parent_id.is_some(), "editing session opened");
        Self {
            store,
            inner: Arc::new(Mutex::new(SessionInner {
                open: true,
                epoch: 0,
                payload: TaskPayload::from_task(task),
                parent,
                intelligence_enabled: true,
                available_tags: Vec::new(),
            })),
        }
    }

    /// Open a session over a brand-new (unsaved) task draft.
    pub fn open_new(store: Arc<S>, name: impl Into<String>) -> Self {
        Self {
            store,
            inner: Arc::new(Mutex::new(SessionInner {
                open: true,
                epoch: 0,
                payload: TaskPayload::new_task(name),
                parent: ParentSlot::None,
                intelligence_enabled: true,
                available_tags: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current state machine position.
    pub fn state(&self) -> SessionState {
        let inner = self.lock();
        if !inner.open {
            return SessionState::Closed;
        }
        match inner.parent {
            ParentSlot::None => SessionState::OpenNoParent,
            ParentSlot::Loading => SessionState::OpenParentLoading,
            ParentSlot::Loaded(_) => SessionState::OpenParentLoaded,
        }
    }

    /// Local copy of the loaded parent, if any. Never the authoritative
    /// record until committed through the store.
    pub fn parent_snapshot(&self) -> Option<Task> {
        match &self.lock().parent {
            ParentSlot::Loaded(task) => Some(task.clone()),
            _ => None,
        }
    }

    /// Snapshot of the pending child payload.
    pub fn payload(&self) -> TaskPayload {
        self.lock().payload.clone()
    }

    pub fn available_tags(&self) -> Vec<String> {
        self.lock().available_tags.clone()
    }

    pub fn intelligence_enabled(&self) -> bool {
        self.lock().intelligence_enabled
    }

    /// Start the parent load.
    ///
    /// Resolves absent without issuing any fetch when the draft carries no
    /// `recurring_parent_id`. Fetch failure (`NotFound`, network) downgrades
    /// to `NoParent`: logged, never surfaced to the user, the edit continues.
    /// A result arriving after `close()` is discarded.
    pub fn spawn_parent_load(&self) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let inner = Arc::clone(&self.inner);
        let (parent_id, epoch) = {
            let guard = self.lock();
            let id = if guard.open {
                guard.payload.recurring_parent_id.clone()
            } else {
                None
            };
            (id, guard.epoch)
        };

        tokio::spawn(async move {
            let Some(parent_id) = parent_id else {
                apply_if_current(&inner, epoch, |g| {
                    if matches!(g.parent, ParentSlot::Loading) {
                        g.parent = ParentSlot::None;
                    }
                });
                return;
            };

            match store.fetch_task_by_id(&parent_id).await {
                Ok(parent) => {
                    apply_if_current(&inner, epoch, |g| {
                        debug!(parent_id = %parent.id, "recurring parent loaded");
                        g.parent = ParentSlot::Loaded(parent);
                    });
                }
                Err(err) => {
                    warn!(%parent_id, error = %err, "recurring parent load failed; continuing without parent context");
                    apply_if_current(&inner, epoch, |g| {
                        g.parent = ParentSlot::None;
                    });
                }
            }
        })
    }

    /// Fetch the intelligence feature flag, once per session.
    ///
    /// Single task, no retry loop; failure keeps the enabled default. Late
    /// results after `close()` are discarded.
    pub fn spawn_flag_load(&self) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let inner = Arc::clone(&self.inner);
        let epoch = self.lock().epoch;

        tokio::spawn(async move {
            match store.get_feature_flag(INTELLIGENCE_FLAG).await {
                Ok(enabled) => {
                    apply_if_current(&inner, epoch, |g| g.intelligence_enabled = enabled);
                }
                Err(err) => {
                    warn!(error = %err, "intelligence flag load failed; defaulting to enabled");
                }
            }
        })
    }

    /// Fetch the available tag names. Failure is swallowed into an empty
    /// list rather than re-thrown.
    pub fn spawn_tag_load(&self) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let inner = Arc::clone(&self.inner);
        let epoch = self.lock().epoch;

        tokio::spawn(async move {
            match store.fetch_tags().await {
                Ok(tags) => {
                    apply_if_current(&inner, epoch, |g| g.available_tags = tags);
                }
                Err(err) => {
                    warn!(error = %err, "tag load failed; tag picker will be empty");
                    apply_if_current(&inner, epoch, |g| g.available_tags.clear());
                }
            }
        })
    }

    // -- Synchronous form-field mutation (session-owned draft state) --------

    pub fn set_name(&self, name: impl Into<String>) {
        self.lock().payload.name = name.into();
    }

    pub fn set_note(&self, note: Option<String>) {
        self.lock().payload.note = note;
    }

    pub fn set_status(&self, status: TaskStatus) {
        self.lock().payload.status = status;
    }

    pub fn set_priority(&self, priority: Priority) {
        self.lock().payload.priority = priority;
    }

    pub fn set_due_date(&self, due: Option<NaiveDate>) {
        self.lock().payload.due_date = due;
    }

    pub fn set_tags(&self, tags: Vec<String>) {
        self.lock().payload.tags = tags;
    }

    /// Edit the draft's own recurrence rule without touching the parent.
    pub fn set_recurrence_field(&self, field: RecurrenceField) {
        let mut inner = self.lock();
        field.apply_to(&mut inner.payload.recurrence);
    }

    /// Propose a recurrence edit that writes back to the parent.
    ///
    /// Under a single lock acquisition, applies the field to the local parent
    /// snapshot and to the pending child payload, and marks the payload with
    /// `update_parent_recurrence`. There is no observable state where only
    /// one side reflects the edit. Returns `false` (and changes nothing) when
    /// no parent is loaded.
    pub fn propose_parent_edit(&self, field: RecurrenceField) -> bool {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if !inner.open {
            return false;
        }
        let ParentSlot::Loaded(parent) = &mut inner.parent else {
            return false;
        };
        field.apply_to(&mut parent.recurrence);
        field.apply_to(&mut inner.payload.recurrence);
        inner.payload.update_parent_recurrence = true;
        true
    }

    /// Analyze the given title text, gated on the intelligence flag.
    ///
    /// Returns `None` when intelligence is disabled; otherwise the analyzer's
    /// suggestions (which may themselves be empty).
    pub fn suggest(&self, title: &str) -> Option<Suggestions> {
        if !self.lock().intelligence_enabled {
            return None;
        }
        Some(analyzer::analyze(title, chrono::Utc::now().date_naive()))
    }

    /// Commit the pending payload through the store.
    ///
    /// The payload carries the child's full field set, tags included
    /// (duplicates pass through). The store applies the parent write-back
    /// when `update_parent_recurrence` is set; this layer only prepared the
    /// intent. Success closes the session; any error leaves it open so the
    /// user can correct and retry.
    pub async fn commit(&self) -> StoreResult<Task> {
        let payload = {
            let inner = self.lock();
            if !inner.open {
                return Err(StoreError::validation("editing session is closed"));
            }
            inner.payload.clone()
        };

        match self.store.save_task(payload).await {
            Ok(task) => {
                debug!(task_id = %task.id, "editing session committed");
                self.close();
                Ok(task)
            }
            Err(err) => {
                warn!(error = %err, "task save failed; session stays open");
                Err(err)
            }
        }
    }

    /// Switch the editing context to the parent task.
    ///
    /// Offered only when a parent is loaded: returns the parent snapshot and
    /// closes this session, for the caller to open the next one. With no
    /// parent loaded the capability is absent (`None`), not an error.
    pub fn navigate_to_parent(&self) -> Option<Task> {
        let parent = {
            let mut inner = self.lock();
            if !inner.open {
                return None;
            }
            let ParentSlot::Loaded(ref parent) = inner.parent else {
                return None;
            };
            let parent = parent.clone();
            close_inner(&mut inner);
            parent
        };
        debug!(parent_id = %parent.id, "navigating to recurring parent");
        Some(parent)
    }

    /// Close the session. Idempotent; any in-flight load result is discarded
    /// once the epoch moves on.
    pub fn close(&self) {
        let mut inner = self.lock();
        close_inner(&mut inner);
    }
}

fn close_inner(inner: &mut SessionInner) {
    if inner.open {
        inner.open = false;
        inner.epoch += 1;
        debug!("editing session closed");
    }
}

/// Apply `f` only if the session is still open under the same epoch the
/// caller captured. Cooperative cancellation: late completions fall through.
fn apply_if_current<F>(inner: &Arc<Mutex<SessionInner>>, epoch: u64, f: F)
where
    F: FnOnce(&mut SessionInner),
{
    let mut guard = inner.lock().unwrap_or_else(|e| e.into_inner());
    if guard.open && guard.epoch == epoch {
        f(&mut guard);
    }
}

impl<S: TaskStore> Drop for EditSession<S> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Recurrence, RecurrenceKind};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Scripted in-memory store for session tests.
    #[derive(Default)]
    struct FakeStore {
        tasks: Mutex<HashMap<String, Task>>,
        saved: Mutex<Vec<TaskPayload>>,
        fetch_calls: AtomicUsize,
        /// When set, fetches park until notified.
        fetch_gate: Option<Arc<Notify>>,
        fail_fetches: bool,
        flag: Mutex<Option<StoreResult<bool>>>,
        fail_tags: bool,
        tags: Vec<String>,
    }

    impl FakeStore {
        fn with_task(self, task: Task) -> Self {
            self.tasks
                .lock()
                .unwrap()
                .insert(task.id.clone(), task);
            self
        }
    }

    #[async_trait]
    impl TaskStore for FakeStore {
        async fn fetch_task_by_id(&self, id: &str) -> StoreResult<Task> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.fetch_gate {
                gate.notified().await;
            }
            if self.fail_fetches {
                return Err(StoreError::network("connection reset"));
            }
            self.tasks
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| StoreError::not_found(format!("task {id}")))
        }

        async fn fetch_tags(&self) -> StoreResult<Vec<String>> {
            if self.fail_tags {
                return Err(StoreError::network("tags unavailable"));
            }
            Ok(self.tags.clone())
        }

        async fn get_feature_flag(&self, _name: &str) -> StoreResult<bool> {
            self.flag
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(Ok(true))
        }

        async fn save_task(&self, payload: TaskPayload) -> StoreResult<Task> {
            if payload.name.trim().is_empty() {
                return Err(StoreError::validation("name must not be empty"));
            }
            self.saved.lock().unwrap().push(payload.clone());
            let mut task = task_fixture(payload.id.as_deref().unwrap_or("new-task"));
            task.name = payload.name;
            task.recurrence = payload.recurrence;
            task.recurring_parent_id = payload.recurring_parent_id;
            Ok(task)
        }

        async fn delete_task(&self, id: &str) -> StoreResult<()> {
            self.tasks
                .lock()
                .unwrap()
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| StoreError::not_found(format!("task {id}")))
        }
    }

    fn task_fixture(id: &str) -> Task {
        Task {
            id: id.to_string(),
            name: "Water plants".into(),
            note: None,
            status: TaskStatus::NotStarted,
            priority: Priority::Medium,
            due_date: None,
            project_id: None,
            tags: vec![],
            recurrence: None,
            recurring_parent_id: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn child_of(parent_id: &str) -> Task {
        let mut task = task_fixture("child-1");
        task.recurring_parent_id = Some(parent_id.to_string());
        task.recurrence = Some(Recurrence::new(RecurrenceKind::Daily));
        task
    }

    #[tokio::test]
    async fn no_parent_reference_resolves_without_fetch() {
        let store = Arc::new(FakeStore::default());
        let session = EditSession::open(Arc::clone(&store), &task_fixture("t1"));

        assert_eq!(session.state(), SessionState::OpenNoParent);
        session.spawn_parent_load().await.unwrap();

        assert_eq!(session.state(), SessionState::OpenNoParent);
        assert_eq!(store.fetch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn parent_load_success_reaches_loaded_state() {
        let mut parent = task_fixture("parent-1");
        parent.recurrence = Some(Recurrence::new(RecurrenceKind::Weekly));
        let store = Arc::new(FakeStore::default().with_task(parent));
        let session = EditSession::open(Arc::clone(&store), &child_of("parent-1"));

        assert_eq!(session.state(), SessionState::OpenParentLoading);
        session.spawn_parent_load().await.unwrap();

        assert_eq!(session.state(), SessionState::OpenParentLoaded);
        assert_eq!(session.parent_snapshot().unwrap().id, "parent-1");
        assert_eq!(store.fetch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn deleted_parent_downgrades_to_no_parent() {
        // Back-reference points at a task the store no longer has.
        let store = Arc::new(FakeStore::default());
        let session = EditSession::open(store, &child_of("gone"));

        session.spawn_parent_load().await.unwrap();

        assert_eq!(session.state(), SessionState::OpenNoParent);
        assert!(session.parent_snapshot().is_none());
    }

    #[tokio::test]
    async fn network_failure_downgrades_to_no_parent() {
        let store = Arc::new(FakeStore {
            fail_fetches: true,
            ..FakeStore::default()
        });
        let session = EditSession::open(store, &child_of("parent-1"));

        session.spawn_parent_load().await.unwrap();

        assert_eq!(session.state(), SessionState::OpenNoParent);
    }

    #[tokio::test]
    async fn close_before_fetch_resolves_discards_result() {
        let gate = Arc::new(Notify::new());
        let store = Arc::new(FakeStore {
            fetch_gate: Some(Arc::clone(&gate)),
            ..FakeStore::default()
        }
        .with_task(task_fixture("parent-1")));
        let session = EditSession::open(store, &child_of("parent-1"));

        let load = session.spawn_parent_load();
        session.close();
        assert_eq!(session.state(), SessionState::Closed);

        // Let the parked fetch complete; its result must be discarded.
        gate.notify_one();
        load.await.unwrap();

        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.parent_snapshot().is_none());
    }

    #[tokio::test]
    async fn propose_then_commit_carries_update_parent_recurrence() {
        let store = Arc::new(FakeStore::default().with_task(task_fixture("parent-1")));
        let session = EditSession::open(Arc::clone(&store), &child_of("parent-1"));
        session.spawn_parent_load().await.unwrap();

        assert!(session.propose_parent_edit(RecurrenceField::Kind(RecurrenceKind::Monthly)));
        session.commit().await.unwrap();

        let saved = store.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].update_parent_recurrence);
        assert_eq!(
            saved[0].recurrence.as_ref().unwrap().kind,
            RecurrenceKind::Monthly
        );
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn propose_updates_snapshot_and_payload_before_any_save() {
        let store = Arc::new(FakeStore::default().with_task(task_fixture("parent-1")));
        let session = EditSession::open(Arc::clone(&store), &child_of("parent-1"));
        session.spawn_parent_load().await.unwrap();

        session.propose_parent_edit(RecurrenceField::Kind(RecurrenceKind::Weekly));

        // Both sides reflect the edit, and nothing was saved yet.
        assert_eq!(
            session.parent_snapshot().unwrap().recurrence.unwrap().kind,
            RecurrenceKind::Weekly
        );
        let payload = session.payload();
        assert_eq!(payload.recurrence.unwrap().kind, RecurrenceKind::Weekly);
        assert!(payload.update_parent_recurrence);
        assert!(store.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn propose_without_loaded_parent_changes_nothing() {
        let store = Arc::new(FakeStore::default());
        let session = EditSession::open(store, &task_fixture("t1"));

        assert!(!session.propose_parent_edit(RecurrenceField::Interval(2)));
        assert!(!session.payload().update_parent_recurrence);
    }

    #[tokio::test]
    async fn navigate_to_parent_only_offered_when_loaded() {
        let store = Arc::new(FakeStore::default().with_task(task_fixture("parent-1")));
        let session = EditSession::open(Arc::clone(&store), &child_of("parent-1"));

        // Still loading: capability absent.
        assert!(session.navigate_to_parent().is_none());
        assert_eq!(session.state(), SessionState::OpenParentLoading);

        session.spawn_parent_load().await.unwrap();
        let parent = session.navigate_to_parent().expect("parent is loaded");
        assert_eq!(parent.id, "parent-1");
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn validation_error_keeps_session_open() {
        let store = Arc::new(FakeStore::default());
        let session = EditSession::open(store, &task_fixture("t1"));
        session.set_name("   ");

        let err = session.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(session.state(), SessionState::OpenNoParent);

        // Correct and retry.
        session.set_name("Water plants");
        session.commit().await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn flag_load_failure_defaults_to_enabled() {
        let store = Arc::new(FakeStore::default());
        *store.flag.lock().unwrap() = Some(Err(StoreError::network("flag service down")));
        let session = EditSession::open(store, &task_fixture("t1"));

        session.spawn_flag_load().await.unwrap();

        assert!(session.intelligence_enabled());
        assert!(session.suggest("Pay rent tomorrow").is_some());
    }

    #[tokio::test]
    async fn disabled_intelligence_yields_no_suggestions_at_all() {
        let store = Arc::new(FakeStore::default());
        *store.flag.lock().unwrap() = Some(Ok(false));
        let session = EditSession::open(store, &task_fixture("t1"));

        session.spawn_flag_load().await.unwrap();

        assert!(!session.intelligence_enabled());
        assert!(session.suggest("Pay rent tomorrow").is_none());
    }

    #[tokio::test]
    async fn enabled_intelligence_suggests_tomorrow() {
        let store = Arc::new(FakeStore::default());
        let session = EditSession::open(store, &task_fixture("t1"));
        session.spawn_flag_load().await.unwrap();

        let suggestions = session.suggest("Pay rent tomorrow").unwrap();
        let tomorrow = chrono::Utc::now().date_naive().succ_opt().unwrap();
        assert_eq!(suggestions.due_date, Some(tomorrow));
    }

    #[tokio::test]
    async fn tag_load_failure_swallowed_into_empty_list() {
        let store = Arc::new(FakeStore {
            fail_tags: true,
            ..FakeStore::default()
        });
        let session = EditSession::open(store, &task_fixture("t1"));

        session.spawn_tag_load().await.unwrap();

        assert!(session.available_tags().is_empty());
    }

    #[tokio::test]
    async fn tag_load_populates_picker() {
        let store = Arc::new(FakeStore {
            tags: vec!["home".into(), "errands".into()],
            ..FakeStore::default()
        });
        let session = EditSession::open(store, &task_fixture("t1"));

        session.spawn_tag_load().await.unwrap();

        assert_eq!(session.available_tags(), vec!["home", "errands"]);
    }

    #[tokio::test]
    async fn duplicate_tags_pass_through_commit() {
        let store = Arc::new(FakeStore::default());
        let session = EditSession::open(Arc::clone(&store), &task_fixture("t1"));
        session.set_tags(vec!["home".into(), "home".into(), "errands".into()]);

        session.commit().await.unwrap();

        let saved = store.saved.lock().unwrap();
        assert_eq!(saved[0].tags, vec!["home", "home", "errands"]);
    }

    #[tokio::test]
    async fn commit_after_close_is_rejected() {
        let store = Arc::new(FakeStore::default());
        let session = EditSession::open(store, &task_fixture("t1"));
        session.close();

        let err = session.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn drop_closes_the_session() {
        let gate = Arc::new(Notify::new());
        let store = Arc::new(FakeStore {
            fetch_gate: Some(Arc::clone(&gate)),
            ..FakeStore::default()
        }
        .with_task(task_fixture("parent-1")));

        let session = EditSession::open(store, &child_of("parent-1"));
        let inner = Arc::clone(&session.inner);
        let load = session.spawn_parent_load();
        drop(session);

        gate.notify_one();
        load.await.unwrap();

        let guard = inner.lock().unwrap();
        assert!(!guard.open);
        assert!(matches!(guard.parent, ParentSlot::Loading));
    }
}
