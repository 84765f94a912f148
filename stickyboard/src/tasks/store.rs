//! Task store: backend-first mutations merged into a shared collection.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;

use stickyboard_proto::event::ChangeEvent;
use stickyboard_proto::task::{NewTask, Position, Priority, Task, TaskId, TaskPatch};
use stickyboard_proto::user::User;

use super::merge;
use super::{NEW_TASK_TITLE, StoreError, UNTITLED};
use crate::backend::{RowStore, TaskQuery};
use crate::canvas::Bounds;

/// Observable state of the board.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardState {
    /// Current user's non-archived tasks, newest-created first.
    pub tasks: Vec<Task>,
    /// The task open in the detail view, if any.
    pub selected: Option<Task>,
    /// A listing is in flight.
    pub loading: bool,
    /// Message of the last failed operation.
    pub error: Option<String>,
}

/// Shared task collection of the signed-in user.
///
/// Every backend call happens outside the state lock; results are merged
/// under a short write lock so readers never see a half-applied change.
/// Completions are applied to whatever the collection holds when they
/// arrive.
pub struct TaskStore<R> {
    backend: Arc<R>,
    auth: watch::Receiver<Option<User>>,
    state: RwLock<BoardState>,
}

impl<R: RowStore> TaskStore<R> {
    /// Creates an empty store over `backend`, reading the signed-in user
    /// from `auth`.
    #[must_use]
    pub fn new(backend: Arc<R>, auth: watch::Receiver<Option<User>>) -> Self {
        Self {
            backend,
            auth,
            state: RwLock::new(BoardState::default()),
        }
    }

    /// The backend this store writes to.
    #[must_use]
    pub const fn backend(&self) -> &Arc<R> {
        &self.backend
    }

    /// The signed-in user, if any.
    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.auth.borrow().clone()
    }

    fn require_user(&self) -> Result<User, StoreError> {
        self.current_user().ok_or_else(|| {
            tracing::warn!("task operation without a signed-in user");
            self.record(&StoreError::Unauthenticated);
            StoreError::Unauthenticated
        })
    }

    fn record(&self, error: &StoreError) {
        self.state.write().error = Some(error.to_string());
    }

    // -----------------------------------------------------------------------
    // Backend operations
    // -----------------------------------------------------------------------

    /// Replaces the collection with the user's non-archived tasks, newest
    /// first. Failures are recorded in [`error`](Self::error).
    pub async fn list(&self) {
        let Ok(user) = self.require_user() else {
            return;
        };
        {
            let mut state = self.state.write();
            state.loading = true;
            state.error = None;
        }

        let result = self.backend.select(&TaskQuery::board(user.id)).await;

        let mut state = self.state.write();
        state.loading = false;
        match result {
            Ok(tasks) => {
                tracing::debug!(count = tasks.len(), "task list loaded");
                state.tasks = tasks;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to list tasks");
                state.error = Some(StoreError::from(e).to_string());
            }
        }
    }

    /// Creates a note and returns the stored record.
    ///
    /// An empty title becomes `"New Task"`. Returns `None` (with the error
    /// recorded) if no user is signed in or the backend rejects the insert.
    pub async fn create(&self, title: &str, position: Position, priority: Priority) -> Option<Task> {
        let user = self.require_user().ok()?;
        let title = if title.is_empty() { NEW_TASK_TITLE } else { title };
        let row = NewTask::new(user.id, title, position, priority);

        match self.backend.insert(row).await {
            Ok(task) => {
                tracing::info!(task_id = %task.id, %position, "task created");
                merge::prepend_unique(&mut self.state.write().tasks, task.clone());
                Some(task)
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to create task");
                self.record(&e.into());
                None
            }
        }
    }

    /// Creates a note at a random point of the spawn area of `bounds`.
    pub async fn create_at_random(
        &self,
        title: &str,
        priority: Priority,
        bounds: &Bounds,
    ) -> Option<Task> {
        self.create(title, bounds.random_spawn(), priority).await
    }

    /// Sends `patch` and merges it locally on success.
    ///
    /// An empty title in the patch is stored as `"Untitled"`. Returns
    /// `true` on success; failures are recorded and leave local state
    /// untouched.
    pub async fn update(&self, id: TaskId, mut patch: TaskPatch) -> bool {
        if self.require_user().is_err() {
            return false;
        }
        if patch.title.as_deref() == Some("") {
            patch.title = Some(UNTITLED.to_string());
        }

        match self.backend.update(id, &patch).await {
            Ok(()) => {
                self.merge_local(id, &patch);
                tracing::debug!(task_id = %id, "task updated");
                true
            }
            Err(e) => {
                tracing::warn!(task_id = %id, error = %e, "failed to update task");
                self.record(&e.into());
                false
            }
        }
    }

    /// Persists a new position for one note.
    ///
    /// # Errors
    ///
    /// Returns the failure (also recorded in [`error`](Self::error)) so a
    /// drag gesture can react to it.
    pub async fn update_position(&self, id: TaskId, position: Position) -> Result<(), StoreError> {
        self.require_user()?;
        let patch = TaskPatch::position(position);
        match self.backend.update(id, &patch).await {
            Ok(()) => {
                self.merge_local(id, &patch);
                tracing::debug!(task_id = %id, %position, "task moved");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(task_id = %id, error = %e, "failed to move task");
                let error = StoreError::from(e);
                self.record(&error);
                Err(error)
            }
        }
    }

    /// Hard-deletes a note, clearing the selection if it was that note.
    /// Returns `true` on success; failures are recorded.
    pub async fn delete(&self, id: TaskId) -> bool {
        if self.require_user().is_err() {
            return false;
        }
        match self.backend.delete(id).await {
            Ok(()) => {
                let mut state = self.state.write();
                merge::remove(&mut state.tasks, id);
                if state.selected.as_ref().is_some_and(|t| t.id == id) {
                    state.selected = None;
                }
                tracing::info!(task_id = %id, "task deleted");
                true
            }
            Err(e) => {
                tracing::warn!(task_id = %id, error = %e, "failed to delete task");
                self.record(&e.into());
                false
            }
        }
    }

    fn merge_local(&self, id: TaskId, patch: &TaskPatch) {
        let mut state = self.state.write();
        merge::merge_patch(&mut state.tasks, id, patch);
        if let Some(selected) = state.selected.as_mut().filter(|t| t.id == id) {
            patch.apply_to(selected);
        }
        if patch.archived == Some(true) {
            forget(&mut state, id);
        }
    }
}

/// Removes `id` from the collection and the selection.
fn forget(state: &mut BoardState, id: TaskId) -> bool {
    if state.selected.as_ref().is_some_and(|t| t.id == id) {
        state.selected = None;
    }
    merge::remove(&mut state.tasks, id)
}

impl<R> TaskStore<R> {
    // -----------------------------------------------------------------------
    // Realtime merge
    // -----------------------------------------------------------------------

    /// Merges a committed change from the backend's feed.
    ///
    /// Inserts are added at the front unless the id is already present,
    /// updates replace the whole record and deletes remove it (and clear
    /// the selection). Archived rows are treated as deleted. Events for
    /// unknown ids change nothing. Returns
    /// `true` if the collection changed.
    pub fn apply_change(&self, event: &ChangeEvent) -> bool {
        let mut state = self.state.write();
        let changed = match event {
            ChangeEvent::Insert(task) if task.archived => false,
            ChangeEvent::Insert(task) => merge::insert_if_absent(&mut state.tasks, task.clone()),
            ChangeEvent::Update(task) if task.archived => forget(&mut state, task.id),
            ChangeEvent::Update(task) => merge::replace_existing(&mut state.tasks, task.clone()),
            ChangeEvent::Delete { id } => forget(&mut state, *id),
        };
        tracing::debug!(task_id = %event.task_id(), kind = %event.kind(), changed, "change applied");
        changed
    }

    // -----------------------------------------------------------------------
    // Local state
    // -----------------------------------------------------------------------

    /// Opens `task` in the detail view, or closes it with `None`.
    pub fn select(&self, task: Option<Task>) {
        self.state.write().selected = task;
    }

    /// The task open in the detail view.
    #[must_use]
    pub fn selection(&self) -> Option<Task> {
        self.state.read().selected.clone()
    }

    /// Replaces the collection wholesale.
    pub fn set_tasks(&self, tasks: Vec<Task>) {
        self.state.write().tasks = tasks;
    }

    /// Forgets the last recorded error.
    pub fn clear_error(&self) {
        self.state.write().error = None;
    }

    /// Empties the collection and the selection, e.g. after sign-out.
    pub fn reset(&self) {
        *self.state.write() = BoardState::default();
    }

    /// Snapshot of the collection.
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.state.read().tasks.clone()
    }

    /// Snapshot of one task.
    #[must_use]
    pub fn task(&self, id: TaskId) -> Option<Task> {
        self.state.read().tasks.iter().find(|t| t.id == id).cloned()
    }

    /// Number of tasks in the collection.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().tasks.len()
    }

    /// Whether the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().tasks.is_empty()
    }

    /// Whether a listing is in flight.
    #[must_use]
    pub fn loading(&self) -> bool {
        self.state.read().loading
    }

    /// Message of the last failed operation.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.state.read().error.clone()
    }

    /// Snapshot of the whole board state.
    #[must_use]
    pub fn snapshot(&self) -> BoardState {
        self.state.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::backend::{AuthProvider, BackendError};
    use crate::canvas::Viewport;

    async fn signed_in_store() -> (Arc<MemoryBackend>, TaskStore<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        backend.sign_up("ada@example.com", "pw", None).await.unwrap();
        backend.sign_in("ada@example.com", "pw").await.unwrap();
        let store = TaskStore::new(Arc::clone(&backend), backend.watch_user());
        (backend, store)
    }

    fn at(x: f64, y: f64) -> Position {
        Position::new(x, y)
    }

    #[tokio::test]
    async fn create_without_user_records_error_and_skips_backend() {
        let backend = Arc::new(MemoryBackend::new());
        let store = TaskStore::new(Arc::clone(&backend), backend.watch_user());

        let created = store.create("Buy milk", at(50.0, 50.0), Priority::Low).await;
        assert!(created.is_none());
        assert_eq!(store.error().as_deref(), Some("user not authenticated"));
        assert_eq!(backend.row_count(), 0);
    }

    #[tokio::test]
    async fn create_derives_color_and_prepends() {
        let (_backend, store) = signed_in_store().await;
        let first = store.create("first", at(0.0, 0.0), Priority::Medium).await.unwrap();
        let second = store.create("Buy milk", at(50.0, 50.0), Priority::Low).await.unwrap();

        assert_eq!(second.color, "#C8F7C5");
        assert_eq!(second.position, at(50.0, 50.0));
        assert!(!second.archived);
        let ids: Vec<TaskId> = store.tasks().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn create_with_empty_title_uses_placeholder() {
        let (_backend, store) = signed_in_store().await;
        let task = store.create("", at(0.0, 0.0), Priority::Medium).await.unwrap();
        assert_eq!(task.title, "New Task");
    }

    #[tokio::test]
    async fn create_after_racing_insert_keeps_one_copy() {
        let (_backend, store) = signed_in_store().await;
        let task = store.create("a", at(0.0, 0.0), Priority::Medium).await.unwrap();
        // Echo of our own insert arriving late.
        assert!(!store.apply_change(&ChangeEvent::Insert(task.clone())));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn create_failure_records_error() {
        let (backend, store) = signed_in_store().await;
        backend.fail_next("insert refused");
        assert!(store.create("a", at(0.0, 0.0), Priority::High).await.is_none());
        assert_eq!(store.error().as_deref(), Some("backend error: insert refused"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn list_replaces_collection_and_clears_loading() {
        let (backend, store) = signed_in_store().await;
        let other_tab = TaskStore::new(Arc::clone(&backend), backend.watch_user());
        other_tab.create("a", at(0.0, 0.0), Priority::Low).await.unwrap();
        other_tab.create("b", at(0.0, 0.0), Priority::Low).await.unwrap();

        store.set_tasks(Vec::new());
        store.list().await;
        assert_eq!(store.len(), 2);
        assert!(!store.loading());
        assert!(store.error().is_none());
        assert_eq!(store.tasks()[0].title, "b");
    }

    #[tokio::test]
    async fn list_failure_is_recorded_not_returned() {
        let (backend, store) = signed_in_store().await;
        store.create("a", at(0.0, 0.0), Priority::Low).await.unwrap();
        backend.fail_next("select refused");
        store.list().await;
        assert_eq!(store.len(), 1);
        assert!(!store.loading());
        assert_eq!(store.error().as_deref(), Some("backend error: select refused"));
    }

    #[tokio::test]
    async fn update_merges_into_collection_and_selection() {
        let (_backend, store) = signed_in_store().await;
        let task = store.create("a", at(0.0, 0.0), Priority::Low).await.unwrap();
        store.select(Some(task.clone()));

        let patch = TaskPatch::default()
            .with_title("renamed")
            .with_description(Some("details".to_string()));
        assert!(store.update(task.id, patch).await);

        assert_eq!(store.task(task.id).unwrap().title, "renamed");
        let selected = store.selection().unwrap();
        assert_eq!(selected.title, "renamed");
        assert_eq!(selected.description.as_deref(), Some("details"));
    }

    #[tokio::test]
    async fn update_with_empty_title_stores_untitled() {
        let (backend, store) = signed_in_store().await;
        let task = store.create("a", at(0.0, 0.0), Priority::Low).await.unwrap();
        assert!(store.update(task.id, TaskPatch::default().with_title("")).await);
        assert_eq!(store.task(task.id).unwrap().title, "Untitled");
        assert_eq!(backend.row(task.id).unwrap().title, "Untitled");
    }

    #[tokio::test]
    async fn update_failure_leaves_state_untouched() {
        let (backend, store) = signed_in_store().await;
        let task = store.create("a", at(0.0, 0.0), Priority::Low).await.unwrap();
        let before = store.tasks();
        backend.fail_next("update refused");
        assert!(!store.update(task.id, TaskPatch::default().with_title("b")).await);
        assert_eq!(store.tasks(), before);
        assert!(store.error().is_some());
    }

    #[tokio::test]
    async fn update_position_returns_and_records_errors() {
        let (_backend, store) = signed_in_store().await;
        let missing = TaskId::new();
        let err = store.update_position(missing, at(1.0, 1.0)).await.unwrap_err();
        assert_eq!(err, StoreError::Backend(BackendError::NotFound(missing)));
        assert_eq!(store.error(), Some(err.to_string()));
    }

    #[tokio::test]
    async fn update_position_is_idempotent() {
        let (backend, store) = signed_in_store().await;
        let task = store.create("a", at(0.0, 0.0), Priority::Low).await.unwrap();
        store.update_position(task.id, at(10.0, 20.0)).await.unwrap();
        let once = store.tasks();
        store.update_position(task.id, at(10.0, 20.0)).await.unwrap();
        assert_eq!(store.tasks(), once);
        assert_eq!(backend.row(task.id).unwrap().position, at(10.0, 20.0));
    }

    #[tokio::test]
    async fn delete_removes_and_clears_selection() {
        let (_backend, store) = signed_in_store().await;
        let task = store.create("a", at(0.0, 0.0), Priority::Low).await.unwrap();
        store.select(Some(task.clone()));
        assert!(store.delete(task.id).await);
        assert!(store.is_empty());
        assert!(store.selection().is_none());
    }

    #[tokio::test]
    async fn delete_of_other_task_keeps_selection() {
        let (_backend, store) = signed_in_store().await;
        let a = store.create("a", at(0.0, 0.0), Priority::Low).await.unwrap();
        let b = store.create("b", at(0.0, 0.0), Priority::Low).await.unwrap();
        store.select(Some(a.clone()));
        assert!(store.delete(b.id).await);
        assert_eq!(store.selection().map(|t| t.id), Some(a.id));
    }

    #[tokio::test]
    async fn create_at_random_lands_in_spawn_area() {
        let (_backend, store) = signed_in_store().await;
        let bounds = Bounds::for_viewport(Viewport::new(1024.0, 768.0));
        let task = store
            .create_at_random("", Priority::Medium, &bounds)
            .await
            .unwrap();
        assert!(bounds.contains(task.position));
        assert!(task.position.x >= 50.0 && task.position.y >= 50.0);
    }

    #[tokio::test]
    async fn remote_update_replaces_full_record() {
        let (_backend, store) = signed_in_store().await;
        let task = store.create("a", at(0.0, 0.0), Priority::Low).await.unwrap();
        let mut remote = task.clone();
        remote.title = "from elsewhere".to_string();
        remote.priority = Priority::High;
        assert!(store.apply_change(&ChangeEvent::Update(remote.clone())));
        assert_eq!(store.task(task.id), Some(remote));
    }

    #[tokio::test]
    async fn remote_events_for_unknown_ids_are_ignored() {
        let (_backend, store) = signed_in_store().await;
        let task = store.create("a", at(0.0, 0.0), Priority::Low).await.unwrap();
        let before = store.snapshot();

        let mut stranger = task.clone();
        stranger.id = TaskId::new();
        assert!(!store.apply_change(&ChangeEvent::Update(stranger)));
        assert!(!store.apply_change(&ChangeEvent::Delete { id: TaskId::new() }));
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn remote_delete_clears_selection() {
        let (_backend, store) = signed_in_store().await;
        let task = store.create("a", at(0.0, 0.0), Priority::Low).await.unwrap();
        store.select(Some(task.clone()));
        assert!(store.apply_change(&ChangeEvent::Delete { id: task.id }));
        assert!(store.selection().is_none());
    }

    #[tokio::test]
    async fn selection_is_independent_of_membership() {
        let (_backend, store) = signed_in_store().await;
        let task = store.create("a", at(0.0, 0.0), Priority::Low).await.unwrap();
        store.select(Some(task.clone()));
        store.set_tasks(Vec::new());
        assert_eq!(store.selection(), Some(task));
        store.select(None);
        assert!(store.selection().is_none());
    }

    #[tokio::test]
    async fn archiving_update_drops_task_and_selection() {
        let (backend, store) = signed_in_store().await;
        let task = store.create("a", at(0.0, 0.0), Priority::Low).await.unwrap();
        store.select(Some(task.clone()));

        assert!(store.update(task.id, TaskPatch::default().with_archived(true)).await);
        assert!(store.task(task.id).is_none());
        assert!(store.selection().is_none());
        assert!(backend.row(task.id).unwrap().archived);

        store.list().await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn remote_archived_insert_is_skipped() {
        let (_backend, store) = signed_in_store().await;
        let mut archived = NewTask::new(
            store.current_user().unwrap().id,
            "old",
            at(0.0, 0.0),
            Priority::Low,
        )
        .into_task(TaskId::new(), 1);
        archived.archived = true;

        assert!(!store.apply_change(&ChangeEvent::Insert(archived)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn remote_archived_update_removes_task() {
        let (_backend, store) = signed_in_store().await;
        let task = store.create("a", at(0.0, 0.0), Priority::Low).await.unwrap();
        store.select(Some(task.clone()));

        let mut archived = task.clone();
        archived.archived = true;
        assert!(store.apply_change(&ChangeEvent::Update(archived)));
        assert!(store.task(task.id).is_none());
        assert!(store.selection().is_none());
    }
}
