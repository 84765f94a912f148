//! The board context: one signed-in view over a backend.
//!
//! A [`Board`] bundles the task store, the presentation flags and the
//! realtime driver for a single backend session. Boards are plain values;
//! several can share one backend (one per browser tab, say) without any
//! global state.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tokio::task::JoinHandle;

use stickyboard_proto::task::Position;
use stickyboard_proto::user::User;

use crate::backend::{Backend, BackendError};
use crate::canvas::NoteDrag;
use crate::realtime::{self, RealtimeIngest};
use crate::tasks::{StoreError, TaskStore};
use crate::ui::UiState;

/// One board over `B`.
pub struct Board<B> {
    backend: Arc<B>,
    store: Arc<TaskStore<B>>,
    ui: Mutex<UiState>,
    realtime: Mutex<Option<JoinHandle<()>>>,
}

impl<B: Backend + 'static> Board<B> {
    /// Creates a board over `backend` with an empty store.
    #[must_use]
    pub fn new(backend: Arc<B>) -> Self {
        let store = Arc::new(TaskStore::new(Arc::clone(&backend), backend.watch_user()));
        Self {
            backend,
            store,
            ui: Mutex::new(UiState::default()),
            realtime: Mutex::new(None),
        }
    }

    /// The backend session.
    #[must_use]
    pub const fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// The task store.
    #[must_use]
    pub const fn store(&self) -> &Arc<TaskStore<B>> {
        &self.store
    }

    /// Locks the presentation state.
    pub fn ui(&self) -> MutexGuard<'_, UiState> {
        self.ui.lock()
    }

    /// The signed-in user.
    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.backend.current_user()
    }

    // -----------------------------------------------------------------------
    // Auth
    // -----------------------------------------------------------------------

    /// Registers an account. The display name defaults to the local part
    /// of the email. Does not sign in.
    ///
    /// # Errors
    ///
    /// Returns the backend error, e.g. [`BackendError::AccountExists`].
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<User, BackendError> {
        let user = self.backend.sign_up(email, password, display_name).await?;
        tracing::info!(user_id = %user.id, "signed up");
        Ok(user)
    }

    /// Signs in and loads the user's tasks.
    ///
    /// # Errors
    ///
    /// Returns the backend error, e.g. [`BackendError::InvalidCredentials`].
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User, BackendError> {
        let user = self.backend.sign_in(email, password).await?;
        self.store.list().await;
        Ok(user)
    }

    /// Signs out and forgets the loaded tasks and view state.
    ///
    /// # Errors
    ///
    /// Returns the backend error if sign-out fails; local state is kept.
    pub async fn sign_out(&self) -> Result<(), BackendError> {
        self.backend.sign_out().await?;
        self.store.reset();
        *self.ui.lock() = UiState::default();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Notes
    // -----------------------------------------------------------------------

    /// Starts a drag gesture on `drag` at `pointer`.
    pub fn begin_drag(&self, drag: &mut NoteDrag, pointer: Position) {
        drag.begin(pointer);
        self.ui.lock().set_dragging(true);
    }

    /// Finishes a drag gesture and persists the final position if the
    /// note moved.
    ///
    /// # Errors
    ///
    /// Returns the store error from the position write.
    pub async fn end_drag(&self, drag: &mut NoteDrag) -> Result<Option<Position>, StoreError> {
        let result = drag.end(&self.store).await;
        self.ui.lock().set_dragging(false);
        result
    }

    /// Opens the note tracked by `drag` unless the click ends a drag.
    /// Returns `true` if the note was selected.
    pub fn open_note(&self, drag: &NoteDrag) -> bool {
        if !drag.accepts_click() {
            return false;
        }
        match self.store.task(drag.task_id()) {
            Some(task) => {
                self.store.select(Some(task));
                true
            }
            None => false,
        }
    }

    /// Closes the task modal and clears the selection.
    pub fn close_modal(&self) {
        self.store.select(None);
        self.ui.lock().set_task_modal_open(false);
    }

    // -----------------------------------------------------------------------
    // Realtime
    // -----------------------------------------------------------------------

    /// Spawns the realtime driver, which keeps the store in step with the
    /// signed-in user's change feed. Does nothing if already running.
    pub fn start_realtime(&self) {
        let mut slot = self.realtime.lock();
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let ingest = RealtimeIngest::new(Arc::clone(&self.backend));
        *slot = Some(tokio::spawn(realtime::run(
            ingest,
            Arc::clone(&self.store),
            self.backend.watch_user(),
        )));
        tracing::debug!("realtime driver started");
    }

    /// Whether the realtime driver is running.
    #[must_use]
    pub fn is_realtime_running(&self) -> bool {
        self.realtime
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl<B> Board<B> {
    /// Stops the realtime driver, releasing its subscription.
    pub fn shutdown(&self) {
        if let Some(handle) = self.realtime.lock().take() {
            handle.abort();
            tracing::debug!("realtime driver stopped");
        }
    }
}

impl<B> Drop for Board<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
