//! Backend contract for `StickyBoard`.
//!
//! The board depends on three capabilities of its hosted backend:
//! - [`RowStore`] -- select/insert/update/delete of task rows
//! - [`AuthProvider`] -- sign-in state and its transitions
//! - [`ChangeFeed`] -- a per-owner stream of committed row changes
//!
//! Implementations:
//! - [`memory::MemoryBackend`] -- in-process backend for tests and demos
//! - [`remote::RemoteBackend`] -- WebSocket adapter for `stickyboard-hub`

pub mod memory;
pub mod remote;

use tokio::sync::{mpsc, watch};

use stickyboard_proto::event::ChangeEvent;
use stickyboard_proto::hub::Fault;
use stickyboard_proto::task::{NewTask, Task, TaskId, TaskPatch};
use stickyboard_proto::user::{User, UserId};

/// Errors returned by backend calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The session is not signed in.
    #[error("user not authenticated")]
    Unauthenticated,

    /// Unknown email or wrong password.
    #[error("invalid login credentials")]
    InvalidCredentials,

    /// Sign-up for an email that is already registered.
    #[error("an account already exists for {0}")]
    AccountExists(String),

    /// No row with this id is visible to the session.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// The request targets another user's rows.
    #[error("permission denied")]
    Forbidden,

    /// The backend did not answer in time.
    #[error("backend request timed out")]
    Timeout,

    /// The backend could not be reached.
    #[error("cannot reach backend: {0}")]
    Unreachable(String),

    /// The connection to the backend is gone.
    #[error("connection to backend closed")]
    ConnectionClosed,

    /// The backend rejected the request or failed internally.
    #[error("backend error: {0}")]
    Rejected(String),

    /// The backend answered with something this client does not understand.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<Fault> for BackendError {
    fn from(fault: Fault) -> Self {
        match fault {
            Fault::Unauthenticated => Self::Unauthenticated,
            Fault::InvalidCredentials => Self::InvalidCredentials,
            Fault::AccountExists { email } => Self::AccountExists(email),
            Fault::NotFound { id } => Self::NotFound(id),
            Fault::Forbidden => Self::Forbidden,
            Fault::Malformed { reason } => Self::Rejected(reason),
        }
    }
}

/// Sort order of a task listing, by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Most recently created first.
    #[default]
    NewestFirst,
    /// Oldest first.
    OldestFirst,
}

/// Filter and order for [`RowStore::select`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskQuery {
    /// Only rows owned by this user.
    pub owner: UserId,
    /// Include archived rows.
    pub include_archived: bool,
    /// Result order.
    pub order: SortOrder,
}

impl TaskQuery {
    /// The board listing: non-archived rows of `owner`, newest first.
    #[must_use]
    pub const fn board(owner: UserId) -> Self {
        Self {
            owner,
            include_archived: false,
            order: SortOrder::NewestFirst,
        }
    }

    /// Returns `true` if `task` passes the filter.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        task.owner == self.owner && (self.include_archived || !task.archived)
    }

    /// Sorts `tasks` in place according to [`Self::order`].
    pub fn sort(&self, tasks: &mut [Task]) {
        match self.order {
            SortOrder::NewestFirst => tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            SortOrder::OldestFirst => tasks.sort_by_key(|t| t.created_at),
        }
    }
}

/// Persistent task rows, scoped to the signed-in session.
pub trait RowStore: Send + Sync {
    /// Returns the rows matching `query`, in its order.
    fn select(
        &self,
        query: &TaskQuery,
    ) -> impl std::future::Future<Output = Result<Vec<Task>, BackendError>> + Send;

    /// Inserts a row and returns it with its backend-assigned id and
    /// timestamps.
    fn insert(
        &self,
        row: NewTask,
    ) -> impl std::future::Future<Output = Result<Task, BackendError>> + Send;

    /// Applies `patch` to the row with `id`.
    fn update(
        &self,
        id: TaskId,
        patch: &TaskPatch,
    ) -> impl std::future::Future<Output = Result<(), BackendError>> + Send;

    /// Hard-deletes the row with `id`.
    fn delete(
        &self,
        id: TaskId,
    ) -> impl std::future::Future<Output = Result<(), BackendError>> + Send;
}

/// Account sign-in state.
pub trait AuthProvider: Send + Sync {
    /// The currently signed-in user, if any.
    fn current_user(&self) -> Option<User>;

    /// Signs in and returns the account.
    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> impl std::future::Future<Output = Result<User, BackendError>> + Send;

    /// Registers a new account without signing in.
    fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> impl std::future::Future<Output = Result<User, BackendError>> + Send;

    /// Signs out of the current session.
    fn sign_out(&self) -> impl std::future::Future<Output = Result<(), BackendError>> + Send;

    /// A receiver that observes every auth-state transition.
    fn watch_user(&self) -> watch::Receiver<Option<User>>;
}

/// Per-owner stream of committed row changes.
pub trait ChangeFeed: Send + Sync {
    /// Opens a subscription to changes of rows owned by `owner`.
    fn subscribe(
        &self,
        owner: UserId,
    ) -> impl std::future::Future<Output = Result<Subscription, BackendError>> + Send;
}

/// The full backend contract.
pub trait Backend: RowStore + AuthProvider + ChangeFeed {}

impl<T: RowStore + AuthProvider + ChangeFeed> Backend for T {}

/// Releases backend resources held by a [`Subscription`].
type ReleaseFn = Box<dyn FnOnce() + Send + Sync>;

/// Handle to one open change-feed subscription.
///
/// Events arrive on an unbounded channel in backend commit order. The
/// backend-side channel is released by [`close`](Self::close) or on drop.
pub struct Subscription {
    owner: UserId,
    events: mpsc::UnboundedReceiver<ChangeEvent>,
    release: Option<ReleaseFn>,
}

impl Subscription {
    /// Wraps a receiver fed by a backend. `release` runs exactly once, on
    /// close or drop.
    pub fn new(
        owner: UserId,
        events: mpsc::UnboundedReceiver<ChangeEvent>,
        release: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            owner,
            events,
            release: Some(Box::new(release)),
        }
    }

    /// Owner whose rows this subscription covers.
    #[must_use]
    pub const fn owner(&self) -> UserId {
        self.owner
    }

    /// Waits for the next event. Returns `None` once the backend side has
    /// gone away.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    /// Returns the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.events.try_recv().ok()
    }

    /// Closes the subscription and releases the backend channel.
    pub fn close(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        self.events.close();
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("owner", &self.owner)
            .field("released", &self.release.is_none())
            .finish_non_exhaustive()
    }
}

/// Current time in milliseconds since epoch.
pub(crate) fn now_ms() -> u64 {
    u64::try_from(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis(),
    )
    .unwrap_or(u64::MAX)
}
