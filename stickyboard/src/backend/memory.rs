//! In-process backend for testing and offline demos.
//!
//! [`MemoryBackend`] implements the whole backend contract over shared
//! in-memory tables. Each value is one auth session; [`MemoryBackend::session`]
//! opens another session (another browser tab, another device) against the
//! same accounts, rows and change feed, so cross-session sync can be
//! exercised without a network.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use stickyboard_proto::event::ChangeEvent;
use stickyboard_proto::task::{NewTask, Task, TaskId, TaskPatch};
use stickyboard_proto::user::{User, UserId};

use super::{AuthProvider, BackendError, ChangeFeed, RowStore, Subscription, TaskQuery, now_ms};

/// A registered account.
struct Account {
    user: User,
    password: String,
}

/// One open change-feed subscription.
struct Subscriber {
    id: u64,
    owner: UserId,
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

/// Tables shared by every session of one backend.
#[derive(Default)]
struct Shared {
    /// Email -> account.
    accounts: Mutex<HashMap<String, Account>>,
    rows: Mutex<HashMap<TaskId, Task>>,
    feed: Mutex<Vec<Subscriber>>,
    next_subscriber: AtomicU64,
    /// Last timestamp handed out; timestamps are strictly increasing.
    clock: AtomicU64,
    /// Failures to return from upcoming row-store calls.
    failures: Mutex<VecDeque<String>>,
}

impl Shared {
    fn tick(&self) -> u64 {
        let now = now_ms();
        let prev = self
            .clock
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now.max(prev + 1)
    }

    fn take_failure(&self) -> Result<(), BackendError> {
        match self.failures.lock().pop_front() {
            Some(message) => Err(BackendError::Rejected(message)),
            None => Ok(()),
        }
    }

    /// Delivers `event` to every live subscriber of `owner`, pruning
    /// subscribers whose receiver is gone. Callers hold the `rows` lock so
    /// events go out in commit order.
    fn broadcast(&self, owner: UserId, event: &ChangeEvent) {
        let mut feed = self.feed.lock();
        feed.retain(|sub| !sub.tx.is_closed());
        for sub in feed.iter().filter(|sub| sub.owner == owner) {
            let _ = sub.tx.send(event.clone());
        }
        tracing::debug!(
            task_id = %event.task_id(),
            kind = %event.kind(),
            subscribers = feed.iter().filter(|sub| sub.owner == owner).count(),
            "change broadcast"
        );
    }

    fn unsubscribe(&self, id: u64) {
        self.feed.lock().retain(|sub| sub.id != id);
    }
}

/// One auth session on an in-memory backend.
pub struct MemoryBackend {
    shared: Arc<Shared>,
    user: watch::Sender<Option<User>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Creates an empty backend with one signed-out session.
    #[must_use]
    pub fn new() -> Self {
        Self::with_shared(Arc::new(Shared::default()))
    }

    fn with_shared(shared: Arc<Shared>) -> Self {
        let (user, _) = watch::channel(None);
        Self { shared, user }
    }

    /// Opens another signed-out session on the same data.
    #[must_use]
    pub fn session(&self) -> Self {
        Self::with_shared(Arc::clone(&self.shared))
    }

    /// Makes the next row-store call (from any session) fail with
    /// [`BackendError::Rejected`]. Calls queue up.
    pub fn fail_next(&self, message: impl Into<String>) {
        self.shared.failures.lock().push_back(message.into());
    }

    /// Number of open change-feed subscriptions across all sessions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let mut feed = self.shared.feed.lock();
        feed.retain(|sub| !sub.tx.is_closed());
        feed.len()
    }

    /// The stored row with `id`, regardless of session.
    #[must_use]
    pub fn row(&self, id: TaskId) -> Option<Task> {
        self.shared.rows.lock().get(&id).cloned()
    }

    /// Total number of stored rows, regardless of owner.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.shared.rows.lock().len()
    }

    fn signed_in(&self) -> Result<User, BackendError> {
        self.user.borrow().clone().ok_or(BackendError::Unauthenticated)
    }
}

impl RowStore for MemoryBackend {
    async fn select(&self, query: &TaskQuery) -> Result<Vec<Task>, BackendError> {
        self.shared.take_failure()?;
        let user = self.signed_in()?;
        if query.owner != user.id {
            return Err(BackendError::Forbidden);
        }
        let mut tasks: Vec<Task> = self
            .shared
            .rows
            .lock()
            .values()
            .filter(|task| query.matches(task))
            .cloned()
            .collect();
        query.sort(&mut tasks);
        Ok(tasks)
    }

    async fn insert(&self, row: NewTask) -> Result<Task, BackendError> {
        self.shared.take_failure()?;
        let user = self.signed_in()?;
        if row.owner != user.id {
            return Err(BackendError::Forbidden);
        }
        let mut rows = self.shared.rows.lock();
        let task = row.into_task(TaskId::new(), self.shared.tick());
        rows.insert(task.id, task.clone());
        self.shared
            .broadcast(task.owner, &ChangeEvent::Insert(task.clone()));
        drop(rows);
        Ok(task)
    }

    async fn update(&self, id: TaskId, patch: &TaskPatch) -> Result<(), BackendError> {
        self.shared.take_failure()?;
        let user = self.signed_in()?;
        let mut rows = self.shared.rows.lock();
        let task = rows
            .get_mut(&id)
            .filter(|task| task.owner == user.id)
            .ok_or(BackendError::NotFound(id))?;
        patch.apply_to(task);
        task.updated_at = self.shared.tick();
        let updated = task.clone();
        self.shared
            .broadcast(updated.owner, &ChangeEvent::Update(updated));
        drop(rows);
        Ok(())
    }

    async fn delete(&self, id: TaskId) -> Result<(), BackendError> {
        self.shared.take_failure()?;
        let user = self.signed_in()?;
        let mut rows = self.shared.rows.lock();
        if !rows.get(&id).is_some_and(|task| task.owner == user.id) {
            return Err(BackendError::NotFound(id));
        }
        rows.remove(&id);
        self.shared.broadcast(user.id, &ChangeEvent::Delete { id });
        drop(rows);
        Ok(())
    }
}

impl AuthProvider for MemoryBackend {
    fn current_user(&self) -> Option<User> {
        self.user.borrow().clone()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<User, BackendError> {
        let user = {
            let accounts = self.shared.accounts.lock();
            match accounts.get(&email.to_ascii_lowercase()) {
                Some(account) if account.password == password => account.user.clone(),
                _ => return Err(BackendError::InvalidCredentials),
            }
        };
        tracing::info!(user_id = %user.id, "session signed in");
        self.user.send_replace(Some(user.clone()));
        Ok(user)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<User, BackendError> {
        let key = email.to_ascii_lowercase();
        let mut accounts = self.shared.accounts.lock();
        if accounts.contains_key(&key) {
            return Err(BackendError::AccountExists(email.to_string()));
        }
        let user = User {
            id: UserId::new(),
            email: email.to_string(),
            display_name: display_name
                .map_or_else(|| User::default_display_name(email), str::to_string),
        };
        accounts.insert(
            key,
            Account {
                user: user.clone(),
                password: password.to_string(),
            },
        );
        drop(accounts);
        tracing::info!(user_id = %user.id, "account registered");
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        if let Some(user) = self.user.send_replace(None) {
            tracing::info!(user_id = %user.id, "session signed out");
        }
        Ok(())
    }

    fn watch_user(&self) -> watch::Receiver<Option<User>> {
        self.user.subscribe()
    }
}

impl ChangeFeed for MemoryBackend {
    async fn subscribe(&self, owner: UserId) -> Result<Subscription, BackendError> {
        let user = self.signed_in()?;
        if user.id != owner {
            return Err(BackendError::Forbidden);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.shared.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.shared.feed.lock().push(Subscriber { id, owner, tx });

        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        Ok(Subscription::new(owner, rx, move || {
            if let Some(shared) = shared.upgrade() {
                shared.unsubscribe(id);
            }
        }))
    }
}
