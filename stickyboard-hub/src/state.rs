//! Hub tables: accounts, task rows and change-feed subscribers.
//!
//! [`HubState`] is shared by every connection. Row mutations publish their
//! [`ChangeEvent`] while the row table is still write-locked, so every
//! subscriber observes changes to an owner's rows in commit order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message;
use sha2::{Digest, Sha256};
use stickyboard_proto::event::ChangeEvent;
use stickyboard_proto::hub::{self, DEFAULT_MAX_FRAME_SIZE, Fault, ServerFrame};
use stickyboard_proto::task::{NewTask, Task, TaskId, TaskPatch};
use stickyboard_proto::user::{User, UserId};
use tokio::sync::{RwLock, mpsc};

/// Identifies one WebSocket connection for the lifetime of the hub.
pub type ConnectionId = u64;

/// A registered account. Only a salted digest of the password is kept.
struct Account {
    user: User,
    digest: [u8; 32],
}

/// SHA-256 over the account id followed by the password.
fn password_digest(id: UserId, password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(id.as_uuid().as_bytes());
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

/// A connection that receives change frames for one owner.
struct Subscriber {
    owner: UserId,
    tx: mpsc::UnboundedSender<Message>,
}

/// State shared by every connection of one hub.
pub struct HubState {
    /// Lowercased email -> account.
    accounts: RwLock<HashMap<String, Account>>,
    rows: RwLock<HashMap<TaskId, Task>>,
    subscribers: parking_lot::Mutex<HashMap<ConnectionId, Subscriber>>,
    next_connection: AtomicU64,
    /// Last timestamp handed out; row timestamps are strictly increasing.
    clock: AtomicU64,
    max_frame_size: usize,
}

impl Default for HubState {
    fn default() -> Self {
        Self::new()
    }
}

impl HubState {
    /// Creates an empty hub accepting frames up to
    /// [`DEFAULT_MAX_FRAME_SIZE`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Creates an empty hub with a custom frame size limit.
    #[must_use]
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            rows: RwLock::new(HashMap::new()),
            subscribers: parking_lot::Mutex::new(HashMap::new()),
            next_connection: AtomicU64::new(1),
            clock: AtomicU64::new(0),
            max_frame_size,
        }
    }

    /// Largest client frame the hub decodes.
    #[must_use]
    pub const fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Allocates an id for a new connection.
    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_connection.fetch_add(1, Ordering::Relaxed)
    }

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

    // -----------------------------------------------------------------------
    // Accounts
    // -----------------------------------------------------------------------

    /// Registers an account. Emails are matched case-insensitively.
    ///
    /// # Errors
    ///
    /// [`Fault::Malformed`] for an empty email or password,
    /// [`Fault::AccountExists`] if the email is taken.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<User, Fault> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(Fault::Malformed {
                reason: "email and password are required".to_string(),
            });
        }
        let key = email.to_ascii_lowercase();
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&key) {
            return Err(Fault::AccountExists {
                email: email.to_string(),
            });
        }
        let user = User {
            id: UserId::new(),
            email: email.to_string(),
            display_name: display_name
                .filter(|name| !name.trim().is_empty())
                .map_or_else(|| User::default_display_name(email), str::to_string),
        };
        let digest = password_digest(user.id, password);
        accounts.insert(
            key,
            Account {
                user: user.clone(),
                digest,
            },
        );
        drop(accounts);
        tracing::info!(user_id = %user.id, "account registered");
        Ok(user)
    }

    /// Checks a login.
    ///
    /// # Errors
    ///
    /// [`Fault::InvalidCredentials`] for an unknown email or wrong password.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, Fault> {
        let accounts = self.accounts.read().await;
        match accounts.get(&email.trim().to_ascii_lowercase()) {
            Some(account) if account.digest == password_digest(account.user.id, password) => {
                Ok(account.user.clone())
            }
            _ => Err(Fault::InvalidCredentials),
        }
    }

    /// Number of registered accounts.
    pub async fn account_count(&self) -> usize {
        self.accounts.read().await.len()
    }

    // -----------------------------------------------------------------------
    // Rows
    // -----------------------------------------------------------------------

    /// Rows of `owner`, newest first. Archived rows only when asked for.
    pub async fn list_tasks(&self, owner: UserId, include_archived: bool) -> Vec<Task> {
        let rows = self.rows.read().await;
        let mut tasks: Vec<Task> = rows
            .values()
            .filter(|task| task.owner == owner && (include_archived || !task.archived))
            .cloned()
            .collect();
        drop(rows);
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }

    /// Stores a new row for `owner` and publishes the insert.
    ///
    /// # Errors
    ///
    /// [`Fault::Forbidden`] if the row names another owner.
    pub async fn insert_task(&self, owner: UserId, row: NewTask) -> Result<Task, Fault> {
        if row.owner != owner {
            return Err(Fault::Forbidden);
        }
        let mut rows = self.rows.write().await;
        let task = row.into_task(TaskId::new(), self.tick());
        rows.insert(task.id, task.clone());
        self.publish(owner, &ChangeEvent::Insert(task.clone()));
        drop(rows);
        Ok(task)
    }

    /// Applies `patch` to one of `owner`'s rows, bumps `updated_at` and
    /// publishes the update.
    ///
    /// # Errors
    ///
    /// [`Fault::NotFound`] if the row is missing or belongs to someone else.
    pub async fn update_task(
        &self,
        owner: UserId,
        id: TaskId,
        patch: &TaskPatch,
    ) -> Result<Task, Fault> {
        let mut rows = self.rows.write().await;
        let task = rows
            .get_mut(&id)
            .filter(|task| task.owner == owner)
            .ok_or(Fault::NotFound { id })?;
        patch.apply_to(task);
        task.updated_at = self.tick();
        let task = task.clone();
        self.publish(owner, &ChangeEvent::Update(task.clone()));
        drop(rows);
        Ok(task)
    }

    /// Removes one of `owner`'s rows and publishes the delete.
    ///
    /// # Errors
    ///
    /// [`Fault::NotFound`] if the row is missing or belongs to someone else.
    pub async fn delete_task(&self, owner: UserId, id: TaskId) -> Result<(), Fault> {
        let mut rows = self.rows.write().await;
        if !rows.get(&id).is_some_and(|task| task.owner == owner) {
            return Err(Fault::NotFound { id });
        }
        rows.remove(&id);
        self.publish(owner, &ChangeEvent::Delete { id });
        drop(rows);
        Ok(())
    }

    /// Total number of rows, across owners.
    pub async fn row_count(&self) -> usize {
        self.rows.read().await.len()
    }

    // -----------------------------------------------------------------------
    // Change feed
    // -----------------------------------------------------------------------

    /// Routes change frames for `owner` to `tx`. Replaces any earlier
    /// subscription of the same connection.
    pub fn subscribe(
        &self,
        connection: ConnectionId,
        owner: UserId,
        tx: mpsc::UnboundedSender<Message>,
    ) {
        self.subscribers
            .lock()
            .insert(connection, Subscriber { owner, tx });
        tracing::info!(connection, user_id = %owner, "change feed subscribed");
    }

    /// Stops change frames to `connection`. Returns whether it was
    /// subscribed.
    pub fn unsubscribe(&self, connection: ConnectionId) -> bool {
        let removed = self.subscribers.lock().remove(&connection).is_some();
        if removed {
            tracing::info!(connection, "change feed unsubscribed");
        }
        removed
    }

    /// Number of subscribed connections.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Sends `event` to every connection subscribed to `owner`.
    fn publish(&self, owner: UserId, event: &ChangeEvent) {
        let bytes = match hub::encode_server(&ServerFrame::Change(event.clone())) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(task_id = %event.task_id(), error = %e, "failed to encode change");
                return;
            }
        };
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|_, sub| !sub.tx.is_closed());
        let mut delivered = 0_usize;
        for sub in subscribers.values().filter(|sub| sub.owner == owner) {
            if sub.tx.send(Message::Binary(bytes.clone().into())).is_ok() {
                delivered += 1;
            }
        }
        drop(subscribers);
        tracing::debug!(
            task_id = %event.task_id(),
            kind = %event.kind(),
            delivered,
            "change published"
        );
    }
}

/// Milliseconds since the Unix epoch.
fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
