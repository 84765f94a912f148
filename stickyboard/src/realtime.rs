//! Realtime ingest: keeps the task store in step with other sessions.
//!
//! [`RealtimeIngest`] holds at most one change-feed [`Subscription`],
//! scoped to the signed-in user. [`run`] drives it: it follows auth-state
//! transitions (closing the old subscription before opening a new one)
//! and merges every delivered [`ChangeEvent`] into the [`TaskStore`].

use std::sync::Arc;

use tokio::sync::watch;

use stickyboard_proto::event::ChangeEvent;
use stickyboard_proto::user::{User, UserId};

use crate::backend::{BackendError, ChangeFeed, Subscription};
use crate::tasks::TaskStore;

/// Owner of the change-feed subscription for one board.
pub struct RealtimeIngest<F> {
    feed: Arc<F>,
    subscription: Option<Subscription>,
}

impl<F: ChangeFeed> RealtimeIngest<F> {
    /// An ingest with no open subscription.
    #[must_use]
    pub const fn new(feed: Arc<F>) -> Self {
        Self {
            feed,
            subscription: None,
        }
    }

    /// Points the subscription at `user`.
    ///
    /// Following the user that is already followed keeps the open handle.
    /// Otherwise the current handle is closed first and, if `user` is
    /// known, a new one is opened for that user's rows.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the new subscription cannot be opened;
    /// the ingest is then left closed.
    pub async fn follow_user(&mut self, user: Option<&User>) -> Result<(), BackendError> {
        let wanted = user.map(|u| u.id);
        if wanted.is_some() && wanted == self.owner() {
            return Ok(());
        }
        self.close();
        if let Some(user) = user {
            let subscription = self.feed.subscribe(user.id).await?;
            tracing::info!(user_id = %user.id, "change feed subscribed");
            self.subscription = Some(subscription);
        }
        Ok(())
    }

    /// Closes the open subscription, if any.
    pub fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            tracing::info!(user_id = %subscription.owner(), "change feed closed");
            subscription.close();
        }
    }

    /// Whether a subscription is open.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.subscription.is_some()
    }

    /// The user whose rows are followed.
    #[must_use]
    pub fn owner(&self) -> Option<UserId> {
        self.subscription.as_ref().map(Subscription::owner)
    }

    /// Waits for the next event. Returns `None` when no subscription is
    /// open or the backend side has ended.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        match self.subscription.as_mut() {
            Some(subscription) => subscription.recv().await,
            None => None,
        }
    }

    /// Applies every already-delivered event to `store` without waiting.
    /// Returns the number of events applied.
    pub fn drain<R>(&mut self, store: &TaskStore<R>) -> usize {
        let Some(subscription) = self.subscription.as_mut() else {
            return 0;
        };
        let mut applied = 0;
        while let Some(event) = subscription.try_recv() {
            store.apply_change(&event);
            applied += 1;
        }
        applied
    }
}

impl<F> Drop for RealtimeIngest<F> {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.close();
        }
    }
}

/// Waits on the open subscription, or forever if there is none.
async fn next_event(subscription: &mut Option<Subscription>) -> Option<ChangeEvent> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

/// Drives `ingest` until the auth stream ends.
///
/// Follows the user currently in `auth` and every later transition, and
/// applies each delivered event to `store`. A failed subscription is
/// logged and retried on the next auth transition.
pub async fn run<F: ChangeFeed, R: Send + Sync>(
    mut ingest: RealtimeIngest<F>,
    store: Arc<TaskStore<R>>,
    mut auth: watch::Receiver<Option<User>>,
) {
    let user = auth.borrow_and_update().clone();
    if let Err(e) = ingest.follow_user(user.as_ref()).await {
        tracing::warn!(error = %e, "failed to open change feed");
    }

    loop {
        tokio::select! {
            changed = auth.changed() => {
                if changed.is_err() {
                    break;
                }
                let user = auth.borrow_and_update().clone();
                if let Err(e) = ingest.follow_user(user.as_ref()).await {
                    tracing::warn!(error = %e, "failed to open change feed");
                }
            }
            event = next_event(&mut ingest.subscription) => {
                if let Some(event) = event {
                    store.apply_change(&event);
                } else {
                    tracing::warn!("change feed ended");
                    ingest.subscription = None;
                }
            }
        }
    }

    ingest.close();
    tracing::debug!("realtime driver exiting");
}
