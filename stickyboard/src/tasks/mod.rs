//! The authoritative in-memory task collection of the signed-in user.
//!
//! [`TaskStore`] fronts a [`RowStore`](crate::backend::RowStore) backend:
//! user actions go to the backend first and are merged locally on success,
//! while committed changes from other sessions arrive through
//! [`TaskStore::apply_change`]. The collection never holds two records with
//! the same id.

pub mod merge;
pub mod store;

pub use store::{BoardState, TaskStore};

use thiserror::Error;

use crate::backend::BackendError;

/// Title given to a note created with an empty title.
pub const NEW_TASK_TITLE: &str = "New Task";

/// Title stored when an update clears the title.
pub const UNTITLED: &str = "Untitled";

/// Errors surfaced by [`TaskStore`] operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No user is signed in; the backend was not contacted.
    #[error("user not authenticated")]
    Unauthenticated,
    /// The backend call failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
}
