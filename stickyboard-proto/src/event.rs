//! Row change notifications pushed by the backend's change feed.

use serde::{Deserialize, Serialize};

use crate::task::{Task, TaskId};

/// A committed change to one task row.
///
/// Delivered to every subscriber scoped to the row's owner, including the
/// session that made the change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChangeEvent {
    /// A row was inserted. Carries the full new row.
    Insert(Task),
    /// A row was updated. Carries the full row after the update.
    Update(Task),
    /// A row was deleted.
    Delete {
        /// Identifier of the removed row.
        id: TaskId,
    },
}

/// Discriminant of a [`ChangeEvent`], used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// See [`ChangeEvent::Insert`].
    Insert,
    /// See [`ChangeEvent::Update`].
    Update,
    /// See [`ChangeEvent::Delete`].
    Delete,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Insert => write!(f, "insert"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

impl ChangeEvent {
    /// Identifier of the affected row.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        match self {
            Self::Insert(task) | Self::Update(task) => task.id,
            Self::Delete { id } => *id,
        }
    }

    /// The kind of change.
    #[must_use]
    pub const fn kind(&self) -> ChangeKind {
        match self {
            Self::Insert(_) => ChangeKind::Insert,
            Self::Update(_) => ChangeKind::Update,
            Self::Delete { .. } => ChangeKind::Delete,
        }
    }
}
