//! Task model for `StickyBoard`.
//!
//! A [`Task`] is the one persisted entity: a sticky note with a title,
//! optional description, priority and a free-form canvas position.
//! [`NewTask`] is the insert payload (the backend assigns id and
//! timestamps) and [`TaskPatch`] is a partial update.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::user::UserId;

/// Unique identifier for a task, based on UUID v7 for time-ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Creates a new time-ordered task identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `TaskId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Priority of a task. Drives the note color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Priority {
    /// Can wait.
    Low,
    /// The default for new tasks.
    #[default]
    Medium,
    /// Needs attention first.
    High,
}

impl Priority {
    /// Background color of a note with this priority.
    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            Self::Low => "#C8F7C5",
            Self::Medium => "#FFF2CC",
            Self::High => "#FFD5D5",
        }
    }

    /// Border color of a note with this priority.
    #[must_use]
    pub const fn border_color(self) -> &'static str {
        match self {
            Self::Low => "#A8E8A1",
            Self::Medium => "#FFE588",
            Self::High => "#FFC2C2",
        }
    }

    /// Lowercase name, as accepted by [`str::parse`].
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unknown priority name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown priority `{0}` (expected low, medium or high)")]
pub struct ParsePriorityError(pub String);

impl std::str::FromStr for Priority {
    type Err = ParsePriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(ParsePriorityError(s.to_string())),
        }
    }
}

/// A point in canvas pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal offset from the left edge.
    pub x: f64,
    /// Vertical offset from the top edge.
    pub y: f64,
}

impl Position {
    /// Creates a position from raw coordinates.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl std::ops::Sub for Position {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.0}, {:.0})", self.x, self.y)
    }
}

/// A sticky note as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Backend-assigned identifier.
    pub id: TaskId,
    /// Creating user. Never changes.
    pub owner: UserId,
    /// Display title.
    pub title: String,
    /// Optional free text.
    pub description: Option<String>,
    /// Task priority.
    pub priority: Priority,
    /// Top-left corner of the note on the canvas.
    pub position: Position,
    /// Note color, copied from the priority at creation time.
    pub color: String,
    /// Creation time (milliseconds since epoch), backend-assigned.
    pub created_at: u64,
    /// Last modification time (milliseconds since epoch), backend-assigned.
    pub updated_at: u64,
    /// Archived tasks are never listed.
    pub archived: bool,
}

/// Insert payload for a new task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    /// Creating user.
    pub owner: UserId,
    /// Display title.
    pub title: String,
    /// Optional free text.
    pub description: Option<String>,
    /// Task priority.
    pub priority: Priority,
    /// Initial position on the canvas.
    pub position: Position,
    /// Note color.
    pub color: String,
    /// Always `false` for tasks created through the board.
    pub archived: bool,
}

impl NewTask {
    /// Builds an unarchived insert payload with the color derived from
    /// `priority`.
    #[must_use]
    pub fn new(owner: UserId, title: impl Into<String>, position: Position, priority: Priority) -> Self {
        Self {
            owner,
            title: title.into(),
            description: None,
            priority,
            position,
            color: priority.color().to_string(),
            archived: false,
        }
    }

    /// Materializes the stored row once the backend has assigned an id and
    /// a timestamp.
    #[must_use]
    pub fn into_task(self, id: TaskId, now_ms: u64) -> Task {
        Task {
            id,
            owner: self.owner,
            title: self.title,
            description: self.description,
            priority: self.priority,
            position: self.position,
            color: self.color,
            created_at: now_ms,
            updated_at: now_ms,
            archived: self.archived,
        }
    }
}

/// A partial update to a task. `None` fields are left unchanged.
///
/// `id`, `owner` and `created_at` are not representable here, so a patch
/// can never rewrite them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    /// New title.
    pub title: Option<String>,
    /// New description; `Some(None)` clears it.
    pub description: Option<Option<String>>,
    /// New priority. Does not touch `color`.
    pub priority: Option<Priority>,
    /// New position.
    pub position: Option<Position>,
    /// New color.
    pub color: Option<String>,
    /// New archived flag.
    pub archived: Option<bool>,
}

impl TaskPatch {
    /// A patch that only moves the note.
    #[must_use]
    pub const fn position(position: Position) -> Self {
        Self {
            title: None,
            description: None,
            priority: None,
            position: Some(position),
            color: None,
            archived: None,
        }
    }

    /// Sets the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets (or clears, with `None`) the description.
    #[must_use]
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = Some(description);
        self
    }

    /// Sets the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Sets the archived flag.
    #[must_use]
    pub const fn with_archived(mut self, archived: bool) -> Self {
        self.archived = Some(archived);
        self
    }

    /// Returns `true` if the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.position.is_none()
            && self.color.is_none()
            && self.archived.is_none()
    }

    /// Merges the present fields into `task`.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            task.description.clone_from(description);
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(position) = self.position {
            task.position = position;
        }
        if let Some(color) = &self.color {
            task.color.clone_from(color);
        }
        if let Some(archived) = self.archived {
            task.archived = archived;
        }
    }
}
