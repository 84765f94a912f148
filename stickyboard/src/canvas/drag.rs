//! Pointer-driven moves of a single note.
//!
//! A [`NoteDrag`] owns the visual position of one rendered note. While the
//! user drags, the visual position follows the pointer (clamped to the
//! viewport) without touching the backend; releasing the pointer writes
//! the final position once. From `begin` until shortly after `end` the note
//! is *locally driven*: position updates from the store are ignored so a
//! stale echo cannot yank the note back under the pointer.

use std::time::Duration;

use tokio::time::Instant;

use stickyboard_proto::task::{Position, Task, TaskId};

use super::Bounds;
use crate::backend::RowStore;
use crate::tasks::{StoreError, TaskStore};

/// How long after a drag the terminating click is swallowed.
pub const DEFAULT_CLICK_GUARD: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Idle,
    Dragging { offset: Position, moved: bool },
    Settling { until: Instant },
}

/// Drag state of one note.
#[derive(Debug, Clone)]
pub struct NoteDrag {
    task_id: TaskId,
    position: Position,
    bounds: Bounds,
    click_guard: Duration,
    phase: Phase,
}

impl NoteDrag {
    /// Starts tracking `task` at its stored position.
    #[must_use]
    pub const fn new(task: &Task, bounds: Bounds, click_guard: Duration) -> Self {
        Self {
            task_id: task.id,
            position: task.position,
            bounds,
            click_guard,
            phase: Phase::Idle,
        }
    }

    /// The note being dragged.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Current visual position.
    #[must_use]
    pub const fn position(&self) -> Position {
        self.position
    }

    /// Updates the bounds, e.g. after a viewport resize.
    pub const fn set_bounds(&mut self, bounds: Bounds) {
        self.bounds = bounds;
    }

    /// Whether a gesture is in progress.
    #[must_use]
    pub const fn is_dragging(&self) -> bool {
        matches!(self.phase, Phase::Dragging { .. })
    }

    /// Pointer pressed at `pointer`.
    pub fn begin(&mut self, pointer: Position) {
        self.phase = Phase::Dragging {
            offset: pointer - self.position,
            moved: false,
        };
    }

    /// Pointer moved to `pointer`. Moves the note locally and returns the
    /// new visual position. Ignored outside a gesture.
    pub fn pointer_moved(&mut self, pointer: Position) -> Position {
        if let Phase::Dragging { offset, moved } = &mut self.phase {
            self.position = self.bounds.clamp(pointer - *offset);
            *moved = true;
        }
        self.position
    }

    /// Pointer released.
    ///
    /// If the pointer moved during the gesture, persists the final position
    /// through [`TaskStore::update_position`] and returns it; otherwise
    /// nothing is written and `Ok(None)` is returned.
    ///
    /// # Errors
    ///
    /// Propagates the store error. The visual position is kept.
    pub async fn end<R: RowStore>(
        &mut self,
        store: &TaskStore<R>,
    ) -> Result<Option<Position>, StoreError> {
        let Phase::Dragging { moved: true, .. } = self.phase else {
            self.phase = Phase::Idle;
            return Ok(None);
        };
        self.phase = Phase::Settling {
            until: Instant::now() + self.click_guard,
        };
        let position = self.position;
        store.update_position(self.task_id, position).await?;
        Ok(Some(position))
    }

    /// Whether the note ignores store positions at `now`.
    #[must_use]
    pub fn is_local_at(&self, now: Instant) -> bool {
        match self.phase {
            Phase::Idle => false,
            Phase::Dragging { .. } => true,
            Phase::Settling { until } => now < until,
        }
    }

    /// Whether a click at `now` should open the note.
    #[must_use]
    pub fn accepts_click_at(&self, now: Instant) -> bool {
        !self.is_local_at(now)
    }

    /// Whether a click right now should open the note.
    #[must_use]
    pub fn accepts_click(&self) -> bool {
        self.accepts_click_at(Instant::now())
    }

    /// Adopts the stored position of `task` unless the note is locally
    /// driven. Returns `true` if the visual position was taken from the
    /// store.
    pub fn sync_from_store(&mut self, task: &Task) -> bool {
        if task.id != self.task_id || self.is_local_at(Instant::now()) {
            return false;
        }
        self.phase = Phase::Idle;
        self.position = task.position;
        true
    }
}
