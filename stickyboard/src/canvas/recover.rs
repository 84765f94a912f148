//! Pulls notes stranded outside the viewport back into view.

use stickyboard_proto::task::TaskId;

use super::Bounds;
use crate::backend::RowStore;
use crate::tasks::{StoreError, TaskStore};

/// Outcome of one recovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Notes moved back inside the bounds and persisted.
    pub corrected: Vec<TaskId>,
    /// Notes whose corrected position could not be written.
    pub failed: Vec<(TaskId, StoreError)>,
}

impl RecoveryReport {
    /// Whether every stranded note was corrected.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs the recovery pass on load and whenever the number of tasks
/// changes, not on every render.
#[derive(Debug, Default)]
pub struct OffscreenRecovery {
    last_count: Option<usize>,
}

impl OffscreenRecovery {
    /// A recovery tracker that has not run yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { last_count: None }
    }

    /// Whether a store holding `count` tasks needs a pass.
    #[must_use]
    pub fn is_due(&self, count: usize) -> bool {
        self.last_count != Some(count)
    }

    /// Runs a pass if the task count changed since the last one.
    pub async fn on_tasks_changed<R: RowStore>(
        &mut self,
        store: &TaskStore<R>,
        bounds: &Bounds,
    ) -> Option<RecoveryReport> {
        if !self.is_due(store.len()) {
            return None;
        }
        Some(self.run(store, bounds).await)
    }

    /// Clamps every note outside `bounds` and persists the result.
    ///
    /// A failed write is logged and the pass moves on to the next note.
    pub async fn run<R: RowStore>(&mut self, store: &TaskStore<R>, bounds: &Bounds) -> RecoveryReport {
        let tasks = store.tasks();
        self.last_count = Some(tasks.len());

        let mut report = RecoveryReport::default();
        for task in tasks.iter().filter(|t| !bounds.contains(t.position)) {
            let target = bounds.clamp(task.position);
            match store.update_position(task.id, target).await {
                Ok(()) => {
                    tracing::info!(
                        task_id = %task.id,
                        from = %task.position,
                        to = %target,
                        "recovered offscreen note"
                    );
                    report.corrected.push(task.id);
                }
                Err(e) => {
                    tracing::warn!(task_id = %task.id, error = %e, "failed to recover offscreen note");
                    report.failed.push((task.id, e));
                }
            }
        }
        report
    }
}
