//! Pure collection updates used by the task store.
//!
//! Every function keeps the id-uniqueness invariant of the collection and
//! is idempotent: applying the same input twice leaves the same state as
//! applying it once.

use stickyboard_proto::task::{Task, TaskId, TaskPatch};

/// Puts `task` at the front, replacing any record with the same id.
pub fn prepend_unique(tasks: &mut Vec<Task>, task: Task) {
    tasks.retain(|t| t.id != task.id);
    tasks.insert(0, task);
}

/// Puts `task` at the front unless its id is already present.
///
/// Returns `true` if the task was added.
pub fn insert_if_absent(tasks: &mut Vec<Task>, task: Task) -> bool {
    if tasks.iter().any(|t| t.id == task.id) {
        return false;
    }
    tasks.insert(0, task);
    true
}

/// Replaces the full field set of the record with `task.id`.
///
/// Returns `false` (and changes nothing) if no such record exists.
pub fn replace_existing(tasks: &mut [Task], task: Task) -> bool {
    match tasks.iter_mut().find(|t| t.id == task.id) {
        Some(slot) => {
            *slot = task;
            true
        }
        None => false,
    }
}

/// Removes the record with `id`. Returns `true` if one was removed.
pub fn remove(tasks: &mut Vec<Task>, id: TaskId) -> bool {
    let before = tasks.len();
    tasks.retain(|t| t.id != id);
    tasks.len() != before
}

/// Applies `patch` to the record with `id`. Returns `true` if it exists.
pub fn merge_patch(tasks: &mut [Task], id: TaskId, patch: &TaskPatch) -> bool {
    match tasks.iter_mut().find(|t| t.id == id) {
        Some(task) => {
            patch.apply_to(task);
            true
        }
        None => false,
    }
}
