//! Property-based tests for partial task updates.
//!
//! Uses `proptest` to check that [`TaskPatch::apply_to`] only touches the
//! fields a patch carries, never rewrites identity fields, and is
//! idempotent.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use proptest::prelude::*;
use stickyboard_proto::task::{NewTask, Position, Priority, Task, TaskId, TaskPatch};
use stickyboard_proto::user::UserId;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn arb_priority() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::Low),
        Just(Priority::Medium),
        Just(Priority::High),
    ]
}

fn arb_position() -> impl Strategy<Value = Position> {
    (-5_000.0f64..5_000.0, -5_000.0f64..5_000.0).prop_map(|(x, y)| Position::new(x, y))
}

fn arb_task() -> impl Strategy<Value = Task> {
    (
        ".{1,40}",
        proptest::option::of(".{0,80}"),
        arb_priority(),
        arb_position(),
        any::<u64>(),
    )
        .prop_map(|(title, description, priority, position, ts)| {
            let mut new = NewTask::new(UserId::new(), title, position, priority);
            new.description = description;
            new.into_task(TaskId::new(), ts)
        })
}

fn arb_patch() -> impl Strategy<Value = TaskPatch> {
    (
        proptest::option::of(".{0,40}"),
        proptest::option::of(proptest::option::of(".{0,80}")),
        proptest::option::of(arb_priority()),
        proptest::option::of(arb_position()),
        proptest::option::of(any::<bool>()),
    )
        .prop_map(|(title, description, priority, position, archived)| TaskPatch {
            title,
            description,
            priority,
            position,
            color: None,
            archived,
        })
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn patch_never_rewrites_identity(task in arb_task(), patch in arb_patch()) {
        let mut patched = task.clone();
        patch.apply_to(&mut patched);
        prop_assert_eq!(patched.id, task.id);
        prop_assert_eq!(patched.owner, task.owner);
        prop_assert_eq!(patched.created_at, task.created_at);
    }

    #[test]
    fn patch_is_idempotent(task in arb_task(), patch in arb_patch()) {
        let mut once = task;
        patch.apply_to(&mut once);
        let mut twice = once.clone();
        patch.apply_to(&mut twice);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn absent_fields_are_untouched(task in arb_task(), patch in arb_patch()) {
        let mut patched = task.clone();
        patch.apply_to(&mut patched);
        if patch.title.is_none() {
            prop_assert_eq!(&patched.title, &task.title);
        }
        if patch.description.is_none() {
            prop_assert_eq!(&patched.description, &task.description);
        }
        if patch.position.is_none() {
            prop_assert_eq!(patched.position, task.position);
        }
        if patch.priority.is_none() {
            prop_assert_eq!(patched.priority, task.priority);
        }
        // Color is never derived from a patched priority.
        prop_assert_eq!(&patched.color, &task.color);
    }
}
