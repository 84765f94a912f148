//! Property-based tests for canvas clamping and spawn points.
//!
//! Uses `proptest` to check that [`Bounds::clamp`] always lands inside the
//! bounds, is idempotent, leaves inside points alone, and that a drag can
//! never carry a note outside the viewport.
//! Spawn points keep their margin when the viewport has room for it and
//! otherwise land on the nearest point inside the bounds.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use stickyboard::canvas::{Bounds, NoteDrag, NoteSize, Viewport};
use stickyboard_proto::task::{NewTask, Position, Priority, TaskId};
use stickyboard_proto::user::UserId;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn arb_bounds() -> impl Strategy<Value = Bounds> {
    (0.0..4000.0_f64, 0.0..3000.0_f64, 50.0..400.0_f64, 50.0..400.0_f64).prop_map(
        |(width, height, note_width, note_height)| {
            Bounds::new(
                Viewport::new(width, height),
                NoteSize {
                    width: note_width,
                    height: note_height,
                },
            )
        },
    )
}

fn arb_coordinate() -> impl Strategy<Value = f64> {
    prop_oneof![
        8 => -1.0e6..1.0e6_f64,
        1 => Just(f64::NAN),
        1 => Just(f64::INFINITY),
        1 => Just(f64::NEG_INFINITY),
    ]
}

fn arb_position() -> impl Strategy<Value = Position> {
    (arb_coordinate(), arb_coordinate()).prop_map(|(x, y)| Position::new(x, y))
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn clamp_lands_inside(bounds in arb_bounds(), position in arb_position()) {
        let clamped = bounds.clamp(position);
        prop_assert!(bounds.contains(clamped), "{clamped:?} outside {bounds:?}");
        prop_assert!(clamped.x >= 0.0 && clamped.x <= bounds.max_x());
        prop_assert!(clamped.y >= 0.0 && clamped.y <= bounds.max_y());
    }

    #[test]
    fn clamp_is_idempotent(bounds in arb_bounds(), position in arb_position()) {
        let once = bounds.clamp(position);
        prop_assert_eq!(bounds.clamp(once), once);
    }

    #[test]
    fn inside_points_are_untouched(
        bounds in arb_bounds(),
        fx in 0.0..=1.0_f64,
        fy in 0.0..=1.0_f64,
    ) {
        let inside = Position::new(bounds.max_x() * fx, bounds.max_y() * fy);
        prop_assert!(bounds.contains(inside));
        prop_assert_eq!(bounds.clamp(inside), inside);
    }

    #[test]
    fn drag_never_leaves_viewport(
        bounds in arb_bounds(),
        pointers in prop::collection::vec(arb_position(), 1..20),
    ) {
        let task = NewTask::new(UserId::new(), "t", Position::default(), Priority::Low)
            .into_task(TaskId::new(), 1);
        let mut drag = NoteDrag::new(&task, bounds, Duration::from_millis(100));
        drag.begin(Position::default());
        for pointer in pointers {
            let visual = drag.pointer_moved(pointer);
            prop_assert!(bounds.contains(visual), "{visual:?} outside {bounds:?}");
        }
    }

    #[test]
    fn spawn_points_land_inside(bounds in arb_bounds(), seed in any::<u64>()) {
        let mut rng = StdRng::seed_from_u64(seed);
        let spawn = bounds.random_spawn_with(&mut rng);
        prop_assert!(bounds.contains(spawn), "{spawn:?} outside {bounds:?}");

        let span_x = (bounds.viewport.width - 300.0).max(0.0);
        let span_y = (bounds.viewport.height - 250.0).max(0.0);
        prop_assert!(spawn.x <= 50.0 + span_x);
        prop_assert!(spawn.y <= 50.0 + span_y);
        prop_assert!(spawn.x >= 50.0_f64.min(bounds.max_x()));
        prop_assert!(spawn.y >= 50.0_f64.min(bounds.max_y()));
    }
}
