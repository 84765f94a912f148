//! Canvas geometry and position reconciliation.
//!
//! Notes live on a free-form canvas the size of the viewport. [`Bounds`]
//! keeps a note's top-left corner inside the visible area, [`NoteDrag`]
//! turns a pointer gesture into exactly one clamped position write, and
//! [`OffscreenRecovery`] pulls notes that ended up outside the viewport
//! (for example after a window resize) back into view.

pub mod drag;
pub mod recover;

pub use drag::{DEFAULT_CLICK_GUARD, NoteDrag};
pub use recover::{OffscreenRecovery, RecoveryReport};

use rand::Rng;
use stickyboard_proto::task::Position;

/// Default note width in pixels.
pub const DEFAULT_NOTE_WIDTH: f64 = 200.0;

/// Default note height in pixels.
pub const DEFAULT_NOTE_HEIGHT: f64 = 150.0;

/// Distance of the random spawn area from the top-left corner.
const SPAWN_MARGIN: f64 = 50.0;

/// Horizontal space excluded from the random spawn area.
const SPAWN_RESERVE_X: f64 = 300.0;

/// Vertical space excluded from the random spawn area.
const SPAWN_RESERVE_Y: f64 = 250.0;

/// Size of the visible canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Width in pixels.
    pub width: f64,
    /// Height in pixels.
    pub height: f64,
}

impl Viewport {
    /// Creates a viewport of the given size.
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Rendered size of one note.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteSize {
    /// Width in pixels.
    pub width: f64,
    /// Height in pixels.
    pub height: f64,
}

impl Default for NoteSize {
    fn default() -> Self {
        Self {
            width: DEFAULT_NOTE_WIDTH,
            height: DEFAULT_NOTE_HEIGHT,
        }
    }
}

/// The region a note's top-left corner may occupy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Visible canvas.
    pub viewport: Viewport,
    /// Note size.
    pub note: NoteSize,
}

impl Bounds {
    /// Bounds for notes of size `note` on `viewport`.
    #[must_use]
    pub const fn new(viewport: Viewport, note: NoteSize) -> Self {
        Self { viewport, note }
    }

    /// Bounds for default-sized notes on `viewport`.
    #[must_use]
    pub fn for_viewport(viewport: Viewport) -> Self {
        Self::new(viewport, NoteSize::default())
    }

    /// Largest allowed x; zero when the viewport is narrower than a note.
    #[must_use]
    pub fn max_x(&self) -> f64 {
        (self.viewport.width - self.note.width).max(0.0)
    }

    /// Largest allowed y; zero when the viewport is shorter than a note.
    #[must_use]
    pub fn max_y(&self) -> f64 {
        (self.viewport.height - self.note.height).max(0.0)
    }

    /// Moves `position` to the nearest point inside the bounds.
    /// NaN coordinates become 0.
    #[must_use]
    pub fn clamp(&self, position: Position) -> Position {
        Position::new(
            clamp_axis(position.x, self.max_x()),
            clamp_axis(position.y, self.max_y()),
        )
    }

    /// Returns `true` if `position` needs no clamping.
    #[must_use]
    pub fn contains(&self, position: Position) -> bool {
        (0.0..=self.max_x()).contains(&position.x) && (0.0..=self.max_y()).contains(&position.y)
    }

    /// A random spawn point for a new note.
    #[must_use]
    pub fn random_spawn(&self) -> Position {
        self.random_spawn_with(&mut rand::rng())
    }

    /// A random spawn point drawn from `rng`.
    ///
    /// Points fall in `[50, 50 + (width - 300)) x [50, 50 + (height - 250))`
    /// and are then clamped into the bounds, so a viewport smaller than the
    /// margin plus a note spawns at the nearest allowed point.
    pub fn random_spawn_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Position {
        let span_x = (self.viewport.width - SPAWN_RESERVE_X).max(0.0);
        let span_y = (self.viewport.height - SPAWN_RESERVE_Y).max(0.0);
        self.clamp(Position::new(
            rng.random::<f64>().mul_add(span_x, SPAWN_MARGIN),
            rng.random::<f64>().mul_add(span_y, SPAWN_MARGIN),
        ))
    }
}

fn clamp_axis(value: f64, max: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.min(max).max(0.0)
    }
}
