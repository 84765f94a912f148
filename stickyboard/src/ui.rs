//! Presentation state of the board that is not backed by the store.

use stickyboard_proto::task::{Position, Task};

/// Smallest canvas zoom factor.
pub const MIN_ZOOM: f64 = 0.5;

/// Largest canvas zoom factor.
pub const MAX_ZOOM: f64 = 2.0;

/// Panel, modal and canvas view flags.
#[derive(Debug, Clone, PartialEq)]
pub struct UiState {
    /// The control panel (new note, sign out) is shown.
    pub control_panel_visible: bool,
    /// The "new task" modal is open.
    pub task_modal_open: bool,
    /// A note is being dragged.
    pub dragging: bool,
    /// Canvas zoom factor, within [`MIN_ZOOM`]..=[`MAX_ZOOM`].
    pub zoom: f64,
    /// Canvas pan offset.
    pub offset: Position,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            control_panel_visible: false,
            task_modal_open: false,
            dragging: false,
            zoom: 1.0,
            offset: Position::default(),
        }
    }
}

impl UiState {
    /// Shows or hides the control panel.
    pub const fn set_control_panel_visible(&mut self, visible: bool) {
        self.control_panel_visible = visible;
    }

    /// Flips the control panel visibility.
    pub const fn toggle_control_panel(&mut self) {
        self.control_panel_visible = !self.control_panel_visible;
    }

    /// Opens or closes the "new task" modal.
    pub const fn set_task_modal_open(&mut self, open: bool) {
        self.task_modal_open = open;
    }

    /// Marks whether a note is being dragged.
    pub const fn set_dragging(&mut self, dragging: bool) {
        self.dragging = dragging;
    }

    /// Sets the zoom factor, clamped to [`MIN_ZOOM`]..=[`MAX_ZOOM`].
    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = if zoom.is_nan() {
            1.0
        } else {
            zoom.clamp(MIN_ZOOM, MAX_ZOOM)
        };
    }

    /// Sets the pan offset.
    pub const fn set_offset(&mut self, offset: Position) {
        self.offset = offset;
    }

    /// Restores zoom 1 and no pan.
    pub fn reset_canvas(&mut self) {
        self.zoom = 1.0;
        self.offset = Position::default();
    }

    /// Whether the task modal is on screen: a task is selected, or the
    /// "new task" modal was opened.
    #[must_use]
    pub const fn task_modal_visible(&self, selection: Option<&Task>) -> bool {
        selection.is_some() || self.task_modal_open
    }
}
