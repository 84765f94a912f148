//! `StickyBoard` -- sticky-note task board core.
//!
//! Notes are kept in a backend-scoped [`tasks::TaskStore`], synced across
//! sessions by [`realtime`], and kept inside the visible canvas by
//! [`canvas`].

pub mod backend;
pub mod board;
pub mod canvas;
pub mod config;
pub mod realtime;
pub mod tasks;
pub mod ui;
