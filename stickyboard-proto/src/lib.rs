//! Shared data model and wire protocol for `StickyBoard`.

pub mod codec;
pub mod event;
pub mod hub;
pub mod task;
pub mod user;
