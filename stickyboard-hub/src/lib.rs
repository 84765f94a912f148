//! `StickyBoard` hub library: account table, task rows, WebSocket handler
//! and change fan-out.
//!
//! The binary entry point is in `main.rs`; this crate root exposes the
//! modules so integration tests can start a hub in-process.

pub mod config;
pub mod hub;
pub mod state;
