//! Chassis assistant, the conversation core of an embeddable chat widget
//! that talks to an AI backend about one chassis record.
//!
//! DESIGN
//! ======
//! - `context` works out which chassis and user the host page is showing.
//! - `api` is the REST client; nothing else touches the network.
//! - `reducer` holds the state and its pure transitions.
//! - `session` drives those transitions around backend calls and timers.
//! - `widget` is the host entry point and owns context resolution.
//! - `render` and `command` are the terminal presentation layer.

pub mod api;
pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod reducer;
pub mod render;
pub mod session;
pub mod types;
pub mod widget;

#[cfg(test)]
pub mod test_helpers;
