//! Core domain + application logic for C3Poh, the Telegram bridge for Claude Code.
//!
//! This crate is intentionally framework-agnostic. Telegram, the `claude` CLI and
//! the notification listener live behind ports (traits) implemented in adapter crates.

pub mod access;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod message_log;
pub mod messaging;
pub mod ports;
pub mod routing;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

pub use errors::{Error, GatewayError, Result};
