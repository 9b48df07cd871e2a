//! Local HTTP listener for push notifications.
//!
//! Accepts JSON bodies on `POST /notify`, normalizes them to chat text and
//! hands the result to a [`NotifySink`](c3poh_core::ports::NotifySink).
//! Binds to loopback only.

pub mod payload;
pub mod server;

pub use payload::normalize;
pub use server::{bind, router, serve, serve_on, MAX_BODY_BYTES};
