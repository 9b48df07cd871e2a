use async_trait::async_trait;

use crate::Result;

/// Hexagonal port for the local assistant process.
///
/// Implementations must never fail: every outcome (missing binary, timeout,
/// empty output) is mapped to a reply string the user can read.
#[async_trait]
pub trait Assistant: Send + Sync {
    async fn ask(&self, prompt: &str) -> String;
}

/// Receiver for normalized external notifications.
///
/// The notification listener holds one of these and calls it once per
/// accepted request; an `Err` becomes a server-error response.
#[async_trait]
pub trait NotifySink: Send + Sync {
    async fn deliver(&self, text: String) -> Result<()>;
}
