use std::path::PathBuf;

/// Core error type.
///
/// Adapter crates map their specific errors into this type so the router can
/// treat failures consistently (operator log vs user-facing reply).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("invalid path: {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    #[error("external error: {0}")]
    External(String),
}

/// Failure talking to the chat platform.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The request never produced a decodable platform response.
    #[error("telegram transport error: {0}")]
    Transport(String),

    /// The platform answered with `ok: false`.
    #[error("telegram API error: {description}")]
    Api { description: String },
}

pub type Result<T> = std::result::Result<T, Error>;
