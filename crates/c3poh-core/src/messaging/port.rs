use async_trait::async_trait;

use crate::{domain::ChatId, messaging::types::ChatAction, Result};

/// Outbound side of the chat platform.
///
/// The router only ever sends plain text and presence indicators; polling and
/// identity lookup stay on the concrete gateway client.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    /// Send `text`, split into sequential messages when it exceeds the
    /// configured maximum length.
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()>;

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()>;
}
