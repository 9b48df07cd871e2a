//! Telegram adapter (teloxide).
//!
//! Implements the `c3poh-core` MessagingPort over the Telegram Bot API and the
//! long-polling loop that feeds the router.

use std::{future::Future, time::Duration};

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{AllowedUpdate, MessageEntityKind, UpdateKind},
};

use tokio::time::sleep;

pub mod polling;

use c3poh_core::{
    domain::{ChatId, UserId},
    errors::{Error, GatewayError},
    formatting::split_message,
    messaging::{
        port::MessagingPort,
        types::{ChatAction, ChatKind, EntityKind, InboundEvent, MessageEntity},
    },
    Result,
};

use crate::polling::{PolledUpdate, UpdateSource};

/// Headroom on top of the long-poll wait before the HTTP client gives up.
const HTTP_TIMEOUT_SLACK: Duration = Duration::from_secs(15);

/// Who the bot is, as reported by `getMe`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotIdentity {
    pub username: String,
    pub first_name: String,
}

#[derive(Clone)]
pub struct TelegramGateway {
    bot: Bot,
    max_message_len: usize,
}

impl TelegramGateway {
    /// Build a gateway whose HTTP timeout outlasts a `poll_timeout` long poll.
    pub fn new(token: &str, max_message_len: usize, poll_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(poll_timeout + HTTP_TIMEOUT_SLACK)
            .build()
            .map_err(|e| Error::External(format!("http client build failed: {e}")))?;
        Ok(Self::with_bot(Bot::with_client(token, client), max_message_len))
    }

    pub fn with_bot(bot: Bot, max_message_len: usize) -> Self {
        Self {
            bot,
            max_message_len: max_message_len.max(1),
        }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        let gateway = match e {
            teloxide::RequestError::Api(api) => GatewayError::Api {
                description: api.to_string(),
            },
            other => GatewayError::Transport(other.to_string()),
        };
        Error::Gateway(gateway)
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }

    /// `getMe`: used at startup to learn the bot's own handle.
    pub async fn get_me(&self) -> Result<BotIdentity> {
        let me = self.with_retry(|| self.bot.get_me()).await?;
        Ok(BotIdentity {
            username: me.user.username.clone().unwrap_or_default(),
            first_name: me.user.first_name.clone(),
        })
    }

    /// `getUpdates` long poll starting at `offset`, waiting up to `timeout`
    /// server-side.
    pub async fn get_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<PolledUpdate>> {
        let offset = i32::try_from(offset).unwrap_or(i32::MAX);
        let wait = u32::try_from(timeout.as_secs()).unwrap_or(u32::MAX);
        let updates = self
            .bot
            .get_updates()
            .offset(offset)
            .timeout(wait)
            .allowed_updates(vec![AllowedUpdate::Message])
            .await
            .map_err(Self::map_err)?;

        Ok(updates.iter().map(polled_from_update).collect())
    }
}

#[async_trait]
impl MessagingPort for TelegramGateway {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()> {
        send_chunked(text, self.max_message_len, |chunk| async move {
            self.with_retry(|| self.bot.send_message(Self::tg_chat(chat_id), chunk.clone()))
                .await
                .map(|_| ())
        })
        .await
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        let tg_action = match action {
            ChatAction::Typing => teloxide::types::ChatAction::Typing,
        };
        self.with_retry(|| self.bot.send_chat_action(Self::tg_chat(chat_id), tg_action))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl UpdateSource for TelegramGateway {
    async fn poll(&self, offset: i64, timeout: Duration) -> Result<Vec<PolledUpdate>> {
        self.get_updates(offset, timeout).await
    }
}

/// Send `text` as sequential chunks of at most `limit` characters.
///
/// Stops at the first failed chunk; later chunks are not sent.
pub async fn send_chunked<F, Fut>(text: &str, limit: usize, mut send: F) -> Result<()>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    for chunk in split_message(text, limit) {
        send(chunk).await?;
    }
    Ok(())
}

/// Decode a Telegram update into the router's event type.
///
/// Non-message updates keep their id (so the offset still advances) but carry
/// no event.
pub fn polled_from_update(update: &Update) -> PolledUpdate {
    let event = match &update.kind {
        UpdateKind::Message(msg) => Some(inbound_from_message(i64::from(update.id), msg)),
        _ => None,
    };
    PolledUpdate {
        update_id: i64::from(update.id),
        event,
    }
}

fn inbound_from_message(update_id: i64, msg: &Message) -> InboundEvent {
    let chat_kind = if msg.chat.is_supergroup() {
        ChatKind::Supergroup
    } else if msg.chat.is_group() {
        ChatKind::Group
    } else if msg.chat.is_channel() {
        ChatKind::Channel
    } else {
        ChatKind::Private
    };

    let entities = msg
        .entities()
        .unwrap_or_default()
        .iter()
        .map(|e| MessageEntity {
            kind: match e.kind {
                MessageEntityKind::Mention => EntityKind::Mention,
                _ => EntityKind::Other,
            },
            offset: e.offset,
            length: e.length,
        })
        .collect();

    InboundEvent {
        update_id,
        user_id: msg.from().map(|u| UserId(u.id.0 as i64)),
        chat_id: Some(ChatId(msg.chat.id.0)),
        chat_kind,
        text: msg.text().map(|s| s.to_string()),
        entities,
    }
}
