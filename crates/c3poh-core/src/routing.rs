//! Access control and message routing.
//!
//! Every inbound event runs through [`MessageRouter::handle_event`]:
//! mention gate (groups) → authorization → mention strip → log → typing →
//! assistant → log → reply. External notifications fan out through
//! [`MessageRouter::notify_all`].

use std::{future::Future, sync::Arc};

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::{
    access::{authorize, Allowlist, DmPolicy},
    config::Config,
    domain::{ChatId, UserId},
    formatting::truncate_text,
    message_log::{Direction, MessageLog},
    messaging::{
        port::MessagingPort,
        types::{ChatAction, EntityKind, InboundEvent, MessageEntity},
    },
    ports::{Assistant, NotifySink},
    state::StateStore,
    Result,
};

pub const REJECTION_NOTICE: &str =
    "🚫 You're not authorized to use this bot.\nContact the owner to be added to the allowlist.";

/// Router knobs, resolved once from [`Config`] plus the bot's own handle.
#[derive(Clone, Debug)]
pub struct RouterSettings {
    pub policy: DmPolicy,
    pub allowlist: Allowlist,
    pub require_mention: bool,
    pub typing_indicator: bool,
    /// Bot username without the leading `@`.
    pub bot_username: String,
}

impl RouterSettings {
    pub fn from_config(cfg: &Config, bot_username: impl Into<String>) -> Result<Self> {
        Ok(Self {
            policy: cfg.policy()?,
            allowlist: Allowlist::new(&cfg.allow_from),
            require_mention: cfg.require_mention,
            typing_indicator: cfg.typing_indicator,
            bot_username: bot_username.into().trim_start_matches('@').to_string(),
        })
    }
}

/// What the router did with one event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Missing text, chat or sender.
    Dropped,
    /// Group message without the required mention.
    Ignored,
    /// Sender not authorized.
    Blocked,
    /// Nothing left after stripping the mention.
    Empty,
    /// Assistant was invoked and a reply attempted.
    Answered,
}

/// Per-recipient result of a notification fan-out.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub delivered: Vec<UserId>,
    /// `(recipient, reason)`; the recipient is kept in its configured form.
    pub failed: Vec<(String, String)>,
}

pub struct MessageRouter {
    settings: RouterSettings,
    state: Arc<StateStore>,
    log: Arc<MessageLog>,
    messenger: Arc<dyn MessagingPort>,
    assistant: Arc<dyn Assistant>,
}

impl MessageRouter {
    pub fn new(
        settings: RouterSettings,
        state: Arc<StateStore>,
        log: Arc<MessageLog>,
        messenger: Arc<dyn MessagingPort>,
        assistant: Arc<dyn Assistant>,
    ) -> Self {
        Self {
            settings,
            state,
            log,
            messenger,
            assistant,
        }
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    /// Handle one inbound event to completion.
    ///
    /// Callers must process events sequentially; see [`authorize`] for the
    /// pairing guard.
    pub async fn handle_event(&self, ev: &InboundEvent) -> Result<HandleOutcome> {
        let (Some(raw_text), Some(chat_id), Some(user_id)) =
            (ev.text.as_deref(), ev.chat_id, ev.user_id)
        else {
            return Ok(HandleOutcome::Dropped);
        };
        let mut text = raw_text.trim().to_string();
        if text.is_empty() {
            return Ok(HandleOutcome::Dropped);
        }

        let is_group = ev.chat_kind.is_group();
        let handle = &self.settings.bot_username;

        if is_group
            && self.settings.require_mention
            && !is_mentioned(raw_text, &ev.entities, handle)
        {
            debug!(chat_id = chat_id.0, "group message without mention, ignoring");
            return Ok(HandleOutcome::Ignored);
        }

        let allowed = authorize(
            self.settings.policy,
            user_id,
            &self.settings.allowlist,
            &self.state,
        )?;
        if !allowed {
            self.log.blocked(user_id, chat_id)?;
            if !is_group {
                best_effort(
                    "rejection notice",
                    self.messenger.send_text(chat_id, REJECTION_NOTICE),
                )
                .await;
            }
            return Ok(HandleOutcome::Blocked);
        }

        if is_group {
            text = strip_mention(&text, handle);
            if text.is_empty() {
                return Ok(HandleOutcome::Empty);
            }
        }

        self.log.message(Direction::In, user_id, chat_id, &text)?;
        debug!(user_id = user_id.0, prompt = %truncate_text(&text, 80), "asking assistant");

        if self.settings.typing_indicator {
            best_effort(
                "typing indicator",
                self.messenger.send_chat_action(chat_id, ChatAction::Typing),
            )
            .await;
        }

        let reply = self.assistant.ask(&text).await;

        self.log.message(Direction::Out, user_id, chat_id, &reply)?;

        if let Err(e) = self.messenger.send_text(chat_id, &reply).await {
            error!(chat_id = chat_id.0, error = %e, "failed to send reply");
        }

        Ok(HandleOutcome::Answered)
    }

    /// Configured allow-list plus the paired owner (if not already listed).
    ///
    /// Entries that are not numeric identities come back in the second list.
    pub fn recipients(&self) -> (Vec<UserId>, Vec<String>) {
        let mut ids: Vec<UserId> = Vec::new();
        let mut invalid = Vec::new();
        for entry in self.settings.allowlist.entries() {
            match entry.parse::<i64>() {
                Ok(id) if !ids.contains(&UserId(id)) => ids.push(UserId(id)),
                Ok(_) => {}
                Err(_) => invalid.push(entry.clone()),
            }
        }
        if let Some(owner) = self.state.owner() {
            if !ids.contains(&owner) {
                ids.push(owner);
            }
        }
        (ids, invalid)
    }

    /// Send `text` to every recipient. Failures are independent and reported.
    pub async fn notify_all(&self, text: &str) -> FanOutReport {
        let (ids, invalid) = self.recipients();
        let mut report = FanOutReport::default();

        for entry in invalid {
            warn!(recipient = %entry, "notify skipped: not a numeric user id");
            report
                .failed
                .push((entry, "not a numeric user id".to_string()));
        }

        for id in ids {
            match self.messenger.send_text(ChatId::from(id), text).await {
                Ok(()) => report.delivered.push(id),
                Err(e) => {
                    error!(user_id = id.0, error = %e, "notify failed");
                    report.failed.push((id.to_string(), e.to_string()));
                }
            }
        }

        report
    }
}

#[async_trait]
impl NotifySink for MessageRouter {
    async fn deliver(&self, text: String) -> Result<()> {
        let report = self.notify_all(&text).await;
        info!(
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "notification fanned out"
        );
        Ok(())
    }
}

/// True when an `@handle` mention annotation (case-insensitive) covers the
/// bot's handle.
pub fn is_mentioned(text: &str, entities: &[MessageEntity], handle: &str) -> bool {
    if handle.is_empty() {
        return false;
    }
    let wanted = format!("@{}", handle.to_lowercase());
    entities
        .iter()
        .filter(|e| e.kind == EntityKind::Mention)
        .filter_map(|e| e.span(text))
        .any(|span| span.to_lowercase() == wanted)
}

/// Remove every literal `@handle` and trim.
pub fn strip_mention(text: &str, handle: &str) -> String {
    if handle.is_empty() {
        return text.trim().to_string();
    }
    text.replace(&format!("@{handle}"), "").trim().to_string()
}

/// Await a best-effort operation, logging (not propagating) its failure.
pub async fn best_effort<F>(what: &str, fut: F)
where
    F: Future<Output = Result<()>>,
{
    if let Err(e) = fut.await {
        warn!(error = %e, "{what} failed (ignored)");
    }
}
