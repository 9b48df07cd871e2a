use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::warn;

use crate::{
    domain::{ChatId, UserId},
    Result,
};

/// Which way a logged message travelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

/// One JSON line in the message log.
///
/// Only the text length is recorded, never the text itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum LogEvent {
    Message {
        direction: Direction,
        user_id: i64,
        chat_id: i64,
        text_length: usize,
    },
    Blocked {
        user_id: i64,
        chat_id: i64,
    },
}

#[derive(Serialize)]
struct LogLine<'a> {
    ts: String,
    #[serde(flatten)]
    event: &'a LogEvent,
}

/// Append-only JSON-lines log of messages and blocked attempts.
#[derive(Debug)]
pub struct MessageLog {
    path: PathBuf,
    enabled: bool,
    write_lock: Mutex<()>,
}

impl MessageLog {
    pub fn new(path: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            path: path.into(),
            enabled,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn message(
        &self,
        direction: Direction,
        user_id: UserId,
        chat_id: ChatId,
        text: &str,
    ) -> Result<()> {
        self.write(&LogEvent::Message {
            direction,
            user_id: user_id.0,
            chat_id: chat_id.0,
            text_length: text.chars().count(),
        })
    }

    /// Record a rejected sender. Also surfaces on the operator log.
    pub fn blocked(&self, user_id: UserId, chat_id: ChatId) -> Result<()> {
        warn!(user_id = user_id.0, chat_id = chat_id.0, "blocked unauthorized user");
        self.write(&LogEvent::Blocked {
            user_id: user_id.0,
            chat_id: chat_id.0,
        })
    }

    pub fn write(&self, event: &LogEvent) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let line = serde_json::to_string(&LogLine {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            event,
        })?;

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}
