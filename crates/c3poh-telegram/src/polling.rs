use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use c3poh_core::{messaging::types::InboundEvent, routing::MessageRouter, Result};

/// Server-side wait for each `getUpdates` call.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(20);
/// Pause after a failed poll before trying again.
pub const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// One update as seen by the polling loop.
#[derive(Clone, Debug)]
pub struct PolledUpdate {
    pub update_id: i64,
    /// `None` for update kinds the router does not handle.
    pub event: Option<InboundEvent>,
}

/// Where updates come from (the Telegram gateway in production).
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn poll(&self, offset: i64, timeout: Duration) -> Result<Vec<PolledUpdate>>;
}

#[derive(Clone, Copy, Debug)]
pub struct PollSettings {
    pub poll_timeout: Duration,
    pub error_backoff: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            poll_timeout: POLL_TIMEOUT,
            error_backoff: ERROR_BACKOFF,
        }
    }
}

/// Long-poll `source` and hand every event to `router`, one at a time.
///
/// The offset only moves forward. Handler errors are logged and never stop
/// the loop; poll errors back off before retrying. Returns as soon as
/// `shutdown` is cancelled, even in the middle of handling an update.
pub async fn run_polling(
    source: &dyn UpdateSource,
    router: &MessageRouter,
    settings: PollSettings,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let mut offset: i64 = 0;
    info!("polling for updates");

    'poll: loop {
        let polled = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            res = source.poll(offset, settings.poll_timeout) => res,
        };

        match polled {
            Ok(batch) => {
                for update in batch {
                    offset = offset.max(update.update_id + 1);
                    let Some(ev) = update.event else {
                        continue;
                    };
                    // Dropping the handler aborts an in-flight assistant run.
                    let handled = tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => {
                            warn!(
                                update_id = update.update_id,
                                "interrupted while handling update"
                            );
                            break 'poll;
                        }
                        res = router.handle_event(&ev) => res,
                    };
                    if let Err(e) = handled {
                        error!(update_id = update.update_id, error = %e, "handler error");
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "poll error");
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(settings.error_backoff) => {}
                }
            }
        }
    }

    info!("polling stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::VecDeque,
        path::PathBuf,
        sync::{Arc, Mutex},
    };

    use c3poh_core::{
        access::{Allowlist, DmPolicy},
        domain::{ChatId, UserId},
        errors::{Error, GatewayError},
        message_log::MessageLog,
        messaging::{
            port::MessagingPort,
            types::{ChatAction, ChatKind},
        },
        ports::Assistant,
        routing::RouterSettings,
        state::StateStore,
    };

    enum Step {
        Batch(Vec<PolledUpdate>),
        Fail,
    }

    struct ScriptedSource {
        steps: Mutex<VecDeque<Step>>,
        offsets: Mutex<Vec<i64>>,
        shutdown: CancellationToken,
    }

    #[async_trait]
    impl UpdateSource for ScriptedSource {
        async fn poll(&self, offset: i64, _timeout: Duration) -> Result<Vec<PolledUpdate>> {
            self.offsets.lock().unwrap().push(offset);
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Batch(b)) => Ok(b),
                Some(Step::Fail) => Err(Error::Gateway(GatewayError::Transport(
                    "connection refused".to_string(),
                ))),
                None => {
                    self.shutdown.cancel();
                    std::future::pending().await
                }
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(i64, String)>>,
    }

    #[async_trait]
    impl MessagingPort for Recorder {
        async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()> {
            self.sent.lock().unwrap().push((chat_id.0, text.to_string()));
            Ok(())
        }

        async fn send_chat_action(&self, _chat_id: ChatId, _action: ChatAction) -> Result<()> {
            Ok(())
        }
    }

    struct Echo;

    #[async_trait]
    impl Assistant for Echo {
        async fn ask(&self, prompt: &str) -> String {
            format!("echo: {prompt}")
        }
    }

    fn update(id: i64, user: i64, text: &str) -> PolledUpdate {
        PolledUpdate {
            update_id: id,
            event: Some(InboundEvent {
                update_id: id,
                user_id: Some(UserId(user)),
                chat_id: Some(ChatId(user)),
                chat_kind: ChatKind::Private,
                text: Some(text.to_string()),
                entities: Vec::new(),
            }),
        }
    }

    #[tokio::test]
    async fn processes_batches_in_order_and_advances_offset() {
        let dir = PathBuf::from(format!("/tmp/c3poh-poll-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        let recorder = Arc::new(Recorder::default());
        let router = MessageRouter::new(
            RouterSettings {
                policy: DmPolicy::Allowlist,
                allowlist: Allowlist::new(["1"]),
                require_mention: true,
                typing_indicator: false,
                bot_username: "c3poh_bot".to_string(),
            },
            Arc::new(StateStore::open(dir.join("state.json")).unwrap()),
            Arc::new(MessageLog::new(dir.join("c3poh.log"), false)),
            recorder.clone(),
            Arc::new(Echo),
        );

        let shutdown = CancellationToken::new();
        let source = ScriptedSource {
            steps: Mutex::new(VecDeque::from(vec![
                Step::Batch(vec![update(5, 1, "first"), update(6, 2, "stranger")]),
                Step::Fail,
                Step::Batch(vec![
                    PolledUpdate {
                        update_id: 7,
                        event: None,
                    },
                    update(8, 1, "second"),
                ]),
            ])),
            offsets: Mutex::new(Vec::new()),
            shutdown: shutdown.clone(),
        };

        run_polling(
            &source,
            &router,
            PollSettings {
                poll_timeout: Duration::from_millis(10),
                error_backoff: Duration::from_millis(10),
            },
            shutdown,
        )
        .await
        .unwrap();

        assert_eq!(*source.offsets.lock().unwrap(), vec![0, 7, 7, 9]);
        let sent = recorder.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0], (1, "echo: first".to_string()));
        assert_eq!(sent[1].0, 2);
        assert_eq!(sent[2], (1, "echo: second".to_string()));
        let _ = std::fs::remove_dir_all(&dir);
    }

    struct Slow;

    #[async_trait]
    impl Assistant for Slow {
        async fn ask(&self, _prompt: &str) -> String {
            tokio::time::sleep(Duration::from_secs(10)).await;
            "too late".to_string()
        }
    }

    #[tokio::test]
    async fn interrupt_during_a_reply_stops_the_loop() {
        let dir = PathBuf::from(format!("/tmp/c3poh-poll-slow-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        let recorder = Arc::new(Recorder::default());
        let router = MessageRouter::new(
            RouterSettings {
                policy: DmPolicy::Open,
                allowlist: Allowlist::default(),
                require_mention: true,
                typing_indicator: false,
                bot_username: "c3poh_bot".to_string(),
            },
            Arc::new(StateStore::open(dir.join("state.json")).unwrap()),
            Arc::new(MessageLog::new(dir.join("c3poh.log"), false)),
            recorder.clone(),
            Arc::new(Slow),
        );

        let shutdown = CancellationToken::new();
        let source = ScriptedSource {
            steps: Mutex::new(VecDeque::from(vec![Step::Batch(vec![update(1, 1, "hi")])])),
            offsets: Mutex::new(Vec::new()),
            shutdown: shutdown.clone(),
        };

        let interrupt = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            interrupt.cancel();
        });

        let started = std::time::Instant::now();
        run_polling(&source, &router, PollSettings::default(), shutdown)
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(recorder.sent.lock().unwrap().is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn cancelled_token_stops_immediately() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let source = ScriptedSource {
            steps: Mutex::new(VecDeque::new()),
            offsets: Mutex::new(Vec::new()),
            shutdown: shutdown.clone(),
        };
        let dir = PathBuf::from(format!("/tmp/c3poh-poll-cancel-{}", std::process::id()));
        let router = MessageRouter::new(
            RouterSettings {
                policy: DmPolicy::Open,
                allowlist: Allowlist::default(),
                require_mention: true,
                typing_indicator: false,
                bot_username: String::new(),
            },
            Arc::new(StateStore::open(dir.join("state.json")).unwrap()),
            Arc::new(MessageLog::new(dir.join("c3poh.log"), false)),
            Arc::new(Recorder::default()),
            Arc::new(Echo),
        );
        run_polling(&source, &router, PollSettings::default(), shutdown)
            .await
            .unwrap();
        assert!(source.offsets.lock().unwrap().is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
