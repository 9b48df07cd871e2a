//! C3Poh binary.
//!
//! ```bash
//! c3poh init
//! TELEGRAM_BOT_TOKEN=xxx c3poh start
//! ```

mod cli;
mod setup;

use std::{
    io::{self, Write},
    path::Path,
    process::ExitCode,
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use clap::{CommandFactory, Parser};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use c3poh_claude_cli::{ClaudeCliClient, ClaudeCliConfig};
use c3poh_core::{
    config::{default_config_path, Config, ConfigIssue},
    domain::ChatId,
    message_log::MessageLog,
    messaging::port::MessagingPort,
    routing::{MessageRouter, RouterSettings},
    state::StateStore,
};
use c3poh_telegram::{
    polling::{run_polling, PollSettings, POLL_TIMEOUT},
    TelegramGateway,
};

use crate::cli::{Cli, Command};

const TEST_MESSAGE: &str = "👋 C3Poh test message. If you received this, it's working!";
/// How long `start` waits for in-flight notify requests after polling stops.
const LISTENER_DRAIN: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = c3poh_core::logging::init("c3poh", cli.verbose) {
        eprintln!("{e}");
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "c3poh failed");
            eprintln!("❌ {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(ExitCode::SUCCESS);
    };

    let load = || Config::load(cli.config.as_deref()).context("failed to load config");
    match command {
        Command::Init => cmd_init(cli.config.as_deref()),
        Command::Start => cmd_start(load()?).await,
        Command::Test { send_to } => cmd_test(load()?, send_to.as_deref()).await,
        Command::Status => cmd_status(&load()?),
    }
}

fn cmd_init(config_path: Option<&Path>) -> anyhow::Result<ExitCode> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut out = io::stdout();

    let answers = match setup::run_wizard(&mut input, &mut out) {
        Ok(a) => a,
        Err(c3poh_core::Error::Config(msg)) => {
            println!("❌ {msg}");
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e.into()),
    };

    let saved = answers
        .config
        .save(config_path)
        .context("failed to save config")?;

    println!("\n[C3Poh] Config saved (token NOT saved to disk - use env var)");
    println!("[C3Poh] Config at: {}", saved.display());
    println!("\n[C3Poh] To start the bot, run:");
    println!("  TELEGRAM_BOT_TOKEN='{}' c3poh start", answers.token);
    println!("\nOr set the env var permanently:");
    println!(
        "  export TELEGRAM_BOT_TOKEN='{}'  # add to your shell profile",
        answers.token
    );
    println!("  c3poh start\n");
    out.flush()?;
    Ok(ExitCode::SUCCESS)
}

async fn cmd_start(cfg: Config) -> anyhow::Result<ExitCode> {
    if !report_issues(&cfg.validate()) {
        return Ok(ExitCode::FAILURE);
    }

    let gateway = Arc::new(TelegramGateway::new(
        &cfg.telegram_bot_token,
        cfg.max_message_length,
        POLL_TIMEOUT,
    )?);
    let me = match gateway.get_me().await {
        Ok(me) => me,
        Err(e) => {
            error!(error = %e, "identity check failed");
            println!("❌ Connection failed: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };
    info!(username = %me.username, policy = %cfg.dm_policy, "connected to Telegram");

    let state = Arc::new(StateStore::open(cfg.state_path()).context("failed to open state file")?);
    let log = Arc::new(MessageLog::new(cfg.log_path(), cfg.log_messages));
    let assistant = Arc::new(ClaudeCliClient::new(ClaudeCliConfig::from_config(&cfg)));
    if assistant.resolve().is_none() {
        warn!(bin = %cfg.claude_bin, "claude CLI not found; replies will say so");
    }

    let router = Arc::new(MessageRouter::new(
        RouterSettings::from_config(&cfg, me.username.clone())?,
        state,
        log,
        gateway.clone(),
        assistant,
    ));

    let shutdown = CancellationToken::new();
    let listener = c3poh_notify::bind(cfg.notify_addr()?)
        .await
        .context("failed to bind notification listener")?;
    let listener_task = tokio::spawn(c3poh_notify::serve_on(
        listener,
        router.clone(),
        shutdown.clone(),
    ));

    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for interrupt signal");
            return;
        }
        info!("interrupt received, shutting down (Ctrl+C again to force)");
        on_signal.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("second interrupt, exiting immediately");
            std::process::exit(130);
        }
    });

    println!("[C3Poh] Running as @{} (Ctrl+C to stop)", me.username);
    let polled = run_polling(
        gateway.as_ref(),
        &router,
        PollSettings::default(),
        shutdown.clone(),
    )
    .await;

    shutdown.cancel();
    match tokio::time::timeout(LISTENER_DRAIN, listener_task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => warn!(error = %e, "notification listener failed"),
        Ok(Err(e)) => warn!(error = %e, "notification listener task panicked"),
        Err(_) => warn!("notification listener did not stop in time"),
    }

    polled?;
    println!("[C3Poh] Stopped.");
    Ok(ExitCode::SUCCESS)
}

async fn cmd_test(cfg: Config, send_to: Option<&str>) -> anyhow::Result<ExitCode> {
    if !report_issues(&cfg.validate()) {
        return Ok(ExitCode::FAILURE);
    }

    let gateway = TelegramGateway::new(
        &cfg.telegram_bot_token,
        cfg.max_message_length,
        POLL_TIMEOUT,
    )?;
    match gateway.get_me().await {
        Ok(me) => println!("✓ Connected as @{} ({})", me.username, me.first_name),
        Err(e) => {
            println!("❌ Connection failed: {e}");
            return Ok(ExitCode::FAILURE);
        }
    }

    let Some(target) = send_to else {
        return Ok(ExitCode::SUCCESS);
    };
    let chat = match target.trim().parse::<i64>() {
        Ok(id) => ChatId(id),
        Err(_) => {
            println!("❌ Send failed: '{target}' is not a numeric user ID");
            return Ok(ExitCode::FAILURE);
        }
    };
    match gateway.send_text(chat, TEST_MESSAGE).await {
        Ok(()) => {
            println!("✓ Test message sent to {chat}");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("❌ Send failed: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn cmd_status(cfg: &Config) -> anyhow::Result<ExitCode> {
    let allow_from = if cfg.allow_from.is_empty() {
        "(none)".to_string()
    } else {
        cfg.allow_from.join(", ")
    };
    let state_path = cfg.state_path();
    let owner = if state_path.is_file() {
        StateStore::open(&state_path)?
            .owner()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "(none)".to_string())
    } else {
        "(none)".to_string()
    };

    println!("[C3Poh] DM policy:      {}", cfg.dm_policy);
    println!("[C3Poh] Allow from:     {allow_from}");
    println!("[C3Poh] Paired owner:   {owner}");
    println!("[C3Poh] Notify port:    {}:{}", cfg.notify_host, cfg.notify_port);
    println!("[C3Poh] Claude timeout: {}s", cfg.claude_timeout_seconds);
    println!(
        "[C3Poh] Token set:      {}",
        if cfg.token_set() {
            "yes"
        } else {
            "NO - set TELEGRAM_BOT_TOKEN"
        }
    );
    if let Some(path) = default_config_path() {
        println!("[C3Poh] Default config: {}", path.display());
    }

    let issues = cfg.validate();
    if !issues.is_empty() {
        println!();
        report_issues(&issues);
    }
    Ok(ExitCode::SUCCESS)
}

/// Print validation issues; returns `false` if any is fatal.
fn report_issues(issues: &[ConfigIssue]) -> bool {
    for issue in issues {
        match issue {
            ConfigIssue::Error(msg) => println!("❌ {msg}"),
            ConfigIssue::Warning(msg) => println!("⚠️  {msg}"),
        }
    }
    !issues.iter().any(ConfigIssue::is_fatal)
}
