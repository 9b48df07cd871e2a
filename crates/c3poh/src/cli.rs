use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// C3Poh: Telegram bridge for the Claude CLI.
#[derive(Parser, Debug)]
#[command(name = "c3poh", version, about)]
#[command(after_help = "examples:
  c3poh init
  TELEGRAM_BOT_TOKEN=your_token c3poh start
  c3poh test --send-to 123456789
  c3poh status")]
pub struct Cli {
    /// Path to a config JSON file
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Verbose logging (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Interactive first-time setup (start here)
    Init,
    /// Start the bot (Telegram polling + notify listener)
    Start,
    /// Test the Telegram connection
    Test {
        /// Send a test message to this Telegram user ID
        #[arg(long, value_name = "USER_ID")]
        send_to: Option<String>,
    },
    /// Show the current configuration
    Status,
}
