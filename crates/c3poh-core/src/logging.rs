use tracing_subscriber::{fmt, EnvFilter};

use crate::{errors::Error, Result};

/// Initialize the operator log stream (stderr).
///
/// `verbosity` raises the default level for the workspace crates
/// (0 = info, 1 = debug, 2+ = trace). `RUST_LOG` always wins.
pub fn init(service_name: &str, verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,{service_name}={level},c3poh_core={level},c3poh_telegram={level},c3poh_notify={level},c3poh_claude_cli={level}"
        ))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| Error::External(format!("logging init failed: {e}")))
}
