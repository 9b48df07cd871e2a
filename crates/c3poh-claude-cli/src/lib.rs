//! Claude CLI adapter.
//!
//! Runs `claude --print <prompt>` as a one-shot subprocess with a hard
//! wall-clock timeout and maps every outcome to a reply string.

use std::{
    env, fs,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Command,
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, warn};

use c3poh_core::{config::Config, errors::Error, ports::Assistant, Result};

pub const NOT_FOUND_REPLY: &str =
    "❌ claude CLI not found.\nInstall Claude Code: https://claude.ai/code";
pub const NO_OUTPUT_REPLY: &str = "_(no output)_";

#[derive(Clone, Debug)]
pub struct ClaudeCliConfig {
    /// Binary name (searched on `PATH`) or path.
    pub claude_bin: String,
    pub timeout: Duration,
}

impl ClaudeCliConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            claude_bin: cfg.claude_bin.clone(),
            timeout: cfg.claude_timeout(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ClaudeCliClient {
    cfg: ClaudeCliConfig,
}

/// Raw result of one run that finished before the timeout.
#[derive(Debug)]
struct Finished {
    stdout: String,
    stderr: String,
}

enum RunOutcome {
    Finished(Finished),
    TimedOut,
}

impl ClaudeCliClient {
    pub fn new(cfg: ClaudeCliConfig) -> Self {
        Self { cfg }
    }

    /// Resolved path of the configured binary, if it exists and is executable.
    pub fn resolve(&self) -> Option<PathBuf> {
        resolve_binary(&self.cfg.claude_bin)
    }

    async fn run(&self, program: &Path, prompt: &str) -> Result<RunOutcome> {
        let mut cmd = Command::new(program);
        cmd.arg("--print")
            .arg(prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so everything the CLI spawns can be killed together.
        #[cfg(unix)]
        cmd.process_group(0);

        let deadline = Instant::now() + self.cfg.timeout;
        let mut child = cmd.spawn()?;
        let mut group = ProcessGroupGuard::new(child.id());

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::External("claude stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::External("claude stderr was not captured".to_string()))?;

        // Drain both pipes in the background so a chatty child never blocks.
        let mut stdout_task = drain(stdout);
        let mut stderr_task = drain(stderr);

        // The deadline covers exit and the pipes closing: a descendant that
        // keeps stdout open counts against the same budget.
        let finished = tokio::time::timeout_at(deadline, async {
            let status = child.wait().await?;
            let stdout = join_drain(&mut stdout_task).await;
            let stderr = join_drain(&mut stderr_task).await;
            Ok::<_, std::io::Error>((status, stdout, stderr))
        })
        .await;

        match finished {
            Ok(res) => {
                let (status, stdout, stderr) = res?;
                group.disarm();
                debug!(%status, "claude exited");
                Ok(RunOutcome::Finished(Finished { stdout, stderr }))
            }
            Err(_) => {
                stdout_task.abort();
                stderr_task.abort();
                group.kill();
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "claude process already gone");
                }
                Ok(RunOutcome::TimedOut)
            }
        }
    }

    fn timeout_reply(&self) -> String {
        format!("⏱️ Claude timed out after {}s.", self.cfg.timeout.as_secs())
    }
}

#[async_trait]
impl Assistant for ClaudeCliClient {
    async fn ask(&self, prompt: &str) -> String {
        let Some(program) = self.resolve() else {
            warn!(bin = %self.cfg.claude_bin, "claude binary not found");
            return NOT_FOUND_REPLY.to_string();
        };

        match self.run(&program, prompt).await {
            Ok(RunOutcome::Finished(out)) => reply_from_output(&out.stdout, &out.stderr),
            Ok(RunOutcome::TimedOut) => {
                warn!(timeout_secs = self.cfg.timeout.as_secs(), "claude timed out");
                self.timeout_reply()
            }
            Err(e) => {
                warn!(error = %e, "claude invocation failed");
                format!("❌ Error invoking Claude: {e}")
            }
        }
    }
}

/// Map captured output to the user-facing reply.
fn reply_from_output(stdout: &str, stderr: &str) -> String {
    let out = stdout.trim();
    let err = stderr.trim();
    if out.is_empty() && !err.is_empty() {
        return format!("❌ Claude error: {err}");
    }
    if out.is_empty() {
        return NO_OUTPUT_REPLY.to_string();
    }
    out.to_string()
}

fn drain<R>(mut reader: R) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf).await;
        String::from_utf8_lossy(&buf).into_owned()
    })
}

async fn join_drain(task: &mut JoinHandle<String>) -> String {
    task.await.unwrap_or_default()
}

/// Kills the child's process group when dropped, unless disarmed.
///
/// Dropping an in-flight `ask` (shutdown) or hitting the timeout must not
/// leave any of the CLI's descendants running.
struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_process_group(pgid);
        }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: killpg only sends a signal to the group created for the child.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(pgid, error = %std::io::Error::last_os_error(), "killpg failed");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

/// Resolve `bin` like a shell would: a value with a path separator is used
/// as-is, anything else is searched on `PATH`.
pub fn resolve_binary(bin: &str) -> Option<PathBuf> {
    let bin = bin.trim();
    if bin.is_empty() {
        return None;
    }
    if bin.contains(std::path::MAIN_SEPARATOR) || bin.contains('/') {
        let p = c3poh_core::config::expand_tilde(Path::new(bin));
        return is_executable_file(&p).then_some(p);
    }
    which_in_path(bin)
}

fn which_in_path(binary: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    for dir in env::split_paths(&path) {
        let candidate = dir.join(binary);
        if is_executable_file(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn is_executable_file(p: &Path) -> bool {
    if !p.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(md) = fs::metadata(p) {
            return (md.permissions().mode() & 0o111) != 0;
        }
    }
    true
}
