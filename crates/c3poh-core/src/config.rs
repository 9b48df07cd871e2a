use std::{
    env, fs,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Deserializer, Serialize};

use crate::{access::DmPolicy, errors::Error, Result};

const LOCAL_CONFIG_FILE: &str = "c3poh.json";

/// Typed configuration, loaded once at startup and read-only afterwards.
///
/// The JSON file mirrors these fields one to one. Missing keys take the
/// defaults below and unknown keys are ignored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Telegram credentials (env preferred; never saved)
    pub telegram_bot_token: String,

    // Access control
    pub dm_policy: String,
    #[serde(deserialize_with = "de_id_list")]
    pub allow_from: Vec<String>,

    // Group chats
    pub require_mention: bool,

    // Notification listener (loopback only)
    pub notify_port: u16,
    pub notify_host: String,

    // Claude CLI
    pub claude_bin: String,
    pub claude_timeout_seconds: u64,

    // Message handling
    pub max_message_length: usize,
    pub typing_indicator: bool,

    // State + logs
    pub state_file: PathBuf,
    pub log_file: PathBuf,
    pub log_messages: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram_bot_token: String::new(),
            dm_policy: DmPolicy::Allowlist.as_str().to_string(),
            allow_from: Vec::new(),
            require_mention: true,
            notify_port: 7734,
            notify_host: "127.0.0.1".to_string(),
            claude_bin: "claude".to_string(),
            claude_timeout_seconds: 300,
            max_message_length: 4000,
            typing_indicator: true,
            state_file: PathBuf::from("~/.c3poh/state.json"),
            log_file: PathBuf::from("~/.c3poh/c3poh.log"),
            log_messages: true,
        }
    }
}

/// Outcome of [`Config::validate`]: errors block startup, warnings do not.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigIssue {
    Error(String),
    Warning(String),
}

impl ConfigIssue {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ConfigIssue::Error(_))
    }

    pub fn message(&self) -> &str {
        match self {
            ConfigIssue::Error(m) | ConfigIssue::Warning(m) => m,
        }
    }
}

impl Config {
    /// Load with the standard precedence: `explicit` → `./c3poh.json` →
    /// `~/.c3poh/config.json` → defaults, then the environment overlay.
    ///
    /// A `.env` file in the working directory is read first (without
    /// overriding variables that are already set).
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match dotenvy::from_path(".env") {
            Ok(()) => {}
            Err(e) if e.not_found() => {}
            Err(e) => return Err(Error::Config(format!("failed to read .env: {e}"))),
        }

        let mut search = Vec::new();
        if let Some(p) = explicit {
            search.push(expand_tilde(p));
        }
        search.push(PathBuf::from(LOCAL_CONFIG_FILE));
        if let Some(p) = default_config_path() {
            search.push(p);
        }

        Self::load_from(&search, |key| env::var(key).ok())
    }

    /// Load from the first existing file in `search`, then overlay `env`.
    pub fn load_from(search: &[PathBuf], env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = match search.iter().find(|p| p.is_file()) {
            Some(path) => {
                let raw = fs::read_to_string(path)?;
                serde_json::from_str::<Config>(&raw).map_err(|e| {
                    Error::Config(format!("failed to parse {}: {e}", path.display()))
                })?
            }
            None => Config::default(),
        };
        cfg.apply_env(env)?;
        Ok(cfg)
    }

    /// Environment overrides, applied regardless of what the file contained.
    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(token) = env("TELEGRAM_BOT_TOKEN").and_then(non_empty) {
            self.telegram_bot_token = token;
        }

        if let Some(list) = env("C3POH_ALLOW_FROM").and_then(non_empty) {
            self.allow_from = parse_csv(&list);
        }

        if let Some(policy) = env("C3POH_DM_POLICY") {
            self.dm_policy = policy.trim().to_string();
        }

        if let Some(port) = env("C3POH_NOTIFY_PORT") {
            self.notify_port = parse_env_number("C3POH_NOTIFY_PORT", &port)?;
        }

        if let Some(timeout) = env("C3POH_CLAUDE_TIMEOUT") {
            self.claude_timeout_seconds = parse_env_number("C3POH_CLAUDE_TIMEOUT", &timeout)?;
        }

        Ok(())
    }

    /// Write the config as pretty JSON to `path` (or `~/.c3poh/config.json`).
    ///
    /// The bot token is always written as an empty string.
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let target = match path {
            Some(p) => expand_tilde(p),
            None => default_config_path()
                .ok_or_else(|| Error::Config("HOME is not set".to_string()))?,
        };
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let scrubbed = Config {
            telegram_bot_token: String::new(),
            ..self.clone()
        };
        let mut json = serde_json::to_string_pretty(&scrubbed)?;
        json.push('\n');
        fs::write(&target, json)?;
        Ok(target)
    }

    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.telegram_bot_token.trim().is_empty() {
            issues.push(ConfigIssue::Error(
                "TELEGRAM_BOT_TOKEN is not set. Set it via env var or c3poh.json.".to_string(),
            ));
        }

        match self.policy() {
            Ok(DmPolicy::Allowlist) if self.allow_from.is_empty() => {
                issues.push(ConfigIssue::Error(
                    "dm_policy is 'allowlist' but allow_from is empty. \
                     Add your Telegram numeric user ID to allow_from, or change dm_policy."
                        .to_string(),
                ));
            }
            Ok(DmPolicy::Open) => {
                issues.push(ConfigIssue::Warning(
                    "dm_policy is 'open': anyone with your bot link can send commands. \
                     This is fine for demos, dangerous for anything real."
                        .to_string(),
                ));
            }
            Ok(_) => {}
            Err(e) => issues.push(ConfigIssue::Error(e.to_string())),
        }

        if self.max_message_length == 0 {
            issues.push(ConfigIssue::Error(
                "max_message_length must be greater than zero".to_string(),
            ));
        }
        if self.claude_timeout_seconds == 0 {
            issues.push(ConfigIssue::Error(
                "claude_timeout_seconds must be greater than zero".to_string(),
            ));
        }
        if let Err(e) = self.notify_addr() {
            issues.push(ConfigIssue::Error(e.to_string()));
        }

        issues
    }

    /// The parsed DM policy; unknown names are a config error.
    pub fn policy(&self) -> Result<DmPolicy> {
        self.dm_policy.parse()
    }

    /// Listener bind address. Only loopback hosts are accepted.
    pub fn notify_addr(&self) -> Result<SocketAddr> {
        let host = self.notify_host.trim();
        let ip = if host.eq_ignore_ascii_case("localhost") {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            host.parse::<IpAddr>().map_err(|_| {
                Error::Config(format!("notify_host '{host}' is not an IP address"))
            })?
        };
        if !ip.is_loopback() {
            return Err(Error::Config(format!(
                "notify_host must be a loopback address (got {ip}); the listener is never exposed publicly"
            )));
        }
        Ok(SocketAddr::new(ip, self.notify_port))
    }

    pub fn claude_timeout(&self) -> Duration {
        Duration::from_secs(self.claude_timeout_seconds)
    }

    pub fn state_path(&self) -> PathBuf {
        expand_tilde(&self.state_file)
    }

    pub fn log_path(&self) -> PathBuf {
        expand_tilde(&self.log_file)
    }

    pub fn token_set(&self) -> bool {
        !self.telegram_bot_token.trim().is_empty()
    }
}

/// `~/.c3poh/config.json`, if `$HOME` is known.
pub fn default_config_path() -> Option<PathBuf> {
    home_dir().map(|h| h.join(".c3poh").join("config.json"))
}

/// Expand a leading `~` to `$HOME`.
pub fn expand_tilde(p: &Path) -> PathBuf {
    let Some(home) = home_dir() else {
        return p.to_path_buf();
    };
    match p.strip_prefix("~") {
        Ok(rest) => home.join(rest),
        Err(_) => p.to_path_buf(),
    }
}

fn de_id_list<'de, D>(d: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    // Hand-edited files mix numbers and strings; keep one canonical form.
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i64),
        Text(String),
    }

    let raw = Option::<Vec<RawId>>::deserialize(d)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .map(|id| match id {
            RawId::Number(n) => n.to_string(),
            RawId::Text(s) => s.trim().to_string(),
        })
        .filter(|s| !s.is_empty())
        .collect())
}

fn parse_env_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| Error::Config(format!("{key} must be a number (got '{raw}')")))
}

fn parse_csv(v: &str) -> Vec<String> {
    v.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME").map(PathBuf::from)
}
