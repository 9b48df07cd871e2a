//! Interactive first-run setup (`c3poh init`).

use std::io::{BufRead, Write};

use c3poh_core::{access::DmPolicy, config::Config, errors::Error, Result};

/// What the wizard collected. The token is kept apart from the config
/// because it is never written to disk.
#[derive(Debug)]
pub struct SetupAnswers {
    pub token: String,
    pub config: Config,
}

pub fn run_wizard(input: &mut impl BufRead, out: &mut impl Write) -> Result<SetupAnswers> {
    writeln!(out, "\nC3Poh setup: Telegram bridge for the Claude CLI\n")?;
    writeln!(
        out,
        "You'll need a Telegram bot token. Get one from @BotFather on Telegram."
    )?;
    writeln!(out, "  1. Open Telegram, search @BotFather")?;
    writeln!(out, "  2. Send /newbot, follow prompts")?;
    writeln!(out, "  3. Copy the token (looks like: 123456789:ABCdef...)\n")?;

    let token = prompt(input, out, "Telegram bot token: ")?;
    if token.is_empty() {
        return Err(Error::Config("Token is required.".to_string()));
    }

    writeln!(out, "\nDM policy (who can message the bot):")?;
    writeln!(out, "  allowlist  - only your Telegram user ID (recommended)")?;
    writeln!(out, "  pairing    - first person to message the bot becomes owner")?;
    writeln!(out, "  open       - anyone (⚠️ dangerous)")?;
    writeln!(out, "  disabled   - nobody\n")?;

    let answer = prompt(input, out, "DM policy [allowlist]: ")?.to_lowercase();
    let policy = if answer.is_empty() {
        DmPolicy::Allowlist
    } else {
        answer.parse::<DmPolicy>().unwrap_or_else(|_| {
            let _ = writeln!(out, "Unknown policy '{answer}', using 'allowlist'.");
            DmPolicy::Allowlist
        })
    };

    let mut allow_from = Vec::new();
    if policy == DmPolicy::Allowlist {
        writeln!(out, "\nYour numeric Telegram user ID:")?;
        writeln!(out, "  Get it by messaging @userinfobot on Telegram")?;
        let uid = prompt(input, out, "Your Telegram user ID: ")?;
        if uid.is_empty() {
            writeln!(
                out,
                "⚠️  No user ID provided. Add it later in the config file: allow_from"
            )?;
        } else {
            allow_from.push(uid);
        }
    }

    Ok(SetupAnswers {
        token: token.clone(),
        config: Config {
            telegram_bot_token: token,
            dm_policy: policy.as_str().to_string(),
            allow_from,
            ..Config::default()
        },
    })
}

fn prompt(input: &mut impl BufRead, out: &mut impl Write, label: &str) -> Result<String> {
    write!(out, "{label}")?;
    out.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn run(script: &str) -> (Result<SetupAnswers>, String) {
        let mut input = Cursor::new(script.as_bytes().to_vec());
        let mut out = Vec::new();
        let res = run_wizard(&mut input, &mut out);
        (res, String::from_utf8(out).unwrap())
    }

    #[test]
    fn allowlist_with_user_id() {
        let (res, _) = run("123:abc\n\n 555 \n");
        let answers = res.unwrap();
        assert_eq!(answers.token, "123:abc");
        assert_eq!(answers.config.dm_policy, "allowlist");
        assert_eq!(answers.config.allow_from, vec!["555".to_string()]);
    }

    #[test]
    fn pairing_skips_user_id_prompt() {
        let (res, out) = run("123:abc\nPairing\n");
        let answers = res.unwrap();
        assert_eq!(answers.config.dm_policy, "pairing");
        assert!(answers.config.allow_from.is_empty());
        assert!(!out.contains("Your Telegram user ID"));
    }

    #[test]
    fn unknown_policy_falls_back_to_allowlist() {
        let (res, out) = run("123:abc\nfriends\n\n");
        let answers = res.unwrap();
        assert_eq!(answers.config.dm_policy, "allowlist");
        assert!(out.contains("Unknown policy 'friends'"));
        assert!(out.contains("No user ID provided"));
    }

    #[test]
    fn empty_token_is_an_error() {
        let (res, _) = run("\n");
        assert!(matches!(res, Err(Error::Config(_))));
    }

    #[test]
    fn saved_config_never_contains_the_token() {
        let (res, _) = run("123:secret\n\n7\n");
        let answers = res.unwrap();
        let dir = std::env::temp_dir().join(format!("c3poh-setup-{}", std::process::id()));
        let path = answers.config.save(Some(&dir.join("config.json"))).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("123:secret"));
        assert!(raw.contains("\"allow_from\""));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
