use std::{collections::HashSet, fmt, str::FromStr};

use tracing::info;

use crate::{domain::UserId, errors::Error, state::StateStore, Result};

/// Who may talk to the bot. Exactly one policy is active at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DmPolicy {
    /// Only identities in `allow_from`.
    Allowlist,
    /// The first identity ever seen becomes the sole, persisted owner.
    Pairing,
    /// Anyone.
    Open,
    /// No one.
    Disabled,
}

impl DmPolicy {
    pub const ALL: [DmPolicy; 4] = [
        DmPolicy::Allowlist,
        DmPolicy::Pairing,
        DmPolicy::Open,
        DmPolicy::Disabled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DmPolicy::Allowlist => "allowlist",
            DmPolicy::Pairing => "pairing",
            DmPolicy::Open => "open",
            DmPolicy::Disabled => "disabled",
        }
    }
}

impl fmt::Display for DmPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DmPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        DmPolicy::ALL
            .into_iter()
            .find(|p| p.as_str() == name)
            .ok_or_else(|| {
                let names = DmPolicy::ALL.map(|p| p.as_str()).join(", ");
                Error::Config(format!(
                    "dm_policy must be one of: {names} (got '{name}')"
                ))
            })
    }
}

/// Configured identities, compared as trimmed strings.
///
/// String comparison keeps hand-edited lists working when entries carry
/// stray whitespace or leading zeros that a numeric parse would change.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Allowlist {
    ids: Vec<String>,
    lookup: HashSet<String>,
}

impl Allowlist {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Self::default();
        for id in ids {
            let id = id.as_ref().trim();
            if id.is_empty() || !out.lookup.insert(id.to_string()) {
                continue;
            }
            out.ids.push(id.to_string());
        }
        out
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.lookup.contains(&user.to_string())
    }

    /// Entries in configured order, duplicates removed.
    pub fn entries(&self) -> &[String] {
        &self.ids
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Authorization decision for one sender.
///
/// Pure for every policy except `pairing` with no owner yet, where the sender
/// is persisted as owner and accepted. The check-then-set runs under the state
/// store's lock, so concurrent callers cannot both become owner.
pub fn authorize(
    policy: DmPolicy,
    sender: UserId,
    allowlist: &Allowlist,
    state: &StateStore,
) -> Result<bool> {
    match policy {
        DmPolicy::Disabled => Ok(false),
        DmPolicy::Open => Ok(true),
        DmPolicy::Allowlist => Ok(allowlist.contains(sender)),
        DmPolicy::Pairing => {
            let claim = state.claim_or_match(sender)?;
            if claim.newly_paired {
                info!(user_id = sender.0, "paired new owner");
            }
            Ok(claim.accepted)
        }
    }
}
