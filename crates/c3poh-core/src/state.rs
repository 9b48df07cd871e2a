use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use serde_json::{Map, Value};

use crate::{domain::UserId, errors::Error, Result};

const OWNER_KEY: &str = "owner_user_id";

/// Result of a pairing check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PairingClaim {
    pub accepted: bool,
    /// True only for the call that set the owner.
    pub newly_paired: bool,
}

/// Persistent runtime state (currently only the paired owner).
///
/// The file is read once on open and rewritten whole on every mutation.
/// Unknown keys are kept. Only one process is expected to own the file.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    data: Mutex<Map<String, Value>>,
}

impl StateStore {
    /// Open (or lazily create) the state file. A missing or unreadable file
    /// starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let data = load_state_file(&path);
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The paired owner, if any.
    pub fn owner(&self) -> Option<UserId> {
        read_owner(&self.lock())
    }

    /// Accept `user` if it is the owner; if there is no owner yet, make it the
    /// owner and accept. An existing owner is never overwritten.
    pub fn claim_or_match(&self, user: UserId) -> Result<PairingClaim> {
        let mut data = self.lock();
        if let Some(owner) = read_owner(&data) {
            return Ok(PairingClaim {
                accepted: owner == user,
                newly_paired: false,
            });
        }

        data.insert(OWNER_KEY.to_string(), Value::from(user.0));
        if let Err(e) = save_state_file(&self.path, &data) {
            data.remove(OWNER_KEY);
            return Err(e);
        }
        Ok(PairingClaim {
            accepted: true,
            newly_paired: true,
        })
    }

    /// Forget the paired owner so the next sender can pair again.
    pub fn clear_owner(&self) -> Result<()> {
        let mut data = self.lock();
        data.remove(OWNER_KEY);
        save_state_file(&self.path, &data)
    }

    fn lock(&self) -> MutexGuard<'_, Map<String, Value>> {
        // The map is always left consistent, so a poisoned lock is still usable.
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn read_owner(data: &Map<String, Value>) -> Option<UserId> {
    match data.get(OWNER_KEY)? {
        Value::Number(n) => n.as_i64().map(UserId),
        Value::String(s) => s.trim().parse::<i64>().ok().map(UserId),
        _ => None,
    }
}

fn load_state_file(path: &Path) -> Map<String, Value> {
    let Ok(txt) = fs::read_to_string(path) else {
        return Map::new();
    };
    match serde_json::from_str::<Value>(&txt) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

fn save_state_file(path: &Path, data: &Map<String, Value>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)?;
    fs::write(path, json).map_err(|e| Error::InvalidPath {
        path: path.to_path_buf(),
        reason: format!("failed to write state: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{tmp_state, TmpDir};
    use std::sync::Arc;

    #[test]
    fn starts_empty_and_creates_parent() {
        let state = tmp_state("state-empty");
        assert_eq!(state.owner(), None);
        assert!(state.path().parent().unwrap().is_dir());
        assert!(!state.path().exists());
    }

    #[test]
    fn owner_is_set_once() {
        let state = tmp_state("state-once");
        let first = state.claim_or_match(UserId(42)).unwrap();
        assert_eq!(
            first,
            PairingClaim {
                accepted: true,
                newly_paired: true
            }
        );
        let second = state.claim_or_match(UserId(99)).unwrap();
        assert!(!second.accepted);
        assert!(!second.newly_paired);
        assert_eq!(state.owner(), Some(UserId(42)));

        let raw: Value = serde_json::from_str(&fs::read_to_string(state.path()).unwrap()).unwrap();
        assert_eq!(raw["owner_user_id"], 42);
    }

    #[test]
    fn clear_owner_allows_repairing() {
        let state = tmp_state("state-clear");
        state.claim_or_match(UserId(1)).unwrap();
        state.clear_owner().unwrap();
        assert_eq!(state.owner(), None);
        assert!(StateStore::open(state.path()).unwrap().owner().is_none());
        assert!(state.claim_or_match(UserId(2)).unwrap().newly_paired);
        assert_eq!(state.owner(), Some(UserId(2)));
    }

    #[test]
    fn corrupt_file_is_treated_as_empty() {
        let dir = TmpDir::new("state-corrupt");
        let path = dir.join("state.json");
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(&path, "{not json").unwrap();
        let state = StateStore::open(&path).unwrap();
        assert_eq!(state.owner(), None);
    }

    #[test]
    fn unknown_keys_are_preserved() {
        let dir = TmpDir::new("state-keys");
        let path = dir.join("state.json");
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(&path, r#"{"note": "keep me"}"#).unwrap();
        let state = StateStore::open(&path).unwrap();
        state.claim_or_match(UserId(7)).unwrap();

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["note"], "keep me");
        assert_eq!(raw["owner_user_id"], 7);
    }

    #[test]
    fn concurrent_claims_pair_exactly_one_owner() {
        let state = Arc::new(tmp_state("state-race"));
        let handles: Vec<_> = (1..=8)
            .map(|id| {
                let state = state.clone();
                std::thread::spawn(move || state.claim_or_match(UserId(id)).unwrap())
            })
            .collect();
        let claims: Vec<PairingClaim> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(claims.iter().filter(|c| c.newly_paired).count(), 1);
        assert_eq!(claims.iter().filter(|c| c.accepted).count(), 1);
        assert!(state.owner().is_some());
    }
}
