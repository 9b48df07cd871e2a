//! Scratch directories for unit tests.

use std::{
    fs,
    ops::Deref,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::state::StateStore;

static SEQ: AtomicUsize = AtomicUsize::new(0);

/// A per-test directory under `/tmp`, removed with everything in it on drop.
///
/// The directory itself is not created, so code under test still has to
/// create missing parents.
pub(crate) struct TmpDir(PathBuf);

impl TmpDir {
    pub(crate) fn new(prefix: &str) -> Self {
        let n = SEQ.fetch_add(1, Ordering::SeqCst);
        let dir = PathBuf::from(format!("/tmp/c3poh-{prefix}-{}-{n}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        Self(dir)
    }

    pub(crate) fn path(&self) -> &Path {
        &self.0
    }

    pub(crate) fn join(&self, name: &str) -> PathBuf {
        self.0.join(name)
    }
}

impl Drop for TmpDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

/// A `StateStore` whose directory goes away with it.
pub(crate) struct TmpState {
    store: StateStore,
    _dir: TmpDir,
}

impl Deref for TmpState {
    type Target = StateStore;

    fn deref(&self) -> &StateStore {
        &self.store
    }
}

pub(crate) fn tmp_state(prefix: &str) -> TmpState {
    let dir = TmpDir::new(prefix);
    let store = StateStore::open(dir.join("state.json")).unwrap();
    TmpState { store, _dir: dir }
}

#[test]
fn tmp_dir_is_removed_on_drop() {
    let dir = TmpDir::new("scratch");
    let path = dir.path().to_path_buf();
    fs::create_dir_all(path.join("nested")).unwrap();
    fs::write(path.join("nested/file"), "x").unwrap();
    drop(dir);
    assert!(!path.exists());
}

#[test]
fn tmp_state_cleans_up_its_file() {
    let state = tmp_state("scratch-state");
    state.claim_or_match(crate::domain::UserId(1)).unwrap();
    let dir = state.path().parent().unwrap().to_path_buf();
    assert!(state.path().is_file());
    drop(state);
    assert!(!dir.exists());
}
