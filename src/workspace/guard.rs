use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex};

use log::debug;

use crate::error::{ReconError, Result};

/// Roots with a run in flight, keyed by canonical path
static ACTIVE_ROOTS: LazyLock<Mutex<HashSet<PathBuf>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

/// Exclusive claim on a workspace root for the duration of one run.
///
/// Released when dropped.
#[derive(Debug)]
pub struct WorkspaceGuard {
    root: PathBuf,
}

impl WorkspaceGuard {
    /// Creates `root` if needed so that every spelling of it resolves to one key
    pub fn acquire(root: &Path) -> Result<Self> {
        if let Err(e) = fs::create_dir_all(root) {
            debug!("Could not create {} before claiming it: {}", root.display(), e);
        }
        let key = match fs::canonicalize(root) {
            Ok(key) => key,
            Err(_) => std::path::absolute(root)?,
        };

        let mut active = ACTIVE_ROOTS
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if !active.insert(key.clone()) {
            return Err(ReconError::WorkspaceBusy(key));
        }

        debug!("🔒 Claimed workspace {}", key.display());
        Ok(Self { root: key })
    }
}

impl Drop for WorkspaceGuard {
    fn drop(&mut self) {
        let mut active = ACTIVE_ROOTS
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        active.remove(&self.root);
        debug!("🔓 Released workspace {}", self.root.display());
    }
}
