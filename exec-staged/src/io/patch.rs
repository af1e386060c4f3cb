//! Patch of unstaged changes, stored in the git directory for the duration of
//! a run.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, warn};

use crate::constants::PATCH_FILE_NAME;
use crate::core::status::StatusSnapshot;
use crate::error::{StageError, StageResult};
use crate::io::git::Git;

/// Location of the unstaged-changes patch inside `git_dir`.
pub fn patch_path(git_dir: &Path) -> PathBuf {
    git_dir.join(PATCH_FILE_NAME)
}

/// Write a binary-safe, zero-context patch of all unstaged changes except
/// deletions to the git directory.
///
/// Untracked files are temporarily registered in the index so the diff
/// records them as additions. Unregistering happens even when the diff fails.
/// Returns the path of the written patch.
#[instrument(skip_all)]
pub fn capture(git: &Git, git_dir: &Path, snapshot: &StatusSnapshot) -> StageResult<PathBuf> {
    let path = patch_path(git_dir);
    let untracked: Vec<&Path> = snapshot.untracked().collect();
    debug!(untracked = untracked.len(), path = %path.display(), "capturing unstaged patch");

    git.add_intent_to_add(&untracked)
        .map_err(|e| StageError::capture("failed to register untracked files", e))?;
    let diffed = git.diff_unstaged_to(&path);
    let unregistered = git.unstage(&untracked);

    diffed.map_err(|e| StageError::capture("failed to capture unstaged changes", e))?;
    unregistered.map_err(|e| StageError::capture("failed to unregister untracked files", e))?;

    Ok(path)
}

/// True if the patch is missing or has no content.
pub fn is_empty(path: &Path) -> io::Result<bool> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.len() == 0),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e),
    }
}

/// Delete the patch; a missing file is fine.
pub fn remove(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed patch");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            warn!(path = %path.display(), err = %e, "failed to remove patch");
            Err(e)
        }
    }
}
