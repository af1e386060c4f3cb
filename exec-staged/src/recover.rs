//! Recovery from a run that never reached `merge` or `revert`.
//!
//! Works purely from what is on disk: the backup stash, the marker commit,
//! merge status backups and the patch file. No state from the crashed process
//! is needed, so this runs both as the `recover` command and as the teardown
//! hook of an interrupted run.

use tracing::{debug, info, instrument};

use crate::constants::{BACKUP_STASH_MESSAGE, STAGED_CHANGES_COMMIT_MESSAGE};
use crate::error::{StageError, StageResult};
use crate::io::git::Git;
use crate::io::merge_status::MergeStatus;
use crate::io::patch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    NothingToRecover,
    Recovered,
}

/// Restore the repository to its state before the interrupted run.
///
/// With a backup stash, everything is reset to the original commit and the
/// stash is applied with its index. A lone marker commit is soft-reset away,
/// keeping its content staged. Merge status backups are then moved back and
/// the patch file is deleted.
pub fn recover(git: &Git) -> StageResult<RecoveryOutcome> {
    recover_to(git, None)
}

/// Like [`recover`], but with the commit the run started from.
///
/// A known `head` is always hard-reset to, so files and commits a task left
/// behind are discarded even when the run had nothing to stash.
#[instrument(skip_all, fields(workdir = %git.workdir().display(), head = ?head))]
pub fn recover_to(git: &Git, head: Option<&str>) -> StageResult<RecoveryOutcome> {
    let git_dir = git.git_dir()?;
    let merge_status = MergeStatus::new(&git_dir);
    let patch_path = patch::patch_path(&git_dir);

    let stash = git.find_stash(BACKUP_STASH_MESSAGE)?;
    let marker_commit = git.head_subject()?.as_deref() == Some(STAGED_CHANGES_COMMIT_MESSAGE);
    let backups = merge_status.leftovers();
    let has_patch = patch_path.exists();
    debug!(
        stash = ?stash,
        marker_commit,
        backups = backups.len(),
        has_patch,
        "recovery artifacts"
    );

    if head.is_none() && stash.is_none() && !marker_commit && backups.is_empty() && !has_patch {
        return Ok(RecoveryOutcome::NothingToRecover);
    }

    let fallback = if marker_commit { "HEAD~1" } else { "HEAD" };
    match (stash, head) {
        (Some(stash), head) => {
            git.add_all()?;
            git.reset_hard(head.unwrap_or(fallback))?;
            git.stash_apply_index(&stash)
                .map_err(|e| StageError::stash("failed to apply backup stash", Some(e)))?;
            let stash = git
                .find_stash(BACKUP_STASH_MESSAGE)?
                .ok_or_else(|| StageError::stash("missing backup stash", None))?;
            git.stash_drop(&stash)
                .map_err(|e| StageError::stash("failed to drop backup stash", Some(e)))?;
        }
        (None, Some(head)) => {
            git.add_all()?;
            git.reset_hard(head)?;
        }
        (None, None) if marker_commit => git.reset_soft("HEAD~1")?,
        (None, None) => {}
    }

    merge_status
        .restore(&backups)
        .map_err(|e| StageError::reconcile("failed to restore merge status", e))?;
    patch::remove(&patch_path)
        .map_err(|e| StageError::reconcile("failed to remove unstaged patch", e))?;

    info!("recovered from interrupted run");
    Ok(RecoveryOutcome::Recovered)
}
