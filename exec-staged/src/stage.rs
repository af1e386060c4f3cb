//! The staged task lifecycle: check → prepare → run → merge, or revert.
//!
//! # Repository choreography
//!
//! ```text
//! prepare  backup MERGE_* ─ diff unstaged → patch ─ stash --keep-index -u
//! run      tasks see exactly the index in the working tree
//! merge    add -A ─ marker commit ─ apply patch (3-way fallback)
//!          ─ re-delete unstaged deletions ─ reset ─ reset --soft <head>
//!          ─ restore MERGE_* ─ drop stash
//! revert   add -A ─ reset --hard <head> ─ stash apply --index ─ drop stash
//!          ─ restore MERGE_*
//! ```
//!
//! Everything a crashed run leaves behind (stash, marker commit, patch file,
//! merge backups) is durable and found again by [`crate::recover`].

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, instrument, warn};

use crate::constants::{BACKUP_STASH_MESSAGE, STAGED_CHANGES_COMMIT_MESSAGE};
use crate::core::status::StatusSnapshot;
use crate::core::task::TaskSpec;
use crate::core::version::GitVersion;
use crate::error::{StageError, StageResult};
use crate::io::git::Git;
use crate::io::merge_status::MergeStatus;
use crate::io::patch;
use crate::logging::Progress;
use crate::recover::recover_to;
use crate::runner::{ProcessTaskRunner, TaskOutcome, TaskRunner};
use crate::teardown::{self, Hook, TeardownRegistry};

const BENIGN_STASH_ERROR: &str = "did not match any file(s) known to git";

/// The five phases of a run, callable one at a time.
pub trait Lifecycle {
    fn check(&mut self) -> StageResult<()>;
    fn prepare(&mut self) -> StageResult<()>;
    fn run(&mut self, tasks: &[TaskSpec]) -> StageResult<()>;
    fn merge(&mut self) -> StageResult<()>;
    fn revert(&mut self) -> StageResult<()>;

    /// Cleanup to run if the process is interrupted mid-run.
    fn teardown_hook(&self) -> Option<Hook> {
        None
    }
}

/// Drive a full run.
///
/// `check` and `prepare` failures are returned as-is. Failures from `run` or
/// `merge`, interrupts included, trigger `revert`; if that fails too, both
/// errors are returned in [`StageError::RevertFailure`]. When reverting an
/// interrupted run fails, the hooks registered on `teardown` get a last try
/// at restoring the repository from its durable state.
pub fn drive<L: Lifecycle + ?Sized>(
    stage: &mut L,
    tasks: &[TaskSpec],
    teardown: &TeardownRegistry,
) -> StageResult<()> {
    stage.check()?;
    teardown.checkpoint()?;
    let _guard = stage.teardown_hook().map(|hook| teardown.register(hook));

    stage.prepare()?;
    let result = teardown
        .checkpoint()
        .and_then(|()| stage.run(tasks))
        .and_then(|()| teardown.checkpoint())
        .and_then(|()| stage.merge());

    match result {
        Ok(()) => Ok(()),
        Err(StageError::Interrupted) => {
            warn!("run interrupted, reverting");
            match stage.revert() {
                Ok(()) => Err(StageError::Interrupted),
                Err(revert) => {
                    error!(err = %revert, "revert after interrupt failed, running teardown hooks");
                    let ran = teardown.run_hooks();
                    warn!(hooks = ran, "teardown hooks finished");
                    Err(StageError::RevertFailure {
                        original: Box::new(StageError::Interrupted),
                        revert: Box::new(revert),
                    })
                }
            }
        }
        Err(original) => {
            warn!(err = %original, "run failed, reverting");
            match stage.revert() {
                Ok(()) => Err(original),
                Err(revert) => {
                    error!(err = %revert, "revert failed");
                    Err(StageError::RevertFailure {
                        original: Box::new(original),
                        revert: Box::new(revert),
                    })
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Checked,
    Prepared,
    Ran,
    Merged,
    Reverted,
}

/// In-memory state of one run. Reset to default when `exec` returns.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    pub phase: Phase,
    /// Rollback target captured before any mutation.
    pub head_commit: Option<String>,
    pub snapshot: StatusSnapshot,
    /// A backup stash with [`BACKUP_STASH_MESSAGE`] exists.
    pub stashed: bool,
    pub git_dir: Option<PathBuf>,
    /// Valid only while `stashed`.
    pub patch_path: Option<PathBuf>,
    /// Merge status files copied aside in `prepare`.
    pub merge_backup: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StageOptions {
    /// Suppress progress lines on stdout.
    pub quiet: bool,
}

/// Stage engine bound to one repository root.
pub struct Stage<R: TaskRunner = ProcessTaskRunner> {
    cwd: PathBuf,
    git: Git,
    runner: R,
    progress: Progress,
    teardown: &'static TeardownRegistry,
    state: RunState,
}

impl Stage<ProcessTaskRunner> {
    pub fn new(cwd: impl Into<PathBuf>, options: StageOptions) -> Self {
        let cwd = cwd.into();
        Self {
            git: Git::new(&cwd),
            cwd,
            runner: ProcessTaskRunner::new(),
            progress: Progress::new(options.quiet),
            teardown: teardown::global(),
            state: RunState::default(),
        }
    }

    /// Report interrupts and teardown hooks to `teardown` instead of the
    /// global registry.
    pub fn with_teardown(mut self, teardown: &'static TeardownRegistry) -> Self {
        self.teardown = teardown;
        self.runner = ProcessTaskRunner::with_teardown(teardown);
        self
    }
}

impl<R: TaskRunner> Stage<R> {
    pub fn with_runner<T: TaskRunner>(self, runner: T) -> Stage<T> {
        Stage {
            cwd: self.cwd,
            git: self.git,
            runner,
            progress: self.progress,
            teardown: self.teardown,
            state: self.state,
        }
    }

    pub fn with_git(mut self, git: Git) -> Self {
        self.git = git;
        self
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Run `tasks` against the staged files and fold their changes back into
    /// the index, or restore the original state on failure.
    #[instrument(skip_all, fields(cwd = %self.cwd.display(), tasks = tasks.len()))]
    pub fn exec(&mut self, tasks: &[TaskSpec]) -> StageResult<()> {
        let teardown = self.teardown;
        let result = drive(self, tasks, teardown);
        self.state = RunState::default();
        result
    }

    fn git_dir(&mut self) -> StageResult<PathBuf> {
        if let Some(dir) = &self.state.git_dir {
            return Ok(dir.clone());
        }
        let dir = self.git.git_dir()?;
        self.state.git_dir = Some(dir.clone());
        Ok(dir)
    }

    fn head_commit(&self) -> StageResult<String> {
        self.state
            .head_commit
            .clone()
            .ok_or_else(|| StageError::RepositoryState("HEAD was not captured before merging".into()))
    }

    fn patch_path(&mut self) -> StageResult<PathBuf> {
        if let Some(path) = &self.state.patch_path {
            return Ok(path.clone());
        }
        Ok(patch::patch_path(&self.git_dir()?))
    }

    fn locate_stash(&self) -> StageResult<String> {
        self.git
            .find_stash(BACKUP_STASH_MESSAGE)?
            .ok_or_else(|| StageError::stash("missing backup stash", None))
    }

    fn ensure_root(&self) -> StageResult<PathBuf> {
        let cwd = fs::canonicalize(&self.cwd)
            .map_err(|_| StageError::RepositoryState("cwd does not exist".into()))?;
        if !self.git.is_inside_work_tree() {
            return Err(StageError::RepositoryState("cwd is not a git repository".into()));
        }
        let toplevel = self.git.toplevel()?;
        let toplevel = fs::canonicalize(&toplevel).unwrap_or(toplevel);
        if toplevel != cwd {
            debug!(toplevel = %toplevel.display(), cwd = %cwd.display(), "cwd is below the root");
            return Err(StageError::RepositoryState(
                "cwd is not a git repository root directory".into(),
            ));
        }
        Ok(cwd)
    }

    fn ensure_git_dir_not_inside_tree(&self, root: &Path) -> StageResult<()> {
        let dot_git = root.join(".git");
        let is_symlink = fs::symlink_metadata(&dot_git).is_ok_and(|m| m.file_type().is_symlink());
        if !is_symlink {
            return Ok(());
        }
        let target = fs::canonicalize(&dot_git).map_err(|e| {
            StageError::RepositoryState(format!("git directory symlink cannot be resolved: {e}"))
        })?;
        if target.starts_with(root) {
            return Err(StageError::RepositoryState(
                "git directory is a symlink pointing to a location within the repository".into(),
            ));
        }
        Ok(())
    }

    /// Remove the patch and merge backups after a failed `prepare` that left
    /// no stash behind.
    fn discard_prepare_artifacts(&mut self, merge_status: &MergeStatus, patch_path: &Path) {
        if let Err(err) = merge_status.discard(&self.state.merge_backup) {
            warn!(err = %err, "failed to discard merge status backup");
        }
        if let Err(err) = patch::remove(patch_path) {
            warn!(err = %err, "failed to discard patch");
        }
        self.state.merge_backup.clear();
        self.state.patch_path = None;
    }

    fn redelete_unstaged_deletions(&self) -> StageResult<()> {
        for path in self.state.snapshot.unstaged_deletions() {
            match fs::remove_file(self.cwd.join(path)) {
                Ok(()) => debug!(path = %path.display(), "re-deleted"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(StageError::reconcile(
                        format!("failed to re-delete {}", path.display()),
                        e,
                    ));
                }
            }
        }
        Ok(())
    }
}

impl<R: TaskRunner> Lifecycle for Stage<R> {
    #[instrument(skip_all)]
    fn check(&mut self) -> StageResult<()> {
        self.progress.step("Checking environment...");

        if !self.cwd.is_dir() {
            return Err(StageError::RepositoryState("cwd does not exist".into()));
        }
        let version = self.git.version()?;
        if !version.is_supported() {
            return Err(StageError::Environment(format!(
                "unsupported git version {version} (need {} or newer)",
                GitVersion::minimum()
            )));
        }
        let root = self.ensure_root()?;
        if self.git.head()?.is_none() {
            return Err(StageError::RepositoryState(
                "repository has no commits yet".into(),
            ));
        }
        self.ensure_git_dir_not_inside_tree(&root)?;

        if self.git.find_stash(BACKUP_STASH_MESSAGE)?.is_some() {
            return Err(StageError::PriorRunArtifact("unexpected backup stash".into()));
        }
        if self.git.head_subject()?.as_deref() == Some(STAGED_CHANGES_COMMIT_MESSAGE) {
            return Err(StageError::PriorRunArtifact("unexpected temporary commit".into()));
        }
        let git_dir = self.git_dir()?;
        let leftovers = MergeStatus::new(&git_dir).leftovers();
        if !leftovers.is_empty() {
            let names: Vec<&str> = leftovers.iter().map(String::as_str).collect();
            return Err(StageError::PriorRunArtifact(format!(
                "unexpected merge status backup ({})",
                names.join(", ")
            )));
        }

        debug!(version = %version, git_dir = %git_dir.display(), "environment ok");
        self.state.phase = Phase::Checked;
        Ok(())
    }

    #[instrument(skip_all)]
    fn prepare(&mut self) -> StageResult<()> {
        self.progress.step("Preparing repository...");

        let head = self
            .git
            .head()?
            .ok_or_else(|| StageError::RepositoryState("repository has no commits yet".into()))?;
        let raw = self.git.status_porcelain()?;
        let snapshot = StatusSnapshot::parse(&raw).map_err(|e| {
            StageError::RepositoryState(format!("unexpected git status output: {e}"))
        })?;
        debug!(head = %head, entries = snapshot.len(), "captured status");
        self.state.head_commit = Some(head);

        let unmerged: Vec<String> = snapshot
            .unmerged()
            .map(|p| p.display().to_string())
            .collect();
        if !unmerged.is_empty() {
            return Err(StageError::RepositoryState(format!(
                "unresolved merge conflicts in {}",
                unmerged.join(", ")
            )));
        }

        if snapshot.is_empty() {
            debug!("nothing changed, skipping stash");
            self.state.snapshot = snapshot;
            self.state.phase = Phase::Prepared;
            return Ok(());
        }

        let git_dir = self.git_dir()?;
        let merge_status = MergeStatus::new(&git_dir);
        self.state.merge_backup = merge_status
            .backup()
            .map_err(|e| StageError::capture("failed to back up merge status", e))?;

        let patch_path = match patch::capture(&self.git, &git_dir, &snapshot) {
            Ok(path) => path,
            Err(err) => {
                self.discard_prepare_artifacts(&merge_status, &patch::patch_path(&git_dir));
                return Err(err);
            }
        };
        self.state.patch_path = Some(patch_path.clone());
        self.state.snapshot = snapshot;

        let pushed = self.git.stash_push_keep_index(BACKUP_STASH_MESSAGE);
        let exists = self.git.find_stash(BACKUP_STASH_MESSAGE)?.is_some();
        match pushed {
            Ok(()) if exists => self.state.stashed = true,
            Ok(()) => {
                debug!("git saved no stash, nothing to hide");
                self.discard_prepare_artifacts(&merge_status, &patch_path);
            }
            Err(err) if exists && err.stderr_contains(BENIGN_STASH_ERROR) => {
                debug!(stderr = %err.stderr.trim(), "ignoring benign stash error");
                self.state.stashed = true;
            }
            Err(err) if exists => {
                return Err(StageError::stash(
                    "failed to create backup stash; it was left in place, run `exec-staged recover`",
                    Some(err),
                ));
            }
            Err(err) => {
                self.discard_prepare_artifacts(&merge_status, &patch_path);
                return Err(StageError::stash("failed to create backup stash", Some(err)));
            }
        }

        self.state.phase = Phase::Prepared;
        Ok(())
    }

    #[instrument(skip_all)]
    fn run(&mut self, tasks: &[TaskSpec]) -> StageResult<()> {
        self.progress.step("Running tasks...");
        let total = tasks.len();
        for (i, task) in tasks.iter().enumerate() {
            self.teardown.checkpoint()?;
            self.progress
                .step(&format!("Running task {} of {total}: `{task}`...", i + 1));
            let outcome = self.runner.run(task, &self.state.snapshot, &self.cwd)?;
            if outcome == TaskOutcome::Skipped {
                self.progress
                    .notice(&format!("Skipped `{task}`: no staged files matched"));
            }
        }
        self.state.phase = Phase::Ran;
        Ok(())
    }

    #[instrument(skip_all)]
    fn merge(&mut self) -> StageResult<()> {
        self.progress
            .step("Merging new changes with saved state...");

        if self.state.stashed {
            self.locate_stash()?;
        }
        self.git
            .add_all()
            .map_err(|e| StageError::reconcile("failed to stage task changes", e))?;
        if !self.state.stashed {
            self.state.phase = Phase::Merged;
            return Ok(());
        }

        let head = self.head_commit()?;
        self.git
            .commit_all_staged(STAGED_CHANGES_COMMIT_MESSAGE)
            .map_err(|e| StageError::reconcile("failed to commit staged changes", e))?;

        let patch_path = self.patch_path()?;
        let empty = patch::is_empty(&patch_path)
            .map_err(|e| StageError::reconcile("failed to read unstaged patch", e))?;
        if !empty {
            if let Err(err) = self.git.apply(&patch_path, false) {
                debug!(err = %err, "plain apply failed, retrying with 3-way merge");
                self.git.apply(&patch_path, true).map_err(|e| {
                    StageError::reconcile("failed to re-apply unstaged changes", e)
                })?;
            }
        }
        self.redelete_unstaged_deletions()?;

        self.git
            .reset_index()
            .map_err(|e| StageError::reconcile("failed to unstage re-applied changes", e))?;
        self.git
            .reset_soft(&head)
            .map_err(|e| StageError::reconcile("failed to remove temporary commit", e))?;
        patch::remove(&patch_path)
            .map_err(|e| StageError::reconcile("failed to remove unstaged patch", e))?;

        let merge_status = MergeStatus::new(self.git_dir()?);
        merge_status
            .restore_copies(&self.state.merge_backup)
            .map_err(|e| StageError::reconcile("failed to restore merge status", e))?;

        self.progress.step("Dropping backup stash...");
        let stash = self.locate_stash()?;
        self.git
            .stash_drop(&stash)
            .map_err(|e| StageError::stash("failed to drop backup stash", Some(e)))?;
        self.state.stashed = false;

        if let Err(err) = merge_status.discard(&self.state.merge_backup) {
            warn!(err = %err, "merge status restored but its backup remains");
        }
        self.state.merge_backup.clear();
        self.state.patch_path = None;
        self.state.phase = Phase::Merged;
        info!("merged task changes");
        Ok(())
    }

    #[instrument(skip_all)]
    fn revert(&mut self) -> StageResult<()> {
        self.progress.step("Reverting to saved state...");

        let stash = if self.state.stashed {
            Some(self.locate_stash()?)
        } else {
            None
        };
        self.git.add_all()?;
        let target = self.state.head_commit.as_deref().unwrap_or("HEAD");
        self.git.reset_hard(target)?;

        if let Some(stash) = stash {
            self.git
                .stash_apply_index(&stash)
                .map_err(|e| StageError::stash("failed to apply backup stash", Some(e)))?;
            self.progress.step("Dropping backup stash...");
            let stash = self.locate_stash()?;
            self.git
                .stash_drop(&stash)
                .map_err(|e| StageError::stash("failed to drop backup stash", Some(e)))?;
            self.state.stashed = false;

            let git_dir = self.git_dir()?;
            MergeStatus::new(&git_dir)
                .restore(&self.state.merge_backup)
                .map_err(|e| StageError::reconcile("failed to restore merge status", e))?;
            self.state.merge_backup.clear();
            let patch_path = self.patch_path()?;
            patch::remove(&patch_path)
                .map_err(|e| StageError::reconcile("failed to remove unstaged patch", e))?;
            self.state.patch_path = None;
        }

        self.state.phase = Phase::Reverted;
        info!("reverted to saved state");
        Ok(())
    }

    fn teardown_hook(&self) -> Option<Hook> {
        let git = self.git.clone();
        let head = self.git.head().ok().flatten();
        Some(Box::new(move || match recover_to(&git, head.as_deref()) {
            Ok(outcome) => info!(?outcome, "teardown recovery finished"),
            Err(err) => error!(err = %err, "teardown recovery failed"),
        }))
    }
}
