//! Test-only helpers: a throwaway git repository and task fixtures.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

/// Succeeds without touching anything.
pub const TASK_EXIT_0: &str = "sh -c 'exit 0'";
/// Always fails.
pub const TASK_EXIT_1: &str = "sh -c 'exit 1'";
/// Succeeds only if `git status` shows changes.
pub const TASK_ASSERT_CHANGES: &str =
    r#"sh -c '[ -n "$(git status --porcelain --untracked-files=all)" ]'"#;
/// Succeeds only if `git status` is clean.
pub const TASK_ASSERT_NO_CHANGES: &str =
    r#"sh -c '[ -z "$(git status --porcelain --untracked-files=all)" ]'"#;
/// Succeeds only if nothing differs between index and working tree.
pub const TASK_ASSERT_NO_UNSTAGED_CHANGES: &str =
    r#"sh -c '[ -z "$(git status --porcelain --untracked-files=all | grep "^.[^ ]")" ]'"#;
/// Deletes every file passed to it.
pub const TASK_RM_FILES: &str = "rm %FILES%";
/// Takes long enough to be interrupted.
pub const TASK_SLEEP: &str = "sleep 5";

/// A git repository in a temp dir with one empty commit.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let repo = Self::empty()?;
        repo.git(&["commit", "--quiet", "--allow-empty", "-m", "initial commit"])?;
        Ok(repo)
    }

    /// Initialized repository without any commit.
    pub fn empty() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp repo dir")?;
        let repo = Self { dir };
        repo.git(&["init", "--quiet"])?;
        repo.git(&["config", "user.name", "exec-staged tests"])?;
        repo.git(&["config", "user.email", "tests@exec-staged.invalid"])?;
        repo.git(&["config", "commit.gpgsign", "false"])?;
        repo.git(&["config", "core.autocrlf", "false"])?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn join(&self, rel: &str) -> PathBuf {
        self.path().join(rel)
    }

    /// Write `contents` to `rel`, creating parent directories.
    pub fn write_file(&self, rel: &str, contents: &str) -> Result<()> {
        let path = self.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    pub fn read_file(&self, rel: &str) -> Result<String> {
        let path = self.join(rel);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }

    /// Remove a file or directory tree.
    pub fn rm(&self, rel: &str) -> Result<()> {
        let path = self.join(rel);
        let meta = fs::symlink_metadata(&path).with_context(|| format!("stat {}", path.display()))?;
        let removed = if meta.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.with_context(|| format!("remove {}", path.display()))
    }

    pub fn rename(&self, from: &str, to: &str) -> Result<()> {
        fs::rename(self.join(from), self.join(to)).with_context(|| format!("rename {from} to {to}"))
    }

    pub fn mkdir(&self, rel: &str) -> Result<()> {
        let path = self.join(rel);
        fs::create_dir_all(&path).with_context(|| format!("create {}", path.display()))
    }

    #[cfg(unix)]
    pub fn symlink(&self, target: &str, link: &str) -> Result<()> {
        std::os::unix::fs::symlink(self.join(target), self.join(link))
            .with_context(|| format!("symlink {link} -> {target}"))
    }

    /// Stage everything and commit.
    pub fn commit_all(&self, message: &str) -> Result<()> {
        self.git(&["add", "-A"])?;
        self.git(&["commit", "--quiet", "-m", message])?;
        Ok(())
    }

    /// Run git in the repository and return stdout.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !output.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// `git status --porcelain` with every untracked file listed.
    pub fn porcelain(&self) -> Result<String> {
        self.git(&["status", "--porcelain", "--untracked-files=all"])
            .map(|s| s.trim_end().to_string())
    }

    /// Long-form `git status -v`, used to compare states byte for byte.
    pub fn status_verbose(&self) -> Result<String> {
        self.git(&["status", "-v", "--untracked-files=all"])
    }

    pub fn stash_list(&self) -> Result<String> {
        self.git(&["stash", "list"])
    }

    pub fn log(&self) -> Result<String> {
        self.git(&["log", "--format=%s"])
    }

    /// Contents of `rel` in the index.
    pub fn staged_contents(&self, rel: &str) -> Result<String> {
        self.git(&["show", &format!(":{rel}")])
    }

    /// Absolute path of the `.git` directory.
    pub fn git_dir(&self) -> PathBuf {
        self.join(".git")
    }
}
