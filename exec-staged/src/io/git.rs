//! Git adapter for the stage engine.
//!
//! Every repository mutation goes through this wrapper so the debug trace
//! records each command and its output. Calls are synchronous: teardown runs
//! them from a signal path that must finish before the process exits.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::{debug, instrument, trace};

use crate::core::version::GitVersion;
use crate::error::{GitCommandError, StageError, StageResult};

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
    program: OsString,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            program: OsString::from("git"),
        }
    }

    /// Use `program` instead of `git` from `PATH`.
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Installed git version. A git that cannot be spawned at all is an
    /// environment error rather than a command failure.
    #[instrument(skip_all)]
    pub fn version(&self) -> StageResult<GitVersion> {
        let output = self.spawn(&[OsStr::new("--version")]).map_err(|err| {
            debug!(err = %err, "git not spawnable");
            StageError::Environment("git installation not found".to_string())
        })?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(version = %stdout.trim(), "git version");
        GitVersion::parse(&stdout)
            .ok_or_else(|| StageError::Environment(format!("unrecognized git version: {}", stdout.trim())))
    }

    pub fn is_inside_work_tree(&self) -> bool {
        self.run(&["rev-parse", "--is-inside-work-tree"])
            .is_ok_and(|out| out.trim() == "true")
    }

    pub fn toplevel(&self) -> Result<PathBuf, GitCommandError> {
        let out = self.run(&["rev-parse", "--show-toplevel"])?;
        Ok(PathBuf::from(out.trim_end_matches('\n')))
    }

    /// Absolute path of the repository metadata directory.
    pub fn git_dir(&self) -> Result<PathBuf, GitCommandError> {
        let out = self.run(&["rev-parse", "--absolute-git-dir"])?;
        Ok(PathBuf::from(out.trim_end_matches('\n')))
    }

    /// Commit id of `HEAD`, or `None` in a repository without commits.
    pub fn head(&self) -> Result<Option<String>, GitCommandError> {
        self.resolve("HEAD")
    }

    /// Commit id of `rev`, or `None` if it does not name a commit.
    pub fn resolve(&self, rev: &str) -> Result<Option<String>, GitCommandError> {
        let spec = format!("{rev}^{{commit}}");
        match self.run(&["rev-parse", "--verify", "--quiet", &spec]) {
            Ok(out) => Ok(Some(out.trim().to_string())),
            Err(err) if err.status == Some(1) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Subject line of the `HEAD` commit, `None` without commits.
    pub fn head_subject(&self) -> Result<Option<String>, GitCommandError> {
        if self.head()?.is_none() {
            return Ok(None);
        }
        let out = self.run(&["log", "-1", "--format=%s", "HEAD"])?;
        Ok(Some(out.trim_end_matches('\n').to_string()))
    }

    /// Raw `git status --porcelain -z` with renames disabled and every
    /// untracked file listed.
    pub fn status_porcelain(&self) -> Result<Vec<u8>, GitCommandError> {
        let args = [
            "status",
            "--porcelain",
            "-z",
            "--no-renames",
            "--untracked-files=all",
        ]
        .map(OsStr::new);
        Ok(self.run_checked(&args)?.stdout)
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<(), GitCommandError> {
        self.run(&["add", "-A"])?;
        Ok(())
    }

    /// Register `paths` in the index without content.
    pub fn add_intent_to_add(&self, paths: &[&Path]) -> Result<(), GitCommandError> {
        self.run_with_paths(&["add", "--intent-to-add"], paths)
    }

    /// Remove `paths` from the index, leaving the working tree alone.
    pub fn unstage(&self, paths: &[&Path]) -> Result<(), GitCommandError> {
        self.run_with_paths(&["reset", "--quiet"], paths)
    }

    /// Write a binary patch of unstaged changes, excluding deletions, to
    /// `out`.
    pub fn diff_unstaged_to(&self, out: &Path) -> Result<(), GitCommandError> {
        let mut output = OsString::from("--output=");
        output.push(out);
        let mut args: Vec<&OsStr> = [
            "diff",
            "--binary",
            "--no-color",
            "--no-ext-diff",
            "--no-renames",
            "--unified=0",
            "--diff-filter=d",
            "--src-prefix=a/",
            "--dst-prefix=b/",
            "--ignore-submodules",
        ]
        .map(OsStr::new)
        .to_vec();
        args.push(&output);
        self.run_checked(&args)?;
        Ok(())
    }

    /// Apply `patch` to the index and working tree.
    pub fn apply(&self, patch: &Path, three_way: bool) -> Result<(), GitCommandError> {
        let mut args: Vec<&OsStr> = ["apply", "--whitespace=nowarn", "--recount", "--unidiff-zero"]
            .map(OsStr::new)
            .to_vec();
        if three_way {
            args.push(OsStr::new("--3way"));
        }
        args.push(patch.as_os_str());
        self.run_checked(&args)?;
        Ok(())
    }

    pub fn stash_list(&self) -> Result<Vec<String>, GitCommandError> {
        let out = self.run(&["stash", "list"])?;
        Ok(out.lines().map(str::to_string).collect())
    }

    /// Reference (`stash@{n}`) of the stash whose message contains `marker`.
    ///
    /// Tasks may push and pop their own stashes, so the position is looked up
    /// on every call.
    #[instrument(skip(self))]
    pub fn find_stash(&self, marker: &str) -> Result<Option<String>, GitCommandError> {
        let found = self
            .stash_list()?
            .iter()
            .position(|line| line.contains(marker))
            .map(|i| format!("stash@{{{i}}}"));
        debug!(stash = ?found, "located stash");
        Ok(found)
    }

    /// Stash everything except the index, including untracked files.
    pub fn stash_push_keep_index(&self, message: &str) -> Result<(), GitCommandError> {
        self.run(&[
            "stash",
            "push",
            "--keep-index",
            "--include-untracked",
            "--message",
            message,
        ])?;
        Ok(())
    }

    /// Apply `stash` restoring both index and working tree.
    pub fn stash_apply_index(&self, stash: &str) -> Result<(), GitCommandError> {
        self.run(&["stash", "apply", "--index", "--quiet", stash])?;
        Ok(())
    }

    pub fn stash_drop(&self, stash: &str) -> Result<(), GitCommandError> {
        self.run(&["stash", "drop", "--quiet", stash])?;
        Ok(())
    }

    /// Commit the index as-is, bypassing hooks and signing.
    pub fn commit_all_staged(&self, message: &str) -> Result<(), GitCommandError> {
        self.run(&[
            "-c",
            "commit.gpgsign=false",
            "commit",
            "--no-verify",
            "--allow-empty",
            "--quiet",
            "-m",
            message,
        ])?;
        Ok(())
    }

    pub fn reset_hard(&self, target: &str) -> Result<(), GitCommandError> {
        self.run(&["reset", "--hard", "--quiet", target])?;
        Ok(())
    }

    /// Reset the index to `HEAD`, keeping the working tree.
    pub fn reset_index(&self) -> Result<(), GitCommandError> {
        self.run(&["reset", "--quiet"])?;
        Ok(())
    }

    pub fn reset_soft(&self, target: &str) -> Result<(), GitCommandError> {
        self.run(&["reset", "--soft", "--quiet", target])?;
        Ok(())
    }

    /// Run git and return stdout, failing on nonzero exit.
    pub fn run(&self, args: &[&str]) -> Result<String, GitCommandError> {
        let args: Vec<&OsStr> = args.iter().copied().map(OsStr::new).collect();
        let output = self.run_checked(&args)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run `args -- paths` with every path taken literally. Paths are passed
    /// as raw bytes, so names that are not UTF-8 or contain glob characters
    /// reach git unchanged.
    fn run_with_paths(&self, args: &[&str], paths: &[&Path]) -> Result<(), GitCommandError> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut argv: Vec<&OsStr> = Vec::with_capacity(args.len() + paths.len() + 2);
        argv.push(OsStr::new("--literal-pathspecs"));
        argv.extend(args.iter().copied().map(OsStr::new));
        argv.push(OsStr::new("--"));
        argv.extend(paths.iter().map(|p| p.as_os_str()));
        self.run_checked(&argv)?;
        Ok(())
    }

    fn run_checked(&self, args: &[&OsStr]) -> Result<Output, GitCommandError> {
        let output = self.spawn(args).map_err(|err| GitCommandError {
            args: to_owned(args),
            stderr: err.to_string(),
            status: None,
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            debug!(
                args = %display_args(args),
                status = ?output.status.code(),
                stderr = %stderr.trim(),
                "git failed"
            );
            return Err(GitCommandError {
                args: to_owned(args),
                stderr,
                status: output.status.code(),
            });
        }
        Ok(output)
    }

    fn spawn(&self, args: &[&OsStr]) -> std::io::Result<Output> {
        debug!(args = %display_args(args), "git");
        let output = Command::new(&self.program)
            .args(args)
            .current_dir(&self.workdir)
            .output()?;
        trace!(
            stdout = %String::from_utf8_lossy(&output.stdout).trim_end(),
            stderr = %String::from_utf8_lossy(&output.stderr).trim_end(),
            "git output"
        );
        Ok(output)
    }
}

fn to_owned(args: &[&OsStr]) -> Vec<String> {
    args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
}

fn display_args(args: &[&OsStr]) -> String {
    to_owned(args).join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;

    #[test]
    fn head_is_none_without_commits() {
        let temp = tempfile::tempdir().expect("tempdir");
        let git = Git::new(temp.path());
        git.run(&["init", "--quiet"]).expect("init");
        assert_eq!(git.head().expect("head"), None);
        assert_eq!(git.head_subject().expect("subject"), None);
    }

    #[test]
    fn head_subject_reads_last_commit() {
        let repo = TestRepo::new().expect("repo");
        let git = Git::new(repo.path());
        assert_eq!(
            git.head_subject().expect("subject").as_deref(),
            Some("initial commit")
        );
    }

    #[test]
    fn find_stash_locates_marker_by_position() {
        let repo = TestRepo::new().expect("repo");
        let git = Git::new(repo.path());
        repo.write_file("a.txt", "a").expect("write");
        git.run(&["stash", "push", "--include-untracked", "-m", "marker"])
            .expect("stash marker");
        repo.write_file("b.txt", "b").expect("write");
        git.run(&["stash", "push", "--include-untracked", "-m", "other"])
            .expect("stash other");
        assert_eq!(
            git.find_stash("marker").expect("find").as_deref(),
            Some("stash@{1}")
        );
        assert_eq!(git.find_stash("absent").expect("find"), None);
    }

    #[test]
    fn failure_reports_args_and_status() {
        let repo = TestRepo::new().expect("repo");
        let err = Git::new(repo.path())
            .run(&["stash", "drop", "stash@{5}"])
            .expect_err("should fail");
        assert_eq!(err.args, vec!["stash", "drop", "stash@{5}"]);
        assert!(err.status.is_some_and(|code| code != 0));
    }

    #[test]
    fn path_arguments_are_literal() {
        let repo = TestRepo::new().expect("repo");
        repo.write_file("a[1].txt", "").expect("write");
        repo.write_file("a1.txt", "").expect("write");
        let git = Git::new(repo.path());

        git.add_intent_to_add(&[Path::new("a[1].txt")]).expect("add");
        assert_eq!(repo.porcelain().expect("status"), " A a[1].txt\n?? a1.txt");
        git.unstage(&[Path::new("a[1].txt")]).expect("unstage");
        assert_eq!(repo.porcelain().expect("status"), "?? a1.txt\n?? a[1].txt");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn non_utf8_paths_reach_git_unchanged() {
        use std::os::unix::ffi::OsStrExt;

        let repo = TestRepo::new().expect("repo");
        let name = Path::new(OsStr::from_bytes(b"bad\xff.txt"));
        std::fs::write(repo.path().join(name), "x").expect("write");
        let git = Git::new(repo.path());

        git.add_intent_to_add(&[name]).expect("add");
        let raw = git.status_porcelain().expect("status");
        assert_eq!(raw, b" A bad\xff.txt\0".to_vec());
        git.unstage(&[name]).expect("unstage");
        let raw = git.status_porcelain().expect("status");
        assert_eq!(raw, b"?? bad\xff.txt\0".to_vec());
    }

    #[test]
    fn missing_program_is_environment_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let git = Git::new(temp.path()).with_program(temp.path().join("no-such-git"));
        let err = git.version().expect_err("should fail");
        assert_eq!(err.to_string(), "git installation not found");
    }
}
