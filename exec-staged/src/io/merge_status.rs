//! Backup of the files git keeps while a merge is in progress.
//!
//! `git stash` and `git reset --hard` both delete `MERGE_HEAD` and friends, so
//! a run started in the middle of a merge copies them aside first.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::constants::{BACKUP_SUFFIX, MERGE_STATUS_FILES};

#[derive(Debug, Clone)]
pub struct MergeStatus {
    git_dir: PathBuf,
}

impl MergeStatus {
    pub fn new(git_dir: impl Into<PathBuf>) -> Self {
        Self {
            git_dir: git_dir.into(),
        }
    }

    fn original(&self, name: &str) -> PathBuf {
        self.git_dir.join(name)
    }

    fn backup_path(&self, name: &str) -> PathBuf {
        self.git_dir.join(format!("{name}{BACKUP_SUFFIX}"))
    }

    /// Copy every existing merge status file to `<name>.bak`. Returns the
    /// names that were copied.
    pub fn backup(&self) -> io::Result<BTreeSet<String>> {
        let mut copied = BTreeSet::new();
        for name in MERGE_STATUS_FILES {
            let src = self.original(name);
            match fs::copy(&src, self.backup_path(name)) {
                Ok(_) => {
                    debug!(file = name, "backed up merge status");
                    copied.insert(name.to_string());
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(copied)
    }

    /// Move each backup back over its original. Missing backups are skipped,
    /// so restoring twice is harmless.
    pub fn restore(&self, names: &BTreeSet<String>) -> io::Result<()> {
        for name in names {
            match fs::rename(self.backup_path(name), self.original(name)) {
                Ok(()) => debug!(file = %name, "restored merge status"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(file = %name, "merge status backup already restored");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Copy each backup over its original, keeping the backup in place until
    /// [`MergeStatus::discard`] removes it.
    pub fn restore_copies(&self, names: &BTreeSet<String>) -> io::Result<()> {
        for name in names {
            match fs::copy(self.backup_path(name), self.original(name)) {
                Ok(_) => debug!(file = %name, "restored merge status copy"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Delete backups without restoring them.
    pub fn discard(&self, names: &BTreeSet<String>) -> io::Result<()> {
        for name in names {
            match fs::remove_file(self.backup_path(name)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(file = %name, err = %e, "failed to remove merge status backup");
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Names whose backup currently exists on disk.
    pub fn leftovers(&self) -> BTreeSet<String> {
        MERGE_STATUS_FILES
            .iter()
            .filter(|name| self.backup_path(name).exists())
            .map(|name| (*name).to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    #[test]
    fn backup_copies_only_existing_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("MERGE_HEAD"), "abc\n").expect("write");
        fs::write(temp.path().join("MERGE_MSG"), "Merge branch\n").expect("write");

        let status = MergeStatus::new(temp.path());
        let copied = status.backup().expect("backup");
        assert_eq!(copied, set(&["MERGE_HEAD", "MERGE_MSG"]));
        assert_eq!(status.leftovers(), copied);
        assert!(temp.path().join("MERGE_HEAD").exists());
    }

    #[test]
    fn restore_moves_backups_back_and_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("MERGE_HEAD"), "abc\n").expect("write");
        let status = MergeStatus::new(temp.path());
        let copied = status.backup().expect("backup");

        fs::remove_file(temp.path().join("MERGE_HEAD")).expect("remove");
        status.restore(&copied).expect("restore");
        status.restore(&copied).expect("restore again");

        assert_eq!(
            fs::read_to_string(temp.path().join("MERGE_HEAD")).expect("read"),
            "abc\n"
        );
        assert!(status.leftovers().is_empty());
    }

    #[test]
    fn restore_copies_then_discard() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("MERGE_MODE"), "no-ff").expect("write");
        let status = MergeStatus::new(temp.path());
        let copied = status.backup().expect("backup");
        fs::remove_file(temp.path().join("MERGE_MODE")).expect("remove");

        status.restore_copies(&copied).expect("restore");
        assert_eq!(status.leftovers(), copied);
        status.discard(&copied).expect("discard");
        assert!(status.leftovers().is_empty());
        assert!(temp.path().join("MERGE_MODE").exists());
    }

    #[test]
    fn backup_in_clean_repository_is_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let status = MergeStatus::new(temp.path());
        assert!(status.backup().expect("backup").is_empty());
        assert!(status.leftovers().is_empty());
    }
}
