//! Parsed view of `git status --porcelain -z`.
//!
//! A snapshot is taken once in `prepare` and then only read: it decides which
//! untracked paths go into the patch, which deletions are replayed after the
//! patch is applied, and which files a task receives.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// One side (index or worktree) of a porcelain status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Unmodified,
    Modified,
    TypeChanged,
    Added,
    Deleted,
    Renamed,
    Copied,
    Unmerged,
    Untracked,
    Ignored,
}

impl StatusCode {
    pub fn from_char(c: char) -> Option<Self> {
        let code = match c {
            ' ' => Self::Unmodified,
            'M' => Self::Modified,
            'T' => Self::TypeChanged,
            'A' => Self::Added,
            'D' => Self::Deleted,
            'R' => Self::Renamed,
            'C' => Self::Copied,
            'U' => Self::Unmerged,
            '?' => Self::Untracked,
            '!' => Self::Ignored,
            _ => return None,
        };
        Some(code)
    }

    pub fn as_char(self) -> char {
        match self {
            Self::Unmodified => ' ',
            Self::Modified => 'M',
            Self::TypeChanged => 'T',
            Self::Added => 'A',
            Self::Deleted => 'D',
            Self::Renamed => 'R',
            Self::Copied => 'C',
            Self::Unmerged => 'U',
            Self::Untracked => '?',
            Self::Ignored => '!',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// Repository-relative path exactly as git reported it; not necessarily
    /// UTF-8.
    pub path: PathBuf,
    pub index: StatusCode,
    pub worktree: StatusCode,
}

impl StatusEntry {
    pub fn is_untracked(&self) -> bool {
        self.index == StatusCode::Untracked
    }

    /// Tracked file deleted in the worktree but not in the index.
    pub fn is_unstaged_deletion(&self) -> bool {
        self.worktree == StatusCode::Deleted && self.index != StatusCode::Deleted
    }

    pub fn is_unmerged(&self) -> bool {
        use StatusCode::{Added, Deleted, Unmerged};
        matches!(
            (self.index, self.worktree),
            (Unmerged, _) | (_, Unmerged) | (Added, Added) | (Deleted, Deleted)
        )
    }
}

impl fmt::Display for StatusEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} {}",
            self.index.as_char(),
            self.worktree.as_char(),
            self.path.display()
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatusParseError {
    #[error("truncated status record: {0:?}")]
    Truncated(String),
    #[error("unknown status code {code:?} for {path}")]
    UnknownCode { code: String, path: String },
    #[error("rename record for {0} is missing its source path")]
    MissingRenameSource(String),
}

/// Status of every changed path at the moment `prepare` ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    entries: BTreeMap<PathBuf, StatusEntry>,
}

impl StatusSnapshot {
    /// Parse the NUL-separated output of `git status --porcelain -z`.
    ///
    /// Paths are kept as raw bytes. Rename and copy records carry an extra
    /// NUL-terminated source path that is skipped; with `--no-renames` git
    /// never emits them.
    pub fn parse(raw: &[u8]) -> Result<Self, StatusParseError> {
        let mut records = raw.split(|b| *b == 0).filter(|r| !r.is_empty());
        let mut entries = BTreeMap::new();

        while let Some(record) = records.next() {
            let (&[x, y, b' '], rest) = record.split_at(record.len().min(3)) else {
                return Err(StatusParseError::Truncated(lossy(record)));
            };
            if rest.is_empty() {
                return Err(StatusParseError::Truncated(lossy(record)));
            }
            let path = path_from_bytes(rest);
            let unknown = || StatusParseError::UnknownCode {
                code: format!("{}{}", char::from(x), char::from(y)),
                path: path.display().to_string(),
            };
            let mut index = StatusCode::from_char(char::from(x)).ok_or_else(unknown)?;
            let mut worktree = StatusCode::from_char(char::from(y)).ok_or_else(unknown)?;

            if matches!(index, StatusCode::Renamed | StatusCode::Copied)
                || matches!(worktree, StatusCode::Renamed | StatusCode::Copied)
            {
                records
                    .next()
                    .ok_or_else(|| StatusParseError::MissingRenameSource(lossy(rest)))?;
            }
            if index == StatusCode::Untracked {
                worktree = StatusCode::Untracked;
            }
            if worktree == StatusCode::Untracked {
                index = StatusCode::Untracked;
            }

            entries.insert(
                path.clone(),
                StatusEntry {
                    path,
                    index,
                    worktree,
                },
            );
        }

        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&StatusEntry> {
        self.entries.get(path.as_ref())
    }

    /// Entries in path order.
    pub fn entries(&self) -> impl Iterator<Item = &StatusEntry> {
        self.entries.values()
    }

    pub fn untracked(&self) -> impl Iterator<Item = &Path> {
        self.entries()
            .filter(|e| e.is_untracked())
            .map(|e| e.path.as_path())
    }

    pub fn unstaged_deletions(&self) -> impl Iterator<Item = &Path> {
        self.entries()
            .filter(|e| e.is_unstaged_deletion())
            .map(|e| e.path.as_path())
    }

    pub fn unmerged(&self) -> impl Iterator<Item = &Path> {
        self.entries()
            .filter(|e| e.is_unmerged())
            .map(|e| e.path.as_path())
    }
}

#[cfg(unix)]
fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    PathBuf::from(OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
