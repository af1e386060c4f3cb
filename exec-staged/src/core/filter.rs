//! File selection for tasks: diff filter letters plus a glob.
//!
//! The diff filter is matched against the index column of the status code.
//! During `run` the working tree holds exactly the index, so the index side
//! describes the change a task actually sees. Unstaged-only changes never
//! match because their staged content equals `HEAD`.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use glob::{MatchOptions, Pattern};
use thiserror::Error;

use crate::core::status::{StatusCode, StatusEntry, StatusSnapshot};

/// A recognized diff filter letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiffLetter {
    /// `A`: file added to the index.
    Added,
    /// `C`: copy detected in the index. Rename detection is off for
    /// snapshots, so this never matches in practice.
    Copied,
    /// `M`: content or type (`T`) changed in the index.
    Modified,
    /// `R`: rename in the index. Never matches with rename detection off;
    /// a staged rename shows up as `D` for the old path and `A` for the new.
    Renamed,
    /// `D`: deletion staged in the index. The path no longer exists while
    /// tasks run.
    Deleted,
    /// `?`: untracked file. Hidden from the working tree during `run`.
    Untracked,
}

impl DiffLetter {
    fn from_char(c: char) -> Option<Self> {
        let letter = match c {
            'A' => Self::Added,
            'C' => Self::Copied,
            'M' => Self::Modified,
            'R' => Self::Renamed,
            'D' => Self::Deleted,
            '?' => Self::Untracked,
            _ => return None,
        };
        Some(letter)
    }

    fn as_char(self) -> char {
        match self {
            Self::Added => 'A',
            Self::Copied => 'C',
            Self::Modified => 'M',
            Self::Renamed => 'R',
            Self::Deleted => 'D',
            Self::Untracked => '?',
        }
    }

    fn matches(self, index: StatusCode) -> bool {
        match self {
            Self::Added => index == StatusCode::Added,
            Self::Copied => index == StatusCode::Copied,
            Self::Modified => matches!(index, StatusCode::Modified | StatusCode::TypeChanged),
            Self::Renamed => index == StatusCode::Renamed,
            Self::Deleted => index == StatusCode::Deleted,
            Self::Untracked => index == StatusCode::Untracked,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("unknown diff filter letter {letter:?} in {filter:?} (expected any of ACMRD?)")]
    UnknownLetter { letter: char, filter: String },
    #[error("diff filter must not be empty")]
    EmptyDiff,
    #[error("invalid glob {glob:?}: {reason}")]
    InvalidGlob { glob: String, reason: String },
}

/// Set of diff letters a task accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffFilter {
    letters: BTreeSet<DiffLetter>,
}

impl DiffFilter {
    pub fn matches(&self, entry: &StatusEntry) -> bool {
        self.letters.iter().any(|l| l.matches(entry.index))
    }
}

impl FromStr for DiffFilter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(FilterError::EmptyDiff);
        }
        let letters = s
            .chars()
            .map(|c| {
                DiffLetter::from_char(c).ok_or_else(|| FilterError::UnknownLetter {
                    letter: c,
                    filter: s.to_string(),
                })
            })
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self { letters })
    }
}

impl fmt::Display for DiffFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.letters.iter().try_for_each(|l| write!(f, "{}", l.as_char()))
    }
}

/// Glob over repository-relative paths. `*` crosses directories and matches
/// dotfiles. Bytes that are not UTF-8 only match wildcards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobFilter {
    pattern: Pattern,
}

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

impl GlobFilter {
    pub fn matches(&self, path: &Path) -> bool {
        self.pattern.matches_with(&path.to_string_lossy(), GLOB_OPTIONS)
    }

    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }
}

impl FromStr for GlobFilter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pattern = Pattern::new(s).map_err(|e| FilterError::InvalidGlob {
            glob: s.to_string(),
            reason: e.msg.to_string(),
        })?;
        Ok(Self { pattern })
    }
}

/// Paths from `snapshot` accepted by both filters, in path order.
pub fn select_paths<'a>(
    snapshot: &'a StatusSnapshot,
    diff: &DiffFilter,
    glob: &GlobFilter,
) -> Vec<&'a Path> {
    snapshot
        .entries()
        .filter(|e| diff.matches(e) && glob.matches(&e.path))
        .map(|e| e.path.as_path())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(raw: &[u8]) -> StatusSnapshot {
        StatusSnapshot::parse(raw).expect("parse")
    }

    fn diff(s: &str) -> DiffFilter {
        s.parse().expect("diff filter")
    }

    fn glob(s: &str) -> GlobFilter {
        s.parse().expect("glob")
    }

    fn select<'a>(snap: &'a StatusSnapshot, diff_filter: &str, pattern: &str) -> Vec<&'a str> {
        select_paths(snap, &diff(diff_filter), &glob(pattern))
            .into_iter()
            .map(|p| p.to_str().expect("utf-8 path"))
            .collect()
    }

    #[test]
    fn default_filter_matches_index_side_only() {
        let snap = snapshot(b"AM a.txt\0 M b.txt\0M  c.txt\0?? d.txt\0D  e.txt\0");
        assert_eq!(
            select(&snap, "ACMR", "*"),
            vec!["a.txt", "c.txt"]
        );
    }

    #[test]
    fn modified_letter_covers_type_changes() {
        let snap = snapshot(b"T  link\0");
        assert_eq!(select(&snap, "M", "*"), vec!["link"]);
    }

    #[test]
    fn staged_rename_is_split_into_delete_and_add() {
        let snap = snapshot(b"D  test.old\0A  test.new\0");
        assert!(select(&snap, "R", "*").is_empty());
        assert_eq!(select(&snap, "D", "*"), vec!["test.old"]);
        assert_eq!(select(&snap, "A", "*"), vec!["test.new"]);
    }

    #[test]
    fn untracked_only_matches_question_mark() {
        let snap = snapshot(b"?? new.txt\0");
        assert!(select(&snap, "ACMRD", "*").is_empty());
        assert_eq!(select(&snap, "?", "*"), vec!["new.txt"]);
    }

    #[test]
    fn default_glob_includes_dotfiles_and_subdirectories() {
        let snap = snapshot(b"A  .env\0A  src/deep/file.rs\0");
        assert_eq!(
            select(&snap, "A", "*"),
            vec![".env", "src/deep/file.rs"]
        );
    }

    #[test]
    fn extension_glob_filters_paths() {
        let snap = snapshot(b"A  a.js\0A  b.ts\0");
        assert_eq!(select(&snap, "ACMR", "*.js"), vec!["a.js"]);
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_path_matches_wildcard_glob() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let snap = snapshot(b"A  bad\xff.js\0");
        assert_eq!(
            select_paths(&snap, &diff("A"), &glob("*.js")),
            vec![Path::new(OsStr::from_bytes(b"bad\xff.js"))]
        );
    }

    #[test]
    fn unknown_letter_is_rejected() {
        let err = "AX".parse::<DiffFilter>().expect_err("should fail");
        assert_eq!(
            err,
            FilterError::UnknownLetter {
                letter: 'X',
                filter: "AX".into()
            }
        );
    }

    #[test]
    fn empty_diff_is_rejected() {
        assert_eq!("".parse::<DiffFilter>(), Err(FilterError::EmptyDiff));
    }

    #[test]
    fn invalid_glob_is_rejected() {
        assert!(matches!(
            "[".parse::<GlobFilter>(),
            Err(FilterError::InvalidGlob { .. })
        ));
    }

    #[test]
    fn diff_filter_displays_in_canonical_order() {
        assert_eq!(diff("RMCA").to_string(), "ACMR");
    }
}
