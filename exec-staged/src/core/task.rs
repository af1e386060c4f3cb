//! Task specifications and their expansion into an argv.

use std::ffi::OsString;
use std::fmt;

use thiserror::Error;

use crate::constants::{DEFAULT_DIFF_FILTER, DEFAULT_GLOB, FILES_PLACEHOLDER};
use crate::core::filter::{DiffFilter, FilterError, GlobFilter, select_paths};
use crate::core::status::StatusSnapshot;

/// A command to run against the staged files, with the filters that decide
/// which files replace `%FILES%`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub command: String,
    pub diff: DiffFilter,
    pub glob: GlobFilter,
}

impl TaskSpec {
    /// Task with the default `ACMR` diff filter and `*` glob.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            diff: default_diff(),
            glob: default_glob(),
        }
    }

    pub fn with_filters(
        command: impl Into<String>,
        diff: Option<&str>,
        glob: Option<&str>,
    ) -> Result<Self, FilterError> {
        let diff = match diff {
            Some(d) => d.parse()?,
            None => default_diff(),
        };
        let glob = match glob {
            Some(g) => g.parse()?,
            None => default_glob(),
        };
        Ok(Self {
            command: command.into(),
            diff,
            glob,
        })
    }

    /// Expand the command against `snapshot`.
    ///
    /// The first `%FILES%` token is replaced by one argv entry per matching
    /// path. When the command has a placeholder and nothing matches, the task
    /// is skipped.
    pub fn plan(&self, snapshot: &StatusSnapshot) -> Result<TaskPlan, PlanError> {
        let tokens = shlex::split(&self.command).ok_or(PlanError::Unparsable)?;
        if tokens.is_empty() {
            return Err(PlanError::Empty);
        }

        let Some(at) = tokens.iter().position(|t| t == FILES_PLACEHOLDER) else {
            return Ok(TaskPlan::Run(tokens.into_iter().map(OsString::from).collect()));
        };

        let paths = select_paths(snapshot, &self.diff, &self.glob);
        if paths.is_empty() {
            return Ok(TaskPlan::Skip);
        }

        let mut tokens = tokens.into_iter().map(OsString::from);
        let mut argv: Vec<OsString> = tokens.by_ref().take(at).collect();
        argv.extend(paths.into_iter().map(|p| p.as_os_str().to_os_string()));
        argv.extend(tokens.skip(1));
        if argv.first().is_none_or(|program| program.is_empty()) {
            return Err(PlanError::Empty);
        }
        Ok(TaskPlan::Run(argv))
    }
}

impl fmt::Display for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command)
    }
}

fn default_diff() -> DiffFilter {
    DEFAULT_DIFF_FILTER
        .parse()
        .unwrap_or_else(|_| unreachable!("default diff filter is valid"))
}

fn default_glob() -> GlobFilter {
    DEFAULT_GLOB
        .parse()
        .unwrap_or_else(|_| unreachable!("default glob is valid"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskPlan {
    /// Program and arguments. Interpolated paths are passed through as raw
    /// bytes.
    Run(Vec<OsString>),
    /// The command interpolates files and none matched.
    Skip,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("command has unbalanced quotes or a trailing escape")]
    Unparsable,
    #[error("command is empty")]
    Empty,
}
