//! Error taxonomy for the staged task lifecycle.
//!
//! Every failure the engine can report maps to one variant of [`StageError`].
//! Low-level causes (git invocations, filesystem calls) stay attached as
//! sources so `{:#}` formatting prints the full chain.

use std::io;

use thiserror::Error;

/// A git invocation that exited nonzero, was killed by a signal, or could not
/// be spawned.
#[derive(Debug, Error)]
#[error("git {} failed: {}", .args.join(" "), .stderr.trim())]
pub struct GitCommandError {
    pub args: Vec<String>,
    pub stderr: String,
    /// Exit code, `None` when the process was terminated by a signal or never
    /// started.
    pub status: Option<i32>,
}

impl GitCommandError {
    /// True when git printed `needle` on stderr.
    pub fn stderr_contains(&self, needle: &str) -> bool {
        self.stderr.contains(needle)
    }
}

/// Underlying cause for capture and reconciliation failures.
#[derive(Debug, Error)]
pub enum Cause {
    #[error(transparent)]
    Git(#[from] GitCommandError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum StageError {
    /// git is missing or too old.
    #[error("{0}")]
    Environment(String),

    /// cwd is not usable as a repository root.
    #[error("{0}")]
    RepositoryState(String),

    /// A previous run left a stash, marker commit or merge backup behind.
    #[error("{0}; run `exec-staged recover` to restore it")]
    PriorRunArtifact(String),

    #[error("{context}")]
    Capture {
        context: String,
        #[source]
        source: Cause,
    },

    #[error("{context}")]
    Stash {
        context: String,
        #[source]
        source: Option<GitCommandError>,
    },

    #[error("task `{command}` failed: {reason}")]
    Task { command: String, reason: String },

    #[error("{context}")]
    MergeReconciliation {
        context: String,
        #[source]
        source: Cause,
    },

    /// Rolling back after `original` failed as well.
    #[error("failed to restore the original state after: {original}")]
    RevertFailure {
        original: Box<StageError>,
        #[source]
        revert: Box<StageError>,
    },

    #[error("interrupted by signal")]
    Interrupted,

    #[error(transparent)]
    Git(#[from] GitCommandError),
}

impl StageError {
    pub(crate) fn capture(context: impl Into<String>, source: impl Into<Cause>) -> Self {
        Self::Capture {
            context: context.into(),
            source: source.into(),
        }
    }

    pub(crate) fn reconcile(context: impl Into<String>, source: impl Into<Cause>) -> Self {
        Self::MergeReconciliation {
            context: context.into(),
            source: source.into(),
        }
    }

    pub(crate) fn stash(context: impl Into<String>, source: Option<GitCommandError>) -> Self {
        Self::Stash {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn task(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Task {
            command: command.into(),
            reason: reason.into(),
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

pub type StageResult<T> = Result<T, StageError>;
