//! Run tasks against the staged portion of a git working tree.
//!
//! Unstaged changes are hidden while tasks run, whatever the tasks change is
//! folded back into the index on success, and the repository is restored
//! exactly if anything fails. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (status parsing, file filters,
//!   command expansion). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (git, filesystem, task processes).
//!
//! [`stage`] ties them together into the check → prepare → run → merge/revert
//! lifecycle; [`recover`] cleans up after a run that was killed.

pub mod constants;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod recover;
pub mod runner;
pub mod stage;
pub mod teardown;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
