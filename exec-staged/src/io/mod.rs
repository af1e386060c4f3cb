//! Side-effecting helpers: git, the filesystem and child processes.

pub mod config;
pub mod git;
pub mod merge_status;
pub mod patch;
pub mod process;
