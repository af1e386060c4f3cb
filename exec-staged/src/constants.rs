//! Stable names shared between a run and a later `recover` invocation.
//!
//! Every marker here is looked up by a separate process after a crash, so the
//! values must never change between releases.

/// Message of the stash that holds the pre-run working tree.
pub const BACKUP_STASH_MESSAGE: &str = "💾 exec-staged backup stash";

/// Subject of the throwaway commit created while re-applying unstaged changes.
pub const STAGED_CHANGES_COMMIT_MESSAGE: &str = "💾 exec-staged staged changes";

/// Patch of unstaged modifications, relative to the git directory.
pub const PATCH_FILE_NAME: &str = "exec-staged-unstaged.patch";

/// Files git keeps while a merge is being resolved.
pub const MERGE_STATUS_FILES: [&str; 3] = ["MERGE_HEAD", "MERGE_MODE", "MERGE_MSG"];

/// Suffix appended to merge status files while they are backed up.
pub const BACKUP_SUFFIX: &str = ".bak";

/// Token in a task command replaced by the matched file paths.
pub const FILES_PLACEHOLDER: &str = "%FILES%";

/// Oldest git release whose stash and apply flags we depend on.
pub const MIN_GIT_VERSION: (u32, u32, u32) = (2, 14, 0);

/// Default diff filter for tasks that do not set one.
pub const DEFAULT_DIFF_FILTER: &str = "ACMR";

/// Default glob for tasks that do not set one.
pub const DEFAULT_GLOB: &str = "*";

/// Directory under the system temp dir that holds debug traces.
pub const DEBUG_LOG_DIR: &str = "exec-staged";

/// Executables installed by the project itself are preferred over `PATH`.
pub const LOCAL_BIN_DIR: &str = "node_modules/.bin";
