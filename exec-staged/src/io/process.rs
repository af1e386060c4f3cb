//! Child process helper for task commands.
//!
//! Tasks inherit stdio and have no timeout. The child is polled so an
//! interrupt can kill it promptly instead of waiting for it to finish.

use std::env;
use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;

use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::constants::LOCAL_BIN_DIR;
use crate::teardown::TeardownRegistry;

/// How often a running task is checked for a pending interrupt.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Exited(ExitStatus),
    /// An interrupt arrived; the child was killed and reaped.
    Killed,
}

/// `PATH` for tasks: `<cwd>/node_modules/.bin` followed by the inherited
/// `PATH`.
pub fn task_search_path(cwd: &Path) -> OsString {
    let inherited = env::var_os("PATH").unwrap_or_default();
    let dirs = std::iter::once(cwd.join(LOCAL_BIN_DIR)).chain(env::split_paths(&inherited));
    env::join_paths(dirs).unwrap_or(inherited)
}

/// Resolve the program of a task.
///
/// Bare names are looked up on `search_path`, so project-local executables
/// win over global ones. Paths with a separator are taken relative to `cwd`.
/// Unresolvable names are returned unchanged and fail at spawn time.
pub fn resolve_program(program: &OsStr, cwd: &Path, search_path: &OsStr) -> PathBuf {
    let as_path = Path::new(program);
    if as_path.components().count() > 1 || as_path.is_absolute() {
        return cwd.join(as_path);
    }
    match which::which_in(program, Some(search_path), cwd) {
        Ok(found) => found,
        Err(err) => {
            debug!(program = ?program, err = %err, "program not found on task path");
            PathBuf::from(program)
        }
    }
}

/// Run `argv` in `cwd` with inherited stdio until it exits or `teardown`
/// reports an interrupt.
#[instrument(skip_all, fields(program = ?argv.first()))]
pub fn run_inherited(
    argv: &[OsString],
    cwd: &Path,
    teardown: &TeardownRegistry,
) -> io::Result<ProcessOutcome> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;
    let search_path = task_search_path(cwd);
    let resolved = resolve_program(program, cwd, &search_path);

    debug!(resolved = %resolved.display(), args = ?args, "spawning task");
    let mut child = Command::new(&resolved)
        .args(args)
        .current_dir(cwd)
        .env("PATH", &search_path)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .inspect_err(|e| error!(err = %e, "failed to spawn task"))?;

    loop {
        if let Some(status) = child.wait_timeout(POLL_INTERVAL)? {
            debug!(exit_code = ?status.code(), "task finished");
            return Ok(ProcessOutcome::Exited(status));
        }
        if teardown.interrupted() {
            warn!(pid = child.id(), "interrupt received, killing task");
            if let Err(err) = child.kill() {
                warn!(err = %err, "failed to kill task");
            }
            child.wait()?;
            return Ok(ProcessOutcome::Killed);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn argv(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn reports_exit_status() {
        let temp = tempfile::tempdir().expect("tempdir");
        let teardown = TeardownRegistry::new();
        let ok = run_inherited(&argv(&["sh", "-c", "exit 0"]), temp.path(), &teardown).expect("run");
        let bad = run_inherited(&argv(&["sh", "-c", "exit 3"]), temp.path(), &teardown).expect("run");
        assert!(matches!(ok, ProcessOutcome::Exited(s) if s.success()));
        assert!(matches!(bad, ProcessOutcome::Exited(s) if s.code() == Some(3)));
    }

    #[test]
    fn missing_program_fails_to_spawn() {
        let temp = tempfile::tempdir().expect("tempdir");
        let teardown = TeardownRegistry::new();
        let err = run_inherited(&argv(&["exec-staged-no-such-program"]), temp.path(), &teardown)
            .expect_err("should fail");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn pending_interrupt_kills_long_task() {
        let temp = tempfile::tempdir().expect("tempdir");
        let teardown = TeardownRegistry::new();
        teardown.interrupt();
        let started = Instant::now();
        let outcome = run_inherited(&argv(&["sleep", "30"]), temp.path(), &teardown).expect("run");
        assert_eq!(outcome, ProcessOutcome::Killed);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn prefers_project_local_bin() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().expect("tempdir");
        let bin = temp.path().join(LOCAL_BIN_DIR);
        std::fs::create_dir_all(&bin).expect("mkdir");
        let script = bin.join("local-tool");
        std::fs::write(&script, "#!/bin/sh\nexit 0\n").expect("write");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).expect("chmod");

        let path = task_search_path(temp.path());
        assert_eq!(resolve_program(OsStr::new("local-tool"), temp.path(), &path), script);
        let teardown = TeardownRegistry::new();
        let outcome = run_inherited(&argv(&["local-tool"]), temp.path(), &teardown).expect("run");
        assert!(matches!(outcome, ProcessOutcome::Exited(s) if s.success()));
    }

    #[test]
    fn relative_paths_resolve_against_cwd() {
        let cwd = Path::new("/repo");
        let path = OsString::new();
        assert_eq!(
            resolve_program(OsStr::new("./bin/tool"), cwd, &path),
            PathBuf::from("/repo/./bin/tool")
        );
    }
}
