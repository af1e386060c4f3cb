//! Task dispatch: filter the snapshot, expand `%FILES%`, run the command.

use std::path::Path;

use tracing::{debug, instrument};

use crate::core::status::StatusSnapshot;
use crate::core::task::{TaskPlan, TaskSpec};
use crate::error::{StageError, StageResult};
use crate::io::process::{ProcessOutcome, run_inherited};
use crate::teardown::{self, TeardownRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Ran,
    /// The command interpolates files and none matched its filters.
    Skipped,
}

pub trait TaskRunner {
    /// Run one task against the staged files. Any error stops the run.
    fn run(&self, task: &TaskSpec, snapshot: &StatusSnapshot, cwd: &Path)
    -> StageResult<TaskOutcome>;
}

/// Runs tasks as child processes with inherited stdio.
#[derive(Clone, Copy)]
pub struct ProcessTaskRunner {
    teardown: &'static TeardownRegistry,
}

impl ProcessTaskRunner {
    pub fn new() -> Self {
        Self::with_teardown(teardown::global())
    }

    /// Poll `teardown` instead of the global registry for interrupts.
    pub fn with_teardown(teardown: &'static TeardownRegistry) -> Self {
        Self { teardown }
    }
}

impl Default for ProcessTaskRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRunner for ProcessTaskRunner {
    #[instrument(skip_all, fields(command = %task.command))]
    fn run(
        &self,
        task: &TaskSpec,
        snapshot: &StatusSnapshot,
        cwd: &Path,
    ) -> StageResult<TaskOutcome> {
        let argv = match task
            .plan(snapshot)
            .map_err(|e| StageError::task(&task.command, e.to_string()))?
        {
            TaskPlan::Run(argv) => argv,
            TaskPlan::Skip => {
                debug!(diff = %task.diff, glob = task.glob.as_str(), "no matching files");
                return Ok(TaskOutcome::Skipped);
            }
        };
        debug!(argv = ?argv, "running task");

        match run_inherited(&argv, cwd, self.teardown) {
            Ok(ProcessOutcome::Exited(status)) if status.success() => Ok(TaskOutcome::Ran),
            Ok(ProcessOutcome::Exited(status)) => Err(StageError::task(&task.command, status.to_string())),
            Ok(ProcessOutcome::Killed) => Err(StageError::Interrupted),
            Err(err) => Err(StageError::task(
                &task.command,
                format!("could not be started: {err}"),
            )),
        }
    }
}
