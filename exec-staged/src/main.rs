//! Run tasks against the staged files of a git repository.
//!
//! Unstaged changes are hidden while tasks run and restored afterwards; task
//! edits are added to the index. Any failure restores the original state.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use exec_staged::core::task::TaskSpec;
use exec_staged::exit_codes;
use exec_staged::io::config::{load_config, resolve_tasks};
use exec_staged::io::git::Git;
use exec_staged::logging::{self, Progress};
use exec_staged::recover::{RecoveryOutcome, recover};
use exec_staged::stage::{Stage, StageOptions};
use exec_staged::teardown;

#[derive(Parser)]
#[command(
    name = "exec-staged",
    version,
    about = "Run tasks against staged git changes"
)]
struct Cli {
    /// Suppress progress output. The debug log is still written.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Repository root to run in, relative to the current directory.
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,

    /// Tasks to run instead of the configured ones.
    #[arg(value_name = "TASK")]
    tasks: Vec<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Run tasks against the staged files (the default command).
    Run {
        /// Tasks to run instead of the configured ones.
        #[arg(value_name = "TASK")]
        tasks: Vec<String>,
    },
    /// Restore the repository after a run that was killed.
    Recover,
}

fn main() {
    let cli = Cli::parse();
    teardown::install_signal_handlers();
    let debug_log = logging::init(cli.quiet);

    let result = run(cli);
    if let Err(err) = &result {
        eprintln!("{:#}", err);
        if let Some(path) = &debug_log {
            eprintln!("debug log: {}", path.display());
        }
    }
    std::process::exit(exit_codes::from_result(&result));
}

fn run(cli: Cli) -> Result<()> {
    let cwd = resolve_cwd(cli.cwd.as_deref())?;
    let progress = Progress::new(cli.quiet);
    match cli.command {
        Some(Command::Recover) => cmd_recover(&cwd, progress),
        Some(Command::Run { tasks }) => cmd_run(&cwd, tasks, cli.quiet, progress),
        None => cmd_run(&cwd, cli.tasks, cli.quiet, progress),
    }
}

fn resolve_cwd(cwd: Option<&Path>) -> Result<PathBuf> {
    let current = std::env::current_dir().context("read current directory")?;
    Ok(match cwd {
        Some(path) => current.join(path),
        None => current,
    })
}

fn cmd_run(cwd: &Path, tasks: Vec<String>, quiet: bool, progress: Progress) -> Result<()> {
    let specs = if tasks.is_empty() {
        let config = load_config(cwd)?;
        match &config.source {
            Some(path) => progress.notice(&format!("Config loaded from {}", path.display())),
            None => progress.notice("No config found"),
        }
        resolve_tasks(&config.tasks)?
    } else {
        tasks.into_iter().map(TaskSpec::new).collect()
    };

    let mut stage = Stage::new(cwd, StageOptions { quiet });
    stage.exec(&specs)?;
    Ok(())
}

fn cmd_recover(cwd: &Path, progress: Progress) -> Result<()> {
    match recover(&Git::new(cwd))? {
        RecoveryOutcome::NothingToRecover => progress.notice("Nothing to recover"),
        RecoveryOutcome::Recovered => progress.step("Recovered from interrupted run"),
    }
    Ok(())
}
