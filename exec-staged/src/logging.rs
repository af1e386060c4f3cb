//! Console progress and tracing setup.
//!
//! # Separation of Concerns
//!
//! - **Progress ([`Progress`])**: the `➡️` lines a user sees for each phase,
//!   printed to stdout unless `--quiet`.
//! - **Tracing**: every git command and its output at `debug`. Always written
//!   to a debug file under the system temp dir; mirrored to stderr according
//!   to `RUST_LOG`.

use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::info;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::constants::DEBUG_LOG_DIR;

/// Initialize tracing and open the debug trace file.
///
/// Reads `RUST_LOG` for stderr output, defaulting to `warn` (`error` when
/// `quiet`). Returns the debug file path, or `None` if it could not be
/// created.
///
/// # Example
/// ```bash
/// RUST_LOG=exec_staged=debug exec-staged "cargo fmt"
/// ```
pub fn init(quiet: bool) -> Option<PathBuf> {
    let default = if quiet { "error" } else { "warn" };
    let stderr_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .compact()
        .with_filter(stderr_filter);

    let (path, file) = open_debug_file().unzip();
    let file_layer = file.map(|file| {
        fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(false)
            .with_filter(EnvFilter::new("exec_staged=debug"))
    });

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    path
}

fn open_debug_file() -> Option<(PathBuf, File)> {
    let dir = std::env::temp_dir().join(DEBUG_LOG_DIR);
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis());
    let path = dir.join(format!("debug-{millis}.txt"));
    let file = fs::create_dir_all(&dir).and_then(|()| File::create(&path));
    match file {
        Ok(file) => Some((path, file)),
        Err(err) => {
            eprintln!("warning: cannot write debug log {}: {err}", path.display());
            None
        }
    }
}

/// Human-readable phase reporting.
#[derive(Debug, Clone, Copy, Default)]
pub struct Progress {
    quiet: bool,
}

impl Progress {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    /// Report a phase or task step.
    pub fn step(&self, message: &str) {
        info!(target: "exec_staged::progress", "{message}");
        if !self.quiet {
            println!("➡️ {message}");
        }
    }

    /// Report something that was deliberately not done.
    pub fn notice(&self, message: &str) {
        info!(target: "exec_staged::progress", "{message}");
        if !self.quiet {
            println!("ℹ️ {message}");
        }
    }
}
