//! Task configuration discovery.
//!
//! The first file found in the working directory wins:
//!
//! 1. `package.json`, only if it has an `"exec-staged"` key
//! 2. `.exec-stagedrc.json`
//! 3. `exec-staged.toml`
//! 4. `.exec-staged.toml`
//!
//! JSON sources hold a bare array of entries; TOML files hold
//! `tasks = [...]`. An entry is a command string or
//! `{ task, diff?, glob? }`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::core::task::TaskSpec;

const PACKAGE_JSON: &str = "package.json";
const PACKAGE_KEY: &str = "exec-staged";
const JSON_RC: &str = ".exec-stagedrc.json";
const TOML_FILES: [&str; 2] = ["exec-staged.toml", ".exec-staged.toml"];

/// One configured task as the user wrote it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum UserTask {
    Command(String),
    Detailed(DetailedTask),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetailedTask {
    pub task: String,
    pub diff: Option<String>,
    pub glob: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    #[serde(default)]
    tasks: Vec<UserTask>,
}

/// Configuration found on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedConfig {
    /// File the tasks came from; `None` if no config exists.
    pub source: Option<PathBuf>,
    pub tasks: Vec<UserTask>,
}

/// Find and parse the task configuration in `dir`.
///
/// A missing configuration yields an empty task list.
pub fn load_config(dir: &Path) -> Result<LoadedConfig> {
    let package_json = dir.join(PACKAGE_JSON);
    if package_json.is_file() {
        let contents = read(&package_json)?;
        let value: Value = serde_json::from_str(&contents)
            .with_context(|| format!("parse {}", package_json.display()))?;
        if let Some(entry) = value.get(PACKAGE_KEY) {
            let tasks = serde_json::from_value(entry.clone())
                .map_err(|e| invalid(&package_json, e))?;
            return Ok(found(package_json, tasks));
        }
    }

    let rc = dir.join(JSON_RC);
    if rc.is_file() {
        let tasks = serde_json::from_str(&read(&rc)?).map_err(|e| invalid(&rc, e))?;
        return Ok(found(rc, tasks));
    }

    for name in TOML_FILES {
        let path = dir.join(name);
        if path.is_file() {
            let cfg: TomlConfig = toml::from_str(&read(&path)?).map_err(|e| invalid(&path, e))?;
            return Ok(found(path, cfg.tasks));
        }
    }

    debug!(dir = %dir.display(), "no config found");
    Ok(LoadedConfig::default())
}

/// Apply defaults and validate filters.
pub fn resolve_tasks(tasks: &[UserTask]) -> Result<Vec<TaskSpec>> {
    tasks
        .iter()
        .enumerate()
        .map(|(i, task)| {
            let spec = match task {
                UserTask::Command(command) => Ok(TaskSpec::new(command.clone())),
                UserTask::Detailed(d) => {
                    TaskSpec::with_filters(d.task.clone(), d.diff.as_deref(), d.glob.as_deref())
                }
            };
            spec.map_err(|e| anyhow!("invalid config: task {}: {e}", i + 1))
        })
        .collect()
}

fn found(path: PathBuf, tasks: Vec<UserTask>) -> LoadedConfig {
    debug!(path = %path.display(), tasks = tasks.len(), "config loaded");
    LoadedConfig {
        source: Some(path),
        tasks,
    }
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

fn invalid(path: &Path, err: impl std::fmt::Display) -> anyhow::Error {
    anyhow!("invalid config in {}: {err}", path.display())
}
