// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Benchmark configuration.
//!
//! Tasks come from a JSON file, with environment overrides layered on top:
//! `TRACESTORM_CONFIG` picks the file, `TRACESTORM_DISABLE_LOG` mutes output
//! and `TRACESTORM_TASKS` holds a JSON array of tasks merged into the file's
//! tasks by name (the override wins).

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracestorm_amplifier::format::{JsonFormat, MsgpackFormat, TraceFormat};

pub const CONFIG_PATH_ENV: &str = "TRACESTORM_CONFIG";
pub const DISABLE_LOG_ENV: &str = "TRACESTORM_DISABLE_LOG";
pub const TASKS_ENV: &str = "TRACESTORM_TASKS";

const DEFAULT_CONFIG_PATH: &str = "./config.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("task {task}: unknown wire format {format:?}")]
    UnknownFormat { task: String, format: String },
}

/// One benchmark task: a call-tree route replayed through the amplifier
/// against one collector endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub name: String,

    /// Wire format spoken to the collector, "msgpack" or "json".
    #[serde(default = "default_format")]
    pub format: String,

    /// Path to the route file describing the synthetic call tree.
    pub route: PathBuf,

    #[serde(default = "default_threads")]
    pub threads: usize,

    #[serde(default = "default_repeat")]
    pub repeat: usize,

    /// Full collector endpoint, e.g. "http://127.0.0.1:9529/v0.4/traces".
    pub collector_url: String,
}

impl TaskConfig {
    /// Resolves the configured format name to a wire-format implementation.
    pub fn wire_format(&self) -> Result<Arc<dyn TraceFormat>, ConfigError> {
        match self.format.as_str() {
            "msgpack" => Ok(Arc::new(MsgpackFormat)),
            "json" => Ok(Arc::new(JsonFormat)),
            other => Err(ConfigError::UnknownFormat {
                task: self.name.clone(),
                format: other.to_string(),
            }),
        }
    }
}

fn default_format() -> String {
    "msgpack".to_string()
}

fn default_threads() -> usize {
    3
}

fn default_repeat() -> usize {
    10
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchConfig {
    #[serde(default)]
    pub disable_log: bool,

    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

impl BenchConfig {
    /// Loads the file chosen by the CLI, falling back to `TRACESTORM_CONFIG`
    /// and then `./config.json`, and layers the environment overrides on top.
    pub fn load(cli_path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match cli_path {
            Some(p) => p.to_path_buf(),
            None => env::var(CONFIG_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
        };
        let mut config = Self::from_file(&path)?;

        if let Ok(v) = env::var(DISABLE_LOG_ENV) {
            config.disable_log = v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = env::var(TASKS_ENV) {
            let overrides: Vec<TaskConfig> = serde_json::from_str(&v)?;
            config.merge_tasks(overrides);
        }

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Merges tasks by name; an incoming task replaces the configured task of
    /// the same name, unmatched incoming tasks are appended.
    pub fn merge_tasks(&mut self, incoming: Vec<TaskConfig>) {
        for task in incoming {
            match self.tasks.iter_mut().find(|t| t.name == task.name) {
                Some(existing) => *existing = task,
                None => self.tasks.push(task),
            }
        }
    }

    /// Tasks to run: all of them, or the named subset in config order.
    pub fn select_tasks(&self, names: &[String]) -> Vec<TaskConfig> {
        if names.is_empty() {
            return self.tasks.clone();
        }
        self.tasks
            .iter()
            .filter(|t| names.iter().any(|n| n == &t.name))
            .cloned()
            .collect()
    }
}
