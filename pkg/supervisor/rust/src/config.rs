// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::process::Launcher;
use crate::supervisor::SupervisorOptions;
use anyhow::{Context, Result};
use log::LevelFilter;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use supervisor_log::Logger;

pub const DEFAULT_CONFIG_FILE: &str = "supervisor.yaml";

fn default_state_file() -> PathBuf {
    PathBuf::from("state/processes.dat")
}

fn default_stop_grace_secs() -> u64 {
    5
}

fn default_level() -> String {
    "info".to_string()
}

fn default_table_stream() -> StreamConfig {
    StreamConfig {
        file: Some(PathBuf::from("logs/process_table.log")),
        stdout: false,
    }
}

fn default_lifecycle_stream() -> StreamConfig {
    StreamConfig {
        file: Some(PathBuf::from("logs/supervisor.log")),
        stdout: false,
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,
    #[serde(default)]
    pub launcher: Launcher,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// Table operations (load, append, remove, save).
    #[serde(default = "default_table_stream")]
    pub table: StreamConfig,
    /// Service lifecycle events (start, stop, restart, monitor).
    #[serde(default = "default_lifecycle_stream")]
    pub lifecycle: StreamConfig,
}

/// Destination of one log stream. No file and no stdout disables it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamConfig {
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub stdout: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            stop_grace_secs: default_stop_grace_secs(),
            launcher: Launcher::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            table: default_table_stream(),
            lifecycle: default_lifecycle_stream(),
        }
    }
}

impl StreamConfig {
    pub fn open(&self, level: LevelFilter) -> Result<Logger> {
        let logger = Logger::open(self.file.as_deref(), self.stdout).with_context(|| {
            format!(
                "opening log file {}",
                self.file.as_deref().unwrap_or(Path::new("-")).display()
            )
        })?;
        Ok(logger.with_level(level))
    }
}

impl SupervisorConfig {
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    pub fn level(&self) -> Result<LevelFilter> {
        self.logging
            .level
            .parse()
            .with_context(|| format!("invalid log level '{}'", self.logging.level))
    }

    pub fn supervisor_options(&self) -> SupervisorOptions {
        SupervisorOptions {
            launcher: self.launcher.clone(),
            stop_grace: self.stop_grace(),
        }
    }
}

/// Load the configuration at `path`. A missing file yields the built-in
/// defaults, so a bare invocation needs no config at all.
pub fn load_config(path: &Path) -> Result<SupervisorConfig> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(SupervisorConfig::default());
        }
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    // An empty document deserializes as unit, not as an empty mapping.
    if contents.trim().is_empty() {
        return Ok(SupervisorConfig::default());
    }
    let config: SupervisorConfig =
        serde_yaml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
    Ok(config)
}
