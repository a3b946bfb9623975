// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use nix::errno::Errno;
use nix::sys::signal::Signal;
use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A value rejected by a bounded record field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("{field} is {len} bytes, limit is {max}")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("{field} contains a NUL byte")]
    Nul { field: &'static str },
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("reading state file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("writing state file {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("state file {} is not usable: {reason}", path.display())]
    Format { path: PathBuf, reason: String },
    #[error("locking state file {}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("service '{0}' already exists")]
    DuplicateName(String),
    #[error(transparent)]
    Field(#[from] FieldError),
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("service '{0}' not found")]
    UnknownService(String),
    #[error("service '{name}' is already running (pid {pid}), use restart instead")]
    AlreadyRunning { name: String, pid: i32 },
    #[error("service '{0}' is not running")]
    NotRunning(String),
    #[error("failed to spawn '{name}'")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to send {signal} to '{name}' (pid {pid})")]
    Signal {
        name: String,
        pid: i32,
        signal: Signal,
        #[source]
        source: Errno,
    },
    #[error("failed to probe '{name}' (pid {pid})")]
    Probe {
        name: String,
        pid: i32,
        #[source]
        source: Errno,
    },
    #[error("cannot remove '{name}': pid {pid} is also recorded for '{other}'")]
    PidConflict {
        name: String,
        pid: i32,
        other: String,
    },
    #[error("restart of '{name}' aborted")]
    RestartAborted {
        name: String,
        #[source]
        source: Box<SupervisorError>,
    },
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Field(#[from] FieldError),
}

pub type Result<T, E = SupervisorError> = std::result::Result<T, E>;

/// Render `err` and its sources as `outer: cause: root`, matching how the
/// binary prints `anyhow` errors.
pub fn chain(err: &dyn StdError) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
