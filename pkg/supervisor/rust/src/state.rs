// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fmt;

/// Result of a liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// The pid refers to a live (non-zombie) process.
    Alive,
    /// No such process, or it has exited and is awaiting or past reaping.
    Dead,
}

impl Liveness {
    pub fn is_alive(self) -> bool {
        self == Liveness::Alive
    }
}

impl fmt::Display for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Liveness::Alive => write!(f, "running"),
            Liveness::Dead => write!(f, "stopped"),
        }
    }
}

/// How a stop request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The process was already gone when SIGTERM was sent.
    AlreadyExited,
    /// Exited within the grace period after SIGTERM.
    Graceful,
    /// Grace period elapsed; SIGKILL was sent.
    Forced,
}

impl fmt::Display for StopOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopOutcome::AlreadyExited => write!(f, "already exited"),
            StopOutcome::Graceful => write!(f, "exited cleanly"),
            StopOutcome::Forced => write!(f, "killed"),
        }
    }
}
