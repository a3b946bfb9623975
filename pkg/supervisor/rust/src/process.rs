// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::state::Liveness;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{Pid, setsid};
use serde::Deserialize;
use std::fs::OpenOptions;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};

fn default_program() -> String {
    "java".to_string()
}

/// Runtime every service artifact is handed to: `<program> <args...> <path>`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Launcher {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for Launcher {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: vec!["-jar".to_string()],
        }
    }
}

/// Spawn `artifact` under `launcher` in a new session so it outlives the
/// caller. stdin is `/dev/null`; stdout and stderr go to `output` (appended)
/// or `/dev/null`. Returns the child's pid without waiting for it.
pub fn spawn_detached(
    launcher: &Launcher,
    artifact: &str,
    env: &[(String, String)],
    output: Option<&Path>,
) -> io::Result<i32> {
    let mut cmd = Command::new(&launcher.program);
    cmd.args(&launcher.args).arg(artifact);
    cmd.envs(env.iter().map(|(k, v)| (k, v)));
    cmd.stdin(Stdio::null());

    match output {
        Some(path) => {
            let out = OpenOptions::new().create(true).append(true).open(path)?;
            let err = out.try_clone()?;
            cmd.stdout(out).stderr(err);
        }
        None => {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
    }

    // SAFETY: setsid is async-signal-safe and only affects the forked child.
    unsafe {
        cmd.pre_exec(|| setsid().map(|_| ()).map_err(io::Error::from));
    }

    let child = cmd.spawn()?;
    Ok(child.id() as i32)
}

/// Non-disruptive liveness check.
///
/// Exited children of this process are reaped first, and zombies count as
/// dead. `ESRCH` is a normal "dead" answer; any other errno is returned.
/// Non-positive pids are dead without touching the OS, since `kill(0)` and
/// `kill(-1)` address process groups.
pub fn probe(pid: i32) -> Result<Liveness, Errno> {
    if pid <= 0 {
        return Ok(Liveness::Dead);
    }
    if reap(pid) {
        return Ok(Liveness::Dead);
    }
    match signal::kill(Pid::from_raw(pid), None) {
        Ok(()) if is_zombie(pid) => Ok(Liveness::Dead),
        Ok(()) => Ok(Liveness::Alive),
        Err(Errno::ESRCH) => Ok(Liveness::Dead),
        Err(e) => Err(e),
    }
}

/// Deliver `sig` to `pid`. Non-positive pids report `ESRCH`.
pub fn send_signal(pid: i32, sig: Signal) -> Result<(), Errno> {
    if pid <= 0 {
        return Err(Errno::ESRCH);
    }
    signal::kill(Pid::from_raw(pid), sig)
}

/// Collect the exit status of `pid` if it is an exited child of this
/// process. Returns true when something was reaped; `ECHILD` (not our child)
/// is simply false.
pub fn reap(pid: i32) -> bool {
    matches!(
        waitpid(Pid::from_raw(pid), Some(WaitPidFlag::WNOHANG)),
        Ok(WaitStatus::Exited(..) | WaitStatus::Signaled(..))
    )
}

#[cfg(target_os = "linux")]
fn is_zombie(pid: i32) -> bool {
    // Field 3 of /proc/<pid>/stat, after the parenthesised command name.
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            let (_, rest) = stat.rsplit_once(')')?;
            rest.trim_start().chars().next()
        })
        .is_some_and(|state| state == 'Z' || state == 'X')
}

#[cfg(not(target_os = "linux"))]
fn is_zombie(_pid: i32) -> bool {
    false
}

/// SIGKILL a child this process just spawned and wait for it, so nothing is
/// left running behind a failed operation.
pub fn discard_child(pid: i32) {
    if send_signal(pid, Signal::SIGKILL).is_ok() {
        let _ = waitpid(Pid::from_raw(pid), None);
    }
}

/// How the lifecycle engine observes and signals service processes.
pub trait ProcessControl: Send + Sync {
    fn probe(&self, pid: i32) -> Result<Liveness, Errno>;
    fn signal(&self, pid: i32, sig: Signal) -> Result<(), Errno>;
    fn reap(&self, pid: i32) -> bool;
}

/// The host's process table, reached through `kill` and `waitpid`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostProcesses;

impl ProcessControl for HostProcesses {
    fn probe(&self, pid: i32) -> Result<Liveness, Errno> {
        probe(pid)
    }

    fn signal(&self, pid: i32, sig: Signal) -> Result<(), Errno> {
        send_signal(pid, sig)
    }

    fn reap(&self, pid: i32) -> bool {
        reap(pid)
    }
}
