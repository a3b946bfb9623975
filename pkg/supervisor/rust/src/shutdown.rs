// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::process::ProcessControl;
use crate::state::{Liveness, StopOutcome};
use nix::errno::Errno;
use nix::sys::signal::Signal;
use supervisor_log::{Logger, warn};
use tokio::time::{Duration, sleep, timeout};

pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const SIGKILL_TIMEOUT: Duration = Duration::from_secs(10);

/// A signal the OS refused to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalFailure {
    pub signal: Signal,
    pub errno: Errno,
}

/// Send SIGTERM to `pid`, poll for exit for up to `grace`, then SIGKILL.
///
/// A pid that is already gone is reported as [`StopOutcome::AlreadyExited`].
/// Only a refused signal (e.g. `EPERM`) is an error.
pub async fn terminate(
    control: &dyn ProcessControl,
    log: &Logger,
    name: &str,
    pid: i32,
    grace: Duration,
) -> Result<StopOutcome, SignalFailure> {
    match control.signal(pid, Signal::SIGTERM) {
        Ok(()) => {}
        Err(Errno::ESRCH) => {
            control.reap(pid);
            return Ok(StopOutcome::AlreadyExited);
        }
        Err(errno) => {
            return Err(SignalFailure {
                signal: Signal::SIGTERM,
                errno,
            });
        }
    }

    if timeout(grace, wait_for_exit(control, pid)).await.is_ok() {
        return Ok(StopOutcome::Graceful);
    }

    warn!(
        log,
        "stop: '{name}' (pid {pid}) ignored SIGTERM for {}ms, sending SIGKILL",
        grace.as_millis()
    );
    match control.signal(pid, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(errno) => {
            return Err(SignalFailure {
                signal: Signal::SIGKILL,
                errno,
            });
        }
    }
    if timeout(SIGKILL_TIMEOUT, wait_for_exit(control, pid)).await.is_err() {
        warn!(log, "stop: '{name}' (pid {pid}) still running after SIGKILL, giving up");
    }
    Ok(StopOutcome::Forced)
}

async fn wait_for_exit(control: &dyn ProcessControl, pid: i32) {
    loop {
        // A probe error means the pid exists; keep waiting for the deadline.
        if control.probe(pid) == Ok(Liveness::Dead) {
            return;
        }
        sleep(POLL_INTERVAL).await;
    }
}
