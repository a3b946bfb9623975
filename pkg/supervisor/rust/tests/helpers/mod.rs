// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

#![allow(dead_code)]

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{Duration, Instant};
use supervisor::{ProcessTable, ServiceRecord};
use supervisor_log::Logger;
use tempfile::TempDir;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub const SLEEPER: &str = "exec sleep 300\n";
pub const STUBBORN: &str = "trap '' TERM\nwhile :; do sleep 1; done\n";

/// A scratch directory holding a config file, the state file, both log
/// streams and the service scripts for one test.
pub struct Workspace {
    dir: TempDir,
}

/// Result of one CLI invocation.
pub struct Run {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Run {
    fn from_output(output: Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl Workspace {
    /// Services run as `/bin/sh <script>`; stops escalate after one second.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create workspace");
        let ws = Self { dir };
        ws.write_config(&format!(
            "state_file: {state}\n\
             stop_grace_secs: 1\n\
             launcher:\n  program: /bin/sh\n\
             logging:\n  level: debug\n\
             \x20 table:\n    file: {table}\n\
             \x20 lifecycle:\n    file: {lifecycle}\n",
            state = ws.state_file().display(),
            table = ws.table_log().display(),
            lifecycle = ws.lifecycle_log().display(),
        ));
        ws
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_file(&self) -> PathBuf {
        self.path().join("supervisor.yaml")
    }

    pub fn state_file(&self) -> PathBuf {
        self.path().join("state").join("processes.dat")
    }

    pub fn table_log(&self) -> PathBuf {
        self.path().join("logs").join("process_table.log")
    }

    pub fn lifecycle_log(&self) -> PathBuf {
        self.path().join("logs").join("supervisor.log")
    }

    pub fn write_config(&self, yaml: &str) {
        std::fs::write(self.config_file(), yaml)
            .unwrap_or_else(|e| panic!("failed to write config: {e}"));
    }

    /// Write a service script and return its path as a CLI argument.
    pub fn script(&self, name: &str, body: &str) -> String {
        let path = self.path().join(format!("{name}.sh"));
        std::fs::write(&path, body)
            .unwrap_or_else(|e| panic!("failed to write {}: {e}", path.display()));
        path.to_str().expect("non-UTF-8 temp path").to_string()
    }

    /// Run the binary with `--config` pointing at this workspace.
    pub fn run(&self, args: &[&str]) -> Run {
        let output = Command::new(env!("CARGO_BIN_EXE_supervisor"))
            .arg("--config")
            .arg(self.config_file())
            .args(args)
            .current_dir(self.path())
            .output()
            .expect("failed to run supervisor");
        let run = Run::from_output(output);
        eprintln!(
            "[supervisor {}] exit={:?}\n{}{}",
            args.join(" "),
            run.code,
            run.stdout,
            run.stderr
        );
        run
    }

    /// Start `name` running `body`, asserting success.
    pub fn start(&self, name: &str, body: &str, extra: &[&str]) -> ServiceRecord {
        let script = self.script(name, body);
        let mut args = vec!["start", name, script.as_str()];
        args.extend_from_slice(extra);
        let run = self.run(&args);
        assert!(run.success(), "start {name} failed: {}", run.stderr);
        self.record(name).expect("started service missing from state file")
    }

    pub fn records(&self) -> Vec<ServiceRecord> {
        match ProcessTable::load(self.state_file(), Logger::disabled()) {
            Ok(table) => table.iter().cloned().collect(),
            Err(e) => panic!("failed to load state file: {e}"),
        }
    }

    pub fn record(&self, name: &str) -> Option<ServiceRecord> {
        self.records().into_iter().find(|r| r.name == name)
    }

    pub fn state_bytes(&self) -> Option<Vec<u8>> {
        std::fs::read(self.state_file()).ok()
    }

    pub fn read_log(&self, path: &Path) -> String {
        std::fs::read_to_string(path).unwrap_or_default()
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let Ok(table) = ProcessTable::load(self.state_file(), Logger::disabled()) else {
            return;
        };
        for record in table.iter().filter(|r| r.running && r.pid > 0) {
            let _ = signal::kill(Pid::from_raw(record.pid), Signal::SIGKILL);
        }
    }
}

/// Check if a PID is still alive, counting zombies as gone.
pub fn pid_is_alive(pid: i32) -> bool {
    if signal::kill(Pid::from_raw(pid), None).is_err() {
        return false;
    }
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).unwrap_or_default();
    let state = stat
        .rsplit_once(')')
        .and_then(|(_, rest)| rest.trim_start().chars().next());
    !matches!(state, Some('Z') | Some('X'))
}

/// Wait until a PID is no longer alive, or timeout.
pub fn wait_for_pid_gone(pid: i32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !pid_is_alive(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

pub fn kill(pid: i32) {
    let _ = signal::kill(Pid::from_raw(pid), Signal::SIGKILL);
    assert!(
        wait_for_pid_gone(pid, DEFAULT_TIMEOUT),
        "pid {pid} survived SIGKILL"
    );
}
