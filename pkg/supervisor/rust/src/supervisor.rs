// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Service lifecycle: start, stop, restart, status, the monitor sweep and
//! removal. Every operation works against a [`ProcessTable`] the caller
//! loaded, and leaves saving to the caller unless stated otherwise.

use crate::env::parse_environment_file;
use crate::error::{Result, SupervisorError, chain};
use crate::process::{self, HostProcesses, Launcher, ProcessControl};
use crate::record::{FsPath, Name, RestartPolicy, ServiceRecord, now_seconds};
use crate::shutdown::{self, DEFAULT_STOP_GRACE};
use crate::state::{Liveness, StopOutcome};
use crate::table::ProcessTable;
use std::path::Path;
use std::time::Duration;
use supervisor_log::{Logger, error, info, warn};

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub launcher: Launcher,
    /// How long a stop waits after SIGTERM before sending SIGKILL.
    pub stop_grace: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            launcher: Launcher::default(),
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }
}

/// Arguments of a start request, validated by [`Supervisor::start`].
#[derive(Debug, Clone, Default)]
pub struct StartRequest {
    pub name: String,
    pub path: String,
    pub restart_policy: RestartPolicy,
    pub port: u16,
    pub env_path: Option<String>,
    pub log_path: Option<String>,
}

/// What one monitor sweep did, by service name.
#[derive(Debug, Default)]
pub struct MonitorReport {
    pub checked: usize,
    pub alive: Vec<String>,
    pub restarted: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, SupervisorError)>,
}

pub struct Supervisor {
    log: Logger,
    options: SupervisorOptions,
    control: Box<dyn ProcessControl>,
}

impl Supervisor {
    pub fn new(log: Logger, options: SupervisorOptions) -> Self {
        Self {
            log,
            options,
            control: Box::new(HostProcesses),
        }
    }

    /// Replace how service processes are probed and signalled.
    pub fn with_control(mut self, control: impl ProcessControl + 'static) -> Self {
        self.control = Box::new(control);
        self
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.options
    }

    /// Spawn the service described by `record` and mark it running.
    ///
    /// An unreadable environment file is logged and the service starts
    /// without it. On spawn failure the record is left untouched.
    pub fn launch(&self, record: &mut ServiceRecord) -> Result<()> {
        let env = match &record.env_path {
            Some(env_path) => match parse_environment_file(Path::new(env_path.as_str())) {
                Ok(vars) => vars,
                Err(e) => {
                    warn!(
                        self.log,
                        "start: '{}': {e:#}, continuing without it",
                        record.name
                    );
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        let output = record.log_path.as_deref().map(Path::new);

        let pid = process::spawn_detached(&self.options.launcher, &record.path, &env, output)
            .map_err(|source| {
                error!(
                    self.log,
                    "start: failed to spawn '{}' ({}): {source}",
                    record.name,
                    record.path
                );
                SupervisorError::Spawn {
                    name: record.name.to_string(),
                    source,
                }
            })?;

        record.pid = pid;
        record.running = true;
        record.start_time = now_seconds();
        info!(
            self.log,
            "start: started '{}' (pid {pid}, port {}, policy {})",
            record.name,
            record.port,
            record.restart_policy
        );
        Ok(())
    }

    /// Start a service by name and save the table.
    ///
    /// A name that is already running is refused. A known name whose process
    /// is dead is relaunched in place with the new arguments, keeping its
    /// position and restart count. A new name is appended. When the save
    /// fails the new process is killed and the table is left as it was, so
    /// nothing runs that the state file does not know about.
    pub fn start(
        &self,
        table: &mut ProcessTable,
        request: StartRequest,
    ) -> Result<ServiceRecord> {
        let name = Name::non_empty("name", &request.name)?;
        let path = FsPath::non_empty("path", &request.path)?;
        let env_path = request
            .env_path
            .as_deref()
            .map(|p| FsPath::non_empty("env_path", p))
            .transpose()?;
        let log_path = request
            .log_path
            .as_deref()
            .map(|p| FsPath::non_empty("log_path", p))
            .transpose()?;

        if let Some(existing) = table.get_mut(&name) {
            if self.status(existing)?.is_alive() {
                warn!(
                    self.log,
                    "start: '{}' is already running (pid {})",
                    existing.name,
                    existing.pid
                );
                return Err(SupervisorError::AlreadyRunning {
                    name: existing.name.to_string(),
                    pid: existing.pid,
                });
            }
            let previous = existing.clone();
            let mut updated = previous.clone();
            updated.path = path;
            updated.env_path = env_path;
            updated.log_path = log_path;
            updated.port = request.port;
            updated.restart_policy = request.restart_policy;
            self.launch(&mut updated)?;
            *existing = updated.clone();
            if let Err(e) = table.save() {
                self.discard(&updated);
                if let Some(record) = table.get_mut(&updated.name) {
                    *record = previous;
                }
                return Err(e.into());
            }
            return Ok(updated);
        }

        let mut record = ServiceRecord::new(name, path, request.restart_policy);
        record.env_path = env_path;
        record.log_path = log_path;
        record.port = request.port;
        self.launch(&mut record)?;
        table.append(record.clone(), false)?;
        if let Err(e) = table.save() {
            self.discard(&record);
            table.take(&record.name);
            return Err(e.into());
        }
        Ok(record)
    }

    fn discard(&self, record: &ServiceRecord) {
        error!(
            self.log,
            "start: could not save '{}', killing pid {}",
            record.name,
            record.pid
        );
        process::discard_child(record.pid);
    }

    /// Stop a running service: SIGTERM, then SIGKILL once the grace period
    /// runs out. The record is marked not running whatever the outcome.
    pub async fn stop(&self, record: &mut ServiceRecord) -> Result<StopOutcome> {
        if !record.running {
            warn!(self.log, "stop: '{}' is not running", record.name);
            return Err(SupervisorError::NotRunning(record.name.to_string()));
        }
        info!(
            self.log,
            "stop: sending SIGTERM to '{}' (pid {})",
            record.name,
            record.pid
        );
        let outcome = shutdown::terminate(
            self.control.as_ref(),
            &self.log,
            &record.name,
            record.pid,
            self.options.stop_grace,
        )
        .await
        .map_err(|failure| {
            error!(
                self.log,
                "stop: failed to send {} to '{}' (pid {}): {}",
                failure.signal,
                record.name,
                record.pid,
                failure.errno
            );
            SupervisorError::Signal {
                name: record.name.to_string(),
                pid: record.pid,
                signal: failure.signal,
                source: failure.errno,
            }
        })?;
        record.running = false;
        info!(
            self.log,
            "stop: '{}' (pid {}) {outcome}",
            record.name,
            record.pid
        );
        Ok(outcome)
    }

    /// Stop the service if it is running, launch it again and bump its
    /// restart count. A pid that cannot be probed is treated as gone and is
    /// never signalled. Any other failure aborts with the record as it was
    /// left.
    pub async fn restart(&self, record: &mut ServiceRecord) -> Result<()> {
        let name = record.name.to_string();
        info!(self.log, "restart: restarting '{name}'");
        let abort = |source: SupervisorError| SupervisorError::RestartAborted {
            name: name.clone(),
            source: Box::new(source),
        };

        if let Err(e) = self.status(record) {
            warn!(self.log, "restart: {}, launching a new process", chain(&e));
            record.running = false;
        }
        if record.running
            && let Err(e) = self.stop(record).await
        {
            error!(self.log, "restart: '{name}': {}", chain(&e));
            return Err(abort(e));
        }
        if let Err(e) = self.launch(record) {
            return Err(abort(e));
        }
        record.restart_count = record.restart_count.saturating_add(1);
        info!(
            self.log,
            "restart: '{}' restarted (pid {}, restart #{})",
            record.name,
            record.pid,
            record.restart_count
        );
        Ok(())
    }

    /// Probe the record's pid and sync `running` with the answer.
    pub fn status(&self, record: &mut ServiceRecord) -> Result<Liveness> {
        match self.control.probe(record.pid) {
            Ok(Liveness::Alive) => {
                record.running = true;
                info!(
                    self.log,
                    "status: '{}' (pid {}) is running, restarts: {}, uptime: {}s",
                    record.name,
                    record.pid,
                    record.restart_count,
                    record.uptime().whole_seconds()
                );
                Ok(Liveness::Alive)
            }
            Ok(Liveness::Dead) => {
                record.running = false;
                info!(
                    self.log,
                    "status: '{}' (pid {}) is NOT running",
                    record.name,
                    record.pid
                );
                Ok(Liveness::Dead)
            }
            Err(source) => {
                warn!(
                    self.log,
                    "status: cannot probe '{}' (pid {}): {source}",
                    record.name,
                    record.pid
                );
                Err(SupervisorError::Probe {
                    name: record.name.to_string(),
                    pid: record.pid,
                    source,
                })
            }
        }
    }

    /// One pass over the table in order: refresh every record and restart
    /// the dead ones whose policy asks for it. A failure on one service is
    /// recorded and the sweep moves on.
    pub async fn monitor_all(&self, table: &mut ProcessTable) -> MonitorReport {
        let mut report = MonitorReport::default();
        if table.is_empty() {
            info!(self.log, "monitor: no services registered");
            return report;
        }

        for record in table.iter_mut() {
            report.checked += 1;
            let name = record.name.to_string();
            // An unprobeable pid is treated as down.
            let liveness = self.status(record).unwrap_or(Liveness::Dead);
            if liveness.is_alive() {
                report.alive.push(name);
                continue;
            }

            let policy = record.restart_policy;
            if !policy.restarts_when_down() {
                info!(
                    self.log,
                    "monitor: '{name}' is down, policy {policy}, leaving it stopped"
                );
                report.skipped.push(name);
                continue;
            }

            info!(self.log, "monitor: '{name}' is down, policy {policy}, restarting");
            match self.restart(record).await {
                Ok(()) => report.restarted.push(name),
                Err(e) => {
                    error!(self.log, "monitor: {}", chain(&e));
                    report.failed.push((name, e));
                }
            }
        }
        report
    }

    /// Stop the named service if it is running, then delete its record and
    /// save the table.
    ///
    /// The table deletes by pid, first match. A name whose pid is also held
    /// by an earlier record is refused before anything is stopped, since the
    /// delete would hit the earlier record.
    pub async fn remove(&self, table: &mut ProcessTable, name: &str) -> Result<ServiceRecord> {
        let pid = table
            .get(name)
            .ok_or_else(|| SupervisorError::UnknownService(name.to_string()))?
            .pid;
        if let Some(other) = table.iter().find(|r| r.pid == pid)
            && other.name != name
        {
            warn!(
                self.log,
                "remove: '{name}' shares pid {pid} with '{}', refusing",
                other.name
            );
            return Err(SupervisorError::PidConflict {
                name: name.to_string(),
                pid,
                other: other.name.to_string(),
            });
        }
        let record = table
            .get_mut(name)
            .ok_or_else(|| SupervisorError::UnknownService(name.to_string()))?;
        if let Err(e) = self.status(record) {
            warn!(self.log, "remove: {}, removing anyway", chain(&e));
        }
        if record.running {
            self.stop(record).await?;
        }
        let removed = record.clone();
        if !table.remove(removed.pid)? {
            return Err(SupervisorError::UnknownService(name.to_string()));
        }
        info!(self.log, "remove: removed '{name}'");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::tests::{
        FOREIGN_PID, ForeignProcess, kill_quietly, sh_launcher, wait_until_dead, write_script,
    };
    use crate::table::tests::make_record;
    use nix::errno::Errno;
    use nix::sys::signal::Signal;
    use tempfile::TempDir;

    const SLEEPER: &str = "exec sleep 60\n";

    fn broken_launcher() -> SupervisorOptions {
        SupervisorOptions {
            launcher: Launcher {
                program: "/nonexistent/java".to_string(),
                args: vec!["-jar".to_string()],
            },
            ..Default::default()
        }
    }

    fn supervisor_with(control: ForeignProcess) -> Supervisor {
        Supervisor::new(
            Logger::disabled(),
            SupervisorOptions {
                launcher: sh_launcher(),
                stop_grace: Duration::from_millis(500),
            },
        )
        .with_control(control)
    }

    struct Fixture {
        dir: TempDir,
        supervisor: Supervisor,
        table: ProcessTable,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let supervisor = Supervisor::new(
                Logger::disabled(),
                SupervisorOptions {
                    launcher: sh_launcher(),
                    stop_grace: Duration::from_millis(500),
                },
            );
            let table = ProcessTable::new(dir.path().join("processes.dat"), Logger::disabled());
            Self {
                dir,
                supervisor,
                table,
            }
        }

        fn request(&self, name: &str, body: &str, policy: RestartPolicy) -> StartRequest {
            StartRequest {
                name: name.to_string(),
                path: write_script(self.dir.path(), name, body),
                restart_policy: policy,
                ..Default::default()
            }
        }

        fn start(&mut self, name: &str, body: &str, policy: RestartPolicy) -> ServiceRecord {
            let request = self.request(name, body, policy);
            self.supervisor.start(&mut self.table, request).unwrap()
        }

        /// Make every save fail: the state path becomes a non-empty
        /// directory, which the final rename cannot replace.
        fn block_state_file(&self) {
            let path = self.table.path();
            if path.exists() {
                std::fs::remove_file(path).unwrap();
            }
            std::fs::create_dir(path).unwrap();
            std::fs::write(path.join("keep"), "").unwrap();
        }

        fn reload(&self) -> ProcessTable {
            ProcessTable::load(self.table.path(), Logger::disabled()).unwrap()
        }

        fn names(table: &ProcessTable) -> Vec<String> {
            table.iter().map(|r| r.name.to_string()).collect()
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            for record in self.table.iter().filter(|r| r.running) {
                kill_quietly(record.pid);
            }
        }
    }

    #[tokio::test]
    async fn test_start_persists_running_record() {
        let mut fx = Fixture::new();
        let mut request = fx.request("api", SLEEPER, RestartPolicy::Always);
        request.port = 8080;

        let record = fx.supervisor.start(&mut fx.table, request).unwrap();
        assert!(record.running);
        assert!(record.pid > 0);
        assert_eq!(record.port, 8080);
        assert_eq!(record.restart_count, 0);
        assert_eq!(record.start_time.nanosecond(), 0);
        assert_eq!(process::probe(record.pid), Ok(Liveness::Alive));

        assert_eq!(fx.reload().get("api"), Some(&record));
    }

    #[tokio::test]
    async fn test_start_refuses_running_name() {
        let mut fx = Fixture::new();
        let first = fx.start("api", SLEEPER, RestartPolicy::Never);

        let request = fx.request("api", SLEEPER, RestartPolicy::Never);
        let err = fx.supervisor.start(&mut fx.table, request).unwrap_err();
        assert!(
            matches!(err, SupervisorError::AlreadyRunning { pid, .. } if pid == first.pid)
        );
        assert_eq!(fx.table.len(), 1);
        assert_eq!(fx.table.get("api").unwrap().pid, first.pid);
    }

    #[tokio::test]
    async fn test_start_relaunches_dead_record_in_place() {
        let mut fx = Fixture::new();
        fx.start("first", SLEEPER, RestartPolicy::Never);
        let old = fx.start("api", SLEEPER, RestartPolicy::Never);
        fx.table.get_mut("api").unwrap().restart_count = 3;
        kill_quietly(old.pid);

        let mut request = fx.request("api", SLEEPER, RestartPolicy::Always);
        request.port = 9090;
        let new = fx.supervisor.start(&mut fx.table, request).unwrap();

        assert_ne!(new.pid, old.pid);
        assert_eq!(new.port, 9090);
        assert_eq!(new.restart_policy, RestartPolicy::Always);
        assert_eq!(new.restart_count, 3);
        assert_eq!(Fixture::names(&fx.table), vec!["first", "api"]);
        assert_eq!(fx.reload().get("api"), Some(&new));
    }

    #[tokio::test]
    async fn test_start_rejects_bad_fields() {
        let mut fx = Fixture::new();
        let mut request = fx.request("api", SLEEPER, RestartPolicy::Never);
        request.name = "x".repeat(65);
        assert!(matches!(
            fx.supervisor.start(&mut fx.table, request),
            Err(SupervisorError::Field(_))
        ));

        let request = StartRequest {
            name: "api".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            fx.supervisor.start(&mut fx.table, request),
            Err(SupervisorError::Field(_))
        ));
        assert!(fx.table.is_empty());
    }

    #[tokio::test]
    async fn test_start_spawn_failure_leaves_table_untouched() {
        let mut fx = Fixture::new();
        fx.supervisor = Supervisor::new(Logger::disabled(), broken_launcher());

        let request = fx.request("api", SLEEPER, RestartPolicy::Never);
        let err = fx.supervisor.start(&mut fx.table, request).unwrap_err();
        assert!(matches!(err, SupervisorError::Spawn { .. }));
        assert!(fx.table.is_empty());
        assert!(!fx.table.path().exists());
    }

    #[tokio::test]
    async fn test_start_applies_env_file_and_log_path() {
        let mut fx = Fixture::new();
        let env = fx.dir.path().join("api.env");
        std::fs::write(&env, "# comment\nGREETING=hello world\n").unwrap();
        let out = fx.dir.path().join("api.out");

        let mut request = fx.request("api", "echo \"$GREETING\"\n", RestartPolicy::Never);
        request.env_path = Some(env.to_str().unwrap().to_string());
        request.log_path = Some(out.to_str().unwrap().to_string());
        let record = fx.supervisor.start(&mut fx.table, request).unwrap();

        assert!(wait_until_dead(record.pid, Duration::from_secs(5)));
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "hello world\n");
    }

    #[tokio::test]
    async fn test_start_with_missing_env_file_still_starts() {
        let mut fx = Fixture::new();
        let mut request = fx.request("api", SLEEPER, RestartPolicy::Never);
        request.env_path = Some("/nonexistent/api.env".to_string());
        let record = fx.supervisor.start(&mut fx.table, request).unwrap();
        assert!(record.running);
    }

    #[tokio::test]
    async fn test_stop_graceful() {
        let mut fx = Fixture::new();
        fx.start("api", SLEEPER, RestartPolicy::Never);

        let record = fx.table.get_mut("api").unwrap();
        let outcome = fx.supervisor.stop(record).await.unwrap();
        assert_eq!(outcome, StopOutcome::Graceful);
        assert!(!record.running);
        assert_eq!(process::probe(record.pid), Ok(Liveness::Dead));
    }

    #[tokio::test]
    async fn test_stop_forces_stubborn_process() {
        let mut fx = Fixture::new();
        fx.start(
            "stubborn",
            "trap '' TERM\nwhile :; do sleep 1; done\n",
            RestartPolicy::Never,
        );
        tokio::time::sleep(Duration::from_millis(200)).await;

        let record = fx.table.get_mut("stubborn").unwrap();
        let outcome = fx.supervisor.stop(record).await.unwrap();
        assert_eq!(outcome, StopOutcome::Forced);
        assert!(!record.running);
        assert_eq!(process::probe(record.pid), Ok(Liveness::Dead));
    }

    #[tokio::test]
    async fn test_stop_not_running() {
        let fx = Fixture::new();
        let mut record = make_record("idle", 0, RestartPolicy::Never);
        let err = fx.supervisor.stop(&mut record).await.unwrap_err();
        assert!(matches!(err, SupervisorError::NotRunning(ref n) if n == "idle"));
    }

    #[tokio::test]
    async fn test_stop_process_that_already_died() {
        let mut fx = Fixture::new();
        let started = fx.start("brief", "exit 0\n", RestartPolicy::Never);
        assert!(wait_until_dead(started.pid, Duration::from_secs(5)));

        let record = fx.table.get_mut("brief").unwrap();
        assert!(record.running, "nothing has refreshed the record yet");
        let outcome = fx.supervisor.stop(record).await.unwrap();
        assert_eq!(outcome, StopOutcome::AlreadyExited);
        assert!(!record.running);
    }

    #[tokio::test]
    async fn test_restart_bumps_count_and_pid() {
        let mut fx = Fixture::new();
        let first = fx.start("api", SLEEPER, RestartPolicy::Never);

        let record = fx.table.get_mut("api").unwrap();
        fx.supervisor.restart(record).await.unwrap();
        assert_eq!(record.restart_count, 1);
        assert_ne!(record.pid, first.pid);
        assert!(record.running);
        assert_eq!(process::probe(first.pid), Ok(Liveness::Dead));

        fx.supervisor.restart(record).await.unwrap();
        assert_eq!(record.restart_count, 2);
    }

    #[tokio::test]
    async fn test_restart_of_stopped_service_only_launches() {
        let mut fx = Fixture::new();
        fx.start("api", SLEEPER, RestartPolicy::Never);
        let record = fx.table.get_mut("api").unwrap();
        fx.supervisor.stop(record).await.unwrap();

        fx.supervisor.restart(record).await.unwrap();
        assert!(record.running);
        assert_eq!(record.restart_count, 1);
    }

    #[tokio::test]
    async fn test_restart_aborts_on_spawn_failure() {
        let mut fx = Fixture::new();
        fx.start("api", SLEEPER, RestartPolicy::Never);
        let record = fx.table.get_mut("api").unwrap();
        fx.supervisor.stop(record).await.unwrap();

        let broken = Supervisor::new(Logger::disabled(), broken_launcher());
        let err = broken.restart(record).await.unwrap_err();
        assert!(matches!(err, SupervisorError::RestartAborted { ref name, .. } if name == "api"));
        assert_eq!(record.restart_count, 0);
        assert!(!record.running);
    }

    #[tokio::test]
    async fn test_status_syncs_running_flag() {
        let mut fx = Fixture::new();
        let started = fx.start("api", SLEEPER, RestartPolicy::Never);

        let record = fx.table.get_mut("api").unwrap();
        assert_eq!(fx.supervisor.status(record).unwrap(), Liveness::Alive);
        assert!(record.running);

        kill_quietly(started.pid);
        assert_eq!(fx.supervisor.status(record).unwrap(), Liveness::Dead);
        assert!(!record.running);

        let snapshot = record.clone();
        assert_eq!(fx.supervisor.status(record).unwrap(), Liveness::Dead);
        assert_eq!(*record, snapshot);
    }

    #[tokio::test]
    async fn test_monitor_restarts_per_policy() {
        let mut fx = Fixture::new();
        for (name, policy) in [
            ("never", RestartPolicy::Never),
            ("on-failure", RestartPolicy::OnFailure),
            ("always", RestartPolicy::Always),
            ("healthy", RestartPolicy::Always),
        ] {
            fx.start(name, SLEEPER, policy);
        }
        let before: Vec<i32> = fx.table.iter().map(|r| r.pid).collect();
        for pid in &before[..3] {
            kill_quietly(*pid);
        }

        let report = fx.supervisor.monitor_all(&mut fx.table).await;
        assert_eq!(report.checked, 4);
        assert_eq!(report.alive, vec!["healthy"]);
        assert_eq!(report.skipped, vec!["never"]);
        assert_eq!(report.restarted, vec!["on-failure", "always"]);
        assert!(report.failed.is_empty());

        let never = fx.table.get("never").unwrap();
        assert!(!never.running);
        assert_eq!(never.restart_count, 0);
        for name in ["on-failure", "always"] {
            let rec = fx.table.get(name).unwrap();
            assert!(rec.running);
            assert_eq!(rec.restart_count, 1);
        }
        let healthy = fx.table.get("healthy").unwrap();
        assert_eq!(healthy.pid, before[3]);
        assert_eq!(healthy.restart_count, 0);
    }

    #[tokio::test]
    async fn test_monitor_empty_table() {
        let mut fx = Fixture::new();
        let report = fx.supervisor.monitor_all(&mut fx.table).await;
        assert_eq!(report.checked, 0);
    }

    #[tokio::test]
    async fn test_monitor_continues_past_failures() {
        let mut fx = Fixture::new();
        fx.start("first", SLEEPER, RestartPolicy::Always);
        fx.start("second", SLEEPER, RestartPolicy::OnFailure);
        let pids: Vec<i32> = fx.table.iter().map(|r| r.pid).collect();
        for pid in pids {
            kill_quietly(pid);
        }

        let sweeper = Supervisor::new(Logger::disabled(), broken_launcher());
        let report = sweeper.monitor_all(&mut fx.table).await;
        assert_eq!(report.checked, 2);
        let failed: Vec<&str> = report.failed.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(failed, vec!["first", "second"]);
        assert!(fx.table.iter().all(|r| !r.running && r.restart_count == 0));
    }

    #[tokio::test]
    async fn test_remove_stops_and_deletes() {
        let mut fx = Fixture::new();
        fx.start("api", SLEEPER, RestartPolicy::Always);
        fx.start("cache", SLEEPER, RestartPolicy::Never);

        let removed = fx.supervisor.remove(&mut fx.table, "api").await.unwrap();
        assert!(!removed.running);
        assert_eq!(process::probe(removed.pid), Ok(Liveness::Dead));
        assert!(fx.table.get("api").is_none());
        assert_eq!(Fixture::names(&fx.reload()), vec!["cache"]);
    }

    #[tokio::test]
    async fn test_remove_unknown_name() {
        let mut fx = Fixture::new();
        let err = fx.supervisor.remove(&mut fx.table, "ghost").await.unwrap_err();
        assert!(matches!(err, SupervisorError::UnknownService(ref n) if n == "ghost"));
    }

    #[tokio::test]
    async fn test_start_kills_new_service_when_save_fails() {
        let mut fx = Fixture::new();
        fx.block_state_file();
        let pid_file = fx.dir.path().join("api.pid");
        let body = format!("echo $$ > {}\nexec sleep 60\n", pid_file.display());

        let request = fx.request("api", &body, RestartPolicy::Always);
        let err = fx.supervisor.start(&mut fx.table, request).unwrap_err();
        assert!(matches!(err, SupervisorError::Table(_)), "{err:?}");
        assert!(fx.table.is_empty());

        // The child may be killed before it gets to write its pid.
        let written = std::fs::read_to_string(&pid_file)
            .ok()
            .and_then(|pid| pid.trim().parse::<i32>().ok());
        if let Some(pid) = written {
            assert_eq!(process::probe(pid), Ok(Liveness::Dead));
        }
    }

    #[tokio::test]
    async fn test_start_restores_record_when_relaunch_save_fails() {
        let mut fx = Fixture::new();
        let old = fx.start("api", SLEEPER, RestartPolicy::Never);
        kill_quietly(old.pid);
        fx.block_state_file();

        let request = fx.request("api", SLEEPER, RestartPolicy::Always);
        let err = fx.supervisor.start(&mut fx.table, request).unwrap_err();
        assert!(matches!(err, SupervisorError::Table(_)), "{err:?}");

        let record = fx.table.get("api").unwrap();
        assert_eq!(record.pid, old.pid);
        assert_eq!(record.restart_policy, RestartPolicy::Never);
        assert!(!record.running);
        assert_eq!(fx.table.len(), 1);
    }

    #[tokio::test]
    async fn test_status_probe_error_leaves_record_unchanged() {
        let supervisor = supervisor_with(ForeignProcess::unprobeable());
        let mut record = make_record("api", FOREIGN_PID, RestartPolicy::Always);
        record.running = true;
        let snapshot = record.clone();

        let err = supervisor.status(&mut record).unwrap_err();
        assert!(matches!(
            err,
            SupervisorError::Probe {
                pid: FOREIGN_PID,
                source: Errno::EPERM,
                ..
            }
        ));
        assert_eq!(record, snapshot);
    }

    #[tokio::test]
    async fn test_monitor_restarts_service_whose_pid_cannot_be_probed() {
        let mut fx = Fixture::new();
        fx.supervisor = supervisor_with(ForeignProcess::unprobeable());
        let started = fx.start("api", SLEEPER, RestartPolicy::Always);
        kill_quietly(started.pid);
        // The pid was recycled for a process owned by someone else.
        fx.table.get_mut("api").unwrap().pid = FOREIGN_PID;

        let report = fx.supervisor.monitor_all(&mut fx.table).await;
        assert_eq!(report.restarted, vec!["api"]);
        assert!(report.failed.is_empty());

        let record = fx.table.get("api").unwrap();
        assert!(record.running);
        assert_ne!(record.pid, FOREIGN_PID);
        assert_eq!(record.restart_count, 1);
        assert_eq!(process::probe(record.pid), Ok(Liveness::Alive));
    }

    #[tokio::test]
    async fn test_stop_refused_signal_keeps_record_running() {
        let supervisor = supervisor_with(ForeignProcess::unkillable());
        let mut record = make_record("api", FOREIGN_PID, RestartPolicy::Never);
        record.running = true;

        let err = supervisor.stop(&mut record).await.unwrap_err();
        assert!(matches!(
            err,
            SupervisorError::Signal {
                signal: Signal::SIGTERM,
                source: Errno::EPERM,
                ..
            }
        ));
        assert!(record.running);
    }

    #[tokio::test]
    async fn test_restart_aborts_when_stop_is_refused() {
        let supervisor = supervisor_with(ForeignProcess::unkillable());
        let mut record = make_record("api", FOREIGN_PID, RestartPolicy::Always);
        record.running = true;
        record.restart_count = 4;

        let err = supervisor.restart(&mut record).await.unwrap_err();
        match err {
            SupervisorError::RestartAborted { source, .. } => {
                assert!(matches!(*source, SupervisorError::Signal { .. }), "{source:?}");
            }
            other => panic!("expected an aborted restart, got {other:?}"),
        }
        assert_eq!(record.restart_count, 4);
        assert_eq!(record.pid, FOREIGN_PID);
        assert!(record.running);
    }

    #[tokio::test]
    async fn test_remove_refuses_pid_held_by_earlier_record() {
        let mut fx = Fixture::new();
        let stale = fx.start("old", SLEEPER, RestartPolicy::Never);
        kill_quietly(stale.pid);
        let api = fx.start("api", SLEEPER, RestartPolicy::Never);
        // "old" kept its pid after dying and the OS handed it to "api".
        let old = fx.table.get_mut("old").unwrap();
        old.pid = api.pid;
        old.running = false;

        let err = fx.supervisor.remove(&mut fx.table, "api").await.unwrap_err();
        assert!(matches!(
            err,
            SupervisorError::PidConflict { ref other, pid, .. } if other == "old" && pid == api.pid
        ));
        assert_eq!(Fixture::names(&fx.table), vec!["old", "api"]);
        assert!(fx.table.get("api").unwrap().running);
        assert_eq!(process::probe(api.pid), Ok(Liveness::Alive));
    }
}
