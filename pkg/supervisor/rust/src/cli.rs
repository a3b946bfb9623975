// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::config::{DEFAULT_CONFIG_FILE, load_config};
use crate::error::{SupervisorError, chain};
use crate::formatters::{write_status, write_table};
use crate::persist::StateLock;
use crate::record::{RestartPolicy, ServiceRecord};
use crate::supervisor::{StartRequest, Supervisor};
use crate::table::ProcessTable;
use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use supervisor_log::debug;

/// Start, stop and watch JAR services on this host
#[derive(Parser, Debug)]
#[command(name = "supervisor", version)]
pub struct Cli {
    /// YAML configuration file; built-in defaults apply when it is missing
    #[arg(short, long, env = "SUPERVISOR_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a service, or relaunch a stopped one with new arguments
    Start {
        name: String,
        /// Path to the service artifact
        path: String,
        /// What the monitor sweep does when it finds the service dead
        #[arg(long, default_value = "never")]
        restart: RestartPolicy,
        /// Informational port number
        #[arg(long, default_value_t = 0)]
        port: u16,
        /// KEY=VALUE file added to the service environment
        #[arg(long = "env", value_name = "FILE")]
        env_file: Option<String>,
        /// File the service's stdout and stderr are appended to
        #[arg(long = "log", value_name = "FILE")]
        log_file: Option<String>,
    },
    /// Stop a service: SIGTERM, then SIGKILL after the grace period
    Stop { name: String },
    /// Stop a service if it is running and start it again
    Restart { name: String },
    /// Probe one service, or all of them
    Status { name: Option<String> },
    /// Probe all services and print them as a table
    List,
    /// Probe all services and restart the dead ones per their policy
    Monitor,
    /// Stop a service if it is running and forget it
    Remove { name: String },
}

/// Run one command end to end: lock, load, operate, save.
pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli.config)?;
    let level = config.level()?;
    let table_log = config.logging.table.open(level)?;
    let lifecycle_log = config.logging.lifecycle.open(level)?;
    debug!(lifecycle_log, "config: {:?}", config);

    let _lock = StateLock::acquire(&config.state_file)?;
    let mut table = ProcessTable::load(&config.state_file, table_log.clone())?;
    let supervisor = Supervisor::new(lifecycle_log.clone(), config.supervisor_options());

    let mut stdout = std::io::stdout();
    let result = execute(&supervisor, &mut table, cli.command, &mut stdout).await;
    table_log.flush();
    lifecycle_log.flush();
    result
}

fn lookup<'t>(
    table: &'t mut ProcessTable,
    name: &str,
) -> Result<&'t mut ServiceRecord, SupervisorError> {
    table
        .get_mut(name)
        .ok_or_else(|| SupervisorError::UnknownService(name.to_string()))
}

/// Dispatch `command` against an already loaded table, writing user-facing
/// output to `out`.
pub async fn execute<W: Write>(
    supervisor: &Supervisor,
    table: &mut ProcessTable,
    command: Command,
    out: &mut W,
) -> Result<()> {
    match command {
        Command::Start {
            name,
            path,
            restart,
            port,
            env_file,
            log_file,
        } => {
            let record = supervisor.start(
                table,
                StartRequest {
                    name,
                    path,
                    restart_policy: restart,
                    port,
                    env_path: env_file,
                    log_path: log_file,
                },
            )?;
            writeln!(out, "started {} (pid {})", record.name, record.pid)?;
        }
        Command::Stop { name } => {
            let record = lookup(table, &name)?;
            let outcome = supervisor.stop(record).await?;
            table.save()?;
            writeln!(out, "stopped {name}: {outcome}")?;
        }
        Command::Restart { name } => {
            let record = lookup(table, &name)?;
            let result = supervisor.restart(record).await;
            let (pid, count) = (record.pid, record.restart_count);
            // A restart that stopped the old process but failed to launch
            // still changed the record.
            table.save()?;
            result?;
            writeln!(out, "restarted {name} (pid {pid}, restart #{count})")?;
        }
        Command::Status { name: Some(name) } => {
            let record = lookup(table, &name)?;
            let result = supervisor.status(record);
            write_status(out, record, result.as_ref().ok().copied())?;
            table.save()?;
            result?;
        }
        Command::Status { name: None } => {
            if table.is_empty() {
                writeln!(out, "no services registered")?;
            }
            for record in table.iter_mut() {
                let liveness = supervisor.status(record).ok();
                write_status(out, record, liveness)?;
            }
            table.save()?;
        }
        Command::List => {
            let mut observed = Vec::with_capacity(table.len());
            for record in table.iter_mut() {
                observed.push(supervisor.status(record).ok());
            }
            write_table(out, table.iter().zip(observed))?;
            table.save()?;
        }
        Command::Monitor => {
            let report = supervisor.monitor_all(table).await;
            table.save()?;
            writeln!(
                out,
                "checked {}: {} alive, {} restarted, {} left stopped, {} failed",
                report.checked,
                report.alive.len(),
                report.restarted.len(),
                report.skipped.len(),
                report.failed.len()
            )?;
            for name in &report.restarted {
                writeln!(out, "restarted {name}")?;
            }
            for (name, err) in &report.failed {
                writeln!(out, "failed {name}: {}", chain(err))?;
            }
            if !report.failed.is_empty() {
                let names: Vec<&str> = report.failed.iter().map(|(n, _)| n.as_str()).collect();
                bail!("failed to restart: {}", names.join(", "));
            }
        }
        Command::Remove { name } => {
            supervisor.remove(table, &name).await?;
            writeln!(out, "removed {name}")?;
        }
    }
    Ok(())
}
