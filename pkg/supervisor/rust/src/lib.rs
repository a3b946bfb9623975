// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Single-host supervisor for JAR services: a persisted table of services
//! plus start, stop, restart, status, monitor and remove operations on it.

pub mod cli;
pub mod config;
pub mod env;
pub mod error;
pub mod formatters;
pub mod persist;
pub mod process;
pub mod record;
pub mod shutdown;
pub mod state;
pub mod supervisor;
pub mod table;

pub use error::{FieldError, SupervisorError, TableError};
pub use record::{RestartPolicy, ServiceRecord};
pub use state::{Liveness, StopOutcome};
pub use supervisor::{MonitorReport, StartRequest, Supervisor, SupervisorOptions};
pub use table::ProcessTable;
