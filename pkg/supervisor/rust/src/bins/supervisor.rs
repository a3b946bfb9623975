// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use clap::Parser;
use log::LevelFilter;
use std::process::ExitCode;
use supervisor::cli::{self, Cli};
use supervisor_log::Logger;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    // Dependencies log through the facade; keep it to warnings on stderr.
    if let Err(e) = Logger::stderr().with_level(LevelFilter::Warn).init_global() {
        eprintln!("error: installing logger: {e}");
        return ExitCode::FAILURE;
    }

    match cli::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
