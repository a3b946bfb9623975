// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context, Result};
use std::path::Path;

/// Parse a `KEY=VALUE` environment file into ordered pairs.
///
/// Blank lines, lines starting with `#`, lines without `=` and lines with an
/// empty key are skipped.
/// The value is everything after the first `=`, kept verbatim: no quoting,
/// no escaping, no trimming.
pub fn parse_environment_file(path: &Path) -> Result<Vec<(String, String)>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading environment file: {}", path.display()))?;
    Ok(parse_environment(&contents))
}

pub fn parse_environment(contents: &str) -> Vec<(String, String)> {
    let mut vars = Vec::new();
    for line in contents.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=')
            && !key.is_empty()
        {
            vars.push((key.to_string(), value.to_string()));
        }
    }
    vars
}
