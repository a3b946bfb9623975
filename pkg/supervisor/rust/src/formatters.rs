// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Output formatting for the command line.

use crate::record::ServiceRecord;
use crate::state::Liveness;
use std::io::{self, Write};
use tabwriter::TabWriter;
use time::OffsetDateTime;
use time::macros::format_description;

/// Format a start time as UTC date/time, `-` for a never-started record.
pub fn format_timestamp(ts: OffsetDateTime) -> String {
    if ts == OffsetDateTime::UNIX_EPOCH {
        return "-".to_string();
    }
    ts.format(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]"
    ))
    .unwrap_or_else(|_| "invalid".to_string())
}

/// Compact duration: `42s`, `5m03s`, `2h05m`, `3d04h`.
pub fn format_uptime(secs: i64) -> String {
    let secs = secs.max(0);
    let (d, h, m, s) = (secs / 86_400, secs / 3_600 % 24, secs / 60 % 60, secs % 60);
    if d > 0 {
        format!("{d}d{h:02}h")
    } else if h > 0 {
        format!("{h}h{m:02}m")
    } else if m > 0 {
        format!("{m}m{s:02}s")
    } else {
        format!("{s}s")
    }
}

/// `None` means the probe failed.
pub fn format_liveness(liveness: Option<Liveness>) -> String {
    match liveness {
        Some(l) => l.to_string(),
        None => "unknown".to_string(),
    }
}

/// One status line per service.
pub fn write_status<W: Write>(
    out: &mut W,
    record: &ServiceRecord,
    liveness: Option<Liveness>,
) -> io::Result<()> {
    match liveness {
        Some(Liveness::Alive) => writeln!(
            out,
            "{}: running (pid {}, restarts {}, uptime {})",
            record.name,
            record.pid,
            record.restart_count,
            format_uptime(record.uptime().whole_seconds())
        ),
        _ => writeln!(
            out,
            "{}: {} (restarts {})",
            record.name,
            format_liveness(liveness),
            record.restart_count
        ),
    }
}

/// Aligned table of every service, in table order.
pub fn write_table<'a, W: Write>(
    out: &mut W,
    rows: impl IntoIterator<Item = (&'a ServiceRecord, Option<Liveness>)>,
) -> io::Result<()> {
    let mut tw = TabWriter::new(out).padding(2);
    writeln!(
        tw,
        "NAME\tPID\tSTATUS\tPOLICY\tPORT\tRESTARTS\tSTARTED\tUPTIME\tPATH"
    )?;
    for (record, liveness) in rows {
        let alive = liveness == Some(Liveness::Alive);
        writeln!(
            tw,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            record.name,
            if alive { record.pid.to_string() } else { "-".to_string() },
            format_liveness(liveness),
            record.restart_policy,
            if record.port == 0 { "-".to_string() } else { record.port.to_string() },
            record.restart_count,
            format_timestamp(record.start_time),
            if alive {
                format_uptime(record.uptime().whole_seconds())
            } else {
                "-".to_string()
            },
            record.path
        )?;
    }
    tw.flush()
}
