// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Timestamped line logger.
//!
//! A [`Logger`] is a cheap, cloneable handle that writes
//! `[YYYY-MM-DD HH:MM:SS] LEVEL message` lines to an append-mode file, to a
//! console stream, to both, or to nothing at all. Handles are passed around
//! explicitly; [`Logger::init_global`] additionally routes the `log` facade
//! through one of them.

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use time::macros::format_description;

pub use log::Level;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Console {
    Stdout,
    Stderr,
}

#[derive(Debug)]
struct Sink {
    file: Option<Mutex<File>>,
    console: Option<Console>,
}

#[derive(Debug, Clone)]
pub struct Logger {
    sink: Option<Arc<Sink>>,
    level: LevelFilter,
}

impl Default for Logger {
    fn default() -> Self {
        Self::disabled()
    }
}

impl Logger {
    /// Open a logger writing to `file` (appending, parent directories created)
    /// and/or stdout. With neither destination the logger is disabled.
    pub fn open(file: Option<&Path>, stdout: bool) -> io::Result<Self> {
        let console = stdout.then_some(Console::Stdout);
        Self::build(file, console)
    }

    /// Logger writing to stderr only.
    pub fn stderr() -> Self {
        Self {
            sink: Some(Arc::new(Sink {
                file: None,
                console: Some(Console::Stderr),
            })),
            level: LevelFilter::Info,
        }
    }

    /// Logger that drops every message.
    pub fn disabled() -> Self {
        Self {
            sink: None,
            level: LevelFilter::Off,
        }
    }

    fn build(file: Option<&Path>, console: Option<Console>) -> io::Result<Self> {
        let file = match file {
            Some(path) => Some(Mutex::new(open_append(path)?)),
            None => None,
        };
        if file.is_none() && console.is_none() {
            return Ok(Self::disabled());
        }
        Ok(Self {
            sink: Some(Arc::new(Sink { file, console })),
            level: LevelFilter::Info,
        })
    }

    pub fn with_level(mut self, level: LevelFilter) -> Self {
        if self.sink.is_some() {
            self.level = level;
        }
        self
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    pub fn is_enabled(&self, level: Level) -> bool {
        self.sink.is_some() && level <= self.level
    }

    /// Write one line. Write failures are dropped: logging never fails the caller.
    pub fn write(&self, level: Level, args: fmt::Arguments<'_>) {
        if !self.is_enabled(level) {
            return;
        }
        let Some(sink) = &self.sink else {
            return;
        };
        let line = format!("[{}] {:<5} {}\n", timestamp(), level, args);

        if let Some(file) = &sink.file
            && let Ok(mut file) = file.lock()
        {
            let _ = file.write_all(line.as_bytes());
        }
        match sink.console {
            Some(Console::Stdout) => {
                let _ = io::stdout().lock().write_all(line.as_bytes());
            }
            Some(Console::Stderr) => {
                let _ = io::stderr().lock().write_all(line.as_bytes());
            }
            None => {}
        }
    }

    pub fn flush(&self) {
        let Some(sink) = &self.sink else {
            return;
        };
        if let Some(file) = &sink.file
            && let Ok(mut file) = file.lock()
        {
            let _ = file.flush();
        }
        if sink.console == Some(Console::Stdout) {
            let _ = io::stdout().flush();
        }
    }

    /// Install a clone of this logger as the `log` facade's global logger.
    pub fn init_global(&self) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(self.clone()))?;
        log::set_max_level(self.level);
        Ok(())
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.is_enabled(metadata.level())
    }

    fn log(&self, record: &Record<'_>) {
        self.write(record.level(), *record.args());
    }

    fn flush(&self) {
        Logger::flush(self);
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn timestamp() -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let now = OffsetDateTime::now_utc();
    now.format(format)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

#[macro_export]
macro_rules! error {
    ($logger:expr, $($arg:tt)+) => {
        $logger.write($crate::Level::Error, format_args!($($arg)+))
    };
}

#[macro_export]
macro_rules! warn {
    ($logger:expr, $($arg:tt)+) => {
        $logger.write($crate::Level::Warn, format_args!($($arg)+))
    };
}

#[macro_export]
macro_rules! info {
    ($logger:expr, $($arg:tt)+) => {
        $logger.write($crate::Level::Info, format_args!($($arg)+))
    };
}

#[macro_export]
macro_rules! debug {
    ($logger:expr, $($arg:tt)+) => {
        $logger.write($crate::Level::Debug, format_args!($($arg)+))
    };
}
