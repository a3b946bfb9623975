// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::error::FieldError;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use thiserror::Error;
use time::{Duration, OffsetDateTime};

pub const NAME_MAX: usize = 64;
pub const PATH_MAX: usize = 256;

/// Owned string limited to `N` bytes with no interior NUL, so it always fits
/// its zero-padded slot in the state file. Overflow is rejected, never
/// truncated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BoundedString<const N: usize>(String);

pub type Name = BoundedString<NAME_MAX>;
pub type FsPath = BoundedString<PATH_MAX>;

impl<const N: usize> BoundedString<N> {
    pub fn new(field: &'static str, value: &str) -> Result<Self, FieldError> {
        if value.len() > N {
            return Err(FieldError::TooLong {
                field,
                len: value.len(),
                max: N,
            });
        }
        if value.contains('\0') {
            return Err(FieldError::Nul { field });
        }
        Ok(Self(value.to_string()))
    }

    /// Like [`BoundedString::new`] but also rejects the empty string.
    pub fn non_empty(field: &'static str, value: &str) -> Result<Self, FieldError> {
        if value.is_empty() {
            return Err(FieldError::Empty { field });
        }
        Self::new(field, value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<const N: usize> Deref for BoundedString<N> {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl<const N: usize> fmt::Display for BoundedString<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<const N: usize> PartialEq<str> for BoundedString<N> {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl<const N: usize> PartialEq<&str> for BoundedString<N> {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// What the monitor sweep does with a service it finds dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RestartPolicy {
    #[default]
    Never,
    OnFailure,
    Always,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown restart policy '{0}' (expected never, on-failure or always)")]
pub struct ParsePolicyError(String);

impl RestartPolicy {
    /// Whether a service found dead by the sweep is relaunched.
    ///
    /// Only liveness is observable across invocations, never the exit status,
    /// so `OnFailure` and `Always` behave the same here.
    pub fn restarts_when_down(self) -> bool {
        match self {
            RestartPolicy::Never => false,
            RestartPolicy::OnFailure | RestartPolicy::Always => true,
        }
    }

    pub(crate) fn to_byte(self) -> u8 {
        match self {
            RestartPolicy::Never => 0,
            RestartPolicy::OnFailure => 1,
            RestartPolicy::Always => 2,
        }
    }

    pub(crate) fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(RestartPolicy::Never),
            1 => Some(RestartPolicy::OnFailure),
            2 => Some(RestartPolicy::Always),
            _ => None,
        }
    }
}

impl FromStr for RestartPolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "never" | "no" => Ok(RestartPolicy::Never),
            "on-failure" | "onfailure" => Ok(RestartPolicy::OnFailure),
            "always" => Ok(RestartPolicy::Always),
            _ => Err(ParsePolicyError(s.to_string())),
        }
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartPolicy::Never => write!(f, "never"),
            RestartPolicy::OnFailure => write!(f, "on-failure"),
            RestartPolicy::Always => write!(f, "always"),
        }
    }
}

/// One managed service, as kept in the table and in the state file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub name: Name,
    pub path: FsPath,
    pub env_path: Option<FsPath>,
    pub log_path: Option<FsPath>,
    pub port: u16,
    /// Only meaningful while `running` is set; may be stale otherwise.
    pub pid: i32,
    pub restart_policy: RestartPolicy,
    pub restart_count: u32,
    pub running: bool,
    pub start_time: OffsetDateTime,
}

impl ServiceRecord {
    /// A never-started record.
    pub fn new(name: Name, path: FsPath, restart_policy: RestartPolicy) -> Self {
        Self {
            name,
            path,
            env_path: None,
            log_path: None,
            port: 0,
            pid: 0,
            restart_policy,
            restart_count: 0,
            running: false,
            start_time: OffsetDateTime::UNIX_EPOCH,
        }
    }

    /// Time since the last start, clamped at zero.
    pub fn uptime(&self) -> Duration {
        let elapsed = OffsetDateTime::now_utc() - self.start_time;
        if elapsed.is_negative() {
            Duration::ZERO
        } else {
            elapsed
        }
    }
}

/// Current UTC time truncated to whole seconds, the resolution persisted on disk.
pub(crate) fn now_seconds() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now - Duration::nanoseconds(i64::from(now.nanosecond()))
}
