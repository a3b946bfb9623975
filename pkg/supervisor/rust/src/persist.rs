// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! On-disk state file.
//!
//! Layout (little endian):
//!
//! ```text
//! header:  magic "SVTB" | version u16 | record size u16
//! record:  name[64] | path[256] | env_path[256] | log_path[256]
//!          | pid i32 | policy u8 | running u8 | port u16
//!          | restart_count u32 | start_time i64 (unix seconds)
//! ```
//!
//! Strings are zero padded; an empty optional string means "absent".
//! Records follow the header back to back, in table order.

use crate::error::TableError;
use crate::record::{BoundedString, NAME_MAX, PATH_MAX, RestartPolicy, ServiceRecord};
use bytes::{Buf, BufMut, BytesMut};
use nix::fcntl::{Flock, FlockArg};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use time::OffsetDateTime;

pub const MAGIC: &[u8; 4] = b"SVTB";
pub const FORMAT_VERSION: u16 = 1;
pub const HEADER_SIZE: usize = 8;
pub const RECORD_SIZE: usize = NAME_MAX + 3 * PATH_MAX + 4 + 1 + 1 + 2 + 4 + 8;

pub fn encode(records: &[ServiceRecord]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + records.len() * RECORD_SIZE);
    buf.put_slice(MAGIC);
    buf.put_u16_le(FORMAT_VERSION);
    buf.put_u16_le(RECORD_SIZE as u16);

    for rec in records {
        put_str::<NAME_MAX>(&mut buf, &rec.name);
        put_str::<PATH_MAX>(&mut buf, &rec.path);
        put_str::<PATH_MAX>(&mut buf, rec.env_path.as_deref().unwrap_or(""));
        put_str::<PATH_MAX>(&mut buf, rec.log_path.as_deref().unwrap_or(""));
        buf.put_i32_le(rec.pid);
        buf.put_u8(rec.restart_policy.to_byte());
        buf.put_u8(u8::from(rec.running));
        buf.put_u16_le(rec.port);
        buf.put_u32_le(rec.restart_count);
        buf.put_i64_le(rec.start_time.unix_timestamp());
    }
    buf.to_vec()
}

fn put_str<const N: usize>(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_bytes(0, N - s.len());
}

/// Decode a whole state file. Any inconsistency fails the load: a partially
/// decoded table is never returned.
pub fn decode(path: &Path, data: &[u8]) -> Result<Vec<ServiceRecord>, TableError> {
    let format_err = |reason: String| TableError::Format {
        path: path.to_path_buf(),
        reason,
    };

    if data.is_empty() {
        return Ok(Vec::new());
    }
    if data.len() < HEADER_SIZE {
        return Err(format_err(format!("truncated header ({} bytes)", data.len())));
    }

    let mut buf = data;
    let mut magic = [0u8; 4];
    buf.copy_to_slice(&mut magic);
    if &magic != MAGIC {
        return Err(format_err("bad magic".to_string()));
    }
    let version = buf.get_u16_le();
    if version != FORMAT_VERSION {
        return Err(format_err(format!("unsupported format version {version}")));
    }
    let record_size = usize::from(buf.get_u16_le());
    if record_size != RECORD_SIZE {
        return Err(format_err(format!(
            "record size {record_size}, expected {RECORD_SIZE}"
        )));
    }
    if buf.remaining() % RECORD_SIZE != 0 {
        return Err(format_err(format!(
            "truncated record ({} trailing bytes)",
            buf.remaining() % RECORD_SIZE
        )));
    }

    let mut records = Vec::with_capacity(buf.remaining() / RECORD_SIZE);
    while buf.has_remaining() {
        let index = records.len();
        let rec = decode_record(&mut buf)
            .map_err(|reason| format_err(format!("record {index}: {reason}")))?;
        records.push(rec);
    }
    Ok(records)
}

fn decode_record(buf: &mut &[u8]) -> Result<ServiceRecord, String> {
    let name = get_str::<NAME_MAX>(buf, "name")?;
    let path = get_str::<PATH_MAX>(buf, "path")?;
    let env_path = get_str::<PATH_MAX>(buf, "env_path")?;
    let log_path = get_str::<PATH_MAX>(buf, "log_path")?;
    let pid = buf.get_i32_le();
    let policy_byte = buf.get_u8();
    let running = buf.get_u8() != 0;
    let port = buf.get_u16_le();
    let restart_count = buf.get_u32_le();
    let start_secs = buf.get_i64_le();

    if name.is_empty() {
        return Err("empty name".to_string());
    }
    let restart_policy = RestartPolicy::from_byte(policy_byte)
        .ok_or_else(|| format!("unknown restart policy {policy_byte}"))?;
    let start_time = OffsetDateTime::from_unix_timestamp(start_secs)
        .map_err(|e| format!("start_time {start_secs}: {e}"))?;

    Ok(ServiceRecord {
        name,
        path,
        env_path: (!env_path.is_empty()).then_some(env_path),
        log_path: (!log_path.is_empty()).then_some(log_path),
        port,
        pid,
        restart_policy,
        restart_count,
        running,
        start_time,
    })
}

fn get_str<const N: usize>(
    buf: &mut &[u8],
    field: &'static str,
) -> Result<BoundedString<N>, String> {
    let data: &[u8] = *buf;
    let (raw, rest) = data.split_at(N);
    *buf = rest;
    let end = raw.iter().position(|&b| b == 0).unwrap_or(N);
    let s = std::str::from_utf8(&raw[..end]).map_err(|e| format!("{field}: {e}"))?;
    BoundedString::new(field, s).map_err(|e| e.to_string())
}

/// Load records from `path`. A missing file is an empty table.
pub fn read_records(path: &Path) -> Result<Vec<ServiceRecord>, TableError> {
    match fs::read(path) {
        Ok(data) => decode(path, &data),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(source) => Err(TableError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Replace `path` with `records`: write to a temporary file in the same
/// directory, fsync, then rename over the old file.
pub fn write_records(path: &Path, records: &[ServiceRecord]) -> Result<(), TableError> {
    let write_err = |source: io::Error| TableError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = parent_dir(path);
    fs::create_dir_all(dir).map_err(write_err)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(&encode(records)).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Exclusive advisory lock on `<state file>.lock`, held for one control
/// invocation so that concurrent commands cannot interleave load and save.
pub struct StateLock {
    _lock: Flock<File>,
    path: PathBuf,
}

impl StateLock {
    /// Block until the lock is acquired.
    pub fn acquire(state_file: &Path) -> Result<Self, TableError> {
        Self::lock(state_file, FlockArg::LockExclusive)
    }

    /// Fail immediately if another invocation holds the lock.
    pub fn try_acquire(state_file: &Path) -> Result<Self, TableError> {
        Self::lock(state_file, FlockArg::LockExclusiveNonblock)
    }

    fn lock(state_file: &Path, arg: FlockArg) -> Result<Self, TableError> {
        let path = lock_path(state_file);
        let lock_err = |source: io::Error| TableError::Lock {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(parent_dir(&path)).map_err(lock_err)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(lock_err)?;
        let lock = Flock::lock(file, arg).map_err(|(_, errno)| lock_err(errno.into()))?;
        Ok(Self { _lock: lock, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn lock_path(state_file: &Path) -> PathBuf {
    let mut os = state_file.as_os_str().to_owned();
    os.push(".lock");
    PathBuf::from(os)
}
