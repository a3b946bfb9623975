// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::error::{TableError, chain};
use crate::persist;
use crate::record::ServiceRecord;
use std::path::{Path, PathBuf};
use supervisor_log::{Logger, debug, error, info};

/// Ordered set of service records backed by the state file.
///
/// Records stay in insertion order; names are unique. Every save rewrites the
/// whole file.
pub struct ProcessTable {
    path: PathBuf,
    records: Vec<ServiceRecord>,
    log: Logger,
}

impl ProcessTable {
    /// Empty table bound to `path`, without reading it.
    pub fn new(path: impl Into<PathBuf>, log: Logger) -> Self {
        Self {
            path: path.into(),
            records: Vec::new(),
            log,
        }
    }

    /// Read the table from `path`. A missing file yields an empty table; any
    /// other failure returns an error and no records.
    pub fn load(path: impl Into<PathBuf>, log: Logger) -> Result<Self, TableError> {
        let path = path.into();
        let records = match persist::read_records(&path) {
            Ok(records) => records,
            Err(e) => {
                error!(log, "load: {}", chain(&e));
                return Err(e);
            }
        };
        info!(
            log,
            "load: loaded {} record(s) from {}",
            records.len(),
            path.display()
        );
        Ok(Self { path, records, log })
    }

    /// Insert `record` at the tail, saving the table when `persist` is set.
    pub fn append(&mut self, record: ServiceRecord, persist: bool) -> Result<(), TableError> {
        if self.get(&record.name).is_some() {
            error!(self.log, "append: '{}' already exists", record.name);
            return Err(TableError::DuplicateName(record.name.to_string()));
        }
        info!(
            self.log,
            "append: appended '{}' (pid {})",
            record.name,
            record.pid
        );
        self.records.push(record);
        if persist {
            self.save()?;
        }
        Ok(())
    }

    /// Remove the first record whose pid is `pid` and save. Returns false when
    /// no record matches.
    pub fn remove(&mut self, pid: i32) -> Result<bool, TableError> {
        let Some(index) = self.records.iter().position(|r| r.pid == pid) else {
            info!(self.log, "remove: no process found with pid {pid}");
            return Ok(false);
        };
        let removed = self.records.remove(index);
        info!(
            self.log,
            "remove: removed '{}' (pid {})",
            removed.name,
            removed.pid
        );
        self.save()?;
        Ok(true)
    }

    /// Drop the named record from memory without saving.
    pub fn take(&mut self, name: &str) -> Option<ServiceRecord> {
        let index = self.records.iter().position(|r| r.name == name)?;
        debug!(self.log, "take: dropped '{name}' from memory");
        Some(self.records.remove(index))
    }

    pub fn find(&self, pid: i32) -> bool {
        match self.records.iter().find(|r| r.pid == pid) {
            Some(rec) => {
                debug!(self.log, "find: found '{}' (pid {pid})", rec.name);
                true
            }
            None => {
                debug!(self.log, "find: pid {pid} not found");
                false
            }
        }
    }

    /// Rewrite the state file from the in-memory records.
    pub fn save(&self) -> Result<(), TableError> {
        if let Err(e) = persist::write_records(&self.path, &self.records) {
            error!(self.log, "save: {}", chain(&e));
            return Err(e);
        }
        debug!(
            self.log,
            "save: wrote {} record(s) to {}",
            self.records.len(),
            self.path.display()
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ServiceRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ServiceRecord> {
        self.records.iter_mut().find(|r| r.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ServiceRecord> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, ServiceRecord> {
        self.records.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<'a> IntoIterator for &'a ProcessTable {
    type Item = &'a ServiceRecord;
    type IntoIter = std::slice::Iter<'a, ServiceRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
