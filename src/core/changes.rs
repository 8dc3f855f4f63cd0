// src/core/changes.rs

//! The in-process log of emitted change records, most recent first.

use parking_lot::RwLock;
use std::collections::VecDeque;

use crate::core::model::ChangeRecord;

/// How many records the log retains before discarding the oldest.
const CHANGE_LOG_CAPACITY: usize = 4096;

/// Bounded, queryable log of detected changes.
#[derive(Default)]
pub struct ChangeLog {
    records: RwLock<VecDeque<ChangeRecord>>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends records from one detection, evicting the oldest past
    /// capacity.
    pub fn push_all(&self, records: impl IntoIterator<Item = ChangeRecord>) {
        let mut log = self.records.write();
        for record in records {
            if log.len() == CHANGE_LOG_CAPACITY {
                log.pop_front();
            }
            log.push_back(record);
        }
    }

    /// The most recent records, newest first, optionally scoped to a path.
    pub fn recent(&self, limit: usize, path: Option<&str>) -> Vec<ChangeRecord> {
        self.records
            .read()
            .iter()
            .rev()
            .filter(|r| path.is_none_or(|p| r.path == p))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}
