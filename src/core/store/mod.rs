// src/core/store/mod.rs

//! The snapshot store: the latest normalized snapshot per path, with content
//! checksums, staleness propagation, TTL validity, and a reaper.
//!
//! Structure-level reports (recursive scans) are cached alongside, keyed by
//! `(root, max_depth)`, and invalidated by the same staleness sweeps.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::core::errors::ShareGuardError;
use crate::core::model::Snapshot;
use crate::core::scanner::{ScanReport, SecurityDescriptorSource};

/// One persistent record: the latest snapshot of a path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub path: String,
    pub snapshot: Snapshot,
    pub checksum: String,
    /// Filesystem modification time at store time, when obtainable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_mtime: Option<DateTime<Utc>>,
    /// When the snapshot was stored (scan freshness).
    pub stored_at: DateTime<Utc>,
    /// When the record itself was last touched (stores and stale sweeps).
    pub updated_at: DateTime<Utc>,
    pub is_stale: bool,
}

impl CacheEntry {
    /// The validity rule: not stale, younger than the TTL, and the
    /// filesystem has not moved past the stored snapshot (unknown mtime is
    /// trusted).
    pub fn is_valid(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        if self.is_stale {
            return false;
        }
        let age = now.signed_duration_since(self.stored_at);
        if age >= ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::MAX) {
            return false;
        }
        match self.fs_mtime {
            Some(mtime) => mtime <= self.stored_at,
            None => true,
        }
    }
}

/// A cached recursive structure report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureEntry {
    pub root_path: String,
    pub max_depth: u32,
    pub report: ScanReport,
    pub stored_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_stale: bool,
}

impl StructureEntry {
    /// Structure entries age out on the same TTL; no mtime check.
    pub fn is_valid(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        if self.is_stale {
            return false;
        }
        now.signed_duration_since(self.stored_at)
            < ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::MAX)
    }
}

/// Keyed store of the latest snapshot per path.
///
/// Concurrency discipline: entry-level locking serializes mutations per
/// path; the sweep guard makes bulk `mark_stale` atomic with respect to
/// concurrent `put` on the same path (writers share, sweeps exclude).
pub struct SnapshotStore {
    entries: DashMap<String, CacheEntry>,
    structures: DashMap<(String, u32), StructureEntry>,
    sweep_guard: RwLock<()>,
    source: Arc<dyn SecurityDescriptorSource>,
    ttl: Duration,
}

impl SnapshotStore {
    pub fn new(source: Arc<dyn SecurityDescriptorSource>, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            structures: DashMap::new(),
            sweep_guard: RwLock::new(()),
            source,
            ttl,
        }
    }

    /// Point-in-time copy of the entry for a path, valid or not.
    pub fn get(&self, path: &str) -> Option<CacheEntry> {
        self.entries.get(path).map(|e| e.clone())
    }

    /// The stored snapshot when the entry passes the validity rule;
    /// consumers must re-scan otherwise.
    pub fn valid_snapshot(&self, path: &str) -> Option<Snapshot> {
        let entry = self.entries.get(path)?;
        entry
            .is_valid(self.ttl, Utc::now())
            .then(|| entry.snapshot.clone())
    }

    /// Stores a snapshot, recomputing the checksum, clearing staleness, and
    /// recording the filesystem mtime when obtainable.
    pub async fn put(&self, path: &str, snapshot: Snapshot) -> Result<CacheEntry, ShareGuardError> {
        let fs_mtime = {
            let source = self.source.clone();
            let path = path.to_string();
            tokio::task::spawn_blocking(move || source.modified_time(&path)).await?
        };

        let _writers = self.sweep_guard.read();
        let now = Utc::now();
        let entry = CacheEntry {
            path: path.to_string(),
            checksum: snapshot.checksum(),
            snapshot,
            fs_mtime,
            stored_at: now,
            updated_at: now,
            is_stale: false,
        };
        self.entries.insert(path.to_string(), entry.clone());
        debug!("Stored snapshot for {path} (checksum {})", entry.checksum);
        Ok(entry)
    }

    /// Caches a recursive structure report.
    pub fn put_structure(&self, report: ScanReport, max_depth: u32) {
        let _writers = self.sweep_guard.read();
        let now = Utc::now();
        let root_path = report.snapshot.path.clone();
        self.structures.insert(
            (root_path.clone(), max_depth),
            StructureEntry {
                root_path,
                max_depth,
                report,
                stored_at: now,
                updated_at: now,
                is_stale: false,
            },
        );
    }

    /// A valid structure report for `(root, max_depth)`, accepting entries
    /// scanned at least as deep as requested.
    pub fn valid_structure(&self, root: &str, max_depth: u32) -> Option<ScanReport> {
        let now = Utc::now();
        self.structures
            .iter()
            .filter(|e| {
                e.root_path == root && e.max_depth >= max_depth && e.is_valid(self.ttl, now)
            })
            .map(|e| e.report.clone())
            .next()
    }

    /// Marks a path and every descendant stale, plus any structure entry
    /// whose root is an ancestor or descendant of the path.
    pub fn mark_stale(&self, path: &str) {
        let _sweep = self.sweep_guard.write();
        let now = Utc::now();
        let mut marked = 0usize;

        for mut entry in self.entries.iter_mut() {
            if entry.key() == path || is_descendant(entry.key(), path) {
                entry.is_stale = true;
                entry.updated_at = now;
                marked += 1;
            }
        }

        for mut entry in self.structures.iter_mut() {
            let root = entry.root_path.clone();
            if root == path || is_descendant(&root, path) || is_descendant(path, &root) {
                entry.is_stale = true;
                entry.updated_at = now;
                marked += 1;
            }
        }

        info!("Marked {marked} cache entries stale for path: {path}");
    }

    /// Removes entries stored before the cutoff, and stale entries whose
    /// last touch predates it. Idempotent.
    pub fn reap(&self, cutoff: DateTime<Utc>) -> usize {
        let _sweep = self.sweep_guard.write();
        let before = self.entries.len() + self.structures.len();

        self.entries
            .retain(|_, e| !(e.stored_at < cutoff || (e.is_stale && e.updated_at < cutoff)));
        self.structures
            .retain(|_, e| !(e.stored_at < cutoff || (e.is_stale && e.updated_at < cutoff)));

        let removed = before - (self.entries.len() + self.structures.len());
        if removed > 0 {
            info!("Reaped {removed} expired cache entries");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Whether `candidate` lies strictly below `ancestor` in the tree. Plain
/// string prefixing is not enough: `D:\Shares2` is not under `D:\Shares`.
fn is_descendant(candidate: &str, ancestor: &str) -> bool {
    let ancestor = ancestor.trim_end_matches(['\\', '/']);
    candidate.len() > ancestor.len()
        && candidate.starts_with(ancestor)
        && candidate[ancestor.len()..].starts_with(['\\', '/'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descendant_requires_separator_boundary() {
        assert!(is_descendant("D:\\Shares\\Finance", "D:\\Shares"));
        assert!(is_descendant("D:\\Shares\\Finance\\Payroll", "D:\\Shares"));
        assert!(!is_descendant("D:\\Shares2", "D:\\Shares"));
        assert!(!is_descendant("D:\\Shares", "D:\\Shares"));
    }
}
