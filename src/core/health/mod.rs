// src/core/health/mod.rs

//! The health analyzer: runs the hygiene detectors over cached snapshots,
//! deduplicates issues across runs, and maintains the aggregate score and
//! its history.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

pub mod checks;

pub use checks::{HealthThresholds, RawIssue};

use crate::core::errors::ShareGuardError;
use crate::core::model::{
    HealthScanRecord, HealthScanStatus, Issue, IssueStatus, IssueType, ScoreHistoryPoint,
    Severity, SeverityCounts,
};
use crate::core::scanner::AclScanner;
use crate::core::store::SnapshotStore;

/// Filters for the paginated issue listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_type: Option<IssueType>,
    /// Substring match on the issue path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_contains: Option<String>,
}

/// One page of active issues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuePage {
    pub total: usize,
    pub issues: Vec<Issue>,
    pub skip: usize,
    pub limit: usize,
}

/// The current score with issue counts, as served to dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub score: f64,
    pub total_issues: usize,
    pub counts: SeverityCounts,
    pub issue_types: HashMap<IssueType, usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scan: Option<DateTime<Utc>>,
}

/// Analyzes cached snapshots for configuration issues and scores them.
pub struct HealthAnalyzer {
    scanner: Arc<AclScanner>,
    store: Arc<SnapshotStore>,
    thresholds: HealthThresholds,

    issues: DashMap<u64, Issue>,
    /// Dedup index: active issue id per `(path, issue_type)`.
    active_index: DashMap<(String, IssueType), u64>,
    next_issue_id: AtomicU64,

    scans: RwLock<Vec<HealthScanRecord>>,
    next_scan_id: AtomicU64,

    history: RwLock<Vec<ScoreHistoryPoint>>,
}

impl HealthAnalyzer {
    pub fn new(
        scanner: Arc<AclScanner>,
        store: Arc<SnapshotStore>,
        thresholds: HealthThresholds,
    ) -> Self {
        Self {
            scanner,
            store,
            thresholds,
            issues: DashMap::new(),
            active_index: DashMap::new(),
            next_issue_id: AtomicU64::new(1),
            scans: RwLock::new(Vec::new()),
            next_scan_id: AtomicU64::new(1),
            history: RwLock::new(Vec::new()),
        }
    }

    /// Runs a full health scan over the given paths and returns the scan id.
    ///
    /// Each path is analyzed from its cached snapshot when valid, otherwise
    /// scanned fresh and persisted. Per-path failures are logged and skipped;
    /// the run itself only fails on storage errors.
    pub async fn run(&self, paths: &[String]) -> Result<u64, ShareGuardError> {
        let scan_id = self.next_scan_id.fetch_add(1, Ordering::Relaxed);
        let started_at = Utc::now();
        self.scans.write().push(HealthScanRecord {
            id: scan_id,
            started_at,
            finished_at: None,
            status: HealthScanStatus::Running,
            total_paths: paths.len(),
            processed_paths: 0,
            issues_found: 0,
            overall_score: None,
        });
        info!("Started health scan {scan_id} for {} paths", paths.len());

        let mut all_issues: Vec<RawIssue> = Vec::new();
        let mut processed = 0usize;

        for path in paths {
            let snapshot = match self.store.valid_snapshot(path) {
                Some(snapshot) => snapshot,
                None => match self.scanner.snapshot(path).await {
                    Ok(snapshot) => {
                        self.store.put(path, snapshot.clone()).await?;
                        snapshot
                    }
                    Err(e) => {
                        warn!("Health scan could not obtain a snapshot for {path}: {e}");
                        continue;
                    }
                },
            };

            let detected = checks::detect(&snapshot, &self.thresholds);
            let significant = checks::filter_significant(detected);
            if !significant.is_empty() {
                info!(
                    "Health scan {scan_id}: {} significant issue(s) on {path}",
                    significant.len()
                );
            }
            all_issues.extend(significant);
            processed += 1;
        }

        let score = score_issues(&all_issues);
        let now = Utc::now();

        for raw in &all_issues {
            self.record_issue(raw, now);
        }

        let counts = SeverityCounts::tally(all_issues.iter().map(|i| i.severity));
        self.history.write().push(ScoreHistoryPoint {
            timestamp: now,
            score,
            total_issues: all_issues.len(),
            counts,
        });

        if let Some(record) = self
            .scans
            .write()
            .iter_mut()
            .find(|record| record.id == scan_id)
        {
            record.finished_at = Some(now);
            record.status = HealthScanStatus::Completed;
            record.processed_paths = processed;
            record.issues_found = all_issues.len();
            record.overall_score = Some(score);
        }

        info!("Health scan {scan_id} completed with score {score:.1}");
        Ok(scan_id)
    }

    /// Inserts a new issue or refreshes the existing active one for the same
    /// `(path, issue_type)`, never duplicating.
    fn record_issue(&self, raw: &RawIssue, now: DateTime<Utc>) {
        let key = (raw.path.clone(), raw.issue_type);

        if let Some(existing_id) = self.active_index.get(&key).map(|id| *id) {
            if let Some(mut issue) = self.issues.get_mut(&existing_id) {
                issue.last_seen = now;
                issue.severity = raw.severity;
                issue.title = raw.title.clone();
                issue.description = raw.description.clone();
                issue.affected_principals = raw.affected_principals.clone();
                issue.recommendations = raw.recommendations.clone();
                issue.risk_score = raw.risk_score;
                return;
            }
        }

        let id = self.next_issue_id.fetch_add(1, Ordering::Relaxed);
        self.issues.insert(
            id,
            Issue {
                id,
                path: raw.path.clone(),
                issue_type: raw.issue_type,
                severity: raw.severity,
                status: IssueStatus::Active,
                title: raw.title.clone(),
                description: raw.description.clone(),
                risk_score: raw.risk_score,
                affected_principals: raw.affected_principals.clone(),
                recommendations: raw.recommendations.clone(),
                first_detected: now,
                last_seen: now,
            },
        );
        self.active_index.insert(key, id);
    }

    /// The latest score point with current active issue-type counts.
    pub fn current_score(&self) -> ScoreSummary {
        let mut issue_types: HashMap<IssueType, usize> = HashMap::new();
        for issue in self.issues.iter() {
            if issue.status == IssueStatus::Active {
                *issue_types.entry(issue.issue_type).or_default() += 1;
            }
        }

        match self.history.read().last() {
            Some(point) => ScoreSummary {
                score: point.score,
                total_issues: point.total_issues,
                counts: point.counts,
                issue_types,
                last_scan: Some(point.timestamp),
            },
            None => ScoreSummary {
                score: 0.0,
                total_issues: 0,
                counts: SeverityCounts::default(),
                issue_types,
                last_scan: None,
            },
        }
    }

    /// Active issues matching the filter, ordered by severity then recency.
    pub fn issues(&self, filter: &IssueFilter, skip: usize, limit: usize) -> IssuePage {
        let mut matching: Vec<Issue> = self
            .issues
            .iter()
            .filter(|issue| issue.status == IssueStatus::Active)
            .filter(|issue| filter.severity.is_none_or(|s| issue.severity == s))
            .filter(|issue| filter.issue_type.is_none_or(|t| issue.issue_type == t))
            .filter(|issue| {
                filter
                    .path_contains
                    .as_ref()
                    .is_none_or(|needle| issue.path.contains(needle))
            })
            .map(|issue| issue.clone())
            .collect();

        matching.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then(b.last_seen.cmp(&a.last_seen))
        });

        let total = matching.len();
        let issues = matching.into_iter().skip(skip).take(limit).collect();
        IssuePage {
            total,
            issues,
            skip,
            limit,
        }
    }

    /// Transitions an issue's lifecycle state. Leaving `Active` releases the
    /// dedup slot, so a later detection opens a fresh issue.
    pub fn set_issue_status(&self, id: u64, status: IssueStatus) -> Result<(), ShareGuardError> {
        let mut issue = self
            .issues
            .get_mut(&id)
            .ok_or(ShareGuardError::IssueNotFound(id))?;

        let key = (issue.path.clone(), issue.issue_type);
        let was_active = issue.status == IssueStatus::Active;
        issue.status = status;
        drop(issue);

        if was_active && status != IssueStatus::Active {
            self.active_index.remove(&key);
        } else if status == IssueStatus::Active {
            self.active_index.insert(key, id);
        }
        Ok(())
    }

    pub fn issue(&self, id: u64) -> Option<Issue> {
        self.issues.get(&id).map(|i| i.clone())
    }

    /// The append-only score series, oldest first.
    pub fn history(&self) -> Vec<ScoreHistoryPoint> {
        self.history.read().clone()
    }

    pub fn scan_record(&self, id: u64) -> Option<HealthScanRecord> {
        self.scans.read().iter().find(|r| r.id == id).cloned()
    }
}

/// Aggregate score: `100 − 100·Σ(base_weight·severity_mult)/Σ(base_weights)`,
/// numerator capped at the denominator, clamped to `[0, 100]`, one decimal.
/// Zero issues score exactly 100.0.
pub fn score_issues(issues: &[RawIssue]) -> f64 {
    if issues.is_empty() {
        return 100.0;
    }

    let max_total = IssueType::max_total_weight();
    let total: f64 = issues
        .iter()
        .map(|i| i.issue_type.base_weight() * Issue::severity_multiplier(i.severity))
        .sum();
    let capped = total.min(max_total);

    let score = (100.0 - (capped / max_total) * 100.0).clamp(0.0, 100.0);
    (score * 10.0).round() / 10.0
}
