// src/core/model/issue.rs

//! Health analyzer output types: configuration issues and the score series.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strum_macros::{Display, EnumString};

use super::change::Severity;

/// The closed set of ACL hygiene problems the analyzer detects.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IssueType {
    BrokenInheritance,
    DirectUserAce,
    OrphanedSid,
    ExcessiveAceCount,
    ConflictingDenyOrder,
    OverPermissiveGroups,
}

impl IssueType {
    /// Base weight contributed to the aggregate risk computation. The six
    /// weights sum to 100, which is also the score denominator.
    pub fn base_weight(self) -> f64 {
        match self {
            IssueType::BrokenInheritance => 15.0,
            IssueType::DirectUserAce => 10.0,
            IssueType::OrphanedSid => 5.0,
            IssueType::ExcessiveAceCount => 20.0,
            IssueType::ConflictingDenyOrder => 25.0,
            IssueType::OverPermissiveGroups => 25.0,
        }
    }

    /// Sum of all base weights; the denominator of the score formula.
    pub fn max_total_weight() -> f64 {
        [
            IssueType::BrokenInheritance,
            IssueType::DirectUserAce,
            IssueType::OrphanedSid,
            IssueType::ExcessiveAceCount,
            IssueType::ConflictingDenyOrder,
            IssueType::OverPermissiveGroups,
        ]
        .iter()
        .map(|t| t.base_weight())
        .sum()
    }
}

/// Lifecycle state of a detected issue.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IssueStatus {
    #[default]
    Active,
    Resolved,
    Ignored,
}

/// One detected configuration issue on one path.
///
/// Identity for deduplication is `(path, issue_type)` among `Active` issues:
/// a repeat detection refreshes `last_seen` and the mutable fields rather
/// than inserting a second row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: u64,
    pub path: String,
    pub issue_type: IssueType,
    pub severity: Severity,
    pub status: IssueStatus,
    pub title: String,
    pub description: String,
    pub risk_score: f64,
    pub affected_principals: BTreeSet<String>,
    pub recommendations: String,
    pub first_detected: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Issue {
    /// Severity multiplier applied to the base weight in the score formula.
    pub fn severity_multiplier(severity: Severity) -> f64 {
        match severity {
            Severity::Low => 0.25,
            Severity::Medium => 0.5,
            Severity::High => 0.75,
            Severity::Critical => 1.0,
        }
    }

    /// The weighted risk this issue contributes to the aggregate score.
    pub fn weighted_risk(&self) -> f64 {
        self.issue_type.base_weight() * Self::severity_multiplier(self.severity)
    }
}

/// Issue counts bucketed by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeverityCounts {
    pub fn tally(issues: impl IntoIterator<Item = Severity>) -> Self {
        let mut counts = Self::default();
        for severity in issues {
            match severity {
                Severity::Critical => counts.critical += 1,
                Severity::High => counts.high += 1,
                Severity::Medium => counts.medium += 1,
                Severity::Low => counts.low += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low
    }
}

/// One append-only point in the historical score series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreHistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub score: f64,
    pub total_issues: usize,
    pub counts: SeverityCounts,
}

/// Execution record of one analyzer run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthScanRecord {
    pub id: u64,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub status: HealthScanStatus,
    pub total_paths: usize,
    pub processed_paths: usize,
    pub issues_found: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_score: Option<f64>,
}

/// Lifecycle of an analyzer run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HealthScanStatus {
    Running,
    Completed,
    Failed,
}
