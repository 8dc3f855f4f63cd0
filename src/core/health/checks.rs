// src/core/health/checks.rs

//! The six ACL hygiene detectors and the significance filter that separates
//! reportable issues from noise.

use std::collections::{BTreeSet, HashMap};

use crate::config::HealthConfig;
use crate::core::model::{AceType, IssueType, PrincipalKind, Severity, Snapshot};

/// Built-in account names excluded from direct-user-ACE reporting.
const BUILTIN_ACCOUNTS: &[&str] = &[
    "administrator",
    "guest",
    "krbtgt",
    "default account",
    "default user",
    "wdagutilityaccount",
];

/// Built-in domains excluded from direct-user-ACE detection.
const BUILTIN_DOMAINS: &[&str] = &["nt authority", "builtin", "nt service"];

/// Minimum weighted risk for an issue to be reported at all.
const MIN_REPORTABLE_RISK: f64 = 2.0;

/// Reporting floor for excessive ACE count. Deliberately distinct from the
/// detection threshold: the detector triggers at `max_ace_count`, but the
/// issue is only reported once the count reaches this floor.
const EXCESSIVE_ACE_REPORT_FLOOR: usize = 15;

/// Detection thresholds, taken from configuration.
#[derive(Debug, Clone)]
pub struct HealthThresholds {
    pub max_ace_count: usize,
    pub max_direct_user_aces: usize,
    pub critical_groups: Vec<String>,
}

impl From<&HealthConfig> for HealthThresholds {
    fn from(config: &HealthConfig) -> Self {
        Self {
            max_ace_count: config.max_ace_count,
            max_direct_user_aces: config.max_direct_user_aces,
            critical_groups: config.critical_groups.clone(),
        }
    }
}

/// A detected issue before registry deduplication.
#[derive(Debug, Clone, PartialEq)]
pub struct RawIssue {
    pub path: String,
    pub issue_type: IssueType,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub risk_score: f64,
    pub affected_principals: BTreeSet<String>,
    pub recommendations: String,
    /// The count the detector derived the risk score from.
    pub count: usize,
}

/// Runs all six detectors over one snapshot.
pub fn detect(snapshot: &Snapshot, thresholds: &HealthThresholds) -> Vec<RawIssue> {
    let mut issues = Vec::new();
    issues.extend(check_broken_inheritance(snapshot));
    issues.extend(check_direct_user_aces(snapshot, thresholds));
    issues.extend(check_orphaned_sids(snapshot));
    issues.extend(check_excessive_ace_count(snapshot, thresholds));
    issues.extend(check_conflicting_deny_order(snapshot));
    issues.extend(check_over_permissive_groups(snapshot, thresholds));
    issues
}

/// Drops issues below the reporting bar: low weighted risk, direct-user
/// findings that only touch built-in accounts, empty orphaned-SID sets, and
/// ACE counts under the reporting floor.
pub fn filter_significant(issues: Vec<RawIssue>) -> Vec<RawIssue> {
    issues
        .into_iter()
        .filter_map(|mut issue| {
            if issue.risk_score < MIN_REPORTABLE_RISK {
                return None;
            }

            match issue.issue_type {
                IssueType::DirectUserAce => {
                    let remaining: BTreeSet<String> = issue
                        .affected_principals
                        .iter()
                        .filter(|p| !is_builtin_principal(p))
                        .cloned()
                        .collect();
                    if remaining.is_empty() {
                        return None;
                    }
                    issue.description = format!(
                        "Found {} direct user ACEs in {}. Best practice is to grant permissions \
                         to security groups instead of individual users.",
                        remaining.len(),
                        issue.path
                    );
                    issue.affected_principals = remaining;
                }
                IssueType::OrphanedSid => {
                    if issue.affected_principals.is_empty() {
                        return None;
                    }
                }
                IssueType::ExcessiveAceCount => {
                    if issue.count < EXCESSIVE_ACE_REPORT_FLOOR {
                        return None;
                    }
                }
                _ => {}
            }

            Some(issue)
        })
        .collect()
}

fn check_broken_inheritance(snapshot: &Snapshot) -> Option<RawIssue> {
    if snapshot.inheritance_enabled {
        return None;
    }
    Some(RawIssue {
        path: snapshot.path.clone(),
        issue_type: IssueType::BrokenInheritance,
        severity: Severity::Medium,
        title: "Inheritance Disabled".to_string(),
        description: format!(
            "ACL inheritance is disabled for {}, which may indicate configuration issues or \
             security risks.",
            snapshot.path
        ),
        risk_score: 15.0,
        affected_principals: BTreeSet::new(),
        recommendations: "Review why inheritance is disabled. Consider re-enabling if \
                          appropriate, or document the business justification."
            .to_string(),
        count: 1,
    })
}

fn check_direct_user_aces(snapshot: &Snapshot, thresholds: &HealthThresholds) -> Option<RawIssue> {
    let direct_users: Vec<&str> = snapshot
        .aces
        .iter()
        .filter(|ace| {
            let trustee = &ace.trustee;
            trustee.kind == PrincipalKind::User
                && !trustee.is_system
                && !is_builtin_account(&trustee.name, &trustee.domain)
        })
        .map(|ace| ace.trustee.full_name.as_str())
        .collect();

    if direct_users.is_empty() {
        return None;
    }

    let count = direct_users.len();
    let severity = if count > thresholds.max_direct_user_aces {
        Severity::High
    } else {
        Severity::Medium
    };

    Some(RawIssue {
        path: snapshot.path.clone(),
        issue_type: IssueType::DirectUserAce,
        severity,
        title: format!("Excessive Direct User Permissions ({count})"),
        description: format!(
            "Found {count} direct user ACEs in {}. Best practice is to grant permissions to \
             security groups instead of individual users.",
            snapshot.path
        ),
        risk_score: 10.0 + (count as f64 * 2.0),
        affected_principals: direct_users.iter().map(|s| s.to_string()).collect(),
        recommendations: "Replace direct user permissions with security group memberships. \
                          Create appropriate security groups and grant permissions to groups \
                          instead."
            .to_string(),
        count,
    })
}

fn check_orphaned_sids(snapshot: &Snapshot) -> Option<RawIssue> {
    // The resolver names unresolvable SIDs "Unknown" and carries the raw SID
    // in the `Unknown SID:` marker, so unresolved trustees are recognized by
    // that marker. A bare `S-` name only appears if a directory provider
    // passes raw SIDs through as account names.
    let orphaned: BTreeSet<String> = snapshot
        .aces
        .iter()
        .filter(|ace| {
            ace.trustee.kind == PrincipalKind::Unknown
                && (ace.trustee.name.starts_with("S-") || ace.trustee.is_unresolved())
        })
        .map(|ace| ace.trustee.sid.clone())
        .collect();

    if orphaned.is_empty() {
        return None;
    }

    let count = orphaned.len();
    let severity = if count > 3 {
        Severity::Medium
    } else {
        Severity::Low
    };

    Some(RawIssue {
        path: snapshot.path.clone(),
        issue_type: IssueType::OrphanedSid,
        severity,
        title: format!("Orphaned SIDs ({count})"),
        description: format!(
            "Found {count} orphaned SIDs in {}. These are security identifiers that cannot be \
             resolved to user or group names.",
            snapshot.path
        ),
        risk_score: 5.0 + count as f64,
        affected_principals: orphaned,
        recommendations: "Remove orphaned SIDs from ACLs. These may be from deleted users or \
                          groups and pose security risks."
            .to_string(),
        count,
    })
}

fn check_excessive_ace_count(
    snapshot: &Snapshot,
    thresholds: &HealthThresholds,
) -> Option<RawIssue> {
    let count = snapshot.aces.len();
    if count <= thresholds.max_ace_count {
        return None;
    }

    let severity = if count > 100 {
        Severity::High
    } else {
        Severity::Medium
    };

    Some(RawIssue {
        path: snapshot.path.clone(),
        issue_type: IssueType::ExcessiveAceCount,
        severity,
        title: format!("Excessive ACE Count ({count})"),
        description: format!(
            "Path {} has {count} ACEs, which exceeds the recommended maximum of {}.",
            snapshot.path, thresholds.max_ace_count
        ),
        risk_score: 20.0 + (count as f64 * 0.5),
        affected_principals: BTreeSet::new(),
        recommendations: "Consolidate permissions by using security groups instead of \
                          individual ACEs. Review and remove unnecessary permissions."
            .to_string(),
        count,
    })
}

/// A Deny ACE appearing after an Allow ACE for the same trustee is
/// ineffective control. The conflict key is `(sid, position)` only; the
/// inherited flag plays no part.
fn check_conflicting_deny_order(snapshot: &Snapshot) -> Option<RawIssue> {
    let mut positions: HashMap<&str, (Vec<usize>, Vec<usize>)> = HashMap::new();
    for (idx, ace) in snapshot.aces.iter().enumerate() {
        let slot = positions.entry(ace.trustee.sid.as_str()).or_default();
        match ace.ace_type {
            AceType::Allow => slot.0.push(idx),
            AceType::Deny => slot.1.push(idx),
        }
    }

    let conflicting: BTreeSet<String> = snapshot
        .aces
        .iter()
        .filter(|ace| {
            let Some((allows, denies)) = positions.get(ace.trustee.sid.as_str()) else {
                return false;
            };
            denies
                .iter()
                .any(|deny| allows.iter().any(|allow| allow < deny))
        })
        .map(|ace| ace.trustee.full_name.clone())
        .collect();

    if conflicting.is_empty() {
        return None;
    }

    let count = conflicting.len();
    Some(RawIssue {
        path: snapshot.path.clone(),
        issue_type: IssueType::ConflictingDenyOrder,
        severity: Severity::High,
        title: format!("Conflicting ACE Order ({count} trustees)"),
        description: format!(
            "Found deny ACEs that come after allow ACEs for the same trustees in {}. This may \
             result in ineffective access control.",
            snapshot.path
        ),
        risk_score: 25.0 + (count as f64 * 5.0),
        affected_principals: conflicting,
        recommendations: "Reorder ACEs so that deny ACEs come before allow ACEs. Review ACL \
                          structure and remove conflicting permissions."
            .to_string(),
        count,
    })
}

fn check_over_permissive_groups(
    snapshot: &Snapshot,
    thresholds: &HealthThresholds,
) -> Option<RawIssue> {
    let critical: Vec<&str> = snapshot
        .aces
        .iter()
        .filter(|ace| {
            ace.ace_type == AceType::Allow
                && thresholds.critical_groups.iter().any(|group| {
                    ace.trustee
                        .full_name
                        .to_lowercase()
                        .contains(&group.to_lowercase())
                })
        })
        .map(|ace| ace.trustee.full_name.as_str())
        .collect();

    if critical.is_empty() {
        return None;
    }

    let count = critical.len();
    let severity = if count > 2 {
        Severity::Critical
    } else {
        Severity::High
    };

    Some(RawIssue {
        path: snapshot.path.clone(),
        issue_type: IssueType::OverPermissiveGroups,
        severity,
        title: format!("Over-Permissive Group Access ({count})"),
        description: format!(
            "Found {count} ACEs granting permissions to high-privilege groups in {}.",
            snapshot.path
        ),
        risk_score: 25.0 + (count as f64 * 10.0),
        affected_principals: critical.iter().map(|s| s.to_string()).collect(),
        recommendations: "Review permissions granted to high-privilege groups. Use principle \
                          of least privilege and create more specific security groups."
            .to_string(),
        count,
    })
}

/// Raw-detection exclusion: well-known local accounts and service domains.
fn is_builtin_account(name: &str, domain: &str) -> bool {
    let name = name.to_lowercase();
    let domain = domain.to_lowercase();
    BUILTIN_ACCOUNTS.contains(&name.as_str())
        || BUILTIN_DOMAINS.contains(&domain.as_str())
        || name.starts_with("nt ")
        || name.starts_with("iis_")
}

/// Significance-filter exclusion, applied to recorded full names.
fn is_builtin_principal(full_name: &str) -> bool {
    let lowered = full_name.to_lowercase();
    let name = lowered.rsplit('\\').next().unwrap_or(&lowered);
    BUILTIN_ACCOUNTS.contains(&name)
        || lowered.starts_with("nt ")
        || lowered.starts_with("iis_")
}
