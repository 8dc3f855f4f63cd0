use std::sync::Arc;
use std::time::Duration;

use shareguard::config::HealthConfig;
use shareguard::core::health::checks::{self, HealthThresholds, RawIssue};
use shareguard::core::health::{HealthAnalyzer, IssueFilter, score_issues};
use shareguard::core::model::{
    AceType, IssueStatus, IssueType, PrincipalKind, Severity,
};
use shareguard::core::resolver::{
    DirectoryAccount, MembershipTracer, PrincipalResolver, StaticDirectory,
};
use shareguard::core::scanner::{AclScanner, DumpSource, RawAce, RawDescriptor};
use shareguard::core::store::SnapshotStore;

const GENERIC_READ: u32 = 0x8000_0000;
const LIST_AND_TRAVERSE: u32 = 0x0000_0021;

fn directory() -> Arc<StaticDirectory> {
    let dir = StaticDirectory::new();
    for (sid, name, domain, kind) in [
        ("S-1-5-32-544", "Administrators", "BUILTIN", PrincipalKind::Alias),
        ("S-1-1-0", "Everyone", "", PrincipalKind::WellKnownGroup),
        ("S-100", "finance_staff", "CORP", PrincipalKind::Group),
        ("S-101", "hr_staff", "CORP", PrincipalKind::Group),
        ("S-102", "ops", "CORP", PrincipalKind::Group),
        ("S-200", "manderson", "SHAREGUARD", PrincipalKind::User),
        ("S-201", "Administrator", "CORP", PrincipalKind::User),
    ] {
        dir.add_account(DirectoryAccount {
            sid: sid.to_string(),
            name: name.to_string(),
            domain: domain.to_string(),
            kind,
        });
    }
    Arc::new(dir)
}

fn raw_ace(sid: &str, ace_type: AceType, mask: u32) -> RawAce {
    RawAce {
        sid: sid.to_string(),
        ace_type,
        inherited: false,
        access_mask: mask,
    }
}

fn descriptor(inheritance_enabled: bool, aces: Vec<RawAce>) -> RawDescriptor {
    RawDescriptor {
        owner_sid: "S-1-5-32-544".to_string(),
        group_sid: None,
        inheritance_enabled,
        aces,
    }
}

fn analyzer_over(folders: Vec<(&str, RawDescriptor)>) -> Arc<HealthAnalyzer> {
    let source = Arc::new(DumpSource::new());
    for (path, desc) in folders {
        source.insert(path, desc);
    }
    let dir = directory();
    let resolver = Arc::new(PrincipalResolver::new(dir.clone()));
    let tracer = Arc::new(MembershipTracer::new(dir));
    let scanner = Arc::new(AclScanner::new(
        source.clone(),
        resolver,
        tracer,
        vec![],
        5,
    ));
    let store = Arc::new(SnapshotStore::new(source, Duration::from_secs(3600)));
    Arc::new(HealthAnalyzer::new(
        scanner,
        store,
        HealthThresholds::from(&HealthConfig::default()),
    ))
}

#[tokio::test]
async fn test_broken_inheritance_issue_and_score() {
    let analyzer = analyzer_over(vec![(
        "D:\\Shares\\Finance",
        descriptor(false, vec![raw_ace("S-100", AceType::Allow, GENERIC_READ)]),
    )]);

    analyzer.run(&["D:\\Shares\\Finance".to_string()]).await.unwrap();

    let page = analyzer.issues(&IssueFilter::default(), 0, 100);
    assert_eq!(page.total, 1);
    let issue = &page.issues[0];
    assert_eq!(issue.issue_type, IssueType::BrokenInheritance);
    assert_eq!(issue.severity, Severity::Medium);
    assert_eq!(issue.risk_score, 15.0);
    // Weighted contribution is 15 * 0.5, so the score lands at 92.5.
    assert_eq!(analyzer.current_score().score, 92.5);
}

#[tokio::test]
async fn test_direct_user_ace_issue() {
    let analyzer = analyzer_over(vec![(
        "D:\\Shares\\Finance",
        descriptor(
            true,
            vec![
                raw_ace("S-100", AceType::Allow, GENERIC_READ),
                raw_ace("S-101", AceType::Allow, GENERIC_READ),
                raw_ace("S-200", AceType::Allow, LIST_AND_TRAVERSE),
            ],
        ),
    )]);

    analyzer.run(&["D:\\Shares\\Finance".to_string()]).await.unwrap();

    let page = analyzer.issues(&IssueFilter::default(), 0, 100);
    assert_eq!(page.total, 1);
    let issue = &page.issues[0];
    assert_eq!(issue.issue_type, IssueType::DirectUserAce);
    assert_eq!(issue.severity, Severity::Medium);
    assert_eq!(issue.risk_score, 12.0);
    assert!(issue.affected_principals.contains("SHAREGUARD\\manderson"));
    assert_eq!(issue.affected_principals.len(), 1);
}

#[tokio::test]
async fn test_conflicting_deny_order_issue() {
    let analyzer = analyzer_over(vec![(
        "D:\\Shares\\Ops",
        descriptor(
            true,
            vec![
                raw_ace("S-102", AceType::Allow, GENERIC_READ),
                raw_ace("S-102", AceType::Deny, GENERIC_READ),
            ],
        ),
    )]);

    analyzer.run(&["D:\\Shares\\Ops".to_string()]).await.unwrap();

    let page = analyzer.issues(&IssueFilter::default(), 0, 100);
    assert_eq!(page.total, 1);
    let issue = &page.issues[0];
    assert_eq!(issue.issue_type, IssueType::ConflictingDenyOrder);
    assert_eq!(issue.severity, Severity::High);
    assert_eq!(issue.risk_score, 30.0);
    assert!(issue.affected_principals.contains("CORP\\ops"));
}

#[tokio::test]
async fn test_deny_before_allow_is_not_a_conflict() {
    let analyzer = analyzer_over(vec![(
        "D:\\Shares\\Ops",
        descriptor(
            true,
            vec![
                raw_ace("S-102", AceType::Deny, GENERIC_READ),
                raw_ace("S-102", AceType::Allow, GENERIC_READ),
            ],
        ),
    )]);

    analyzer.run(&["D:\\Shares\\Ops".to_string()]).await.unwrap();
    let page = analyzer.issues(&IssueFilter::default(), 0, 100);
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn test_over_permissive_groups_issue() {
    let analyzer = analyzer_over(vec![(
        "D:\\Shares\\Public",
        descriptor(
            true,
            vec![
                raw_ace("S-1-5-32-544", AceType::Allow, GENERIC_READ),
                raw_ace("S-1-1-0", AceType::Allow, GENERIC_READ),
            ],
        ),
    )]);

    analyzer.run(&["D:\\Shares\\Public".to_string()]).await.unwrap();

    let page = analyzer.issues(&IssueFilter::default(), 0, 100);
    assert_eq!(page.total, 1);
    let issue = &page.issues[0];
    assert_eq!(issue.issue_type, IssueType::OverPermissiveGroups);
    assert_eq!(issue.severity, Severity::High);
    assert_eq!(issue.risk_score, 45.0);
}

#[tokio::test]
async fn test_orphaned_sid_issue() {
    // S-1-5-21-9-404 is absent from the directory and degrades to unknown.
    let analyzer = analyzer_over(vec![(
        "D:\\Shares\\Legacy",
        descriptor(
            true,
            vec![
                raw_ace("S-100", AceType::Allow, GENERIC_READ),
                raw_ace("S-1-5-21-9-404", AceType::Allow, GENERIC_READ),
            ],
        ),
    )]);

    analyzer.run(&["D:\\Shares\\Legacy".to_string()]).await.unwrap();

    let page = analyzer.issues(&IssueFilter::default(), 0, 100);
    assert_eq!(page.total, 1);
    let issue = &page.issues[0];
    assert_eq!(issue.issue_type, IssueType::OrphanedSid);
    assert_eq!(issue.severity, Severity::Low);
    assert_eq!(issue.risk_score, 6.0);
    assert!(issue.affected_principals.contains("S-1-5-21-9-404"));
}

#[tokio::test]
async fn test_issue_deduplication_across_runs() {
    let analyzer = analyzer_over(vec![(
        "D:\\Shares\\Finance",
        descriptor(false, vec![raw_ace("S-100", AceType::Allow, GENERIC_READ)]),
    )]);
    let paths = vec!["D:\\Shares\\Finance".to_string()];

    analyzer.run(&paths).await.unwrap();
    let first = analyzer.issues(&IssueFilter::default(), 0, 100);
    assert_eq!(first.total, 1);
    let first_seen = first.issues[0].last_seen;
    let first_id = first.issues[0].id;

    analyzer.run(&paths).await.unwrap();
    let second = analyzer.issues(&IssueFilter::default(), 0, 100);
    assert_eq!(second.total, 1);
    assert_eq!(second.issues[0].id, first_id);
    assert!(second.issues[0].last_seen >= first_seen);
    assert_eq!(second.issues[0].first_detected, first.issues[0].first_detected);

    // Both runs append score points.
    assert_eq!(analyzer.history().len(), 2);
}

#[tokio::test]
async fn test_resolving_issue_releases_dedup_slot() {
    let analyzer = analyzer_over(vec![(
        "D:\\Shares\\Finance",
        descriptor(false, vec![raw_ace("S-100", AceType::Allow, GENERIC_READ)]),
    )]);
    let paths = vec!["D:\\Shares\\Finance".to_string()];

    analyzer.run(&paths).await.unwrap();
    let id = analyzer.issues(&IssueFilter::default(), 0, 100).issues[0].id;

    analyzer.set_issue_status(id, IssueStatus::Resolved).unwrap();
    assert_eq!(analyzer.issues(&IssueFilter::default(), 0, 100).total, 0);

    // The condition persists, so the next run opens a fresh issue.
    analyzer.run(&paths).await.unwrap();
    let page = analyzer.issues(&IssueFilter::default(), 0, 100);
    assert_eq!(page.total, 1);
    assert_ne!(page.issues[0].id, id);
}

#[tokio::test]
async fn test_issue_filters_and_pagination() {
    let analyzer = analyzer_over(vec![
        (
            "D:\\Shares\\Finance",
            descriptor(false, vec![raw_ace("S-100", AceType::Allow, GENERIC_READ)]),
        ),
        (
            "D:\\Shares\\Public",
            descriptor(
                true,
                vec![raw_ace("S-1-1-0", AceType::Allow, GENERIC_READ)],
            ),
        ),
    ]);
    analyzer
        .run(&["D:\\Shares\\Finance".to_string(), "D:\\Shares\\Public".to_string()])
        .await
        .unwrap();

    let all = analyzer.issues(&IssueFilter::default(), 0, 100);
    assert_eq!(all.total, 2);
    // Higher severity sorts first.
    assert_eq!(all.issues[0].issue_type, IssueType::OverPermissiveGroups);

    let high_only = analyzer.issues(
        &IssueFilter {
            severity: Some(Severity::High),
            ..IssueFilter::default()
        },
        0,
        100,
    );
    assert_eq!(high_only.total, 1);

    let by_path = analyzer.issues(
        &IssueFilter {
            path_contains: Some("Finance".to_string()),
            ..IssueFilter::default()
        },
        0,
        100,
    );
    assert_eq!(by_path.total, 1);
    assert_eq!(by_path.issues[0].issue_type, IssueType::BrokenInheritance);

    let paged = analyzer.issues(&IssueFilter::default(), 1, 1);
    assert_eq!(paged.total, 2);
    assert_eq!(paged.issues.len(), 1);
}

fn raw_issue(issue_type: IssueType, severity: Severity) -> RawIssue {
    RawIssue {
        path: "D:\\Shares".to_string(),
        issue_type,
        severity,
        title: String::new(),
        description: String::new(),
        risk_score: 50.0,
        affected_principals: ["CORP\\jdoe".to_string()].into_iter().collect(),
        recommendations: String::new(),
        count: 1,
    }
}

#[test]
fn test_score_is_100_with_no_issues() {
    assert_eq!(score_issues(&[]), 100.0);
}

#[test]
fn test_score_is_0_with_all_six_critical() {
    let issues: Vec<RawIssue> = [
        IssueType::BrokenInheritance,
        IssueType::DirectUserAce,
        IssueType::OrphanedSid,
        IssueType::ExcessiveAceCount,
        IssueType::ConflictingDenyOrder,
        IssueType::OverPermissiveGroups,
    ]
    .into_iter()
    .map(|t| raw_issue(t, Severity::Critical))
    .collect();

    assert_eq!(score_issues(&issues), 0.0);
}

#[test]
fn test_score_is_clamped_when_risk_overflows() {
    // Many critical issues of the heaviest types: the numerator caps at the
    // denominator instead of going negative.
    let issues: Vec<RawIssue> = (0..20)
        .map(|_| raw_issue(IssueType::OverPermissiveGroups, Severity::Critical))
        .collect();
    assert_eq!(score_issues(&issues), 0.0);
}

#[test]
fn test_significance_filter_drops_builtin_only_direct_user_issues() {
    let mut only_builtin = raw_issue(IssueType::DirectUserAce, Severity::Medium);
    only_builtin.affected_principals =
        ["CORP\\Administrator".to_string(), "NT AUTHORITY\\SYSTEM".to_string()]
            .into_iter()
            .collect();
    assert!(checks::filter_significant(vec![only_builtin]).is_empty());

    let mut mixed = raw_issue(IssueType::DirectUserAce, Severity::Medium);
    mixed.affected_principals = [
        "CORP\\Administrator".to_string(),
        "CORP\\jdoe".to_string(),
    ]
    .into_iter()
    .collect();
    let kept = checks::filter_significant(vec![mixed]);
    assert_eq!(kept.len(), 1);
    // Built-in principals are stripped from the surviving issue.
    assert_eq!(kept[0].affected_principals.len(), 1);
    assert!(kept[0].affected_principals.contains("CORP\\jdoe"));
}

#[test]
fn test_significance_filter_drops_low_risk() {
    let mut weak = raw_issue(IssueType::OrphanedSid, Severity::Low);
    weak.risk_score = 1.5;
    assert!(checks::filter_significant(vec![weak]).is_empty());
}

#[test]
fn test_excessive_ace_trigger_and_report_thresholds_are_distinct() {
    use chrono::Utc;
    use shareguard::core::model::{
        AccessMask, Ace, PermissionSet, Principal, Snapshot,
    };

    let thresholds = HealthThresholds {
        max_ace_count: 10,
        max_direct_user_aces: 5,
        critical_groups: vec![],
    };

    let snapshot_with = |n: usize| Snapshot {
        path: "D:\\Shares\\Wide".to_string(),
        scanned_at: Utc::now(),
        owner: Principal::new("S-1-5-32-544", "Administrators", "BUILTIN", PrincipalKind::Alias),
        primary_group: None,
        inheritance_enabled: true,
        aces: (0..n)
            .map(|i| Ace {
                trustee: Principal::new(
                    format!("S-7-{i}"),
                    format!("group_{i}"),
                    "CORP",
                    PrincipalKind::Group,
                ),
                ace_type: AceType::Allow,
                inherited: false,
                permissions: PermissionSet::from_mask(AccessMask::GENERIC_READ),
                access_paths: None,
            })
            .collect(),
    };

    // 12 ACEs: the detector triggers (12 > 10) but the reporting floor (15)
    // filters it out.
    let detected = checks::detect(&snapshot_with(12), &thresholds);
    assert!(detected.iter().any(|i| i.issue_type == IssueType::ExcessiveAceCount));
    let kept = checks::filter_significant(detected);
    assert!(!kept.iter().any(|i| i.issue_type == IssueType::ExcessiveAceCount));

    // 16 ACEs clear both thresholds.
    let kept = checks::filter_significant(checks::detect(&snapshot_with(16), &thresholds));
    let issue = kept
        .iter()
        .find(|i| i.issue_type == IssueType::ExcessiveAceCount)
        .unwrap();
    assert_eq!(issue.severity, Severity::Medium);
    assert_eq!(issue.risk_score, 20.0 + 16.0 * 0.5);
}
