use std::sync::Arc;

use shareguard::core::model::{Principal, PrincipalKind};
use shareguard::core::resolver::{
    DirectoryAccount, MembershipTracer, PrincipalResolver, StaticDirectory,
};

fn account(sid: &str, name: &str, kind: PrincipalKind) -> DirectoryAccount {
    DirectoryAccount {
        sid: sid.to_string(),
        name: name.to_string(),
        domain: "CORP".to_string(),
        kind,
    }
}

fn group_principal(sid: &str, name: &str) -> Principal {
    Principal::new(sid, name, "CORP", PrincipalKind::Group)
}

/// CORP\all contains CORP\staff contains CORP\interns contains user jdoe.
fn nested_directory() -> Arc<StaticDirectory> {
    let dir = StaticDirectory::new();
    dir.add_account(account("S-1", "all", PrincipalKind::Group));
    dir.add_account(account("S-2", "staff", PrincipalKind::Group));
    dir.add_account(account("S-3", "interns", PrincipalKind::Group));
    dir.add_account(account("S-4", "jdoe", PrincipalKind::User));
    dir.add_member("CORP\\all", "S-2");
    dir.add_member("CORP\\staff", "S-3");
    dir.add_member("CORP\\interns", "S-4");
    Arc::new(dir)
}

#[tokio::test]
async fn test_trace_reports_nesting_depth() {
    let tracer = MembershipTracer::new(nested_directory());
    let path = tracer.trace(&group_principal("S-1", "all")).await;

    assert_eq!(path.group.full_name, "CORP\\all");
    assert_eq!(path.nested_level, 2);
    assert_eq!(path.direct_members.len(), 1);
    assert_eq!(path.nested.len(), 1);
    assert_eq!(path.nested[0].group.full_name, "CORP\\staff");
    assert_eq!(path.nested[0].nested_level, 1);

    let interns = &path.nested[0].nested[0];
    assert_eq!(interns.group.full_name, "CORP\\interns");
    assert_eq!(interns.nested_level, 0);
    assert_eq!(interns.direct_members[0].full_name, "CORP\\jdoe");
}

#[tokio::test]
async fn test_trace_is_total_on_cyclic_graphs() {
    // a contains b, b contains a. The trace must terminate and report the
    // acyclic covering depth.
    let dir = StaticDirectory::new();
    dir.add_account(account("S-10", "a", PrincipalKind::Group));
    dir.add_account(account("S-11", "b", PrincipalKind::Group));
    dir.add_member("CORP\\a", "S-11");
    dir.add_member("CORP\\b", "S-10");
    let tracer = MembershipTracer::new(Arc::new(dir));

    let path = tracer.trace(&group_principal("S-10", "a")).await;
    assert_eq!(path.nested_level, 1);
    assert_eq!(path.nested.len(), 1);
    assert_eq!(path.nested[0].group.full_name, "CORP\\b");
    // The cycle back to a is cut, not expanded.
    assert!(path.nested[0].nested.is_empty());
}

#[tokio::test]
async fn test_diamond_membership_expands_both_branches() {
    // all contains staff and admins; both contain shared.
    let dir = StaticDirectory::new();
    dir.add_account(account("S-20", "all", PrincipalKind::Group));
    dir.add_account(account("S-21", "staff", PrincipalKind::Group));
    dir.add_account(account("S-22", "admins", PrincipalKind::Group));
    dir.add_account(account("S-23", "shared", PrincipalKind::Group));
    dir.add_member("CORP\\all", "S-21");
    dir.add_member("CORP\\all", "S-22");
    dir.add_member("CORP\\staff", "S-23");
    dir.add_member("CORP\\admins", "S-23");
    let tracer = MembershipTracer::new(Arc::new(dir));

    let path = tracer.trace(&group_principal("S-20", "all")).await;
    assert_eq!(path.nested.len(), 2);
    for branch in &path.nested {
        assert_eq!(branch.nested.len(), 1);
        assert_eq!(branch.nested[0].group.full_name, "CORP\\shared");
    }
}

#[tokio::test]
async fn test_system_groups_are_never_expanded() {
    let dir = StaticDirectory::new();
    dir.add_account(DirectoryAccount {
        sid: "S-1-5-32-544".to_string(),
        name: "Administrators".to_string(),
        domain: "BUILTIN".to_string(),
        kind: PrincipalKind::Alias,
    });
    dir.add_account(account("S-30", "jdoe", PrincipalKind::User));
    dir.add_member("BUILTIN\\Administrators", "S-30");
    let tracer = MembershipTracer::new(Arc::new(dir));

    let admins = Principal::new("S-1-5-32-544", "Administrators", "BUILTIN", PrincipalKind::Alias);
    assert!(admins.is_system);

    let path = tracer.trace(&admins).await;
    assert!(path.direct_members.is_empty());
    assert!(path.nested.is_empty());
    assert_eq!(path.nested_level, 0);
}

#[tokio::test]
async fn test_user_groups_reverse_query() {
    let dir = nested_directory();
    let tracer = MembershipTracer::new(dir);

    let jdoe = Principal::new("S-4", "jdoe", "CORP", PrincipalKind::User);
    let groups = tracer.user_groups(&jdoe).await;
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].full_name, "CORP\\interns");
}

#[tokio::test]
async fn test_user_groups_short_circuits_system_principals() {
    let tracer = MembershipTracer::new(nested_directory());
    let system = Principal::new("S-1-5-18", "SYSTEM", "NT AUTHORITY", PrincipalKind::WellKnownGroup);
    assert!(system.is_system);
    assert!(tracer.user_groups(&system).await.is_empty());
}

#[tokio::test]
async fn test_resolver_memoizes_and_degrades() {
    let resolver = PrincipalResolver::new(nested_directory());

    let resolved = resolver.resolve("S-4").await;
    assert_eq!(resolved.full_name, "CORP\\jdoe");
    assert_eq!(resolved.kind, PrincipalKind::User);

    let unknown = resolver.resolve("S-1-5-21-404").await;
    assert_eq!(unknown.name, "Unknown");
    assert_eq!(unknown.full_name, "Unknown SID: S-1-5-21-404");
    assert_eq!(unknown.kind, PrincipalKind::Unknown);

    // Both answers are memoized, including the failure.
    assert_eq!(resolver.cached_count(), 2);
    resolver.clear_cache();
    assert_eq!(resolver.cached_count(), 0);
}
