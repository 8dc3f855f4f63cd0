use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

use shareguard::core::model::{AceType, PermissionSet, Principal, PrincipalKind, Snapshot};
use shareguard::core::model::{AccessMask, Ace};
use shareguard::core::scanner::{DumpSource, RawDescriptor, ScanOptions};
use shareguard::core::store::SnapshotStore;

fn snapshot(path: &str) -> Snapshot {
    Snapshot {
        path: path.to_string(),
        scanned_at: Utc::now(),
        owner: Principal::new("S-1-5-32-544", "Administrators", "BUILTIN", PrincipalKind::Alias),
        primary_group: None,
        inheritance_enabled: true,
        aces: vec![Ace {
            trustee: Principal::new("S-100", "finance_staff", "CORP", PrincipalKind::Group),
            ace_type: AceType::Allow,
            inherited: false,
            permissions: PermissionSet::from_mask(AccessMask::GENERIC_READ),
            access_paths: None,
        }],
    }
}

fn store_with(paths: &[&str], ttl: Duration) -> (SnapshotStore, Arc<DumpSource>) {
    let source = Arc::new(DumpSource::new());
    for path in paths {
        source.insert(
            path,
            RawDescriptor {
                owner_sid: "S-1-5-32-544".to_string(),
                group_sid: None,
                inheritance_enabled: true,
                aces: vec![],
            },
        );
    }
    (SnapshotStore::new(source.clone(), ttl), source)
}

#[tokio::test]
async fn test_put_get_roundtrip() {
    let (store, _) = store_with(&["D:\\Shares\\Finance"], Duration::from_secs(3600));
    let s = snapshot("D:\\Shares\\Finance");

    store.put("D:\\Shares\\Finance", s.clone()).await.unwrap();
    let entry = store.get("D:\\Shares\\Finance").unwrap();

    assert_eq!(entry.snapshot.aces, s.aces);
    assert_eq!(entry.snapshot.owner, s.owner);
    assert_eq!(entry.checksum, s.checksum());
    assert!(!entry.is_stale);
    assert!(entry.fs_mtime.is_some());
}

#[tokio::test]
async fn test_mark_stale_covers_path_and_descendants() {
    let (store, _) = store_with(
        &["D:\\Shares", "D:\\Shares\\Finance", "D:\\Shares2"],
        Duration::from_secs(3600),
    );
    store.put("D:\\Shares", snapshot("D:\\Shares")).await.unwrap();
    store
        .put("D:\\Shares\\Finance", snapshot("D:\\Shares\\Finance"))
        .await
        .unwrap();
    store.put("D:\\Shares2", snapshot("D:\\Shares2")).await.unwrap();

    store.mark_stale("D:\\Shares");

    assert!(store.get("D:\\Shares").unwrap().is_stale);
    assert!(store.get("D:\\Shares\\Finance").unwrap().is_stale);
    // A sibling sharing the string prefix is not a descendant.
    assert!(!store.get("D:\\Shares2").unwrap().is_stale);
}

#[tokio::test]
async fn test_stale_entry_is_invalid_until_rewritten() {
    let (store, _) = store_with(&["D:\\Shares"], Duration::from_secs(3600));
    store.put("D:\\Shares", snapshot("D:\\Shares")).await.unwrap();
    assert!(store.valid_snapshot("D:\\Shares").is_some());

    store.mark_stale("D:\\Shares");
    assert!(store.valid_snapshot("D:\\Shares").is_none());

    // A fresh put clears the flag.
    store.put("D:\\Shares", snapshot("D:\\Shares")).await.unwrap();
    assert!(store.valid_snapshot("D:\\Shares").is_some());
}

#[tokio::test]
async fn test_newer_fs_mtime_invalidates() {
    let (store, source) = store_with(&["D:\\Shares"], Duration::from_secs(3600));
    store.put("D:\\Shares", snapshot("D:\\Shares")).await.unwrap();
    assert!(store.valid_snapshot("D:\\Shares").is_some());

    // Snapshots are only trusted while the filesystem has not moved on. A
    // fresh entry read must observe the new mtime to invalidate.
    source.set_modified("D:\\Shares", Utc::now() + ChronoDuration::hours(1));
    store.put("D:\\Shares", snapshot("D:\\Shares")).await.unwrap();
    assert!(store.valid_snapshot("D:\\Shares").is_none());
}

#[tokio::test]
async fn test_zero_ttl_means_always_expired() {
    let (store, _) = store_with(&["D:\\Shares"], Duration::ZERO);
    store.put("D:\\Shares", snapshot("D:\\Shares")).await.unwrap();
    assert!(store.valid_snapshot("D:\\Shares").is_none());
    // The entry itself is still readable.
    assert!(store.get("D:\\Shares").is_some());
}

#[tokio::test]
async fn test_reap_removes_old_entries_and_is_idempotent() {
    let (store, _) = store_with(&["D:\\Old", "D:\\New"], Duration::from_secs(3600));
    store.put("D:\\Old", snapshot("D:\\Old")).await.unwrap();
    store.put("D:\\New", snapshot("D:\\New")).await.unwrap();

    // A cutoff in the past removes nothing.
    assert_eq!(store.reap(Utc::now() - ChronoDuration::hours(48)), 0);

    // A future cutoff removes everything stored before it.
    let removed = store.reap(Utc::now() + ChronoDuration::seconds(1));
    assert_eq!(removed, 2);
    assert!(store.get("D:\\Old").is_none());

    // Idempotent: the second sweep finds nothing.
    assert_eq!(store.reap(Utc::now() + ChronoDuration::seconds(1)), 0);
}

#[tokio::test]
async fn test_structure_cache_staleness_propagates_both_directions() {
    let (store, source) = store_with(
        &["D:\\Shares", "D:\\Shares\\Finance"],
        Duration::from_secs(3600),
    );

    // Build a structure report over the root through a real scan.
    let dir = Arc::new(shareguard::core::resolver::StaticDirectory::new());
    let resolver = Arc::new(shareguard::core::resolver::PrincipalResolver::new(dir.clone()));
    let tracer = Arc::new(shareguard::core::resolver::MembershipTracer::new(dir));
    let scanner = shareguard::core::scanner::AclScanner::new(
        source.clone(),
        resolver,
        tracer,
        vec![],
        5,
    );
    let opts = ScanOptions {
        include_subfolders: true,
        ..ScanOptions::default()
    };
    let report = scanner.scan("D:\\Shares", &opts).await.unwrap();
    store.put_structure(report, 5);
    assert!(store.valid_structure("D:\\Shares", 5).is_some());
    // A deeper request than what was cached misses.
    assert!(store.valid_structure("D:\\Shares", 6).is_none());

    // Staleness on a descendant invalidates the enclosing structure.
    store.mark_stale("D:\\Shares\\Finance");
    assert!(store.valid_structure("D:\\Shares", 5).is_none());
}
