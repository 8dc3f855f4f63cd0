use chrono::{Duration, Utc};
use shareguard::core::model::{
    AccessMask, AccessPaths, Ace, AceType, PermissionSet, Principal, PrincipalKind, Snapshot,
};

fn principal(sid: &str, name: &str, domain: &str, kind: PrincipalKind) -> Principal {
    Principal::new(sid, name, domain, kind)
}

fn ace(sid: &str, name: &str, ace_type: AceType, inherited: bool, mask: AccessMask) -> Ace {
    Ace {
        trustee: principal(sid, name, "CORP", PrincipalKind::Group),
        ace_type,
        inherited,
        permissions: PermissionSet::from_mask(mask),
        access_paths: None,
    }
}

fn snapshot(aces: Vec<Ace>) -> Snapshot {
    Snapshot {
        path: "D:\\Shares\\Finance".to_string(),
        scanned_at: Utc::now(),
        owner: principal("S-1-5-32-544", "Administrators", "BUILTIN", PrincipalKind::Alias),
        primary_group: None,
        inheritance_enabled: true,
        aces,
    }
}

#[test]
fn test_checksum_is_stable_across_rescans() {
    let a = snapshot(vec![ace(
        "S-1-5-21-1",
        "finance_staff",
        AceType::Allow,
        false,
        AccessMask::GENERIC_READ,
    )]);
    let mut b = a.clone();
    b.scanned_at = b.scanned_at + Duration::hours(3);
    assert_eq!(a.checksum(), b.checksum());
}

#[test]
fn test_checksum_ignores_access_paths() {
    let plain = snapshot(vec![ace(
        "S-1-5-21-1",
        "finance_staff",
        AceType::Allow,
        false,
        AccessMask::GENERIC_READ,
    )]);
    let mut annotated = plain.clone();
    annotated.aces[0].access_paths = Some(AccessPaths::direct());
    assert_eq!(plain.checksum(), annotated.checksum());
}

#[test]
fn test_checksum_ignores_trustee_display_fields() {
    // Identical (sid, type, inherited, permissions) tuples hash equal even
    // when the resolved display name differs.
    let a = snapshot(vec![ace(
        "S-1-5-21-1",
        "finance_staff",
        AceType::Allow,
        false,
        AccessMask::GENERIC_READ,
    )]);
    let b = snapshot(vec![ace(
        "S-1-5-21-1",
        "finance_staff_renamed",
        AceType::Allow,
        false,
        AccessMask::GENERIC_READ,
    )]);
    assert_eq!(a.checksum(), b.checksum());
}

#[test]
fn test_checksum_changes_with_inheritance_flag() {
    let enabled = snapshot(vec![]);
    let mut disabled = enabled.clone();
    disabled.inheritance_enabled = false;
    assert_ne!(enabled.checksum(), disabled.checksum());
}

#[test]
fn test_checksum_changes_with_owner_sid() {
    let a = snapshot(vec![]);
    let mut b = a.clone();
    b.owner = principal("S-1-5-21-9999", "jdoe", "CORP", PrincipalKind::User);
    assert_ne!(a.checksum(), b.checksum());
}

#[test]
fn test_checksum_distinguishes_ace_inherited_flag() {
    let explicit = snapshot(vec![ace(
        "S-1-5-21-1",
        "finance_staff",
        AceType::Allow,
        false,
        AccessMask::GENERIC_READ,
    )]);
    let inherited = snapshot(vec![ace(
        "S-1-5-21-1",
        "finance_staff",
        AceType::Allow,
        true,
        AccessMask::GENERIC_READ,
    )]);
    assert_ne!(explicit.checksum(), inherited.checksum());
}

#[test]
fn test_checksum_distinguishes_permissions() {
    let read = snapshot(vec![ace(
        "S-1-5-21-1",
        "finance_staff",
        AceType::Allow,
        false,
        AccessMask::GENERIC_READ,
    )]);
    let write = snapshot(vec![ace(
        "S-1-5-21-1",
        "finance_staff",
        AceType::Allow,
        false,
        AccessMask::GENERIC_WRITE,
    )]);
    assert_ne!(read.checksum(), write.checksum());
}

#[test]
fn test_checksum_is_sensitive_to_ace_order() {
    // Evaluation order matters for deny-before-allow, so it is part of the
    // canonical tuple.
    let first = ace(
        "S-1-5-21-1",
        "finance_staff",
        AceType::Allow,
        false,
        AccessMask::GENERIC_READ,
    );
    let second = ace(
        "S-1-5-21-2",
        "hr_staff",
        AceType::Deny,
        false,
        AccessMask::GENERIC_WRITE,
    );
    let forward = snapshot(vec![first.clone(), second.clone()]);
    let backward = snapshot(vec![second, first]);
    assert_ne!(forward.checksum(), backward.checksum());
}

#[test]
fn test_checksum_is_64_hex_chars() {
    let s = snapshot(vec![]);
    let checksum = s.checksum();
    assert_eq!(checksum.len(), 64);
    assert!(checksum.chars().all(|c| c.is_ascii_hexdigit()));
}
