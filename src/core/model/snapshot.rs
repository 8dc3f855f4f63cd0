// src/core/model/snapshot.rs

//! The normalized, immutable result of scanning one path: ordered ACEs plus
//! owner and inheritance state, with a content checksum over the canonical
//! tuple.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use strum_macros::{Display, EnumString};

use super::access::AccessPaths;
use super::permissions::PermissionSet;
use super::principal::Principal;

/// Allow/Deny disposition of an ACE.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AceType {
    Allow,
    Deny,
}

/// One normalized access control entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ace {
    pub trustee: Principal,
    #[serde(rename = "type")]
    pub ace_type: AceType,
    pub inherited: bool,
    pub permissions: PermissionSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_paths: Option<AccessPaths>,
}

impl Ace {
    /// The authoritative identity of an ACE for diffing. The `inherited`
    /// flag is part of the key: an explicit grant replacing an inherited one
    /// with identical permissions is a removal plus an addition, not a no-op.
    pub fn diff_key(&self) -> (String, AceType, bool) {
        (self.trustee.sid.clone(), self.ace_type, self.inherited)
    }

    /// The consolidation identity used while normalizing a raw ACE list.
    pub fn consolidation_key(&self) -> (String, AceType, bool) {
        (self.trustee.full_name.clone(), self.ace_type, self.inherited)
    }
}

/// Immutable result of one scan of one path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub path: String,
    pub scanned_at: DateTime<Utc>,
    pub owner: Principal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_group: Option<Principal>,
    pub inheritance_enabled: bool,
    /// Order is significant: the platform evaluates Deny-before-Allow in
    /// list order, and the health analyzer inspects positions.
    pub aces: Vec<Ace>,
}

impl Snapshot {
    /// Content checksum over the canonical tuple:
    /// `(owner.sid, inheritance_enabled, [(sid, type, inherited, sorted rights)...])`.
    ///
    /// Non-contributing fields (timestamps, access paths, statistics) never
    /// perturb the digest, so checksum equality is a safe fast-path for "no
    /// change".
    pub fn checksum(&self) -> String {
        let aces: Vec<serde_json::Value> = self
            .aces
            .iter()
            .map(|ace| {
                json!([
                    ace.trustee.sid,
                    ace.ace_type.to_string(),
                    ace.inherited,
                    ace.permissions.sorted_names(),
                ])
            })
            .collect();
        let canonical = json!([self.owner.sid, self.inheritance_enabled, aces]);

        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// The last component of the path, for display.
    pub fn folder_name(&self) -> &str {
        folder_name_of(&self.path)
    }

    /// Counts of system vs non-system trustees across the ACE list.
    pub fn ace_counts(&self) -> (usize, usize) {
        let system = self.aces.iter().filter(|a| a.trustee.is_system).count();
        (system, self.aces.len() - system)
    }
}

/// Last path component under either separator convention; scanned trees use
/// backslashes, test fixtures may not.
pub fn folder_name_of(path: &str) -> &str {
    path.trim_end_matches(['\\', '/'])
        .rsplit(['\\', '/'])
        .next()
        .unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::permissions::{AccessMask, PermissionSet};
    use crate::core::model::principal::PrincipalKind;

    fn snapshot_with_paths(paths: Option<AccessPaths>) -> Snapshot {
        Snapshot {
            path: "D:\\Shares\\Finance".into(),
            scanned_at: Utc::now(),
            owner: Principal::new("S-1-5-32-544", "Administrators", "BUILTIN", PrincipalKind::Alias),
            primary_group: None,
            inheritance_enabled: true,
            aces: vec![Ace {
                trustee: Principal::new("S-1-5-21-1-2-3-500", "jdoe", "CORP", PrincipalKind::User),
                ace_type: AceType::Allow,
                inherited: false,
                permissions: PermissionSet::from_mask(AccessMask::GENERIC_READ),
                access_paths: paths,
            }],
        }
    }

    #[test]
    fn checksum_ignores_non_canonical_fields() {
        let a = snapshot_with_paths(None);
        let mut b = snapshot_with_paths(Some(AccessPaths::direct()));
        b.scanned_at = b.scanned_at + chrono::Duration::hours(5);
        assert_eq!(a.checksum(), b.checksum());
    }

    #[test]
    fn folder_name_handles_separators() {
        assert_eq!(folder_name_of("D:\\Shares\\Finance"), "Finance");
        assert_eq!(folder_name_of("/srv/shares/finance"), "finance");
        assert_eq!(folder_name_of("Finance"), "Finance");
    }
}
