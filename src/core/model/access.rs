// src/core/model/access.rs

//! Group-membership trees and per-ACE access-path annotations.

use serde::{Deserialize, Serialize};

use super::principal::Principal;

/// One traced branch of group membership: the group itself, its direct
/// members, and recursively the nested groups reachable from it.
///
/// `nested_level` is the depth of the `nested` tree below this node; a leaf
/// group reports 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipPath {
    pub group: Principal,
    pub direct_members: Vec<Principal>,
    pub nested: Vec<MembershipPath>,
    pub nested_level: u32,
}

impl MembershipPath {
    /// A terminal node with no expansion, used for system principals and for
    /// groups the platform cannot enumerate.
    pub fn leaf(group: Principal) -> Self {
        Self {
            group,
            direct_members: Vec::new(),
            nested: Vec::new(),
            nested_level: 0,
        }
    }
}

/// How a trustee reaches a path: directly, through group chains, or both.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AccessPaths {
    /// The trustee itself is granted on the path (owner or ACE trustee).
    pub direct_access: bool,
    /// One traced membership tree per granting group the trustee belongs to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_paths: Vec<MembershipPath>,
    /// Max `nested_level` across all included group paths.
    pub nested_level: u32,
}

impl AccessPaths {
    pub fn direct() -> Self {
        Self {
            direct_access: true,
            group_paths: Vec::new(),
            nested_level: 0,
        }
    }

    /// Adds a traced group chain, keeping `nested_level` at the maximum.
    pub fn push_group_path(&mut self, path: MembershipPath) {
        self.nested_level = self.nested_level.max(path.nested_level);
        self.group_paths.push(path);
    }
}
