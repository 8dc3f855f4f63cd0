// src/core/model/mod.rs

//! Core data model: principals, permission sets, snapshots, changes, issues.

pub mod access;
pub mod change;
pub mod issue;
pub mod permissions;
pub mod principal;
pub mod snapshot;

pub use access::{AccessPaths, MembershipPath};
pub use change::{
    ChangeRecord, ChangeSet, ChangeState, ChangeType, PermissionGrant, PermissionModification,
    Severity,
};
pub use issue::{
    HealthScanRecord, HealthScanStatus, Issue, IssueStatus, IssueType, ScoreHistoryPoint,
    SeverityCounts,
};
pub use permissions::{AccessMask, AdvancedRight, BasicRight, DirectoryRight, PermissionSet};
pub use principal::{Principal, PrincipalKind};
pub use snapshot::{Ace, AceType, Snapshot, folder_name_of};
