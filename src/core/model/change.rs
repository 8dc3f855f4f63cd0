// src/core/model/change.rs

//! Change taxonomy: the categorized diff between two snapshots and the
//! records emitted when a significant change is detected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use super::permissions::PermissionSet;
use super::principal::Principal;

/// The closed set of change categories.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangeType {
    OwnerChanged,
    InheritanceChanged,
    PermissionAdded,
    PermissionRemoved,
    PermissionModified,
}

/// Severity shared by change records, issues, and notification envelopes.
/// Ordering follows the rank table: low < medium < high < critical.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Numeric rank used by subscription filters.
    pub fn rank(self) -> u8 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
            Severity::Critical => 4,
        }
    }
}

/// A grant that appeared or disappeared for one trustee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub trustee: Principal,
    pub permissions: PermissionSet,
}

/// A trustee whose permissions changed between snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionModification {
    pub trustee: Principal,
    pub old_permissions: PermissionSet,
    pub new_permissions: PermissionSet,
}

/// The categorized result of diffing two snapshots of the same path.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    /// `(old_full_name, new_full_name)` when the owner differs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_changed: Option<(String, String)>,
    /// `(old, new)` when the inheritance flag flipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inheritance_changed: Option<(bool, bool)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions_added: Vec<PermissionGrant>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions_removed: Vec<PermissionGrant>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions_modified: Vec<PermissionModification>,
}

impl ChangeSet {
    /// A change set is significant when any category is non-empty. Only
    /// significant sets trigger persistence, staleness, and notification.
    pub fn is_significant(&self) -> bool {
        self.owner_changed.is_some()
            || self.inheritance_changed.is_some()
            || !self.permissions_added.is_empty()
            || !self.permissions_removed.is_empty()
            || !self.permissions_modified.is_empty()
    }

    /// Non-empty categories in a fixed presentation order.
    pub fn categories(&self) -> Vec<ChangeType> {
        let mut out = Vec::new();
        if self.owner_changed.is_some() {
            out.push(ChangeType::OwnerChanged);
        }
        if self.inheritance_changed.is_some() {
            out.push(ChangeType::InheritanceChanged);
        }
        if !self.permissions_added.is_empty() {
            out.push(ChangeType::PermissionAdded);
        }
        if !self.permissions_removed.is_empty() {
            out.push(ChangeType::PermissionRemoved);
        }
        if !self.permissions_modified.is_empty() {
            out.push(ChangeType::PermissionModified);
        }
        out
    }
}

/// The category-relevant subset of state carried by a change record, instead
/// of whole snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeState {
    Owner { full_name: String },
    Inheritance { enabled: bool },
    Grants(Vec<PermissionGrant>),
    Modifications(Vec<PermissionModification>),
    Absent,
}

/// One emitted diff, recorded per non-empty category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub id: uuid::Uuid,
    pub detected_at: DateTime<Utc>,
    pub path: String,
    pub change_type: ChangeType,
    pub previous_state: ChangeState,
    pub current_state: ChangeState,
    pub severity: Severity,
}
