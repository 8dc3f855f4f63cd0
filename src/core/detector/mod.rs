// src/core/detector/mod.rs

//! The change detector: a pure structural diff between two snapshots of the
//! same path, with significance and severity derivation.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

pub mod format;

pub use format::{ChangeDetails, ChangeItem, ChangeSummary, FolderRef};

use crate::core::model::{
    Ace, AceType, ChangeRecord, ChangeSet, ChangeState, ChangeType, PermissionGrant,
    PermissionModification, Severity, Snapshot,
};

/// Stateless snapshot comparison. All functions are pure; callers decide
/// what to persist and notify.
pub struct ChangeDetector;

impl ChangeDetector {
    /// Categorized diff of two snapshots.
    ///
    /// ACEs are identified by `(trustee.sid, type, inherited)`. The
    /// inheritance flag is part of the key on purpose: an explicit grant
    /// replacing an inherited one with identical permissions must surface as
    /// a removal plus an addition, never collapse to a no-op.
    pub fn diff(old: &Snapshot, new: &Snapshot) -> ChangeSet {
        let mut changes = ChangeSet::default();

        if old.owner.full_name != new.owner.full_name {
            changes.owner_changed =
                Some((old.owner.full_name.clone(), new.owner.full_name.clone()));
        }

        if old.inheritance_enabled != new.inheritance_enabled {
            changes.inheritance_changed = Some((old.inheritance_enabled, new.inheritance_enabled));
        }

        let old_keyed: HashMap<(String, AceType, bool), &Ace> =
            old.aces.iter().map(|a| (a.diff_key(), a)).collect();
        let new_keyed: HashMap<(String, AceType, bool), &Ace> =
            new.aces.iter().map(|a| (a.diff_key(), a)).collect();

        for ace in &old.aces {
            if !new_keyed.contains_key(&ace.diff_key()) {
                changes.permissions_removed.push(PermissionGrant {
                    trustee: ace.trustee.clone(),
                    permissions: ace.permissions.clone(),
                });
            }
        }

        for ace in &new.aces {
            match old_keyed.get(&ace.diff_key()) {
                None => changes.permissions_added.push(PermissionGrant {
                    trustee: ace.trustee.clone(),
                    permissions: ace.permissions.clone(),
                }),
                Some(previous) if previous.permissions != ace.permissions => {
                    changes.permissions_modified.push(PermissionModification {
                        trustee: ace.trustee.clone(),
                        old_permissions: previous.permissions.clone(),
                        new_permissions: ace.permissions.clone(),
                    });
                }
                Some(_) => {}
            }
        }

        changes
    }

    /// Severity of a change set:
    /// high — owner change, any removal, or a modification escalating a
    /// non-system trustee to write-capable rights; medium — additions,
    /// non-escalating modifications, or inheritance flips; low otherwise.
    pub fn severity(changes: &ChangeSet) -> Severity {
        let escalation = changes.permissions_modified.iter().any(|m| {
            !m.trustee.is_system && m.new_permissions.grants_write()
        });
        if changes.owner_changed.is_some()
            || !changes.permissions_removed.is_empty()
            || escalation
        {
            return Severity::High;
        }
        if !changes.permissions_added.is_empty()
            || !changes.permissions_modified.is_empty()
            || changes.inheritance_changed.is_some()
        {
            return Severity::Medium;
        }
        Severity::Low
    }

    /// One change record per non-empty category, carrying only the
    /// category-relevant subset of state.
    pub fn records(
        path: &str,
        changes: &ChangeSet,
        detected_at: DateTime<Utc>,
    ) -> Vec<ChangeRecord> {
        let mut records = Vec::new();

        let mut push = |change_type: ChangeType, previous: ChangeState, current: ChangeState| {
            let singleton = singleton_set(changes, change_type);
            records.push(ChangeRecord {
                id: uuid::Uuid::new_v4(),
                detected_at,
                path: path.to_string(),
                change_type,
                previous_state: previous,
                current_state: current,
                severity: Self::severity(&singleton),
            });
        };

        if let Some((old, new)) = &changes.owner_changed {
            push(
                ChangeType::OwnerChanged,
                ChangeState::Owner {
                    full_name: old.clone(),
                },
                ChangeState::Owner {
                    full_name: new.clone(),
                },
            );
        }
        if let Some((old, new)) = changes.inheritance_changed {
            push(
                ChangeType::InheritanceChanged,
                ChangeState::Inheritance { enabled: old },
                ChangeState::Inheritance { enabled: new },
            );
        }
        if !changes.permissions_added.is_empty() {
            push(
                ChangeType::PermissionAdded,
                ChangeState::Absent,
                ChangeState::Grants(changes.permissions_added.clone()),
            );
        }
        if !changes.permissions_removed.is_empty() {
            push(
                ChangeType::PermissionRemoved,
                ChangeState::Grants(changes.permissions_removed.clone()),
                ChangeState::Absent,
            );
        }
        if !changes.permissions_modified.is_empty() {
            push(
                ChangeType::PermissionModified,
                ChangeState::Modifications(changes.permissions_modified.clone()),
                ChangeState::Modifications(changes.permissions_modified.clone()),
            );
        }

        records
    }
}

/// A copy of `changes` reduced to a single category, for per-record severity.
fn singleton_set(changes: &ChangeSet, change_type: ChangeType) -> ChangeSet {
    let mut set = ChangeSet::default();
    match change_type {
        ChangeType::OwnerChanged => set.owner_changed = changes.owner_changed.clone(),
        ChangeType::InheritanceChanged => set.inheritance_changed = changes.inheritance_changed,
        ChangeType::PermissionAdded => {
            set.permissions_added = changes.permissions_added.clone();
        }
        ChangeType::PermissionRemoved => {
            set.permissions_removed = changes.permissions_removed.clone();
        }
        ChangeType::PermissionModified => {
            set.permissions_modified = changes.permissions_modified.clone();
        }
    }
    set
}
