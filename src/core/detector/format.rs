// src/core/detector/format.rs

//! Human-readable rendering of a change set: the one-line summary message
//! and the structured detail record the UI renders.

use serde::{Deserialize, Serialize};

use super::ChangeDetector;
use crate::core::model::{ChangeSet, Severity, folder_name_of};

/// How many affected trustees a detail item lists before truncating.
const USERS_AFFECTED_CAP: usize = 3;

/// The folder a change applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRef {
    pub name: String,
    pub full_path: String,
}

/// Counts and overall level for the detail header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub changes_detected: usize,
    pub severity_level: Severity,
}

/// One rendered change category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub icon: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users_affected: Option<Vec<String>>,
    pub impact: String,
}

/// The structured detail record attached to change notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeDetails {
    pub folder: FolderRef,
    pub summary: ChangeSummary,
    pub changes: Vec<ChangeItem>,
}

impl ChangeDetector {
    /// One-line human-readable summary, one clause per category.
    pub fn format_message(path: &str, changes: &ChangeSet) -> String {
        let folder_name = folder_name_of(path);
        let mut parts: Vec<String> = Vec::new();

        if let Some((old, new)) = &changes.owner_changed {
            parts.push(format!("owner changed: {old} -> {new}"));
        }
        if let Some((_, new)) = changes.inheritance_changed {
            let status = if new { "enabled" } else { "disabled" };
            parts.push(format!("inheritance {status}"));
        }
        if !changes.permissions_added.is_empty() {
            let count = changes.permissions_added.len();
            parts.push(format!("{count} permission{} added", plural(count)));
        }
        if !changes.permissions_removed.is_empty() {
            let count = changes.permissions_removed.len();
            parts.push(format!("{count} permission{} removed", plural(count)));
        }
        if !changes.permissions_modified.is_empty() {
            let count = changes.permissions_modified.len();
            parts.push(format!("{count} permission{} modified", plural(count)));
        }

        if parts.is_empty() {
            return format!("Permission structure changed for {folder_name}");
        }
        format!("{folder_name}: {}", parts.join(", "))
    }

    /// The structured detail record for the UI.
    pub fn format_details(path: &str, changes: &ChangeSet) -> ChangeDetails {
        let mut items: Vec<ChangeItem> = Vec::new();

        if let Some((old, new)) = &changes.owner_changed {
            items.push(ChangeItem {
                kind: "Owner Change".to_string(),
                icon: "🔄".to_string(),
                description: format!("Folder owner changed from '{old}' to '{new}'"),
                users_affected: None,
                impact: "High - Ownership changes can affect access control".to_string(),
            });
        }

        if let Some((_, new)) = changes.inheritance_changed {
            let status = if new { "enabled" } else { "disabled" };
            items.push(ChangeItem {
                kind: "Inheritance Setting".to_string(),
                icon: "🔗".to_string(),
                description: format!("Permission inheritance {status}"),
                users_affected: None,
                impact: "Medium - Affects how permissions are inherited from parent folders"
                    .to_string(),
            });
        }

        if !changes.permissions_added.is_empty() {
            let count = changes.permissions_added.len();
            items.push(ChangeItem {
                kind: "Permissions Added".to_string(),
                icon: "➕".to_string(),
                description: format!("{count} new permission{} granted", plural(count)),
                users_affected: Some(capped_names(
                    changes.permissions_added.iter().map(|g| &g.trustee.full_name),
                )),
                impact: "Medium - New users/groups can access this folder".to_string(),
            });
        }

        if !changes.permissions_removed.is_empty() {
            let count = changes.permissions_removed.len();
            items.push(ChangeItem {
                kind: "Permissions Removed".to_string(),
                icon: "➖".to_string(),
                description: format!("{count} permission{} revoked", plural(count)),
                users_affected: Some(capped_names(
                    changes
                        .permissions_removed
                        .iter()
                        .map(|g| &g.trustee.full_name),
                )),
                impact: "High - Users/groups lost access to this folder".to_string(),
            });
        }

        if !changes.permissions_modified.is_empty() {
            let count = changes.permissions_modified.len();
            items.push(ChangeItem {
                kind: "Permissions Modified".to_string(),
                icon: "🔧".to_string(),
                description: format!("{count} permission{} changed", plural(count)),
                users_affected: Some(capped_names(
                    changes
                        .permissions_modified
                        .iter()
                        .map(|m| &m.trustee.full_name),
                )),
                impact: "Medium - Access levels changed for existing users/groups".to_string(),
            });
        }

        ChangeDetails {
            folder: FolderRef {
                name: folder_name_of(path).to_string(),
                full_path: path.to_string(),
            },
            summary: ChangeSummary {
                changes_detected: items.len(),
                severity_level: Self::severity(changes),
            },
            changes: items,
        }
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "" } else { "s" }
}

fn capped_names<'a>(names: impl Iterator<Item = &'a String>) -> Vec<String> {
    names.take(USERS_AFFECTED_CAP).cloned().collect()
}
