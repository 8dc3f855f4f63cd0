// src/core/scanner/user_access.rs

//! Effective-access query: every folder under a base path where a user holds
//! access directly or through any of their groups.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use crate::core::errors::ShareGuardError;
use crate::core::model::{Ace, PermissionSet, Principal};

use super::{AclScanner, ScanOptions};

/// One folder the user can reach, with the union of their effective rights
/// and the ACEs that granted them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderAccess {
    pub path: String,
    pub effective_permissions: PermissionSet,
    pub matching_aces: Vec<Ace>,
}

/// Counters for an effective-access sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserAccessStatistics {
    pub total_groups: usize,
    pub folders_checked: usize,
    pub accessible_folders: usize,
    pub error_count: usize,
}

/// The result of `AclScanner::user_access`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccessReport {
    pub user: Principal,
    pub group_memberships: Vec<Principal>,
    pub accessible_folders: Vec<FolderAccess>,
    pub statistics: UserAccessStatistics,
}

impl AclScanner {
    /// Reports every folder under `base_path` (to the default depth) where
    /// `user` holds access, either as the ACE trustee or through a group
    /// membership. Per-folder errors are counted, never propagated.
    pub async fn user_access(
        &self,
        user: &Principal,
        base_path: Option<&str>,
    ) -> Result<UserAccessReport, ShareGuardError> {
        let groups = self.tracer().user_groups(user).await;
        let granting_names: HashSet<String> = std::iter::once(user.full_name.clone())
            .chain(groups.iter().map(|g| g.full_name.clone()))
            .collect();

        let mut report = UserAccessReport {
            user: user.clone(),
            statistics: UserAccessStatistics {
                total_groups: groups.len(),
                ..Default::default()
            },
            group_memberships: groups,
            accessible_folders: Vec::new(),
        };

        let Some(base) = base_path else {
            return Ok(report);
        };

        let opts = ScanOptions {
            include_subfolders: true,
            ..ScanOptions::default()
        };
        let scan = self.scan(base, &opts).await?;
        report.statistics.error_count += scan.statistics.error_count;

        let mut pending = vec![&scan];
        while let Some(folder) = pending.pop() {
            report.statistics.folders_checked += 1;

            let matching: Vec<Ace> = folder
                .snapshot
                .aces
                .iter()
                .filter(|ace| granting_names.contains(&ace.trustee.full_name))
                .cloned()
                .collect();

            if !matching.is_empty() {
                let mut effective = PermissionSet::default();
                for ace in &matching {
                    effective.union_with(&ace.permissions);
                }
                debug!(
                    "{} reaches {} through {} ACE(s)",
                    report.user.full_name,
                    folder.snapshot.path,
                    matching.len()
                );
                report.statistics.accessible_folders += 1;
                report.accessible_folders.push(FolderAccess {
                    path: folder.snapshot.path.clone(),
                    effective_permissions: effective,
                    matching_aces: matching,
                });
            }

            pending.extend(folder.subfolders.iter());
        }

        Ok(report)
    }
}
