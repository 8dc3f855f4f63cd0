// src/core/resolver/membership.rs

//! Group membership tracing: expands a group into its direct and nested
//! members, safely on arbitrary (including cyclic) group graphs.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::model::{MembershipPath, Principal, PrincipalKind};

use super::provider::DirectoryProvider;

/// Traces group membership trees and answers the reverse user-to-groups
/// query, memoizing both by `full_name`.
pub struct MembershipTracer {
    provider: Arc<dyn DirectoryProvider>,
    trace_cache: DashMap<String, MembershipPath>,
    user_groups_cache: DashMap<String, Vec<Principal>>,
}

impl MembershipTracer {
    pub fn new(provider: Arc<dyn DirectoryProvider>) -> Self {
        Self {
            provider,
            trace_cache: DashMap::new(),
            user_groups_cache: DashMap::new(),
        }
    }

    /// Expands a group-like principal into its membership tree.
    ///
    /// System principals are never expanded and report a terminal node. The
    /// traversal carries a visited set keyed by `full_name`: a group already
    /// on the current branch is not re-expanded, which is the only
    /// correctness requirement on cyclic graphs.
    pub async fn trace(&self, group: &Principal) -> MembershipPath {
        if let Some(hit) = self.trace_cache.get(&group.full_name) {
            return hit.clone();
        }

        let provider = self.provider.clone();
        let group_owned = group.clone();
        let traced = tokio::task::spawn_blocking(move || {
            let mut visited = HashSet::new();
            trace_blocking(provider.as_ref(), &group_owned, &mut visited)
        })
        .await;

        let path = match traced {
            // The root is never in the visited set, so the trace always
            // produces a node.
            Ok(Some(path)) => path,
            Ok(None) => MembershipPath::leaf(group.clone()),
            Err(e) => {
                warn!("Membership trace task failed for {}: {e}", group.full_name);
                MembershipPath::leaf(group.clone())
            }
        };

        self.trace_cache
            .insert(group.full_name.clone(), path.clone());
        path
    }

    /// The groups a user belongs to, resolved through the directory.
    /// System principals short-circuit to an empty list.
    pub async fn user_groups(&self, user: &Principal) -> Vec<Principal> {
        if user.is_system {
            return Vec::new();
        }
        if let Some(hit) = self.user_groups_cache.get(&user.full_name) {
            return hit.clone();
        }

        let provider = self.provider.clone();
        let full_name = user.full_name.clone();
        let groups: Vec<Principal> =
            match tokio::task::spawn_blocking(move || provider.user_groups(&full_name)).await {
                Ok(accounts) => accounts
                    .into_iter()
                    .map(|a| Principal::new(a.sid, a.name, a.domain, a.kind))
                    .collect(),
                Err(e) => {
                    warn!("User group lookup task failed for {}: {e}", user.full_name);
                    Vec::new()
                }
            };

        self.user_groups_cache
            .insert(user.full_name.clone(), groups.clone());
        groups
    }

    /// Admin flush of both memoization tables.
    pub fn clear_cache(&self) {
        self.trace_cache.clear();
        self.user_groups_cache.clear();
        debug!("Membership tracer caches cleared");
    }
}

/// Recursive expansion on the blocking pool.
///
/// Each nested branch receives its own copy of the visited set, so a diamond
/// (two siblings containing the same subgroup) expands the subgroup under
/// both parents while a true cycle is still cut.
fn trace_blocking(
    provider: &dyn DirectoryProvider,
    group: &Principal,
    visited: &mut HashSet<String>,
) -> Option<MembershipPath> {
    if !visited.insert(group.full_name.clone()) {
        return None;
    }

    if group.is_system {
        return Some(MembershipPath::leaf(group.clone()));
    }

    let mut path = MembershipPath {
        group: group.clone(),
        direct_members: Vec::new(),
        nested: Vec::new(),
        nested_level: 0,
    };

    for member in provider.group_members(&group.full_name) {
        let principal = Principal::new(member.sid, member.name, member.domain, member.kind);

        if matches!(
            principal.kind,
            PrincipalKind::Group | PrincipalKind::WellKnownGroup
        ) {
            let mut branch_visited = visited.clone();
            if let Some(nested) = trace_blocking(provider, &principal, &mut branch_visited) {
                path.nested_level = path.nested_level.max(nested.nested_level + 1);
                path.nested.push(nested);
            }
        }

        path.direct_members.push(principal);
    }

    Some(path)
}
