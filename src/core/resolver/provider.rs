// src/core/resolver/provider.rs

//! The directory lookup seam.
//!
//! Platform account lookups are blocking OS calls; the provider trait keeps
//! that contract explicit so async callers can dispatch through the blocking
//! pool. `StaticDirectory` is the in-memory implementation, loadable from an
//! exported account dump, and backs tests, demos, and replay deployments.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::core::errors::ShareGuardError;
use crate::core::model::PrincipalKind;

/// A raw account row as the platform reports it, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryAccount {
    pub sid: String,
    pub name: String,
    pub domain: String,
    #[serde(default)]
    pub kind: PrincipalKind,
}

impl DirectoryAccount {
    pub fn full_name(&self) -> String {
        format!("{}\\{}", self.domain, self.name)
    }
}

/// Blocking directory lookups. Implementations must tolerate arbitrary
/// inputs: unknown SIDs and unenumerable groups return empty results, never
/// errors.
pub trait DirectoryProvider: Send + Sync + 'static {
    /// SID string to account row; `None` when the SID is unresolvable.
    fn lookup_sid(&self, sid: &str) -> Option<DirectoryAccount>;

    /// Direct members of a group, by the group's `domain\name`.
    fn group_members(&self, group_full_name: &str) -> Vec<DirectoryAccount>;

    /// Groups a user belongs to (domain and local), by `domain\name`.
    fn user_groups(&self, user_full_name: &str) -> Vec<DirectoryAccount>;
}

/// Serialized form of a directory export.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryDump {
    #[serde(default)]
    pub accounts: Vec<DirectoryAccount>,
    /// Group `domain\name` to member SIDs.
    #[serde(default)]
    pub memberships: HashMap<String, Vec<String>>,
}

/// In-memory directory provider over an exported account dump.
///
/// The reverse user-to-groups index is derived from the forward membership
/// table at load time.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    inner: RwLock<DirectoryIndex>,
}

#[derive(Debug, Default)]
struct DirectoryIndex {
    by_sid: HashMap<String, DirectoryAccount>,
    by_full_name: HashMap<String, DirectoryAccount>,
    members: HashMap<String, Vec<String>>,
    member_of: HashMap<String, Vec<String>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a directory export from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ShareGuardError> {
        let contents = fs::read_to_string(path.as_ref())?;
        let dump: DirectoryDump = serde_json::from_str(&contents)?;
        Ok(Self::from_dump(dump))
    }

    pub fn from_dump(dump: DirectoryDump) -> Self {
        let directory = Self::new();
        for account in dump.accounts {
            directory.add_account(account);
        }
        for (group, members) in dump.memberships {
            for member_sid in members {
                directory.add_member(&group, &member_sid);
            }
        }
        directory
    }

    /// Registers an account row, indexed by SID and full name.
    pub fn add_account(&self, account: DirectoryAccount) {
        let mut inner = self.inner.write();
        inner
            .by_full_name
            .insert(account.full_name(), account.clone());
        inner.by_sid.insert(account.sid.clone(), account);
    }

    /// Records `member_sid` as a direct member of `group_full_name`, and
    /// maintains the reverse index.
    pub fn add_member(&self, group_full_name: &str, member_sid: &str) {
        let mut inner = self.inner.write();
        inner
            .members
            .entry(group_full_name.to_string())
            .or_default()
            .push(member_sid.to_string());

        let member_full_name = inner.by_sid.get(member_sid).map(|m| m.full_name());
        if let Some(member_full_name) = member_full_name {
            inner
                .member_of
                .entry(member_full_name)
                .or_default()
                .push(group_full_name.to_string());
        }
    }
}

impl DirectoryProvider for StaticDirectory {
    fn lookup_sid(&self, sid: &str) -> Option<DirectoryAccount> {
        let inner = self.inner.read();
        inner.by_sid.get(sid).cloned()
    }

    fn group_members(&self, group_full_name: &str) -> Vec<DirectoryAccount> {
        let inner = self.inner.read();
        inner
            .members
            .get(group_full_name)
            .map(|sids| {
                sids.iter()
                    .filter_map(|sid| inner.by_sid.get(sid).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn user_groups(&self, user_full_name: &str) -> Vec<DirectoryAccount> {
        let inner = self.inner.read();
        inner
            .member_of
            .get(user_full_name)
            .map(|groups| {
                groups
                    .iter()
                    .filter_map(|name| inner.by_full_name.get(name).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}
