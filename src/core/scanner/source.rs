// src/core/scanner/source.rs

//! The security-descriptor seam.
//!
//! Reading a DACL is a blocking platform call. The source trait keeps that
//! contract explicit; `DumpSource` replays an exported descriptor dump and is
//! the implementation behind tests, demos, and lab deployments.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::core::errors::ShareGuardError;
use crate::core::model::AceType;

/// One platform ACE before normalization: raw SID, disposition, inheritance
/// flag, and the undecoded access mask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAce {
    pub sid: String,
    #[serde(rename = "type")]
    pub ace_type: AceType,
    #[serde(default)]
    pub inherited: bool,
    pub access_mask: u32,
}

/// A security descriptor as read from the platform, before resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDescriptor {
    pub owner_sid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_sid: Option<String>,
    pub inheritance_enabled: bool,
    /// Platform evaluation order; preserved through normalization.
    pub aces: Vec<RawAce>,
}

/// Blocking reads of filesystem security state.
pub trait SecurityDescriptorSource: Send + Sync + 'static {
    fn exists(&self, path: &str) -> bool;

    fn read_descriptor(&self, path: &str) -> Result<RawDescriptor, ShareGuardError>;

    fn list_subdirectories(&self, path: &str) -> Result<Vec<String>, ShareGuardError>;

    fn modified_time(&self, path: &str) -> Option<DateTime<Utc>>;
}

/// One folder entry in a descriptor dump.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpFolder {
    pub descriptor: RawDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    /// Simulates an unreadable DACL: reads fail with permission denied while
    /// the folder still exists and is listed under its parent.
    #[serde(default)]
    pub access_denied: bool,
}

/// Serialized form of a descriptor export, keyed by absolute path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DescriptorDump {
    #[serde(default)]
    pub folders: HashMap<String, DumpFolder>,
}

/// Replay source over an exported descriptor dump.
///
/// Mutation methods let the monitor loop be driven end-to-end: rewriting a
/// folder's descriptor simulates an on-disk ACL change.
#[derive(Debug, Default)]
pub struct DumpSource {
    folders: DashMap<String, DumpFolder>,
}

impl DumpSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a descriptor export from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ShareGuardError> {
        let contents = fs::read_to_string(path.as_ref())?;
        let dump: DescriptorDump = serde_json::from_str(&contents)?;
        Ok(Self::from_dump(dump))
    }

    pub fn from_dump(dump: DescriptorDump) -> Self {
        let source = Self::new();
        for (path, folder) in dump.folders {
            source.folders.insert(normalize(&path), folder);
        }
        source
    }

    /// Inserts or replaces a folder's descriptor.
    pub fn insert(&self, path: &str, descriptor: RawDescriptor) {
        self.folders.insert(
            normalize(path),
            DumpFolder {
                descriptor,
                modified_at: Some(Utc::now()),
                access_denied: false,
            },
        );
    }

    /// Inserts a folder whose descriptor reads fail with permission denied.
    pub fn insert_denied(&self, path: &str, descriptor: RawDescriptor) {
        self.folders.insert(
            normalize(path),
            DumpFolder {
                descriptor,
                modified_at: Some(Utc::now()),
                access_denied: true,
            },
        );
    }

    /// Removes a folder, simulating deletion on disk.
    pub fn remove(&self, path: &str) {
        self.folders.remove(&normalize(path));
    }

    pub fn set_modified(&self, path: &str, at: DateTime<Utc>) {
        if let Some(mut entry) = self.folders.get_mut(&normalize(path)) {
            entry.modified_at = Some(at);
        }
    }
}

impl SecurityDescriptorSource for DumpSource {
    fn exists(&self, path: &str) -> bool {
        self.folders.contains_key(&normalize(path))
    }

    fn read_descriptor(&self, path: &str) -> Result<RawDescriptor, ShareGuardError> {
        let key = normalize(path);
        let entry = self
            .folders
            .get(&key)
            .ok_or_else(|| ShareGuardError::NotFound(path.to_string()))?;
        if entry.access_denied {
            return Err(ShareGuardError::PermissionDenied(path.to_string()));
        }
        Ok(entry.descriptor.clone())
    }

    fn list_subdirectories(&self, path: &str) -> Result<Vec<String>, ShareGuardError> {
        let key = normalize(path);
        if !self.folders.contains_key(&key) {
            return Err(ShareGuardError::NotFound(path.to_string()));
        }
        let mut children: Vec<String> = self
            .folders
            .iter()
            .map(|e| e.key().clone())
            .filter(|candidate| parent_of(candidate).is_some_and(|p| p == key))
            .collect();
        children.sort();
        Ok(children)
    }

    fn modified_time(&self, path: &str) -> Option<DateTime<Utc>> {
        self.folders
            .get(&normalize(path))
            .and_then(|e| e.modified_at)
    }
}

/// Canonical key form: trailing separators stripped.
fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches(['\\', '/']);
    if trimmed.is_empty() {
        path.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Parent path under either separator convention; `None` at a root.
pub fn parent_of(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches(['\\', '/']);
    let idx = trimmed.rfind(['\\', '/'])?;
    let parent = trimmed[..idx].trim_end_matches(['\\', '/']);
    (!parent.is_empty()).then(|| parent.to_string())
}
