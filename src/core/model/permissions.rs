// src/core/model/permissions.rs

//! Categorized permission rights and raw NTFS access-mask decoding.
//!
//! Rights are grouped into the three display buckets used throughout the
//! system: basic, advanced, and directory. A raw platform access mask decodes
//! into a `PermissionSet`; `FullControl` subsumes everything else.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strum_macros::{Display, EnumString};

bitflags! {
    /// Raw NTFS access mask bits as they appear in a platform ACE.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessMask: u32 {
        const FILE_LIST_DIRECTORY   = 0x0000_0001;
        const FILE_ADD_FILE         = 0x0000_0002;
        const FILE_ADD_SUBDIRECTORY = 0x0000_0004;
        const FILE_READ_EA          = 0x0000_0008;
        const FILE_WRITE_EA         = 0x0000_0010;
        const FILE_TRAVERSE         = 0x0000_0020;
        const FILE_DELETE_CHILD     = 0x0000_0040;
        const FILE_READ_ATTRIBUTES  = 0x0000_0080;
        const FILE_WRITE_ATTRIBUTES = 0x0000_0100;
        const DELETE                = 0x0001_0000;
        const READ_CONTROL          = 0x0002_0000;
        const WRITE_DAC             = 0x0004_0000;
        const WRITE_OWNER           = 0x0008_0000;
        const GENERIC_ALL           = 0x1000_0000;
        const GENERIC_EXECUTE       = 0x2000_0000;
        const GENERIC_WRITE         = 0x4000_0000;
        const GENERIC_READ          = 0x8000_0000;

        // Masks can carry bits outside the decoded set (SACL, synchronize).
        const _ = !0;
    }
}

/// Basic rights bucket.
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
pub enum BasicRight {
    Read,
    Write,
    Execute,
    FullControl,
}

/// Advanced rights bucket.
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
pub enum AdvancedRight {
    Delete,
    ReadPermissions,
    ChangePermissions,
    TakeOwnership,
}

/// Directory-specific rights bucket.
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
pub enum DirectoryRight {
    ListFolder,
    CreateFiles,
    CreateFolders,
    ReadEA,
    WriteEA,
    Traverse,
    DeleteChild,
    ReadAttributes,
    WriteAttributes,
}

/// The categorized rights carried by one ACE.
///
/// Invariant: when `basic` contains `FullControl`, the other buckets are
/// empty — full control subsumes them in display. `normalize` enforces this
/// after any mutation that can introduce the flag.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PermissionSet {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub basic: BTreeSet<BasicRight>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub advanced: BTreeSet<AdvancedRight>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub directory: BTreeSet<DirectoryRight>,
}

impl PermissionSet {
    /// Decodes a raw platform access mask into categorized rights.
    ///
    /// `GENERIC_ALL` short-circuits to a bare `FullControl` set.
    pub fn from_mask(mask: AccessMask) -> Self {
        if mask.contains(AccessMask::GENERIC_ALL) {
            return Self::full_control();
        }

        let mut set = Self::default();
        if mask.contains(AccessMask::GENERIC_READ) {
            set.basic.insert(BasicRight::Read);
        }
        if mask.contains(AccessMask::GENERIC_WRITE) {
            set.basic.insert(BasicRight::Write);
        }
        if mask.contains(AccessMask::GENERIC_EXECUTE) {
            set.basic.insert(BasicRight::Execute);
        }

        if mask.contains(AccessMask::DELETE) {
            set.advanced.insert(AdvancedRight::Delete);
        }
        if mask.contains(AccessMask::READ_CONTROL) {
            set.advanced.insert(AdvancedRight::ReadPermissions);
        }
        if mask.contains(AccessMask::WRITE_DAC) {
            set.advanced.insert(AdvancedRight::ChangePermissions);
        }
        if mask.contains(AccessMask::WRITE_OWNER) {
            set.advanced.insert(AdvancedRight::TakeOwnership);
        }

        if mask.contains(AccessMask::FILE_LIST_DIRECTORY) {
            set.directory.insert(DirectoryRight::ListFolder);
        }
        if mask.contains(AccessMask::FILE_ADD_FILE) {
            set.directory.insert(DirectoryRight::CreateFiles);
        }
        if mask.contains(AccessMask::FILE_ADD_SUBDIRECTORY) {
            set.directory.insert(DirectoryRight::CreateFolders);
        }
        if mask.contains(AccessMask::FILE_READ_EA) {
            set.directory.insert(DirectoryRight::ReadEA);
        }
        if mask.contains(AccessMask::FILE_WRITE_EA) {
            set.directory.insert(DirectoryRight::WriteEA);
        }
        if mask.contains(AccessMask::FILE_TRAVERSE) {
            set.directory.insert(DirectoryRight::Traverse);
        }
        if mask.contains(AccessMask::FILE_DELETE_CHILD) {
            set.directory.insert(DirectoryRight::DeleteChild);
        }
        if mask.contains(AccessMask::FILE_READ_ATTRIBUTES) {
            set.directory.insert(DirectoryRight::ReadAttributes);
        }
        if mask.contains(AccessMask::FILE_WRITE_ATTRIBUTES) {
            set.directory.insert(DirectoryRight::WriteAttributes);
        }

        set
    }

    /// A set holding exactly `FullControl`.
    pub fn full_control() -> Self {
        let mut basic = BTreeSet::new();
        basic.insert(BasicRight::FullControl);
        Self {
            basic,
            advanced: BTreeSet::new(),
            directory: BTreeSet::new(),
        }
    }

    /// True when no bucket holds any right.
    pub fn is_empty(&self) -> bool {
        self.basic.is_empty() && self.advanced.is_empty() && self.directory.is_empty()
    }

    /// Whether any bucket grants a write-capable right. Used by severity
    /// derivation to detect privilege escalation.
    pub fn grants_write(&self) -> bool {
        self.basic.contains(&BasicRight::Write)
            || self.basic.contains(&BasicRight::FullControl)
            || self.advanced.contains(&AdvancedRight::ChangePermissions)
            || self.advanced.contains(&AdvancedRight::TakeOwnership)
            || self.directory.contains(&DirectoryRight::CreateFiles)
            || self.directory.contains(&DirectoryRight::CreateFolders)
            || self.directory.contains(&DirectoryRight::DeleteChild)
    }

    /// Unions another set into this one, per bucket.
    pub fn union_with(&mut self, other: &PermissionSet) {
        self.basic.extend(other.basic.iter().copied());
        self.advanced.extend(other.advanced.iter().copied());
        self.directory.extend(other.directory.iter().copied());
        self.normalize();
    }

    /// Enforces the `FullControl` subsumption invariant.
    pub fn normalize(&mut self) {
        if self.basic.contains(&BasicRight::FullControl) {
            self.basic.clear();
            self.basic.insert(BasicRight::FullControl);
            self.advanced.clear();
            self.directory.clear();
        }
    }

    /// All rights as display strings, sorted within each bucket. Feeds the
    /// canonical checksum tuple, so the order must be stable.
    pub fn sorted_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        names.extend(self.basic.iter().map(|r| r.to_string()));
        names.extend(self.advanced.iter().map(|r| r.to_string()));
        names.extend(self.directory.iter().map(|r| r.to_string()));
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_all_short_circuits() {
        let mask = AccessMask::GENERIC_ALL | AccessMask::DELETE | AccessMask::FILE_TRAVERSE;
        let set = PermissionSet::from_mask(mask);
        assert_eq!(set, PermissionSet::full_control());
    }

    #[test]
    fn union_normalizes_full_control() {
        let mut a = PermissionSet::from_mask(AccessMask::GENERIC_READ | AccessMask::DELETE);
        let b = PermissionSet::full_control();
        a.union_with(&b);
        assert_eq!(a, PermissionSet::full_control());
    }

    #[test]
    fn mask_decode_buckets() {
        let set = PermissionSet::from_mask(
            AccessMask::GENERIC_READ | AccessMask::WRITE_DAC | AccessMask::FILE_LIST_DIRECTORY,
        );
        assert!(set.basic.contains(&BasicRight::Read));
        assert!(set.advanced.contains(&AdvancedRight::ChangePermissions));
        assert!(set.directory.contains(&DirectoryRight::ListFolder));
        assert!(set.grants_write());
    }
}
