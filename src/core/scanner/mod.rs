// src/core/scanner/mod.rs

//! The ACL scanner: turns a directory path into a normalized permission
//! snapshot, optionally recursing into subfolders with aggregate statistics.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

pub mod source;
pub mod user_access;

pub use source::{DescriptorDump, DumpFolder, DumpSource, RawAce, RawDescriptor,
    SecurityDescriptorSource};
pub use user_access::{FolderAccess, UserAccessReport};

use crate::core::errors::ShareGuardError;
use crate::core::model::{AccessMask, AccessPaths, Ace, PermissionSet, PrincipalKind, Snapshot};
use crate::core::resolver::{MembershipTracer, PrincipalResolver};

/// Options for one scan request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Recurse into subfolders, up to `max_depth`.
    #[serde(default)]
    pub include_subfolders: bool,
    /// Recursion cap; the configured default applies when unset.
    #[serde(default)]
    pub max_depth: Option<u32>,
    /// When false, inherited ACEs are dropped during conversion.
    #[serde(default = "default_true")]
    pub include_inherited: bool,
    /// When true, system trustees carry no access-path annotation.
    #[serde(default = "default_true")]
    pub simplified_system: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            include_subfolders: false,
            max_depth: None,
            include_inherited: true,
            simplified_system: true,
        }
    }
}

/// Aggregate counters for a (possibly recursive) scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScanStatistics {
    pub total_folders: usize,
    pub processed_folders: usize,
    pub error_count: usize,
    pub system_aces: usize,
    pub non_system_aces: usize,
}

impl ScanStatistics {
    fn absorb(&mut self, other: &ScanStatistics) {
        self.total_folders += other.total_folders;
        self.processed_folders += other.processed_folders;
        self.error_count += other.error_count;
        self.system_aces += other.system_aces;
        self.non_system_aces += other.non_system_aces;
    }
}

/// A per-subfolder error captured without aborting the parent scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFailure {
    pub path: String,
    pub error: String,
}

/// The result of one scan: the root snapshot, successful subfolder reports,
/// captured failures, and aggregate statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub snapshot: Snapshot,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subfolders: Vec<ScanReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ScanFailure>,
    pub statistics: ScanStatistics,
}

/// Scans directories into normalized snapshots.
pub struct AclScanner {
    source: Arc<dyn SecurityDescriptorSource>,
    resolver: Arc<PrincipalResolver>,
    tracer: Arc<MembershipTracer>,
    excluded_paths: Vec<String>,
    default_max_depth: u32,
}

impl AclScanner {
    pub fn new(
        source: Arc<dyn SecurityDescriptorSource>,
        resolver: Arc<PrincipalResolver>,
        tracer: Arc<MembershipTracer>,
        excluded_paths: Vec<String>,
        default_max_depth: u32,
    ) -> Self {
        Self {
            source,
            resolver,
            tracer,
            excluded_paths,
            default_max_depth,
        }
    }

    pub fn source(&self) -> &Arc<dyn SecurityDescriptorSource> {
        &self.source
    }

    pub fn tracer(&self) -> &Arc<MembershipTracer> {
        &self.tracer
    }

    fn is_excluded(&self, path: &str) -> bool {
        self.excluded_paths.iter().any(|p| path.starts_with(p))
    }

    /// Scans a path into a report, recursing when requested.
    pub async fn scan(
        &self,
        path: &str,
        opts: &ScanOptions,
    ) -> Result<ScanReport, ShareGuardError> {
        let depth = opts.max_depth.unwrap_or(self.default_max_depth);
        self.scan_recursive(path.to_string(), depth, opts).await
    }

    /// Scans a single path into a bare snapshot; the shape the monitor loop
    /// and the store consume.
    pub async fn snapshot(&self, path: &str) -> Result<Snapshot, ShareGuardError> {
        let report = self
            .scan_recursive(path.to_string(), 0, &ScanOptions::default())
            .await?;
        Ok(report.snapshot)
    }

    fn scan_recursive<'a>(
        &'a self,
        path: String,
        depth: u32,
        opts: &'a ScanOptions,
    ) -> BoxFuture<'a, Result<ScanReport, ShareGuardError>> {
        Box::pin(async move {
            if self.is_excluded(&path) {
                return Err(ShareGuardError::Excluded(path));
            }
            if !self.path_exists(&path).await {
                return Err(ShareGuardError::NotFound(path));
            }

            let snapshot = self.scan_one(&path, opts).await?;
            let (system_aces, non_system_aces) = snapshot.ace_counts();

            let mut report = ScanReport {
                snapshot,
                subfolders: Vec::new(),
                failures: Vec::new(),
                statistics: ScanStatistics {
                    total_folders: 1,
                    processed_folders: 1,
                    error_count: 0,
                    system_aces,
                    non_system_aces,
                },
            };

            if opts.include_subfolders && depth > 0 {
                let children = match self.list_children(&path).await {
                    Ok(children) => children,
                    Err(e) => {
                        warn!("Could not list subfolders of {path}: {e}");
                        report.statistics.error_count += 1;
                        return Ok(report);
                    }
                };

                for child in children {
                    if self.is_excluded(&child) {
                        continue;
                    }
                    match self.scan_recursive(child.clone(), depth - 1, opts).await {
                        Ok(child_report) => {
                            report.statistics.absorb(&child_report.statistics);
                            report.subfolders.push(child_report);
                        }
                        Err(e) => {
                            debug!("Subfolder scan failed for {child}: {e}");
                            report.statistics.error_count += 1;
                            report.failures.push(ScanFailure {
                                path: child,
                                error: e.to_string(),
                            });
                        }
                    }
                }
            }

            Ok(report)
        })
    }

    /// Reads and normalizes the descriptor of exactly one path.
    async fn scan_one(&self, path: &str, opts: &ScanOptions) -> Result<Snapshot, ShareGuardError> {
        let descriptor = self.read_descriptor(path).await?;

        let owner = self.resolver.resolve(&descriptor.owner_sid).await;
        let primary_group = match &descriptor.group_sid {
            Some(sid) => Some(self.resolver.resolve(sid).await),
            None => None,
        };

        // Convert in platform order; evaluation order is significant.
        let mut aces: Vec<Ace> = Vec::with_capacity(descriptor.aces.len());
        for raw in &descriptor.aces {
            if !opts.include_inherited && raw.inherited {
                continue;
            }
            let trustee = self.resolver.resolve(&raw.sid).await;
            let mut permissions =
                PermissionSet::from_mask(AccessMask::from_bits_retain(raw.access_mask));
            permissions.normalize();
            aces.push(Ace {
                trustee,
                ace_type: raw.ace_type,
                inherited: raw.inherited,
                permissions,
                access_paths: None,
            });
        }

        let aces = consolidate(aces);

        let mut snapshot = Snapshot {
            path: path.to_string(),
            scanned_at: chrono::Utc::now(),
            owner,
            primary_group,
            inheritance_enabled: descriptor.inheritance_enabled,
            aces,
        };

        self.annotate_access_paths(&mut snapshot, opts).await;
        Ok(snapshot)
    }

    /// Computes `access_paths` for every ACE: the direct grant plus one
    /// traced membership tree per group of the trustee that itself appears
    /// as an ACE trustee on this path.
    async fn annotate_access_paths(&self, snapshot: &mut Snapshot, opts: &ScanOptions) {
        let trustee_names: HashSet<String> = snapshot
            .aces
            .iter()
            .map(|a| a.trustee.full_name.clone())
            .collect();
        let owner_name = snapshot.owner.full_name.clone();

        for idx in 0..snapshot.aces.len() {
            let trustee = snapshot.aces[idx].trustee.clone();

            if trustee.is_system {
                snapshot.aces[idx].access_paths = if opts.simplified_system {
                    None
                } else {
                    Some(AccessPaths::direct())
                };
                continue;
            }

            let mut paths = AccessPaths {
                direct_access: trustee.full_name == owner_name
                    || trustee_names.contains(&trustee.full_name),
                group_paths: Vec::new(),
                nested_level: 0,
            };

            if trustee.kind == PrincipalKind::User {
                for group in self.tracer.user_groups(&trustee).await {
                    if trustee_names.contains(&group.full_name) {
                        paths.push_group_path(self.tracer.trace(&group).await);
                    }
                }
            }

            snapshot.aces[idx].access_paths = Some(paths);
        }
    }

    async fn path_exists(&self, path: &str) -> bool {
        let source = self.source.clone();
        let path = path.to_string();
        tokio::task::spawn_blocking(move || source.exists(&path))
            .await
            .unwrap_or(false)
    }

    async fn read_descriptor(&self, path: &str) -> Result<RawDescriptor, ShareGuardError> {
        let source = self.source.clone();
        let path = path.to_string();
        tokio::task::spawn_blocking(move || source.read_descriptor(&path)).await?
    }

    async fn list_children(&self, path: &str) -> Result<Vec<String>, ShareGuardError> {
        let source = self.source.clone();
        let path = path.to_string();
        tokio::task::spawn_blocking(move || source.list_subdirectories(&path)).await?
    }
}

/// Reduces a converted ACE list so that at most one ACE exists per
/// `(trustee.full_name, type, inherited)` triple, unioning permissions per
/// bucket. First-seen position is preserved.
fn consolidate(aces: Vec<Ace>) -> Vec<Ace> {
    let mut out: Vec<Ace> = Vec::with_capacity(aces.len());
    let mut index: std::collections::HashMap<(String, crate::core::model::AceType, bool), usize> =
        std::collections::HashMap::new();

    for ace in aces {
        match index.get(&ace.consolidation_key()) {
            Some(&pos) => {
                out[pos].permissions.union_with(&ace.permissions);
            }
            None => {
                index.insert(ace.consolidation_key(), out.len());
                out.push(ace);
            }
        }
    }

    out
}
