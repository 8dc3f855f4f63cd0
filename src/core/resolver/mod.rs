// src/core/resolver/mod.rs

//! SID-to-principal resolution with process-local memoization.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub mod membership;
pub mod provider;

pub use membership::MembershipTracer;
pub use provider::{DirectoryAccount, DirectoryDump, DirectoryProvider, StaticDirectory};

use crate::core::model::Principal;

/// Resolves SIDs to principals through the directory provider, memoizing
/// every answer by SID string.
///
/// Resolution never fails: an unresolvable SID (or a failed dispatch to the
/// blocking pool) degrades to an `Unknown` principal, which is cached like
/// any other result.
pub struct PrincipalResolver {
    provider: Arc<dyn DirectoryProvider>,
    cache: DashMap<String, Principal>,
}

impl PrincipalResolver {
    pub fn new(provider: Arc<dyn DirectoryProvider>) -> Self {
        Self {
            provider,
            cache: DashMap::new(),
        }
    }

    /// Resolves a SID string to a principal.
    ///
    /// The directory lookup is a blocking platform call and runs on the
    /// blocking pool; the event loop is never stalled.
    pub async fn resolve(&self, sid: &str) -> Principal {
        if let Some(hit) = self.cache.get(sid) {
            return hit.clone();
        }

        let provider = self.provider.clone();
        let sid_owned = sid.to_string();
        let looked_up = match tokio::task::spawn_blocking(move || provider.lookup_sid(&sid_owned))
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!("SID lookup task failed for {sid}: {e}");
                None
            }
        };

        let principal = match looked_up {
            Some(account) => {
                Principal::new(account.sid, account.name, account.domain, account.kind)
            }
            None => {
                debug!("Could not resolve SID {sid}; degrading to unknown principal");
                Principal::unresolved(sid)
            }
        };

        self.cache.insert(sid.to_string(), principal.clone());
        principal
    }

    /// Number of memoized resolutions, for status reporting.
    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    /// Admin flush of the memoization table.
    pub fn clear_cache(&self) {
        self.cache.clear();
        debug!("Principal resolver cache cleared");
    }
}
