// src/core/tasks/monitor.rs

//! The change monitor: a single long-running task that periodically scans
//! every watched path, diffs against the stored baseline, and on significant
//! change persists, propagates staleness, records, and notifies.

use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::MonitorConfig;
use crate::core::changes::ChangeLog;
use crate::core::detector::ChangeDetector;
use crate::core::errors::ShareGuardError;
use crate::core::notify::{Notification, NotificationService};
use crate::core::scanner::AclScanner;
use crate::core::store::SnapshotStore;

/// Monitor state as reported by the status API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub active: bool,
    pub watched_paths: Vec<String>,
    pub queue_depth: usize,
    pub connections: usize,
    pub cycles_completed: u64,
    pub cycle_errors: u64,
}

/// Drives the scan-diff-persist-notify cycle over a mutable watch set.
///
/// The loop is cooperative: the stop signal is honored at the top of each
/// cycle and during the inter-cycle sleep, never inside a scan.
pub struct ChangeMonitor {
    scanner: Arc<AclScanner>,
    store: Arc<SnapshotStore>,
    notifications: Arc<NotificationService>,
    changes: Arc<ChangeLog>,

    watch_set: Arc<RwLock<BTreeSet<String>>>,
    check_interval: Duration,
    backoff_interval: Duration,
    reap_retention: Duration,

    running: Arc<AtomicBool>,
    cycles: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
    task: Mutex<Option<(watch::Sender<bool>, JoinHandle<()>)>>,
}

impl ChangeMonitor {
    pub fn new(
        config: &MonitorConfig,
        reap_retention: Duration,
        scanner: Arc<AclScanner>,
        store: Arc<SnapshotStore>,
        notifications: Arc<NotificationService>,
        changes: Arc<ChangeLog>,
    ) -> Self {
        Self {
            scanner,
            store,
            notifications,
            changes,
            watch_set: Arc::new(RwLock::new(config.paths.iter().cloned().collect())),
            check_interval: config.check_interval,
            backoff_interval: config.backoff_interval,
            reap_retention,
            running: Arc::new(AtomicBool::new(false)),
            cycles: Arc::new(AtomicU64::new(0)),
            errors: Arc::new(AtomicU64::new(0)),
            task: Mutex::new(None),
        }
    }

    /// Adds paths to the watch set and starts the loop if it is not already
    /// running. Additions during a running cycle take effect next cycle.
    pub async fn start(self: &Arc<Self>, paths: Vec<String>) {
        if !paths.is_empty() {
            self.watch_set.write().extend(paths);
        }

        let mut task = self.task.lock().await;
        if task.is_some() {
            info!("Monitoring already active");
            return;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        self.running.store(true, Ordering::SeqCst);

        let monitor = self.clone();
        let handle = tokio::spawn(async move {
            monitor.run_loop(stop_rx).await;
        });
        *task = Some((stop_tx, handle));

        let watched = self.watch_set.read().len();
        info!("Started monitoring {watched} paths");
        self.notifications.broadcast(Notification::system_status(
            "Permission monitoring started",
            json!({ "watched_paths": watched }),
        ));
    }

    /// Stops the loop and joins the task. A sleeping loop wakes immediately;
    /// a cycle in progress finishes its current path first.
    pub async fn stop(&self) {
        let Some((stop_tx, handle)) = self.task.lock().await.take() else {
            info!("Monitoring already stopped");
            return;
        };

        let _ = stop_tx.send(true);
        if let Err(e) = handle.await {
            error!("Monitor task join failed: {e}");
        }
        self.running.store(false, Ordering::SeqCst);
        info!("Stopped monitoring");
        self.notifications.broadcast(Notification::system_status(
            "Permission monitoring stopped",
            json!({}),
        ));
    }

    /// Adds one path; takes effect on the next cycle.
    pub fn add_path(&self, path: &str) {
        self.watch_set.write().insert(path.to_string());
        info!("Added monitoring path: {path}");
    }

    /// Removes one path; takes effect on the next cycle.
    pub fn remove_path(&self, path: &str) {
        self.watch_set.write().remove(path);
        info!("Removed monitoring path: {path}");
    }

    pub fn status(&self) -> MonitorStatus {
        let stats = self.notifications.stats();
        MonitorStatus {
            active: self.running.load(Ordering::SeqCst),
            watched_paths: self.watch_set.read().iter().cloned().collect(),
            queue_depth: stats.queue_depth,
            connections: stats.active_connections,
            cycles_completed: self.cycles.load(Ordering::Relaxed),
            cycle_errors: self.errors.load(Ordering::Relaxed),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn run_loop(&self, mut stop_rx: watch::Receiver<bool>) {
        info!("Change monitor loop started.");
        loop {
            if *stop_rx.borrow() {
                break;
            }

            let sleep_for = match self.run_cycle().await {
                Ok(()) => {
                    self.cycles.fetch_add(1, Ordering::Relaxed);
                    self.check_interval
                }
                Err(e) => {
                    error!("Error in monitor cycle: {e}");
                    self.errors.fetch_add(1, Ordering::Relaxed);
                    self.backoff_interval
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Change monitor loop shutting down.");
    }

    /// One sweep of the watch set, followed by a store reap. Also exposed
    /// for manual rescans outside the periodic loop.
    ///
    /// Per-path failures are isolated: they are logged and counted, and the
    /// watch set is preserved.
    pub async fn run_cycle(&self) -> Result<(), ShareGuardError> {
        let paths: Vec<String> = self.watch_set.read().iter().cloned().collect();

        for path in paths {
            if let Err(e) = self.check_path(&path).await {
                warn!("Error checking path {path}: {e}");
                self.errors.fetch_add(1, Ordering::Relaxed);
            }
        }

        let cutoff = Utc::now()
            - ChronoDuration::from_std(self.reap_retention).unwrap_or(ChronoDuration::zero());
        self.store.reap(cutoff);
        Ok(())
    }

    /// Diffs one path against its stored baseline and reacts to significant
    /// changes.
    async fn check_path(&self, path: &str) -> Result<(), ShareGuardError> {
        let exists = {
            let source = self.scanner.source().clone();
            let path = path.to_string();
            tokio::task::spawn_blocking(move || source.exists(&path)).await?
        };
        if !exists {
            warn!("Monitored path no longer exists: {path}");
            return Ok(());
        }

        let current = self.scanner.snapshot(path).await?;

        let Some(entry) = self.store.get(path) else {
            info!("Creating initial cache entry for: {path}");
            self.store.put(path, current).await?;
            return Ok(());
        };

        // Checksum equality is the fast path; the structural diff is skipped
        // entirely when the canonical tuples match.
        if entry.checksum == current.checksum() {
            return Ok(());
        }
        info!("Detected potential permission change for: {path}");

        let changes = ChangeDetector::diff(&entry.snapshot, &current);
        if !changes.is_significant() {
            return Ok(());
        }
        info!("Confirmed significant permission change for: {path}");

        let detected_at = Utc::now();
        let records = ChangeDetector::records(path, &changes, detected_at);
        let severity = ChangeDetector::severity(&changes);
        let message = ChangeDetector::format_message(path, &changes);
        let details = ChangeDetector::format_details(path, &changes);

        self.store.put(path, current).await?;
        self.store.mark_stale(path);

        let top_severity = records.iter().map(|r| r.severity).max();
        if let Some(primary) =
            top_severity.and_then(|s| records.iter().find(|r| r.severity == s))
        {
            self.notifications.broadcast(Notification::permission_change(
                primary, &details, message, severity,
            ));
        }
        self.changes.push_all(records);

        Ok(())
    }
}
