// src/core/state/mod.rs

//! Defines the central `AppState` struct, holding all shared service-wide
//! state, and its initialization.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::core::changes::ChangeLog;
use crate::core::health::{HealthAnalyzer, HealthThresholds};
use crate::core::notify::{NotificationService, QueuedDelivery};
use crate::core::resolver::{DirectoryProvider, MembershipTracer, PrincipalResolver};
use crate::core::scanner::{AclScanner, SecurityDescriptorSource};
use crate::core::store::SnapshotStore;
use crate::core::tasks::ChangeMonitor;

/// Contains the initialized shared state plus the channel receivers consumed
/// by the background-task spawner. Created once at startup.
pub struct AppInit {
    pub state: Arc<AppState>,
    /// Receiver half of the notification delivery queue.
    pub notification_rx: mpsc::Receiver<QueuedDelivery>,
}

/// The central struct holding all shared, service-wide state. Wrapped in an
/// `Arc` and passed to every task and connection handler.
pub struct AppState {
    pub config: Arc<Config>,
    pub resolver: Arc<PrincipalResolver>,
    pub tracer: Arc<MembershipTracer>,
    pub scanner: Arc<AclScanner>,
    pub store: Arc<SnapshotStore>,
    pub health: Arc<HealthAnalyzer>,
    pub notifications: Arc<NotificationService>,
    pub monitor: Arc<ChangeMonitor>,
    pub changes: Arc<ChangeLog>,
}

impl AppState {
    /// Wires every component together from the configuration and the two
    /// platform seams.
    pub fn initialize(
        config: Config,
        directory: Arc<dyn DirectoryProvider>,
        source: Arc<dyn SecurityDescriptorSource>,
    ) -> AppInit {
        let config = Arc::new(config);

        let resolver = Arc::new(PrincipalResolver::new(directory.clone()));
        let tracer = Arc::new(MembershipTracer::new(directory));
        let scanner = Arc::new(AclScanner::new(
            source.clone(),
            resolver.clone(),
            tracer.clone(),
            config.scanner.excluded_paths.clone(),
            config.scanner.max_depth,
        ));
        let store = Arc::new(SnapshotStore::new(source, config.cache.ttl));
        let health = Arc::new(HealthAnalyzer::new(
            scanner.clone(),
            store.clone(),
            HealthThresholds::from(&config.health),
        ));
        let (notifications, notification_rx) = NotificationService::new(&config.notifications);
        let changes = Arc::new(ChangeLog::new());
        let monitor = Arc::new(ChangeMonitor::new(
            &config.monitor,
            config.cache.reap_retention,
            scanner.clone(),
            store.clone(),
            notifications.clone(),
            changes.clone(),
        ));

        let state = Arc::new(Self {
            config,
            resolver,
            tracer,
            scanner,
            store,
            health,
            notifications,
            monitor,
            changes,
        });

        AppInit {
            state,
            notification_rx,
        }
    }
}
