// src/core/notify/mod.rs

//! The notification service: a bounded delivery queue feeding the
//! subscription registry, plus the client-to-server control messages.
//!
//! Fan-out is single-producer/single-consumer into a broadcast step: one
//! queue, one processor task, no per-subscription queues. A slow or dead
//! subscription is disconnected rather than allowed to stall the rest.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub mod envelope;
pub mod registry;

pub use envelope::{Notification, NotificationType};
pub use registry::{ConnectionManager, NotificationSink, SubscriptionFilters};

use crate::config::NotificationConfig;
use crate::core::errors::ShareGuardError;

/// Where a queued notification goes.
#[derive(Debug, Clone)]
pub enum DeliveryTarget {
    /// Every subscription, applying per-connection filters.
    Broadcast,
    /// Every subscription of one user; filters do not apply.
    User(String),
    /// Exactly one subscription; filters do not apply.
    Subscription(Uuid),
}

/// One unit of work on the delivery queue.
#[derive(Debug, Clone)]
pub struct QueuedDelivery {
    notification: Notification,
    target: DeliveryTarget,
}

/// Messages clients send over their subscription transport.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
    UpdateFilters { filters: SubscriptionFilters },
    AcknowledgeNotification { notification_id: Uuid },
}

/// Delivery counters, surfaced through the status API.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NotificationStats {
    pub notifications_queued: u64,
    pub notifications_sent: u64,
    pub notifications_dropped: u64,
    pub connections_established: u64,
    pub connections_closed: u64,
    pub queue_depth: usize,
    pub active_connections: usize,
    pub unique_users: usize,
}

/// The notification service facade: registry plus queue producer side.
pub struct NotificationService {
    manager: ConnectionManager,
    queue_tx: mpsc::Sender<QueuedDelivery>,
    send_timeout: Duration,

    queued: AtomicU64,
    sent: AtomicU64,
    dropped: AtomicU64,
    established: AtomicU64,
    closed: AtomicU64,
}

impl NotificationService {
    /// Creates the service and the receiver half handed to the processor
    /// task at spawn time.
    pub fn new(config: &NotificationConfig) -> (Arc<Self>, mpsc::Receiver<QueuedDelivery>) {
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);
        let service = Arc::new(Self {
            manager: ConnectionManager::new(),
            queue_tx,
            send_timeout: config.send_timeout,
            queued: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            established: AtomicU64::new(0),
            closed: AtomicU64::new(0),
        });
        (service, queue_rx)
    }

    /// Registers a transport and returns the subscription id.
    pub async fn connect(
        &self,
        sink: Arc<dyn NotificationSink>,
        user_id: Option<String>,
        filters: SubscriptionFilters,
    ) -> Uuid {
        self.established.fetch_add(1, Ordering::Relaxed);
        self.manager
            .connect(sink, user_id, filters, self.send_timeout)
            .await
    }

    /// Removes a subscription; idempotent.
    pub fn disconnect(&self, id: Uuid) {
        if self.manager.disconnect(id) {
            self.closed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Places a notification on the delivery queue. The queue is bounded; a
    /// full queue drops the message and counts it rather than blocking the
    /// producer (the monitor loop must not stall behind slow clients).
    pub fn publish(&self, notification: Notification, target: DeliveryTarget) {
        match self.queue_tx.try_send(QueuedDelivery {
            notification,
            target,
        }) {
            Ok(()) => {
                self.queued.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(item)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Notification queue full; dropping notification {}",
                    item.notification.id
                );
            }
            Err(TrySendError::Closed(item)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Notification queue closed; dropping notification {}",
                    item.notification.id
                );
            }
        }
    }

    /// Broadcast shorthand used by the monitor loop.
    pub fn broadcast(&self, notification: Notification) {
        self.publish(notification, DeliveryTarget::Broadcast);
    }

    /// Handles one inbound client control message on a subscription.
    pub async fn handle_client_message(
        &self,
        subscription_id: Uuid,
        message: ClientMessage,
    ) -> Result<(), ShareGuardError> {
        match message {
            ClientMessage::Ping => {
                let reply = json!({
                    "type": "pong",
                    "timestamp": Utc::now(),
                });
                self.manager
                    .send_to(subscription_id, reply.to_string(), self.send_timeout)
                    .await
            }
            ClientMessage::UpdateFilters { filters } => {
                if !self.manager.update_filters(subscription_id, filters.clone()) {
                    return Err(ShareGuardError::SubscriptionNotFound(subscription_id));
                }
                debug!("Filters updated for subscription {subscription_id}");
                let reply = json!({
                    "type": "filters_updated",
                    "filters": filters,
                    "timestamp": Utc::now(),
                });
                self.manager
                    .send_to(subscription_id, reply.to_string(), self.send_timeout)
                    .await
            }
            ClientMessage::AcknowledgeNotification { notification_id } => {
                let reply = json!({
                    "type": "notification_acknowledged",
                    "notification_id": notification_id,
                    "timestamp": Utc::now(),
                });
                self.manager
                    .send_to(subscription_id, reply.to_string(), self.send_timeout)
                    .await
            }
        }
    }

    pub fn stats(&self) -> NotificationStats {
        NotificationStats {
            notifications_queued: self.queued.load(Ordering::Relaxed),
            notifications_sent: self.sent.load(Ordering::Relaxed),
            notifications_dropped: self.dropped.load(Ordering::Relaxed),
            connections_established: self.established.load(Ordering::Relaxed),
            connections_closed: self.closed.load(Ordering::Relaxed),
            queue_depth: self.queue_tx.max_capacity() - self.queue_tx.capacity(),
            active_connections: self.manager.connection_count(),
            unique_users: self.manager.user_count(),
        }
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Closes every subscription; called at shutdown after the processor
    /// has drained.
    pub fn close_all(&self) {
        self.manager.close_all();
    }
}

/// The single queue-drain task. Each message is delivered at most once per
/// matching subscription; failures disconnect only the failing subscription
/// and the message is never re-queued.
pub struct NotificationProcessorTask {
    service: Arc<NotificationService>,
    rx: mpsc::Receiver<QueuedDelivery>,
}

impl NotificationProcessorTask {
    pub fn new(service: Arc<NotificationService>, rx: mpsc::Receiver<QueuedDelivery>) -> Self {
        Self { service, rx }
    }

    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Notification queue processor started.");
        loop {
            tokio::select! {
                item = self.rx.recv() => {
                    match item {
                        Some(delivery) => self.deliver(delivery).await,
                        None => {
                            info!("Notification queue closed; processor exiting.");
                            return;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Notification queue processor shutting down.");
                    self.service.close_all();
                    return;
                }
            }
        }
    }

    async fn deliver(&self, delivery: QueuedDelivery) {
        let service = &self.service;
        let timeout = service.send_timeout;
        let notification = delivery.notification;

        let sent = match delivery.target {
            DeliveryTarget::Broadcast => service.manager.broadcast(&notification, timeout).await,
            DeliveryTarget::User(user) => {
                match serde_json::to_string(&notification) {
                    Ok(payload) => service.manager.send_to_user(&user, &payload, timeout).await,
                    Err(e) => {
                        warn!("Could not serialize notification {}: {e}", notification.id);
                        0
                    }
                }
            }
            DeliveryTarget::Subscription(id) => {
                match serde_json::to_string(&notification) {
                    Ok(payload) => service
                        .manager
                        .send_to(id, payload, timeout)
                        .await
                        .map(|_| 1)
                        .unwrap_or(0),
                    Err(e) => {
                        warn!("Could not serialize notification {}: {e}", notification.id);
                        0
                    }
                }
            }
        };

        service.sent.fetch_add(sent as u64, Ordering::Relaxed);
        debug!(
            "Processed notification {} - sent to {sent} subscription(s)",
            notification.id
        );
    }
}
