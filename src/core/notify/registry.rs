// src/core/notify/registry.rs

//! The connection registry: subscriptions, per-connection filters, and the
//! fan-out primitives the queue processor drives.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::errors::ShareGuardError;
use crate::core::model::Severity;

use super::envelope::{Notification, NotificationType};

/// Per-subscription delivery filters. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<NotificationType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_prefixes: Option<Vec<String>>,
}

impl SubscriptionFilters {
    /// Whether a notification passes this filter: type membership, severity
    /// rank at or above the floor, and any configured prefix appearing as a
    /// substring of the notification's path.
    pub fn matches(&self, notification: &Notification) -> bool {
        if let Some(types) = &self.types {
            if !types.contains(&notification.kind) {
                return false;
            }
        }

        if let Some(min) = self.min_severity {
            if notification.severity.rank() < min.rank() {
                return false;
            }
        }

        if let Some(prefixes) = &self.path_prefixes {
            let path = notification.path().unwrap_or("");
            if !prefixes.iter().any(|prefix| path.contains(prefix.as_str())) {
                return false;
            }
        }

        true
    }
}

/// The transport half of a subscription. Sinks are held weakly in spirit: a
/// failed send removes the subscription rather than retrying.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, payload: String) -> Result<(), ShareGuardError>;
}

/// One connected client.
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Option<String>,
    sink: Arc<dyn NotificationSink>,
}

/// In-memory table of subscriptions with a by-user index and per-connection
/// filters. All mutations go through entry-level locks; broadcast iterates a
/// snapshot of the current subscription ids.
#[derive(Default)]
pub struct ConnectionManager {
    connections: DashMap<Uuid, Arc<Subscription>>,
    filters: DashMap<Uuid, SubscriptionFilters>,
    by_user: DashMap<String, HashSet<Uuid>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscription and sends the `connection_established`
    /// envelope. The send is best-effort: a transport that fails here is
    /// removed immediately.
    pub async fn connect(
        &self,
        sink: Arc<dyn NotificationSink>,
        user_id: Option<String>,
        filters: SubscriptionFilters,
        send_timeout: Duration,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let subscription = Arc::new(Subscription {
            id,
            user_id: user_id.clone(),
            sink,
        });

        self.connections.insert(id, subscription);
        self.filters.insert(id, filters);
        if let Some(user) = user_id.clone() {
            self.by_user.entry(user).or_default().insert(id);
        }
        info!("Subscription established: {id} (user: {user_id:?})");

        let hello = json!({
            "type": "connection_established",
            "connection_id": id,
            "timestamp": Utc::now(),
        });
        let _ = self.send_to(id, hello.to_string(), send_timeout).await;

        id
    }

    /// Unregisters a subscription; idempotent.
    pub fn disconnect(&self, id: Uuid) -> bool {
        let removed = self.connections.remove(&id);
        self.filters.remove(&id);

        if let Some((_, subscription)) = &removed {
            if let Some(user) = &subscription.user_id {
                if let Some(mut ids) = self.by_user.get_mut(user) {
                    ids.remove(&id);
                }
                self.by_user.remove_if(user, |_, ids| ids.is_empty());
            }
            info!("Subscription closed: {id}");
        }

        removed.is_some()
    }

    /// Sends a payload to one subscription. A failed or timed-out send
    /// disconnects that subscription (and only that one).
    pub async fn send_to(
        &self,
        id: Uuid,
        payload: String,
        timeout: Duration,
    ) -> Result<(), ShareGuardError> {
        let Some(subscription) = self.connections.get(&id).map(|s| s.clone()) else {
            return Err(ShareGuardError::SubscriptionNotFound(id));
        };

        let outcome = tokio::time::timeout(timeout, subscription.sink.send(payload)).await;
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                warn!("Send failed for subscription {id}: {e}; disconnecting");
                self.disconnect(id);
                Err(e)
            }
            Err(_) => {
                warn!("Send timed out for subscription {id}; disconnecting");
                self.disconnect(id);
                Err(ShareGuardError::NotificationSend(format!(
                    "send to {id} timed out"
                )))
            }
        }
    }

    /// Sends a payload to every subscription of a user. Returns how many
    /// sends succeeded.
    pub async fn send_to_user(&self, user: &str, payload: &str, timeout: Duration) -> usize {
        let ids: Vec<Uuid> = self
            .by_user
            .get(user)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();

        let mut sent = 0;
        for id in ids {
            if self.send_to(id, payload.to_string(), timeout).await.is_ok() {
                sent += 1;
            }
        }
        sent
    }

    /// Fans a notification out to every subscription whose filters match.
    /// Iteration runs over a snapshot of the registry, so connects and
    /// disconnects during the fan-out are safe. Returns how many sends
    /// succeeded.
    pub async fn broadcast(&self, notification: &Notification, timeout: Duration) -> usize {
        let payload = match serde_json::to_string(notification) {
            Ok(p) => p,
            Err(e) => {
                warn!("Could not serialize notification {}: {e}", notification.id);
                return 0;
            }
        };

        let ids: Vec<Uuid> = self.connections.iter().map(|e| *e.key()).collect();
        let mut sent = 0;

        for id in ids {
            let matches = self
                .filters
                .get(&id)
                .map(|f| f.matches(notification))
                .unwrap_or(true);
            if !matches {
                debug!("Notification {} filtered for {id}", notification.id);
                continue;
            }
            if self.send_to(id, payload.clone(), timeout).await.is_ok() {
                sent += 1;
            }
        }
        sent
    }

    /// Replaces a subscription's filters.
    pub fn update_filters(&self, id: Uuid, filters: SubscriptionFilters) -> bool {
        if !self.connections.contains_key(&id) {
            return false;
        }
        self.filters.insert(id, filters);
        true
    }

    pub fn filters_of(&self, id: Uuid) -> Option<SubscriptionFilters> {
        self.filters.get(&id).map(|f| f.clone())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn user_count(&self) -> usize {
        self.by_user.len()
    }

    /// Drops every subscription; used at shutdown.
    pub fn close_all(&self) {
        let ids: Vec<Uuid> = self.connections.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.disconnect(id);
        }
    }
}
