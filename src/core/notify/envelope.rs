// src/core/notify/envelope.rs

//! The outbound notification envelope: the stable wire format pushed to
//! subscribed clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use strum_macros::{Display, EnumString};
use uuid::Uuid;

use crate::core::detector::ChangeDetails;
use crate::core::model::{ChangeRecord, Severity};

/// The closed set of notification kinds on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationType {
    PermissionChange,
    GroupMembershipChange,
    NewAccessGranted,
    AccessRemoved,
    AlertTriggered,
    SystemStatus,
}

/// One notification envelope. Field names and shapes are wire-stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
    pub read: bool,
}

impl Notification {
    pub fn new(
        kind: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            title: title.into(),
            message: message.into(),
            severity,
            timestamp: Utc::now(),
            data,
            read: false,
        }
    }

    /// The envelope for a detected permission change. `primary` is the
    /// highest-severity record of the diff; the detail record carries every
    /// category for rendering.
    pub fn permission_change(
        primary: &ChangeRecord,
        details: &ChangeDetails,
        message: String,
        severity: Severity,
    ) -> Self {
        let data = json!({
            "change_id": primary.id,
            "change_type": primary.change_type,
            "path": &primary.path,
            "previous_state": &primary.previous_state,
            "current_state": &primary.current_state,
            "detected_time": primary.detected_at,
            "folder": &details.folder,
            "summary": &details.summary,
            "changes": &details.changes,
        });
        Self::new(
            NotificationType::PermissionChange,
            "Permission Change Detected",
            message,
            severity,
            data,
        )
    }

    /// Lifecycle announcements (monitor start/stop, service state).
    pub fn system_status(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self::new(
            NotificationType::SystemStatus,
            "System Status",
            message,
            Severity::Low,
            data,
        )
    }

    /// The path this notification concerns, when it has one; drives the
    /// subscription path filter.
    pub fn path(&self) -> Option<&str> {
        self.data.get("path").and_then(|v| v.as_str())
    }
}
