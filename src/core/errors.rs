// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the service.
/// Using `thiserror` allows for clean error definitions and automatic `From`
/// trait implementations.
#[derive(Error, Debug, Clone)]
pub enum ShareGuardError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Path does not exist: {0}")]
    NotFound(String),

    #[error("Path is in exclusion list: {0}")]
    Excluded(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Scan failed for {path}: {reason}")]
    ScanFailed { path: String, reason: String },

    #[error("SID could not be resolved: {0}")]
    ResolutionFailed(String),

    #[error("Descriptor source error: {0}")]
    DescriptorSource(String),

    #[error("Storage Error: {0}")]
    Storage(String),

    #[error("Notification send failed: {0}")]
    NotificationSend(String),

    #[error("Notification queue is full")]
    NotificationQueueFull,

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(uuid::Uuid),

    #[error("Issue not found: {0}")]
    IssueNotFound(u64),

    #[error("Monitor is not running")]
    MonitorNotRunning,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShareGuardError {
    /// Recoverable conditions are captured and counted rather than
    /// propagated: per-subfolder scan errors, per-subscription send
    /// failures, and SID resolution failures.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ShareGuardError::PermissionDenied(_)
                | ShareGuardError::ResolutionFailed(_)
                | ShareGuardError::NotificationSend(_)
                | ShareGuardError::ScanFailed { .. }
        )
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for ShareGuardError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            return ShareGuardError::PermissionDenied(e.to_string());
        }
        ShareGuardError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for ShareGuardError {
    fn from(e: serde_json::Error) -> Self {
        ShareGuardError::Internal(format!("JSON serialization/deserialization error: {e}"))
    }
}

impl From<tokio::task::JoinError> for ShareGuardError {
    fn from(e: tokio::task::JoinError) -> Self {
        ShareGuardError::Internal(format!("Background task failed: {e}"))
    }
}
