// src/core/tasks/mod.rs

//! Long-running background tasks that support the service's core
//! functionality.

pub mod monitor;

pub use monitor::{ChangeMonitor, MonitorStatus};
