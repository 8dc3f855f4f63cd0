// src/config.rs

//! Manages service configuration: loading, defaulting, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Configuration for the ACL scanner.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ScannerConfig {
    /// Recursion cap for subfolder scans.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    /// Scanner batch cursor size for bulk path operations.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Path-prefix blacklist; scans of matching paths are rejected.
    #[serde(default = "default_excluded_paths")]
    pub excluded_paths: Vec<String>,
    /// Exported security-descriptor dump served by the replay source.
    #[serde(default = "default_descriptor_dump")]
    pub descriptor_dump: String,
    /// Exported account directory served by the static directory provider.
    #[serde(default = "default_directory_dump")]
    pub directory_dump: String,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            batch_size: default_batch_size(),
            excluded_paths: default_excluded_paths(),
            descriptor_dump: default_descriptor_dump(),
            directory_dump: default_directory_dump(),
        }
    }
}

fn default_max_depth() -> u32 {
    5
}
fn default_batch_size() -> usize {
    1000
}
fn default_excluded_paths() -> Vec<String> {
    vec![
        "C:\\Windows\\".to_string(),
        "C:\\Program Files\\".to_string(),
        "C:\\Program Files (x86)\\".to_string(),
    ]
}
fn default_descriptor_dump() -> String {
    "shareguard_data/descriptors.json".to_string()
}
fn default_directory_dump() -> String {
    "shareguard_data/directory.json".to_string()
}

/// Configuration for the snapshot cache.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CacheConfig {
    /// Validity window for a cache entry.
    #[serde(default = "default_cache_ttl", with = "humantime_serde")]
    pub ttl: Duration,
    /// Reaper cutoff: entries stored earlier than this ago are removed.
    #[serde(default = "default_reap_retention", with = "humantime_serde")]
    pub reap_retention: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: default_cache_ttl(),
            reap_retention: default_reap_retention(),
        }
    }
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(24 * 3600)
}
fn default_reap_retention() -> Duration {
    Duration::from_secs(48 * 3600)
}

/// Configuration for the change monitor loop.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MonitorConfig {
    /// Cycle period between sweeps of the watch set.
    #[serde(default = "default_check_interval", with = "humantime_serde")]
    pub check_interval: Duration,
    /// Sleep applied after a cycle-level failure before resuming.
    #[serde(default = "default_backoff_interval", with = "humantime_serde")]
    pub backoff_interval: Duration,
    /// Paths placed on the watch set at startup.
    #[serde(default)]
    pub paths: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            backoff_interval: default_backoff_interval(),
            paths: Vec::new(),
        }
    }
}

fn default_check_interval() -> Duration {
    Duration::from_secs(60)
}
fn default_backoff_interval() -> Duration {
    Duration::from_secs(60)
}

/// Thresholds for the health analyzer.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthConfig {
    /// ACE count above which the excessive-ACE detector triggers.
    #[serde(default = "default_max_ace_count")]
    pub max_ace_count: usize,
    /// Direct-user-ACE count above which severity escalates to high.
    #[serde(default = "default_max_direct_user_aces")]
    pub max_direct_user_aces: usize,
    /// Substrings identifying broad high-privilege groups.
    #[serde(default = "default_critical_groups")]
    pub critical_groups: Vec<String>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_ace_count: default_max_ace_count(),
            max_direct_user_aces: default_max_direct_user_aces(),
            critical_groups: default_critical_groups(),
        }
    }
}

fn default_max_ace_count() -> usize {
    50
}
fn default_max_direct_user_aces() -> usize {
    5
}
fn default_critical_groups() -> Vec<String> {
    vec![
        "Domain Admins".to_string(),
        "Enterprise Admins".to_string(),
        "Administrators".to_string(),
        "BUILTIN\\Administrators".to_string(),
        "Everyone".to_string(),
    ]
}

/// Configuration for the notification service.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NotificationConfig {
    /// Capacity of the bounded internal delivery queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Per-subscription send timeout; exceeding it disconnects that one
    /// subscription.
    #[serde(default = "default_send_timeout", with = "humantime_serde")]
    pub send_timeout: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            send_timeout: default_send_timeout(),
        }
    }
}

fn default_queue_capacity() -> usize {
    4096
}
fn default_send_timeout() -> Duration {
    Duration::from_secs(5)
}

/// The fully resolved service configuration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8790
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            scanner: ScannerConfig::default(),
            cache: CacheConfig::default(),
            monitor: MonitorConfig::default(),
            health: HealthConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl Config {
    /// Loads and validates the configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{path}'"))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations that cannot produce a working service.
    pub fn validate(&self) -> Result<()> {
        if self.monitor.check_interval.is_zero() {
            return Err(anyhow!("monitor.check_interval must be greater than zero"));
        }
        if self.cache.ttl.is_zero() {
            return Err(anyhow!("cache.ttl must be greater than zero"));
        }
        if self.notifications.queue_capacity == 0 {
            return Err(anyhow!(
                "notifications.queue_capacity must be greater than zero"
            ));
        }
        if self.health.max_ace_count == 0 {
            return Err(anyhow!("health.max_ace_count must be greater than zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.scanner.max_depth, 5);
        assert_eq!(config.cache.ttl, Duration::from_secs(86400));
        assert_eq!(config.monitor.check_interval, Duration::from_secs(60));
        assert_eq!(config.health.max_ace_count, 50);
    }

    #[test]
    fn parses_partial_toml() {
        let toml = r#"
            port = 9000

            [monitor]
            check_interval = "30s"

            [health]
            max_ace_count = 80
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.monitor.check_interval, Duration::from_secs(30));
        assert_eq!(config.health.max_ace_count, 80);
        assert_eq!(config.scanner.max_depth, 5);
    }

    #[test]
    fn rejects_zero_interval() {
        let mut config = Config::default();
        config.monitor.check_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shareguard.toml");
        fs::write(&path, "port = 9100\n\n[cache]\nttl = \"1h\"\n").unwrap();

        let config = Config::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.cache.ttl, Duration::from_secs(3600));
    }

    #[test]
    fn rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shareguard.toml");
        fs::write(&path, "port = \"not a port\"").unwrap();
        assert!(Config::from_file(path.to_str().unwrap()).is_err());
    }
}
