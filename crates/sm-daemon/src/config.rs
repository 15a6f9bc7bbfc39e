// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk configuration (§6 "Config keys"): a closed TOML key set with
//! human-readable durations and silently-clamped alert priorities.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// A duration parsed from a human suffix (`s`, `m`, `h`, `d`), the format
/// every `*TTL`/`*Timeout` config key uses (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HumanDuration(pub std::time::Duration);

impl HumanDuration {
    pub fn as_std(self) -> std::time::Duration {
        self.0
    }

    pub fn as_chrono(self) -> chrono::Duration {
        chrono::Duration::from_std(self.0).unwrap_or(chrono::Duration::zero())
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_human_duration(&raw).map(HumanDuration).map_err(serde::de::Error::custom)
    }
}

fn parse_human_duration(raw: &str) -> Result<std::time::Duration, String> {
    let raw = raw.trim();
    let (digits, unit) = raw.split_at(raw.len() - 1);
    let amount: u64 = digits.parse().map_err(|_| format!("invalid duration {raw:?}"))?;
    let secs = match unit {
        "s" => amount,
        "m" => amount * 60,
        "h" => amount * 3600,
        "d" => amount * 86400,
        _ => return Err(format!("unknown duration suffix in {raw:?}")),
    };
    Ok(std::time::Duration::from_secs(secs))
}

fn default_service_ttl() -> HumanDuration {
    HumanDuration(std::time::Duration::from_secs(30 * 86400))
}

fn default_layer_ttl() -> HumanDuration {
    HumanDuration(std::time::Duration::from_secs(30 * 86400))
}

fn default_health_check_timeout() -> HumanDuration {
    HumanDuration(std::time::Duration::from_secs(35))
}

fn default_reconnect_timeout() -> HumanDuration {
    HumanDuration(std::time::Duration::from_secs(10))
}

fn default_poll_period() -> HumanDuration {
    HumanDuration(std::time::Duration::from_secs(35))
}

fn default_average_window() -> HumanDuration {
    HumanDuration(std::time::Duration::from_secs(35))
}

fn default_alert_sending_period() -> HumanDuration {
    HumanDuration(std::time::Duration::from_secs(5 * 60))
}

const DEFAULT_SERVICE_PRIORITY: u8 = 4;
const DEFAULT_SYSTEM_PRIORITY: u8 = 3;
const MAX_PRIORITY: u8 = 7;

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default = "default_poll_period")]
    pub poll_period: HumanDuration,
    #[serde(default = "default_average_window")]
    pub average_window: HumanDuration,
    #[serde(default)]
    pub source: Option<String>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        MonitoringConfig { poll_period: default_poll_period(), average_window: default_average_window(), source: None }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfigSection {
    #[serde(default)]
    pub max_part_size: u64,
    #[serde(default)]
    pub max_part_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JournalAlertsConfigSection {
    #[serde(default)]
    pub filter: Vec<String>,
    #[serde(default = "default_service_priority_raw")]
    service_alert_priority: u8,
    #[serde(default = "default_system_priority_raw")]
    system_alert_priority: u8,
    #[serde(default = "default_alert_sending_period")]
    pub sending_period: HumanDuration,
}

fn default_service_priority_raw() -> u8 {
    DEFAULT_SERVICE_PRIORITY
}

fn default_system_priority_raw() -> u8 {
    DEFAULT_SYSTEM_PRIORITY
}

impl Default for JournalAlertsConfigSection {
    fn default() -> Self {
        JournalAlertsConfigSection {
            filter: Vec::new(),
            service_alert_priority: DEFAULT_SERVICE_PRIORITY,
            system_alert_priority: DEFAULT_SYSTEM_PRIORITY,
            sending_period: default_alert_sending_period(),
        }
    }
}

impl JournalAlertsConfigSection {
    /// Priorities outside `[0,7]` silently reset to default with a warning
    /// (§6 "Config keys").
    pub fn service_alert_priority(&self) -> u8 {
        clamp_priority(self.service_alert_priority, DEFAULT_SERVICE_PRIORITY, "journalAlerts.serviceAlertPriority")
    }

    pub fn system_alert_priority(&self) -> u8 {
        clamp_priority(self.system_alert_priority, DEFAULT_SYSTEM_PRIORITY, "journalAlerts.systemAlertPriority")
    }
}

fn clamp_priority(value: u8, default: u8, key: &str) -> u8 {
    if value > MAX_PRIORITY {
        tracing::warn!(value, key, "priority out of range [0,7], resetting to default");
        default
    } else {
        value
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostEntry {
    pub ip: String,
    pub hostname: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MigrationConfig {
    #[serde(default)]
    pub migration_path: Option<PathBuf>,
    #[serde(default)]
    pub merged_migration_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub ca_cert: PathBuf,
    pub cert_storage: PathBuf,
    pub cm_server_url: String,
    pub iam_public_server_url: String,
    pub iam_protected_server_url: String,
    pub working_dir: PathBuf,
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
    #[serde(default)]
    pub services_dir: Option<PathBuf>,
    #[serde(default)]
    pub services_part_limit: u64,
    #[serde(default)]
    pub layers_dir: Option<PathBuf>,
    #[serde(default)]
    pub layers_part_limit: u64,
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
    #[serde(default)]
    pub extract_dir: Option<PathBuf>,
    #[serde(default)]
    pub node_config_file: Option<PathBuf>,
    #[serde(default = "default_service_ttl")]
    pub service_ttl: HumanDuration,
    #[serde(default = "default_layer_ttl")]
    pub layer_ttl: HumanDuration,
    #[serde(default = "default_health_check_timeout")]
    pub service_health_check_timeout: HumanDuration,
    #[serde(default = "default_reconnect_timeout")]
    pub cm_reconnect_timeout: HumanDuration,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub logging: LoggingConfigSection,
    #[serde(default)]
    pub journal_alerts: JournalAlertsConfigSection,
    #[serde(default)]
    pub host_binds: Vec<String>,
    #[serde(default)]
    pub hosts: Vec<HostEntry>,
    #[serde(default)]
    pub migration: MigrationConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        toml::from_str(&raw).map_err(ConfigError::Parse)
    }

    pub fn services_dir(&self) -> PathBuf {
        self.services_dir.clone().unwrap_or_else(|| self.working_dir.join("services"))
    }

    pub fn layers_dir(&self) -> PathBuf {
        self.layers_dir.clone().unwrap_or_else(|| self.working_dir.join("layers"))
    }

    pub fn download_dir(&self) -> PathBuf {
        self.download_dir.clone().unwrap_or_else(|| self.working_dir.join("downloads"))
    }

    pub fn extract_dir(&self) -> PathBuf {
        self.extract_dir.clone().unwrap_or_else(|| self.working_dir.join("extracts"))
    }

    pub fn db_path(&self) -> PathBuf {
        sm_storage::store::default_db_path(&self.working_dir)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(PathBuf, #[source] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
