// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const MINIMAL: &str = r#"
caCert = "/etc/aos/ca.pem"
certStorage = "/etc/aos/certs"
cmServerURL = "cm.example:8443"
iamPublicServerURL = "iam.example:8090"
iamProtectedServerURL = "iam.example:8089"
workingDir = "/var/aos/sm"
"#;

#[test]
fn minimal_config_fills_in_defaults() {
    let cfg: Config = toml::from_str(MINIMAL).unwrap();
    assert_eq!(cfg.service_ttl.as_std(), std::time::Duration::from_secs(30 * 86400));
    assert_eq!(cfg.cm_reconnect_timeout.as_std(), std::time::Duration::from_secs(10));
    assert_eq!(cfg.monitoring.poll_period.as_std(), std::time::Duration::from_secs(35));
    assert_eq!(cfg.services_dir(), PathBuf::from("/var/aos/sm/services"));
    assert_eq!(cfg.journal_alerts.service_alert_priority(), DEFAULT_SERVICE_PRIORITY);
    assert_eq!(cfg.journal_alerts.sending_period.as_std(), std::time::Duration::from_secs(5 * 60));
}

#[test]
fn explicit_dirs_override_working_dir_derivation() {
    let mut raw = MINIMAL.to_string();
    raw.push_str("servicesDir = \"/custom/services\"\n");
    let cfg: Config = toml::from_str(&raw).unwrap();
    assert_eq!(cfg.services_dir(), PathBuf::from("/custom/services"));
}

#[test]
fn duration_suffixes_parse_seconds_minutes_hours_days() {
    assert_eq!(parse_human_duration("45s").unwrap(), std::time::Duration::from_secs(45));
    assert_eq!(parse_human_duration("2m").unwrap(), std::time::Duration::from_secs(120));
    assert_eq!(parse_human_duration("3h").unwrap(), std::time::Duration::from_secs(3 * 3600));
    assert_eq!(parse_human_duration("1d").unwrap(), std::time::Duration::from_secs(86400));
}

#[test]
fn duration_rejects_unknown_suffix() {
    assert!(parse_human_duration("5x").is_err());
}

#[test]
fn priority_out_of_range_resets_to_default() {
    let mut raw = MINIMAL.to_string();
    raw.push_str("[journalAlerts]\nserviceAlertPriority = 42\n");
    let cfg: Config = toml::from_str(&raw).unwrap();
    assert_eq!(cfg.journal_alerts.service_alert_priority(), DEFAULT_SERVICE_PRIORITY);
}

#[test]
fn priority_within_range_is_kept() {
    let mut raw = MINIMAL.to_string();
    raw.push_str("[journalAlerts]\nserviceAlertPriority = 2\n");
    let cfg: Config = toml::from_str(&raw).unwrap();
    assert_eq!(cfg.journal_alerts.service_alert_priority(), 2);
}

#[test]
fn load_reports_missing_file() {
    let err = Config::load(Path::new("/nonexistent/aos_servicemanager.cfg")).unwrap_err();
    assert!(matches!(err, ConfigError::Read(_, _)));
}
