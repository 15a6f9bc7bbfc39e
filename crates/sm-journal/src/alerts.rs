// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Journal-backed alert reader (§4.5 "Alert reader"): classifies every new
//! journal entry into a service-instance, core-component, or system alert,
//! persisting its read position as it goes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use regex::Regex;
use sm_core::{InstanceIdent, SmResult};
use sm_storage::PersistentStore;
use tokio::task::JoinHandle;

use crate::journal::{JournalContract, JournalEntry, JournalFactory};

const AOS_SERVICE_PREFIX: &str = "aos-service@";
const CURSOR_SAVE_INTERVAL_TICKS: u32 = 10;
const MONITOR_TICK: std::time::Duration = std::time::Duration::from_secs(1);

/// Known core-component unit name fragments (§4.5 "enumerated closed set").
/// These are the on-node Aos core services, matched the same way
/// `aos-service@` instance units are, by substring of the resolved unit
/// name.
pub const CORE_COMPONENTS: &[(CoreComponent, &str)] = &[
    (CoreComponent::Cm, "aos-cm"),
    (CoreComponent::Iam, "aos-iam"),
    (CoreComponent::Um, "aos-um"),
    (CoreComponent::Sm, "aos-sm"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreComponent {
    Cm,
    Iam,
    Um,
    Sm,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceInstanceAlert {
    pub instance_ident: InstanceIdent,
    pub service_version: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoreAlert {
    pub component: CoreComponent,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemAlert {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlertVariant {
    ServiceInstance(ServiceInstanceAlert),
    Core(CoreAlert),
    System(SystemAlert),
}

/// Resolves the service instance behind an `aos-service@<id>.service` unit.
pub trait InstanceInfoProvider: Send + Sync {
    fn instance_info(&self, instance_id: &str) -> SmResult<(InstanceIdent, String)>;
}

pub trait AlertSender: Send + Sync {
    fn send_alert(&self, alert: AlertVariant);
}

#[derive(Debug, Clone)]
pub struct JournalAlertsConfig {
    /// Regexes suppressing an otherwise-emitted `SystemAlert`.
    pub filter: Vec<String>,
    pub system_alert_priority: i32,
    pub service_alert_priority: i32,
    /// Minimum gap between two sent alerts sharing the same tag (§4.5
    /// "sending windows"). Zero disables debouncing entirely.
    pub sending_period: std::time::Duration,
}

pub struct AlertReader {
    config: JournalAlertsConfig,
    filters: Vec<Regex>,
    instance_info: Arc<dyn InstanceInfoProvider>,
    store: Arc<PersistentStore>,
    sender: Arc<dyn AlertSender>,
    factory: Arc<dyn JournalFactory>,
    stopped: Arc<AtomicBool>,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
    last_sent: parking_lot::Mutex<std::collections::HashMap<String, DateTime<Utc>>>,
}

impl AlertReader {
    pub fn new(
        config: JournalAlertsConfig,
        instance_info: Arc<dyn InstanceInfoProvider>,
        store: Arc<PersistentStore>,
        sender: Arc<dyn AlertSender>,
        factory: Arc<dyn JournalFactory>,
    ) -> SmResult<Self> {
        let filters = config
            .filter
            .iter()
            .filter(|f| !f.is_empty())
            .map(|f| Regex::new(f).map_err(|e| sm_core::SmError::InvalidArgument(e.to_string())))
            .collect::<SmResult<Vec<_>>>()?;

        Ok(AlertReader {
            config,
            filters,
            instance_info,
            store,
            sender,
            factory,
            stopped: Arc::new(AtomicBool::new(true)),
            worker: parking_lot::Mutex::new(None),
            last_sent: parking_lot::Mutex::new(std::collections::HashMap::new()),
        })
    }

    /// Opens a filtered journal handle, seeds its position from the stored
    /// cursor (or the tail if none), and spawns the monitoring task
    /// (§4.5 "Alert reader" setup steps).
    pub async fn start(self: &Arc<Self>) -> SmResult<()> {
        let mut journal = self.factory.create();
        setup_journal(journal.as_mut(), &self.config, self.store.get_journal_cursor())?;

        self.stopped.store(false, Ordering::SeqCst);
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.monitor_loop(journal).await });
        *self.worker.lock() = Some(handle);
        Ok(())
    }

    pub async fn stop(&self) -> SmResult<()> {
        self.stopped.store(true, Ordering::SeqCst);
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        Ok(())
    }

    async fn monitor_loop(self: Arc<Self>, mut journal: Box<dyn JournalContract>) {
        let mut ticks_since_save = 0u32;
        let mut last_saved_cursor = String::new();

        while !self.stopped.load(Ordering::SeqCst) {
            tokio::time::sleep(MONITOR_TICK).await;
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }

            self.process_journal(journal.as_mut());

            ticks_since_save += 1;
            if ticks_since_save >= CURSOR_SAVE_INTERVAL_TICKS {
                ticks_since_save = 0;
                self.store_cursor(journal.as_ref(), &mut last_saved_cursor);
            }
        }

        self.store_cursor(journal.as_ref(), &mut last_saved_cursor);
    }

    fn store_cursor(&self, journal: &dyn JournalContract, last_saved: &mut String) {
        let cursor = journal.get_cursor();
        if cursor == *last_saved {
            return;
        }
        if let Err(e) = self.store.set_journal_cursor(&cursor) {
            tracing::error!(error = %e, "failed to persist journal cursor");
            return;
        }
        *last_saved = cursor;
    }

    /// Drains every currently-available entry, classifying and forwarding
    /// each one (§4.5 "For each entry, classify by...").
    fn process_journal(&self, journal: &mut dyn JournalContract) {
        while journal.next() {
            let entry = journal.get_entry();
            if let Some(alert) = self.classify(&entry) {
                if self.should_send(&alert) {
                    self.sender.send_alert(alert);
                }
            }
        }
    }

    /// Per-tag debounce: an alert is dropped if another alert with the same
    /// tag already went out within `sending_period` (§4.5 "sending
    /// windows"). Each tag's window is measured from the timestamp of the
    /// alert that opened it, so a burst of entries sharing one tag collapses
    /// to the first.
    fn should_send(&self, alert: &AlertVariant) -> bool {
        if self.config.sending_period.is_zero() {
            return true;
        }
        let window = chrono::Duration::from_std(self.config.sending_period).unwrap_or_else(|_| chrono::Duration::zero());
        let tag = alert_tag(alert);
        let now = alert_timestamp(alert);

        let mut last_sent = self.last_sent.lock();
        match last_sent.get(&tag) {
            Some(prev) if now.signed_duration_since(*prev) < window => false,
            _ => {
                last_sent.insert(tag, now);
                true
            }
        }
    }

    /// Pure classification step, split out from the journal loop so it can
    /// be exercised directly in tests (§8 Scenarios 1-2).
    pub fn classify(&self, entry: &JournalEntry) -> Option<AlertVariant> {
        let mut unit = entry.systemd_unit.clone();

        if entry.systemd_unit == "init.scope" {
            if entry.priority > self.config.service_alert_priority {
                return None;
            }
            unit = entry.unit.clone().unwrap_or_default();
        }

        if unit.is_empty() {
            unit = entry.systemd_cgroup.clone();
        }

        if let Some(id) = parse_instance_id(&unit) {
            return match self.instance_info.instance_info(&id) {
                Ok((ident, version)) => Some(AlertVariant::ServiceInstance(ServiceInstanceAlert {
                    instance_ident: ident,
                    service_version: version,
                    message: entry.message.clone(),
                    timestamp: entry.realtime,
                })),
                Err(e) => {
                    tracing::error!(instance_id = %id, error = %e, "instance lookup failed for alert unit");
                    None
                }
            };
        }

        if let Some(component) = core_component_in(&unit) {
            return Some(AlertVariant::Core(CoreAlert { component, message: entry.message.clone(), timestamp: entry.realtime }));
        }

        if self.filters.iter().any(|re| re.is_match(&entry.message)) {
            return None;
        }

        Some(AlertVariant::System(SystemAlert { message: entry.message.clone(), timestamp: entry.realtime }))
    }
}

fn setup_journal(journal: &mut dyn JournalContract, config: &JournalAlertsConfig, cursor: Option<String>) -> SmResult<()> {
    for level in 0..=config.system_alert_priority {
        journal.add_match("PRIORITY", &level.to_string());
    }
    journal.add_disjunction();
    journal.add_match("_SYSTEMD_UNIT", "init.scope");
    journal.seek_tail();
    let _ = journal.previous();

    if let Some(cursor) = cursor {
        if !cursor.is_empty() {
            journal.seek_cursor(&cursor);
            let _ = journal.next();
        }
    }
    Ok(())
}

fn parse_instance_id(unit: &str) -> Option<String> {
    let start = unit.find(AOS_SERVICE_PREFIX)? + AOS_SERVICE_PREFIX.len();
    let rest = &unit[start..];
    rest.rfind(".service").map(|end| rest[..end].to_string())
}

fn core_component_in(unit: &str) -> Option<CoreComponent> {
    CORE_COMPONENTS.iter().find(|(_, name)| unit.contains(name)).map(|(component, _)| *component)
}

fn alert_tag(alert: &AlertVariant) -> String {
    match alert {
        AlertVariant::ServiceInstance(a) => format!("instance:{}", a.instance_ident.instance_id()),
        AlertVariant::Core(a) => format!("core:{:?}", a.component),
        AlertVariant::System(_) => "system".to_string(),
    }
}

fn alert_timestamp(alert: &AlertVariant) -> DateTime<Utc> {
    match alert {
        AlertVariant::ServiceInstance(a) => a.timestamp,
        AlertVariant::Core(a) => a.timestamp,
        AlertVariant::System(a) => a.timestamp,
    }
}

#[cfg(test)]
#[path = "alerts_tests.rs"]
mod tests;
