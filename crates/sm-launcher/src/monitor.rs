// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-second unit-status poll (§4.7 "Monitor").

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::bus::{InstanceRunState, SystemBus, UnitStatus};
use crate::launcher::UnitLauncher;

const MONITOR_TICK: std::time::Duration = std::time::Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub struct InstanceStatus {
    pub instance_id: String,
    pub state: InstanceRunState,
    pub error: Option<String>,
}

pub trait StatusSink: Send + Sync {
    fn send_status(&self, statuses: Vec<InstanceStatus>);
}

pub struct UnitMonitor {
    bus: Arc<dyn SystemBus>,
    launcher: Arc<UnitLauncher>,
    sink: Arc<dyn StatusSink>,
    stopped: Arc<AtomicBool>,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl UnitMonitor {
    pub fn new(bus: Arc<dyn SystemBus>, launcher: Arc<UnitLauncher>, sink: Arc<dyn StatusSink>) -> Self {
        UnitMonitor { bus, launcher, sink, stopped: Arc::new(AtomicBool::new(true)), worker: parking_lot::Mutex::new(None) }
    }

    pub fn start(self: &Arc<Self>) {
        self.stopped.store(false, Ordering::SeqCst);
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.monitor_loop().await });
        *self.worker.lock() = Some(handle);
    }

    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    async fn monitor_loop(self: Arc<Self>) {
        while !self.stopped.load(Ordering::SeqCst) {
            tokio::time::sleep(MONITOR_TICK).await;
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }
            self.tick();
        }
    }

    /// Split out from the sleep loop so a single poll can be driven directly
    /// in tests (§8 Scenario-style coverage for UL).
    pub fn tick(&self) {
        let units = match self.bus.list_units() {
            Ok(units) => units,
            Err(e) => {
                tracing::error!(error = %e, "ListUnits failed during UL monitor tick");
                return;
            }
        };

        let previous = self.launcher.running_units();
        let current = diff_and_build(&previous, &units);

        if current != previous {
            self.launcher.set_running(current.clone());
            self.sink.send_status(current.into_iter().map(|(unit, state)| InstanceStatus {
                instance_id: instance_id_from_unit(&unit),
                state,
                error: None,
            }).collect());
        }
    }
}

fn diff_and_build(previous: &HashMap<String, InstanceRunState>, units: &[UnitStatus]) -> HashMap<String, InstanceRunState> {
    units
        .iter()
        .filter(|u| previous.contains_key(&u.name))
        .map(|u| (u.name.clone(), u.active_state))
        .collect()
}

fn instance_id_from_unit(unit: &str) -> String {
    unit.strip_prefix("aos-service@").and_then(|s| s.strip_suffix(".service")).unwrap_or(unit).to_string()
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
