// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Instance start/stop against the system bus (§4.7 "Start instance",
//! "Stop instance").

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use sm_core::SmResult;

use crate::bus::{InstanceRunState, SystemBus};
use crate::dropins::{self, RunParameters};

const STOP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);
const REPLACE_MODE: &str = "replace";

pub struct UnitLauncher {
    bus: Arc<dyn SystemBus>,
    systemd_drop_ins: PathBuf,
    running: parking_lot::Mutex<HashMap<String, InstanceRunState>>,
}

impl UnitLauncher {
    pub fn new(bus: Arc<dyn SystemBus>, systemd_drop_ins: PathBuf) -> Self {
        UnitLauncher { bus, systemd_drop_ins, running: parking_lot::Mutex::new(HashMap::new()) }
    }

    /// Current `{unit -> state}` snapshot, as seen after the last start/stop
    /// or monitor tick.
    pub fn running_units(&self) -> HashMap<String, InstanceRunState> {
        self.running.lock().clone()
    }

    /// §4.7 "Start instance": defaults, drop-in, `StartUnit`, status record.
    pub fn start_instance(&self, instance_id: &str, params: RunParameters) -> SmResult<InstanceRunState> {
        let params = params.with_defaults();
        let unit = dropins::unit_name(instance_id);

        dropins::write_drop_in(&self.systemd_drop_ins, instance_id, &params)?;
        self.bus.start_unit(&unit, REPLACE_MODE, params.start_timeout())?;

        let status = self.bus.get_unit_status(&unit)?;
        self.running.lock().insert(unit, status.active_state);
        Ok(status.active_state)
    }

    /// §4.7 "Stop instance": drop from the running map, `StopUnit` and
    /// `ResetFailedUnit` with `NotFound` tolerated on both, remove drop-in.
    pub fn stop_instance(&self, instance_id: &str) -> SmResult<()> {
        let unit = dropins::unit_name(instance_id);
        self.running.lock().remove(&unit);

        tolerate_not_found(self.bus.stop_unit(&unit, REPLACE_MODE, STOP_TIMEOUT))?;
        tolerate_not_found(self.bus.reset_failed_unit(&unit))?;
        dropins::remove_drop_in(&self.systemd_drop_ins, instance_id)?;
        Ok(())
    }

    pub(crate) fn set_running(&self, snapshot: HashMap<String, InstanceRunState>) {
        *self.running.lock() = snapshot;
    }
}

fn tolerate_not_found(result: SmResult<()>) -> SmResult<()> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

#[cfg(test)]
#[path = "launcher_tests.rs"]
mod tests;
