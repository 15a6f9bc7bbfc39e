// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! System message bus seam (§4.7 "Job completion", "Active-state mapping").
//! A production implementation (not built here) would wrap a system D-Bus
//! connection the way `sm-daemon` wires it in; this trait is what lets
//! `launcher.rs`/`monitor.rs` stay free of a bus library dependency.

use std::time::Duration;

use sm_core::SmResult;

/// `"active" → Active`; everything else (`reloading`, `inactive`, `failed`,
/// `activating`, `deactivating`) → `Failed` (§4.7 "Active-state mapping").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstanceRunState {
    Active,
    #[default]
    Failed,
}

pub fn run_state_from_active_state(active_state: &str) -> InstanceRunState {
    if active_state == "active" {
        InstanceRunState::Active
    } else {
        InstanceRunState::Failed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitStatus {
    pub name: String,
    pub active_state: InstanceRunState,
}

/// The subset of `org.freedesktop.systemd1.Manager` UL needs.
pub trait SystemBus: Send + Sync {
    fn list_units(&self) -> SmResult<Vec<UnitStatus>>;
    fn get_unit_status(&self, name: &str) -> SmResult<UnitStatus>;

    /// Issues `StartUnit` and blocks on `JobRemoved` up to `timeout`
    /// (§4.7 "Job completion").
    fn start_unit(&self, name: &str, mode: &str, timeout: Duration) -> SmResult<()>;

    /// Issues `StopUnit` and blocks on `JobRemoved` up to `timeout`. A
    /// missing unit is tolerated and reported as `NotFound`, which callers
    /// are expected to swallow (§4.7 "Stop instance").
    fn stop_unit(&self, name: &str, mode: &str, timeout: Duration) -> SmResult<()>;

    /// `NotFound` is tolerated by callers the same way as `stop_unit`.
    fn reset_failed_unit(&self, name: &str) -> SmResult<()>;
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
