// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `SystemBus` over `systemctl` subprocesses (§4.7). No D-Bus crate sits
//! anywhere in this workspace's dependency graph, so job completion is
//! observed by polling `ActiveState`/`SubState` rather than waiting on a
//! `JobRemoved` signal, the same subprocess-and-poll shape
//! `sm-network`'s plugin executor uses for its own external collaborator.

use std::process::{Command, Output};
use std::time::{Duration, Instant};

use sm_core::{SmError, SmResult};
use sm_launcher::bus::{run_state_from_active_state, SystemBus, UnitStatus};

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const NOT_FOUND_MARKERS: &[&str] = &["not loaded", "not be found", "no such file"];

pub struct SystemdBus;

impl SystemdBus {
    fn run(&self, args: &[&str]) -> SmResult<Output> {
        Command::new("systemctl").args(args).output().map_err(SmError::failed)
    }

    fn active_state(&self, unit: &str) -> SmResult<String> {
        let output = self.run(&["show", unit, "--property=ActiveState", "--value"])?;
        if !output.status.success() {
            return Err(not_found_or_runtime(unit, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

fn not_found_or_runtime(unit: &str, output: &Output) -> SmError {
    let stderr = String::from_utf8_lossy(&output.stderr).to_lowercase();
    if NOT_FOUND_MARKERS.iter().any(|m| stderr.contains(m)) {
        SmError::not_found(unit)
    } else {
        SmError::Runtime(format!("systemctl failed for {unit}: {}", stderr.trim()))
    }
}

/// Parses `systemctl list-units --no-legend --plain` output: `UNIT LOAD
/// ACTIVE SUB DESCRIPTION`, columns two (`ACTIVE`) mapped through §4.7's
/// active-state rule.
fn parse_unit_list(stdout: &str) -> Vec<UnitStatus> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            let name = columns.next()?.to_string();
            let _load = columns.next();
            let active = columns.next()?;
            Some(UnitStatus { name, active_state: run_state_from_active_state(active) })
        })
        .collect()
}

impl SystemBus for SystemdBus {
    fn list_units(&self) -> SmResult<Vec<UnitStatus>> {
        let output = self.run(&["list-units", "--type=service", "--all", "--no-legend", "--plain"])?;
        if !output.status.success() {
            return Err(SmError::Runtime(format!("systemctl list-units failed: {}", String::from_utf8_lossy(&output.stderr))));
        }
        Ok(parse_unit_list(&String::from_utf8_lossy(&output.stdout)))
    }

    fn get_unit_status(&self, name: &str) -> SmResult<UnitStatus> {
        let active = self.active_state(name)?;
        Ok(UnitStatus { name: name.to_string(), active_state: run_state_from_active_state(&active) })
    }

    fn start_unit(&self, name: &str, mode: &str, timeout: Duration) -> SmResult<()> {
        let output = self.run(&["start", &format!("--job-mode={mode}"), name])?;
        if !output.status.success() {
            return Err(not_found_or_runtime(name, &output));
        }
        self.wait_for_job_settled(name, timeout)
    }

    fn stop_unit(&self, name: &str, mode: &str, timeout: Duration) -> SmResult<()> {
        let output = self.run(&["stop", &format!("--job-mode={mode}"), name])?;
        if !output.status.success() {
            return Err(not_found_or_runtime(name, &output));
        }
        self.wait_for_job_settled(name, timeout)
    }

    fn reset_failed_unit(&self, name: &str) -> SmResult<()> {
        let output = self.run(&["reset-failed", name])?;
        if !output.status.success() {
            return Err(not_found_or_runtime(name, &output));
        }
        Ok(())
    }
}

impl SystemdBus {
    /// No `JobRemoved` signal without a bus connection, so polling
    /// `ActiveState` until it stabilizes stands in for it (§4.7 "Job
    /// completion").
    fn wait_for_job_settled(&self, unit: &str, timeout: Duration) -> SmResult<()> {
        let deadline = Instant::now() + timeout;
        let mut last = self.active_state(unit)?;
        while Instant::now() < deadline {
            std::thread::sleep(POLL_INTERVAL);
            let current = self.active_state(unit)?;
            if current == last && !matches!(current.as_str(), "activating" | "deactivating" | "reloading") {
                return Ok(());
            }
            last = current;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
