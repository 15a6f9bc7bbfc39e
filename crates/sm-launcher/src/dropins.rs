// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-instance systemd drop-in override file (§4.7 "Start instance" steps
//! 1-2).

use std::path::{Path, PathBuf};
use std::time::Duration;

use sm_core::SmResult;

const DEFAULT_START_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_START_BURST: u32 = 3;
const DEFAULT_RESTART_INTERVAL: Duration = Duration::from_secs(1);

/// Restart policy knobs for one instance's unit. A zero duration on input
/// means "use the default" (§4.7 step 1).
#[derive(Debug, Clone, Copy)]
pub struct RunParameters {
    pub start_interval: Duration,
    pub start_burst: u32,
    pub restart_interval: Duration,
}

impl RunParameters {
    /// Fills in defaults for any zero field, mirroring the original's
    /// `StartInstance` pre-processing.
    pub fn with_defaults(mut self) -> Self {
        if self.start_interval.is_zero() {
            self.start_interval = DEFAULT_START_INTERVAL;
        }
        if self.start_burst == 0 {
            self.start_burst = DEFAULT_START_BURST;
        }
        if self.restart_interval.is_zero() {
            self.restart_interval = DEFAULT_RESTART_INTERVAL;
        }
        self
    }

    /// `timeout = 1.2 × start_interval`, used for `StartUnit`'s job-wait
    /// deadline (§4.7 step 3).
    pub fn start_timeout(&self) -> Duration {
        self.start_interval.mul_f64(1.2)
    }
}

impl Default for RunParameters {
    fn default() -> Self {
        RunParameters { start_interval: Duration::ZERO, start_burst: 0, restart_interval: Duration::ZERO }.with_defaults()
    }
}

pub fn unit_name(instance_id: &str) -> String {
    format!("aos-service@{instance_id}.service")
}

fn drop_in_dir(systemd_drop_ins: &Path, instance_id: &str) -> PathBuf {
    systemd_drop_ins.join(format!("{}.d", unit_name(instance_id)))
}

fn drop_in_content(params: &RunParameters) -> String {
    format!(
        "[Unit]\nStartLimitIntervalSec={}\nStartLimitBurst={}\n[Service]\nRestartSec={}\n",
        params.start_interval.as_secs(),
        params.start_burst,
        params.restart_interval.as_secs(),
    )
}

/// Writes `parameters.conf` under `<systemdDropIns>/aos-service@<id>.service.d/`
/// (§4.7 step 2).
pub fn write_drop_in(systemd_drop_ins: &Path, instance_id: &str, params: &RunParameters) -> SmResult<()> {
    let dir = drop_in_dir(systemd_drop_ins, instance_id);
    std::fs::create_dir_all(&dir)?;
    std::fs::write(dir.join("parameters.conf"), drop_in_content(params))?;
    Ok(())
}

/// Removes the instance's drop-in directory (§4.7 "Stop instance", last
/// step). A missing directory is not an error.
pub fn remove_drop_in(systemd_drop_ins: &Path, instance_id: &str) -> SmResult<()> {
    let dir = drop_in_dir(systemd_drop_ins, instance_id);
    match std::fs::remove_dir_all(&dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[path = "dropins_tests.rs"]
mod tests;
