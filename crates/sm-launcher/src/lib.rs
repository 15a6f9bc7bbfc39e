// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit Launcher (§4.7): start/stop supervised instances via a system bus,
//! drop-in override files, and status polling.

pub mod bus;
pub mod dropins;
pub mod launcher;
pub mod monitor;

pub use bus::{InstanceRunState, SystemBus, UnitStatus};
pub use dropins::RunParameters;
pub use launcher::UnitLauncher;
pub use monitor::{InstanceStatus, StatusSink, UnitMonitor};
