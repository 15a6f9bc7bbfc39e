// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command-line flags (§6 "CLI flags").

use std::path::PathBuf;

use clap::Parser;

const DEFAULT_CONFIG_FILE: &str = "aos_servicemanager.cfg";

#[derive(Debug, Parser)]
#[command(name = "aos-servicemanager", about = "Aos node service manager", version)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Redirect logs to the systemd journal instead of stderr.
    #[arg(short = 'j', long = "journal")]
    pub journal: bool,

    /// Log verbosity, 0 (quiet) through higher numbers for more detail.
    #[arg(short = 'v', long = "verbose", default_value_t = 0)]
    pub verbose: u8,
}

impl Cli {
    /// Maps `-v` counts onto `tracing`'s level filter, clamping at `trace`.
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
