// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI flag specs (§6 "CLI flags").

use crate::support::Project;
use assert_cmd::Command;

#[test]
fn help_lists_the_documented_flags() {
    let mut cmd = Command::cargo_bin("aos-servicemanager").expect("locate aos-servicemanager binary");
    let output = cmd.arg("--help").output().expect("run --help");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    for flag in ["--config", "--journal", "--verbose"] {
        assert!(stdout.contains(flag), "--help output is missing {flag}:\n{stdout}");
    }
}

#[test]
fn unknown_flag_is_rejected() {
    let mut cmd = Command::cargo_bin("aos-servicemanager").expect("locate aos-servicemanager binary");
    let output = cmd.arg("--not-a-real-flag").output().expect("run with an unknown flag");
    assert!(!output.status.success());
}

#[test]
fn missing_config_file_exits_with_failure() {
    let project = Project::empty();
    let missing = project.path().join("does-not-exist.cfg");
    let output = project.daemon(&missing).output().expect("run daemon");

    assert!(!output.status.success());
    // `init_tracing` uses `tracing_subscriber::fmt()`'s default writer
    // (stdout), so the startup error lands there, not on stderr.
    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    assert!(stdout.contains("does-not-exist.cfg"), "error should name the missing file:\n{stdout}");
}
