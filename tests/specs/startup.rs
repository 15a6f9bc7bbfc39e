// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Config validation specs (§6 "Config keys"): every case here is expected
//! to fail inside `Config::load`, before any background worker (the unit
//! monitor, the journal alert reader, the upstream client) has a chance to
//! start, so none of them depend on `systemctl`/`iptables`/`journalctl`
//! being available in the environment the daemon runs in.

use crate::support::Project;

#[test]
fn malformed_toml_exits_with_failure() {
    let project = Project::empty();
    let config = project.file("aos_servicemanager.cfg", "this is not [ valid toml");
    let output = project.daemon(&config).output().expect("run daemon");

    assert!(!output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    assert!(stdout.contains("failed to parse config"), "stdout:\n{stdout}");
}

#[test]
fn missing_required_key_exits_with_failure() {
    let project = Project::empty();
    // No `caCert` key: `Config`'s required fields carry no `#[serde(default)]`.
    let config = project.file(
        "aos_servicemanager.cfg",
        "certStorage = \"certs\"\n\
         cmServerUrl = \"wss://localhost:1\"\n\
         iamPublicServerUrl = \"https://localhost:2\"\n\
         iamProtectedServerUrl = \"https://localhost:3\"\n\
         workingDir = \".\"\n",
    );
    let output = project.daemon(&config).output().expect("run daemon");

    assert!(!output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    assert!(stdout.contains("failed to parse config"), "stdout:\n{stdout}");
}

#[test]
fn valid_config_creates_the_working_directories() {
    let project = Project::empty();
    let config = project.config("");

    // Directory creation happens synchronously in `run()`, before journal
    // alert/log readers or the upstream client start, so it is observable
    // even in an environment without `journalctl`/`systemctl` to back
    // those later steps: a short-lived, killed child is enough.
    let mut child = project.daemon(&config).spawn().expect("spawn daemon");
    std::thread::sleep(std::time::Duration::from_millis(300));
    if child.try_wait().expect("poll child").is_none() {
        child.kill().expect("kill daemon");
    }
    let _ = child.wait();

    for dir in ["services", "layers", "downloads", "extracts", "dropins", "cni/bin", "cni/conf.d"] {
        assert!(project.path().join(dir).is_dir(), "{dir} was not created under the working directory");
    }
}
