// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::cargo::CommandCargoExt;

/// A throwaway working tree for one daemon invocation: a `tempfile::TempDir`
/// plus the config file the daemon will be pointed at.
pub struct Project {
    dir: tempfile::TempDir,
}

impl Project {
    pub fn empty() -> Self {
        Project { dir: tempfile::tempdir().expect("tempdir") }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes `contents` at `relative` under the project root, creating
    /// parent directories as needed, and returns the absolute path.
    pub fn file(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dir");
        }
        std::fs::write(&path, contents).expect("write fixture file");
        path
    }

    /// Writes a config TOML whose required keys are filled in and whose
    /// `workingDir` is this project's own directory, then returns the
    /// config's path.
    pub fn config(&self, body: &str) -> PathBuf {
        let contents = format!(
            "caCert = \"ca.pem\"\n\
             certStorage = \"certs\"\n\
             cmServerUrl = \"wss://localhost:1\"\n\
             iamPublicServerUrl = \"https://localhost:2\"\n\
             iamProtectedServerUrl = \"https://localhost:3\"\n\
             workingDir = \"{}\"\n\
             {body}\n",
            self.dir.path().display(),
        );
        self.file("aos_servicemanager.cfg", &contents)
    }

    /// A `std::process::Command` for the daemon binary, pointed at `config`.
    pub fn daemon(&self, config: &Path) -> Command {
        let mut cmd = Command::cargo_bin("aos-servicemanager").expect("locate aos-servicemanager binary");
        cmd.arg("-c").arg(config);
        cmd
    }
}
