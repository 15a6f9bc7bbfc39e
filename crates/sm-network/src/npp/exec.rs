// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Invoking a single CNI-style plugin binary (§4.2 "Per-plugin behavior").

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;

const MAX_RETRIES: u32 = 5;
const RETRY_DELAY: Duration = Duration::from_secs(1);
const BUSY_MARKER: &str = "text file busy";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CniCommand {
    Add,
    Del,
    Check,
}

impl CniCommand {
    fn as_env(self) -> &'static str {
        match self {
            CniCommand::Add => "ADD",
            CniCommand::Del => "DEL",
            CniCommand::Check => "CHECK",
        }
    }
}

/// Arguments used to invoke one plugin stage.
#[derive(Debug, Clone)]
pub struct PluginInvocation {
    pub command: CniCommand,
    pub plugin_bin_dir: PathBuf,
    pub binary_name: String,
    pub container_id: String,
    pub netns: Option<String>,
    pub ifname: Option<String>,
    /// Ordered `k=v` runtime args (§4.2 `CNI_ARGS`).
    pub cni_args: Vec<(String, String)>,
    pub stdin_config: Value,
}

/// Plugin error envelope parsed from stderr on non-zero exit (§4.2).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PluginErrorEnvelope {
    pub code: i64,
    pub msg: String,
    #[serde(default)]
    pub details: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("plugin {binary} failed (code={code}): {msg}")]
    Envelope { binary: String, code: i64, msg: String, raw: String },
    #[error("plugin {binary} failed: {raw}")]
    Raw { binary: String, raw: String },
    #[error("failed to spawn plugin {binary}: {source}")]
    Spawn { binary: String, #[source] source: std::io::Error },
    #[error("plugin {binary} produced invalid JSON result: {source}")]
    InvalidResult { binary: String, #[source] source: serde_json::Error },
}

impl PluginError {
    fn binary(&self) -> &str {
        match self {
            PluginError::Envelope { binary, .. }
            | PluginError::Raw { binary, .. }
            | PluginError::Spawn { binary, .. }
            | PluginError::InvalidResult { binary, .. } => binary,
        }
    }
}

/// Raw stderr captured for a failed run, if the failure came from a
/// non-zero exit (busy retries never apply to spawn/decode failures).
fn busy_stderr(error: &PluginError) -> Option<&str> {
    match error {
        PluginError::Envelope { raw, .. } | PluginError::Raw { raw, .. } => Some(raw),
        PluginError::Spawn { .. } | PluginError::InvalidResult { .. } => None,
    }
}

/// Abstraction over "run one plugin binary", so the pipeline can be tested
/// without touching `/opt/cni/bin` (mirrors the out-of-scope boundary in
/// §1: plugin binaries themselves are external collaborators).
#[async_trait]
pub trait PluginRunner: Send + Sync {
    async fn run(&self, invocation: &PluginInvocation) -> Result<Value, PluginError>;
}

/// Real runner: spawns the plugin binary as a subprocess.
pub struct PluginExecutor;

#[async_trait]
impl PluginRunner for PluginExecutor {
    async fn run(&self, invocation: &PluginInvocation) -> Result<Value, PluginError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match run_once(invocation).await {
                Ok(value) => return Ok(value),
                // The busy check runs against the raw captured stderr
                // regardless of whether it happens to also parse as a
                // `{code,msg,details}` envelope (§4.2 retry rule).
                Err(e) if busy_stderr(&e).is_some_and(|raw| raw.contains(BUSY_MARKER)) && attempt < MAX_RETRIES => {
                    tracing::warn!(binary = %e.binary(), attempt, "plugin binary busy, retrying");
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

async fn run_once(invocation: &PluginInvocation) -> Result<Value, PluginError> {
    let binary = invocation.binary_name.clone();
    let path = invocation.plugin_bin_dir.join(&binary);

    let cni_args = invocation
        .cni_args
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(";");

    let mut env: BTreeMap<&str, String> = BTreeMap::new();
    env.insert("CNI_COMMAND", invocation.command.as_env().to_string());
    env.insert("CNI_ARGS", cni_args);
    env.insert("CNI_PATH", invocation.plugin_bin_dir.display().to_string());
    env.insert("CNI_CONTAINERID", invocation.container_id.clone());
    if let Some(netns) = &invocation.netns {
        env.insert("CNI_NETNS", netns.clone());
    }
    if let Some(ifname) = &invocation.ifname {
        env.insert("CNI_IFNAME", ifname.clone());
    }

    let mut cmd = Command::new(&path);
    cmd.envs(env.iter().map(|(k, v)| (*k, v.as_str())));
    cmd.stdin(std::process::Stdio::piped());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());

    let mut child = cmd.spawn().map_err(|source| PluginError::Spawn { binary: binary.clone(), source })?;

    if let Some(mut stdin) = child.stdin.take() {
        use tokio::io::AsyncWriteExt;
        let payload = serde_json::to_vec(&invocation.stdin_config).unwrap_or_default();
        let _ = stdin.write_all(&payload).await;
    }

    let output = child.wait_with_output().await.map_err(|source| PluginError::Spawn { binary: binary.clone(), source })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if let Ok(envelope) = serde_json::from_str::<PluginErrorEnvelope>(stderr.trim()) {
            return Err(PluginError::Envelope { binary, code: envelope.code, msg: envelope.msg, raw: stderr });
        }
        return Err(PluginError::Raw { binary, raw: stderr });
    }

    serde_json::from_slice(&output.stdout).map_err(|source| PluginError::InvalidResult { binary, source })
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;
