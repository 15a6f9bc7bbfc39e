// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline composition: bridge → DNS → firewall → bandwidth, chaining
//! `prevResult` (§4.2).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::exec::{CniCommand, PluginError, PluginInvocation, PluginRunner};
use super::plugin::{PluginConfig, PluginKind};
use super::result::CniResult;

/// The four composed stage configs for one network (§4.2, §4.4's "Cache
/// format" `config` field is this, base64-encoded).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkList {
    pub name: String,
    #[serde(rename = "cniVersion")]
    pub cni_version: String,
    pub bridge: PluginConfig,
    pub dns: PluginConfig,
    pub firewall: PluginConfig,
    pub bandwidth: PluginConfig,
}

impl NetworkList {
    fn stage(&self, kind: PluginKind) -> &PluginConfig {
        match kind {
            PluginKind::Bridge => &self.bridge,
            PluginKind::Dns => &self.dns,
            PluginKind::Firewall => &self.firewall,
            PluginKind::Bandwidth => &self.bandwidth,
        }
    }
}

/// Per-attachment runtime arguments (§4.2's `CNI_ARGS`, cache `cniArgs`/
/// `capabilityArgs`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConf {
    pub container_id: String,
    #[serde(default)]
    pub netns: Option<String>,
    #[serde(default)]
    pub ifname: Option<String>,
    pub args: Vec<(String, String)>,
    #[serde(default)]
    pub dns_aliases: Vec<String>,
}

pub struct Pipeline<'a> {
    pub plugin_bin_dir: PathBuf,
    pub runner: &'a dyn PluginRunner,
}

impl<'a> Pipeline<'a> {
    pub fn new(plugin_bin_dir: PathBuf, runner: &'a dyn PluginRunner) -> Self {
        Pipeline { plugin_bin_dir, runner }
    }

    /// Runs ADD across every non-empty stage in fixed order, chaining
    /// `prevResult`. Partial failures do not auto-rollback (§4.2 "Failure
    /// semantics"), and the caller is expected to invoke `del` with the same
    /// config on error.
    pub async fn add(&self, net: &NetworkList, rt: &RuntimeConf) -> Result<Value, PluginError> {
        self.run_chain(net, rt, CniCommand::Add).await
    }

    /// Runs DEL across every stage in the same fixed order, best-effort:
    /// individual stage failures are logged and do not stop the others
    /// (§4.2 "DEL best-efforts each stage").
    pub async fn del(&self, net: &NetworkList, rt: &RuntimeConf) {
        let mut prev: Option<Value> = None;
        for kind in PluginKind::ORDER {
            let stage = net.stage(kind);
            if stage.is_empty() {
                continue;
            }
            let stdin = stage.compose(&net.cni_version, &net.name, prev.as_ref(), dns_hosts(kind, rt));
            let invocation = self.invocation(stage, net, rt, stdin, CniCommand::Del);
            match self.runner.run(&invocation).await {
                Ok(value) => prev = Some(value),
                Err(e) => tracing::warn!(stage = ?kind, error = %e, "DEL stage failed, continuing"),
            }
        }
    }

    async fn run_chain(&self, net: &NetworkList, rt: &RuntimeConf, command: CniCommand) -> Result<Value, PluginError> {
        let mut prev: Option<Value> = None;
        for kind in PluginKind::ORDER {
            let stage = net.stage(kind);
            if stage.is_empty() {
                continue;
            }
            let stdin = stage.compose(&net.cni_version, &net.name, prev.as_ref(), dns_hosts(kind, rt));
            let invocation = self.invocation(stage, net, rt, stdin, command);
            prev = Some(self.runner.run(&invocation).await?);
        }
        Ok(prev.unwrap_or(Value::Null))
    }

    fn invocation(
        &self,
        stage: &PluginConfig,
        _net: &NetworkList,
        rt: &RuntimeConf,
        stdin_config: Value,
        command: CniCommand,
    ) -> PluginInvocation {
        let binary_name = stage.plugin_type().unwrap_or("unknown").to_string();
        PluginInvocation {
            command,
            plugin_bin_dir: self.plugin_bin_dir.clone(),
            binary_name,
            container_id: rt.container_id.clone(),
            netns: rt.netns.clone(),
            ifname: rt.ifname.clone(),
            cni_args: rt.args.clone(),
            stdin_config,
        }
    }
}

fn dns_hosts(kind: PluginKind, rt: &RuntimeConf) -> Option<&[String]> {
    if kind == PluginKind::Dns && !rt.dns_aliases.is_empty() {
        Some(&rt.dns_aliases)
    } else {
        None
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
