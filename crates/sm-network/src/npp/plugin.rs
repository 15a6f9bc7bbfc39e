// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plugin config composition (§4.2 "Per-plugin behavior" and "Pipeline
//! composition"). Each stage's config is a tagged sum; no inheritance is
//! needed (§9).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PluginKind {
    Bridge,
    Dns,
    Firewall,
    Bandwidth,
}

impl PluginKind {
    /// Binary name, looked up under `/opt/cni/bin/` (§6 "Plugin binaries").
    pub fn binary_name(self) -> &'static str {
        match self {
            PluginKind::Bridge => "bridge",
            PluginKind::Dns => "dnsname",
            PluginKind::Firewall => "aos-firewall",
            PluginKind::Bandwidth => "bandwidth",
        }
    }

    /// Fixed pipeline order (§4.2 "Pipeline composition").
    pub const ORDER: [PluginKind; 4] =
        [PluginKind::Bridge, PluginKind::Dns, PluginKind::Firewall, PluginKind::Bandwidth];
}

/// A single stage's plugin-specific config, before the CNI envelope fields
/// are attached. `None` means the stage is omitted (§4.2 "Omitted stages").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginConfig {
    pub kind: Option<PluginKind>,
    /// Plugin-specific object, e.g. `{"type": "bridge", "bridge": "aos0", ...}`.
    pub config: Value,
}

impl PluginConfig {
    pub fn new(kind: PluginKind, config: Value) -> Self {
        PluginConfig { kind: Some(kind), config }
    }

    pub fn empty() -> Self {
        PluginConfig::default()
    }

    pub fn is_empty(&self) -> bool {
        self.kind.is_none()
    }

    /// Type name taken from the composed config's `type` field (§6).
    pub fn plugin_type(&self) -> Option<&str> {
        self.config.get("type").and_then(Value::as_str)
    }

    /// Attach `cniVersion`, `name`, and optionally `prevResult` /
    /// `runtimeConfig.aliases.<networkName>` to produce the final stdin
    /// payload for this stage (§4.2 steps 2-4).
    pub fn compose(
        &self,
        cni_version: &str,
        network_name: &str,
        prev_result: Option<&Value>,
        dns_aliases: Option<&[String]>,
    ) -> Value {
        let mut obj = match self.config.clone() {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        obj.insert("cniVersion".to_string(), json!(cni_version));
        obj.insert("name".to_string(), json!(network_name));

        if let Some(prev) = prev_result {
            if !prev.is_null() {
                obj.insert("prevResult".to_string(), prev.clone());
            }
        }

        if self.kind == Some(PluginKind::Dns) {
            if let Some(hosts) = dns_aliases {
                if !hosts.is_empty() {
                    let mut runtime_config = serde_json::Map::new();
                    let mut aliases = serde_json::Map::new();
                    aliases.insert(network_name.to_string(), json!(hosts));
                    runtime_config.insert("aliases".to_string(), Value::Object(aliases));
                    obj.insert("runtimeConfig".to_string(), Value::Object(runtime_config));
                }
            }
        }

        Value::Object(obj)
    }
}

#[cfg(test)]
#[path = "plugin_tests.rs"]
mod tests;
