// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CNI cache entries (§4.2 "Cache format"): enough state to reconstruct the
//! DEL command without the original ADD-time inputs.

use std::path::{Path, PathBuf};

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use sm_core::{SmError, SmResult};

use super::pipeline::{NetworkList, RuntimeConf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityArgs {
    #[serde(default)]
    pub aliases: std::collections::BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub kind: String,
    #[serde(rename = "containerId")]
    pub container_id: String,
    #[serde(rename = "ifName")]
    pub if_name: Option<String>,
    #[serde(rename = "networkName")]
    pub network_name: String,
    /// Base64 of the composed `NetworkList` JSON.
    pub config: String,
    #[serde(rename = "cniArgs")]
    pub cni_args: Vec<(String, String)>,
    #[serde(rename = "capabilityArgs")]
    pub capability_args: CapabilityArgs,
    pub result: Value,
}

impl CacheEntry {
    pub fn new(net: &NetworkList, rt: &RuntimeConf, result: Value) -> SmResult<Self> {
        let config_json = serde_json::to_vec(net)?;
        let mut aliases = std::collections::BTreeMap::new();
        if !rt.dns_aliases.is_empty() {
            aliases.insert(net.name.clone(), rt.dns_aliases.clone());
        }
        Ok(CacheEntry {
            kind: "cniCacheV1".to_string(),
            container_id: rt.container_id.clone(),
            if_name: rt.ifname.clone(),
            network_name: net.name.clone(),
            config: base64::engine::general_purpose::STANDARD.encode(config_json),
            cni_args: rt.args.clone(),
            capability_args: CapabilityArgs { aliases },
            result,
        })
    }

    pub fn decode_network_list(&self) -> SmResult<NetworkList> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&self.config)
            .map_err(|e| SmError::InvalidArgument(format!("cache config not valid base64: {e}")))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn to_runtime_conf(&self, netns: Option<String>) -> RuntimeConf {
        let dns_aliases = self.capability_args.aliases.get(&self.network_name).cloned().unwrap_or_default();
        RuntimeConf {
            container_id: self.container_id.clone(),
            netns,
            ifname: self.if_name.clone(),
            args: self.cni_args.clone(),
            dns_aliases,
        }
    }
}

/// Persists cache entries under `<confDir>/results/<networkName>-<containerId>`.
pub struct CacheStore {
    conf_dir: PathBuf,
}

impl CacheStore {
    pub fn new(conf_dir: PathBuf) -> Self {
        CacheStore { conf_dir }
    }

    pub fn path_for(&self, network_name: &str, container_id: &str) -> PathBuf {
        self.conf_dir.join("results").join(format!("{network_name}-{container_id}"))
    }

    pub fn write(&self, entry: &CacheEntry) -> SmResult<()> {
        let path = self.path_for(&entry.network_name, &entry.container_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(entry)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn read(&self, network_name: &str, container_id: &str) -> SmResult<CacheEntry> {
        let path = self.path_for(network_name, container_id);
        let bytes = std::fs::read(&path).map_err(|_| SmError::not_found(path.display().to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn remove(&self, network_name: &str, container_id: &str) -> SmResult<()> {
        let path = self.path_for(network_name, container_id);
        std::fs::remove_file(&path).map_err(SmError::from)
    }

    pub fn exists(&self, network_name: &str, container_id: &str) -> bool {
        self.path_for(network_name, container_id).exists()
    }
}

pub fn read_dir_exists(path: &Path) -> bool {
    path.exists()
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
