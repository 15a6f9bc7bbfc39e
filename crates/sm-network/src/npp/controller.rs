// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ties the pipeline and the on-disk cache together into the three
//! operations callers actually invoke per attachment (§4.2 "Cache format"):
//! add, look up cached config, and tear down.

use std::path::PathBuf;

use sm_core::{SmError, SmResult};

use super::cache::{CacheEntry, CacheStore};
use super::exec::PluginRunner;
use super::pipeline::{NetworkList, Pipeline, RuntimeConf};

pub struct NetworkPluginPipeline<'a> {
    pipeline: Pipeline<'a>,
    cache: CacheStore,
}

impl<'a> NetworkPluginPipeline<'a> {
    pub fn new(plugin_bin_dir: PathBuf, conf_dir: PathBuf, runner: &'a dyn PluginRunner) -> Self {
        NetworkPluginPipeline {
            pipeline: Pipeline::new(plugin_bin_dir, runner),
            cache: CacheStore::new(conf_dir),
        }
    }

    /// Runs ADD and persists a cache entry so `delete_network_list` can later
    /// tear the attachment down without the original `NetworkList`.
    pub async fn add_network_list(&self, net: &NetworkList, rt: &RuntimeConf) -> SmResult<serde_json::Value> {
        let result = self.pipeline.add(net, rt).await.map_err(SmError::failed)?;
        let entry = CacheEntry::new(net, rt, result.clone())?;
        self.cache.write(&entry)?;
        Ok(result)
    }

    /// Reconstructs the composed `NetworkList` and cached result for a live
    /// attachment, without re-running any plugin.
    pub fn get_network_list_cached_config(&self, network_name: &str, container_id: &str) -> SmResult<(NetworkList, serde_json::Value)> {
        let entry = self.cache.read(network_name, container_id)?;
        let net = entry.decode_network_list()?;
        Ok((net, entry.result.clone()))
    }

    /// Runs DEL from the cached config (not the caller's), then removes the
    /// cache entry regardless of per-stage DEL outcomes (§4.2 "DEL best-effort").
    pub async fn delete_network_list(&self, network_name: &str, container_id: &str) -> SmResult<()> {
        let entry = self.cache.read(network_name, container_id)?;
        let net = entry.decode_network_list()?;
        let rt = entry.to_runtime_conf(None);
        self.pipeline.del(&net, &rt).await;
        self.cache.remove(network_name, container_id)
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
