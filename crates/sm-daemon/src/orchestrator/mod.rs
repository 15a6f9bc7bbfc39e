// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator (§4.9): turns one `RunInstances` request into service/layer
//! installs, an instance diff, and the network/unit/monitoring wiring each
//! started instance needs.

mod reconcile;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Duration as ChronoDuration;
use serde::Deserialize;
use sm_core::Instance;
use sm_image::space::SpaceHandle;
use sm_image::ImageHandler;
use sm_launcher::UnitLauncher;
use sm_monitor::ResourceUsageProvider;
use sm_network::npp::{NetworkPluginPipeline, PluginExecutor};
use sm_network::tm::{PacketFilterEngine, TrafficMonitor};
use sm_storage::capacity::Capacities;
use sm_storage::PersistentStore;

/// `PluginExecutor` carries no state, so a single process-wide instance can
/// be borrowed with `'static` lifetime by every `NetworkPluginPipeline`.
static PLUGIN_EXECUTOR: PluginExecutor = PluginExecutor;

/// Deserializable directly off the `services` entries of an incoming
/// `RunInstances` message: the daemon's RPC layer stages the archive to a
/// temp path first and fills in `staged_archive` before this is built.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceRequest {
    pub service_id: String,
    pub version: String,
    pub provider_id: String,
    pub staged_archive: PathBuf,
    pub sha3_256: String,
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LayerRequest {
    pub layer_id: String,
    pub version: String,
    pub os_version: String,
    pub staged_archive: PathBuf,
    pub sha3_256: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct RunInstancesRequest {
    pub services: Vec<ServiceRequest>,
    pub layers: Vec<LayerRequest>,
    pub instances: Vec<Instance>,
    pub force_restart: bool,
}

pub struct Orchestrator<E: PacketFilterEngine + 'static> {
    store: Arc<PersistentStore>,
    image: Arc<ImageHandler>,
    launcher: Arc<UnitLauncher>,
    #[allow(dead_code)]
    resource: Arc<ResourceUsageProvider>,
    npp: Arc<NetworkPluginPipeline<'static>>,
    tm: Arc<TrafficMonitor<E>>,
    capacities: Capacities,
    service_ttl: ChronoDuration,
    layer_ttl: ChronoDuration,
    services_install_dir: PathBuf,
    layers_install_dir: PathBuf,
    /// Keeps each install's [`SpaceHandle`] alive for as long as the content
    /// stays on disk; dropping it early would release the space-allocator
    /// reservation while the bytes are still installed (§4.4).
    layer_space: Mutex<HashMap<String, SpaceHandle>>,
    service_space: Mutex<HashMap<(String, String), SpaceHandle>>,
}

impl<E: PacketFilterEngine + 'static> Orchestrator<E> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<PersistentStore>,
        image: Arc<ImageHandler>,
        launcher: Arc<UnitLauncher>,
        resource: Arc<ResourceUsageProvider>,
        plugin_bin_dir: PathBuf,
        cni_conf_dir: PathBuf,
        tm: Arc<TrafficMonitor<E>>,
        capacities: Capacities,
        service_ttl: ChronoDuration,
        layer_ttl: ChronoDuration,
        services_install_dir: PathBuf,
        layers_install_dir: PathBuf,
    ) -> Self {
        let npp = Arc::new(NetworkPluginPipeline::new(plugin_bin_dir, cni_conf_dir, &PLUGIN_EXECUTOR));
        Orchestrator {
            store,
            image,
            launcher,
            resource,
            npp,
            tm,
            capacities,
            service_ttl,
            layer_ttl,
            services_install_dir,
            layers_install_dir,
            layer_space: Mutex::new(HashMap::new()),
            service_space: Mutex::new(HashMap::new()),
        }
    }
}

pub use reconcile::InstanceUpdate;

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
