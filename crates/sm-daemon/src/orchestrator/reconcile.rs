// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The five `run_instances` steps (§4.9).

use std::collections::HashSet;

use chrono::Utc;
use serde_json::{json, Value};
use sm_core::{Instance, Layer, Service, ServiceState, SmError, SmResult};
use sm_image::{LayerInfo, ServiceInfo};
use sm_launcher::{dropins, InstanceRunState, InstanceStatus, RunParameters};
use sm_network::npp::{NetworkList, PluginConfig, PluginKind, RuntimeConf};
use sm_network::tm::PacketFilterEngine;

use super::Orchestrator;

/// Reported for a single instance after a `run_instances` pass, serialized
/// into `UpdateInstancesStatus`/`RunInstancesStatus` (§6 "Outgoing").
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceUpdate {
    pub instance_id: String,
    pub state: InstanceRunState,
    pub error: Option<String>,
}

fn network_list_for(params: &sm_core::NetworkParameters) -> NetworkList {
    let bridge = PluginConfig::new(
        PluginKind::Bridge,
        json!({
            "type": "bridge",
            "bridge": "aos0",
            "ipam": { "type": "host-local", "subnet": params.subnet_cidr, "ip": params.ip },
        }),
    );
    let dns = if params.dns_servers.is_empty() {
        PluginConfig::empty()
    } else {
        PluginConfig::new(PluginKind::Dns, json!({ "type": "dnsname", "nameservers": params.dns_servers }))
    };
    let firewall = if params.firewall_rules.is_empty() {
        PluginConfig::empty()
    } else {
        PluginConfig::new(PluginKind::Firewall, json!({ "type": "aos-firewall", "rules": params.firewall_rules }))
    };
    NetworkList { name: params.network_id.clone(), cni_version: "1.0.0".to_string(), bridge, dns, firewall, bandwidth: PluginConfig::empty() }
}

impl<E: PacketFilterEngine + 'static> Orchestrator<E> {
    /// §4.9 steps 1-5.
    pub async fn run_instances(&self, request: super::RunInstancesRequest) -> SmResult<Vec<InstanceUpdate>> {
        self.validate_sizes(&request)?;
        self.sync_content(&request)?;
        self.gc_expired_content()?;
        self.reconcile_instances(&request.instances, request.force_restart).await
    }

    fn validate_sizes(&self, request: &super::RunInstancesRequest) -> SmResult<()> {
        if request.services.len() > self.capacities.max_services {
            return Err(SmError::NoMemory(format!("desired services {} exceed limit {}", request.services.len(), self.capacities.max_services)));
        }
        if request.layers.len() > self.capacities.max_layers {
            return Err(SmError::NoMemory(format!("desired layers {} exceed limit {}", request.layers.len(), self.capacities.max_layers)));
        }
        if request.instances.len() > self.capacities.max_instances {
            return Err(SmError::NoMemory(format!("desired instances {} exceed limit {}", request.instances.len(), self.capacities.max_instances)));
        }
        Ok(())
    }

    /// Step 2: install missing services/layers, mark the rest `Cached`.
    fn sync_content(&self, request: &super::RunInstancesRequest) -> SmResult<()> {
        let desired_layers: HashSet<&str> = request.layers.iter().map(|l| l.layer_id.as_str()).collect();
        let desired_services: HashSet<(&str, &str)> =
            request.services.iter().map(|s| (s.service_id.as_str(), s.version.as_str())).collect();

        let existing_layer_ids: HashSet<String> = self.store.get_all_layers()?.into_iter().map(|l| l.layer_id).collect();
        for layer in &request.layers {
            if existing_layer_ids.contains(&layer.layer_id) {
                continue;
            }
            self.install_layer(layer)?;
        }

        for service in &request.services {
            let already = self.store.get_service_versions(&service.service_id).into_iter().any(|s| s.version == service.version);
            if already {
                continue;
            }
            self.install_service(service)?;
        }

        for layer in self.store.get_all_layers()? {
            if layer.state == ServiceState::Active && !desired_layers.contains(layer.layer_id.as_str()) {
                let mut updated = layer;
                updated.state = ServiceState::Cached;
                self.store.update_layer(updated)?;
            }
        }
        for service in self.store.get_all_services()? {
            if service.state == ServiceState::Active && !desired_services.contains(&(service.service_id.as_str(), service.version.as_str())) {
                let mut updated = service;
                updated.state = ServiceState::Cached;
                self.store.update_service(updated)?;
            }
        }
        Ok(())
    }

    fn install_layer(&self, req: &super::LayerRequest) -> SmResult<()> {
        let install_base = self.layers_install_dir.clone();
        let info = LayerInfo { size: req.size, sha3_256: req.sha3_256.clone() };
        let (install_dir, space) = self.image.install_layer(&req.staged_archive, &install_base, &info)?;
        let digest = self.image.calculate_digest(&install_dir)?;
        self.store.add_layer(Layer {
            digest,
            layer_id: req.layer_id.clone(),
            path: install_dir,
            os_version: req.os_version.clone(),
            version: req.version.clone(),
            timestamp: Utc::now(),
            state: ServiceState::Active,
            size_bytes: req.size,
        })?;
        self.layer_space.lock().expect("layer space map poisoned").insert(req.layer_id.clone(), space);
        Ok(())
    }

    fn install_service(&self, req: &super::ServiceRequest) -> SmResult<()> {
        let install_base = self.services_install_dir.clone();
        let info = ServiceInfo { service_id: req.service_id.clone(), size: req.size, sha3_256: req.sha3_256.clone(), uid: req.uid, gid: req.gid };
        let (install_dir, space) = self.image.install_service(&req.staged_archive, &install_base, &info)?;
        let digest = self.image.calculate_digest(&install_dir)?;
        self.store.add_service(Service {
            service_id: req.service_id.clone(),
            version: req.version.clone(),
            provider_id: req.provider_id.clone(),
            image_path: install_dir,
            manifest_digest: digest,
            state: ServiceState::Active,
            timestamp: Utc::now(),
            size_bytes: req.size,
            gid: req.gid,
        })?;
        self.service_space
            .lock()
            .expect("service space map poisoned")
            .insert((req.service_id.clone(), req.version.clone()), space);
        Ok(())
    }

    /// Step 2's GC half: past-TTL `Cached` rows are removed from PS; the
    /// installed content itself is left for a future sweep (§4.9 names PS
    /// bookkeeping only, not filesystem reclamation timing).
    fn gc_expired_content(&self) -> SmResult<()> {
        let now = Utc::now();
        for service in self.store.get_all_services()? {
            if service.expired(now, self.service_ttl) {
                self.store.remove_service(&service.service_id, &service.version)?;
                self.service_space
                    .lock()
                    .expect("service space map poisoned")
                    .remove(&(service.service_id, service.version));
            }
        }
        for layer in self.store.get_all_layers()? {
            if layer.expired(now, self.layer_ttl) {
                self.store.remove_layer(layer.digest.as_str())?;
                self.layer_space.lock().expect("layer space map poisoned").remove(&layer.layer_id);
            }
        }
        Ok(())
    }

    /// Steps 3-4: diff running instances against desired, stop/start the
    /// difference (or everything, on `force_restart`), and wire network,
    /// unit and traffic accounting for each started instance.
    async fn reconcile_instances(&self, desired: &[Instance], force_restart: bool) -> SmResult<Vec<InstanceUpdate>> {
        let current = self.store.get_all_instances()?;
        let current_ids: HashSet<&str> = current.iter().map(|i| i.instance_id.as_str()).collect();
        let desired_ids: HashSet<&str> = desired.iter().map(|i| i.instance_id.as_str()).collect();

        let to_stop: Vec<&Instance> = current
            .iter()
            .filter(|i| force_restart || !desired_ids.contains(i.instance_id.as_str()))
            .collect();
        let to_start: Vec<&Instance> = desired
            .iter()
            .filter(|i| force_restart || !current_ids.contains(i.instance_id.as_str()))
            .collect();

        for instance in &to_stop {
            self.stop_instance(instance).await;
        }
        for instance in &to_start {
            self.store.add_instance((*instance).clone()).or_else(|e| if matches!(e, SmError::AlreadyExists(_)) { Ok(()) } else { Err(e) })?;
        }

        let mut updates = Vec::with_capacity(desired.len());
        for instance in &to_start {
            updates.push(self.start_instance(instance).await);
        }
        // Instances that were neither stopped nor (re)started keep whatever
        // run state UL's monitor last observed.
        let running = self.launcher.running_units();
        for instance in desired {
            if to_start.iter().any(|i| i.instance_id == instance.instance_id) {
                continue;
            }
            let unit = dropins::unit_name(&instance.instance_id);
            let state = running.get(&unit).copied().unwrap_or_default();
            updates.push(InstanceUpdate { instance_id: instance.instance_id.clone(), state, error: None });
        }
        Ok(updates)
    }

    async fn stop_instance(&self, instance: &Instance) {
        if let Some(params) = &instance.network_parameters {
            if let Err(e) = self.npp.delete_network_list(&params.network_id, &instance.instance_id).await {
                tracing::warn!(instance_id = %instance.instance_id, error = %e, "network teardown failed");
            }
        }
        if let Err(e) = self.launcher.stop_instance(&instance.instance_id) {
            tracing::warn!(instance_id = %instance.instance_id, error = %e, "unit stop failed");
        }
        if let Err(e) = self.tm.remove_instance(&instance.instance_id).await {
            if !e.is_not_found() {
                tracing::warn!(instance_id = %instance.instance_id, error = %e, "traffic chain teardown failed");
            }
        }
        let _ = self.store.remove_instance(&instance.instance_id);
    }

    async fn start_instance(&self, instance: &Instance) -> InstanceUpdate {
        if let Some(params) = &instance.network_parameters {
            let net = network_list_for(params);
            let rt = RuntimeConf { container_id: instance.instance_id.clone(), args: Vec::new(), ..Default::default() };
            if let Err(e) = self.npp.add_network_list(&net, &rt).await {
                return InstanceUpdate { instance_id: instance.instance_id.clone(), state: InstanceRunState::Failed, error: Some(e.to_string()) };
            }
            if let Err(e) = self.tm.add_instance(&instance.instance_id, &params.ip, 0).await {
                tracing::warn!(instance_id = %instance.instance_id, error = %e, "traffic accounting setup failed");
            }
        }

        match self.launcher.start_instance(&instance.instance_id, RunParameters::default()) {
            Ok(state) => InstanceUpdate { instance_id: instance.instance_id.clone(), state, error: None },
            Err(e) => InstanceUpdate { instance_id: instance.instance_id.clone(), state: InstanceRunState::Failed, error: Some(e.to_string()) },
        }
    }
}

impl InstanceUpdate {
    pub fn to_json(&self) -> Value {
        json!({ "instanceId": self.instance_id, "state": format!("{:?}", self.state), "errorInfo": self.error })
    }
}

impl From<InstanceStatus> for InstanceUpdate {
    fn from(status: InstanceStatus) -> Self {
        InstanceUpdate { instance_id: status.instance_id, state: status.state, error: status.error }
    }
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
