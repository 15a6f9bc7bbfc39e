// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::orchestrator::tests::orchestrator;
use crate::orchestrator::{LayerRequest, RunInstancesRequest, ServiceRequest};
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest as _, Sha256};
use sm_core::test_support;
use sm_image::manifest::{Descriptor, ImageManifest};
use sm_network::npp::exec::PluginInvocation;
use sm_network::npp::{NetworkPluginPipeline, PluginError, PluginRunner};
use sm_storage::capacity::Capacities;
use std::fs;
use std::path::Path;
use std::sync::Arc;

const MANIFEST_FILE: &str = "manifest.json";

fn write_tar_gz(path: &Path, files: &[(&str, &[u8])]) {
    let file = fs::File::create(path).expect("create archive file");
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_cksum();
        builder.append_data(&mut header, name, *contents).expect("append");
    }
    builder.into_inner().expect("finish tar").finish().expect("finish gzip");
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Builds a minimal valid layer archive, the same shape `sm-image`'s own
/// handler tests use, so `install_layer` can run unmodified against it.
fn make_layer_archive(dir: &Path, name: &str) -> LayerRequest {
    let embedded_path = dir.join(format!("{name}-embedded.tar.gz"));
    write_tar_gz(&embedded_path, &[("payload/data.bin", b"layer contents")]);
    let embedded_bytes = fs::read(&embedded_path).expect("read embedded");
    let embedded_hex = sha256_hex(&embedded_bytes);

    let outer_path = dir.join(format!("{name}.tar.gz"));
    let manifest = ImageManifest {
        schema_version: 2,
        config: Descriptor {
            media_type: "application/vnd.aos.layer.config.v1+json".to_string(),
            digest: format!("sha256:{embedded_hex}"),
            size: embedded_bytes.len() as u64,
        },
        layers: vec![],
        aos_service: None,
    };
    let manifest_json = serde_json::to_vec(&manifest).expect("serialize manifest");
    write_tar_gz(&outer_path, &[(MANIFEST_FILE, &manifest_json), (&embedded_hex, &embedded_bytes)]);

    let outer_bytes = fs::read(&outer_path).expect("read outer archive");
    let sha3 = sm_image::digest::hash_file_sha3_256(&outer_path).expect("sha3");

    LayerRequest {
        layer_id: name.to_string(),
        version: "1.0.0".to_string(),
        os_version: "1".to_string(),
        staged_archive: outer_path,
        sha3_256: sha3,
        size: outer_bytes.len() as u64,
    }
}

/// Always fails ADD, letting tests exercise `start_instance`'s network
/// failure branch without a real CNI binary on disk.
struct FailingRunner;
#[async_trait]
impl PluginRunner for FailingRunner {
    async fn run(&self, invocation: &PluginInvocation) -> Result<serde_json::Value, PluginError> {
        Err(PluginError::Raw { binary: invocation.binary_name.clone(), raw: "no plugin binaries in test environment".to_string() })
    }
}

fn network_instance(id: &str) -> Instance {
    let mut inst = test_support::instance(id, "subj0", 0);
    inst.instance_id = id.to_string();
    inst.network_parameters = Some(sm_core::NetworkParameters {
        network_id: format!("net-{id}"),
        subnet_cidr: "10.1.0.0/24".to_string(),
        ip: "10.1.0.2".to_string(),
        vlan_id: None,
        vlan_if_name: None,
        dns_servers: vec![],
        firewall_rules: vec![],
    });
    inst
}

fn plain_instance(id: &str) -> Instance {
    let mut inst = test_support::instance(id, "subj0", 0);
    inst.instance_id = id.to_string();
    inst
}

#[tokio::test]
async fn run_instances_installs_new_content_and_caches_dropped_content() {
    let dir = tempfile::tempdir().expect("tempdir");
    let orch = orchestrator(dir.path());
    let layer_req = make_layer_archive(dir.path(), "layer0");

    orch.run_instances(RunInstancesRequest { services: vec![], layers: vec![layer_req], instances: vec![], force_restart: false })
        .await
        .expect("first run_instances installs the layer");

    let layers = orch.store.get_all_layers().expect("layers");
    assert_eq!(layers.len(), 1);
    assert_eq!(layers[0].state, ServiceState::Active);

    // Second pass desires no layers at all: the installed one should be
    // marked `Cached` rather than removed outright (§4.9 step 2).
    orch.run_instances(RunInstancesRequest { services: vec![], layers: vec![], instances: vec![], force_restart: false })
        .await
        .expect("second run_instances caches the layer");

    let layers = orch.store.get_all_layers().expect("layers");
    assert_eq!(layers.len(), 1);
    assert_eq!(layers[0].state, ServiceState::Cached);
}

#[tokio::test]
async fn run_instances_skips_reinstalling_an_already_present_service() {
    let dir = tempfile::tempdir().expect("tempdir");
    let orch = orchestrator(dir.path());
    orch.store.add_service(test_support::service("svc0", "1.0.0", ServiceState::Active)).expect("seed service");

    // Desiring the same (service_id, version) PS already has must not call
    // `install_service` at all: the staged archive below doesn't exist on
    // disk, so `run_instances` would fail if it tried.
    let service_req = ServiceRequest {
        service_id: "svc0".to_string(),
        version: "1.0.0".to_string(),
        provider_id: "provider0".to_string(),
        staged_archive: dir.path().join("does-not-exist.tar.gz"),
        sha3_256: "unused".to_string(),
        size: 0,
        uid: 0,
        gid: 0,
    };

    orch.run_instances(RunInstancesRequest { services: vec![service_req], layers: vec![], instances: vec![], force_restart: false })
        .await
        .expect("already-present service is not reinstalled");
    assert_eq!(orch.store.get_service_versions("svc0").len(), 1);
}

#[tokio::test]
async fn run_instances_rejects_a_desired_set_over_capacity() {
    let dir = tempfile::tempdir().expect("tempdir");
    let orch = orchestrator(dir.path());
    let oversized: Vec<Instance> = (0..orch.capacities.max_instances + 1).map(|i| plain_instance(&format!("inst{i}"))).collect();

    let err = orch
        .run_instances(RunInstancesRequest { services: vec![], layers: vec![], instances: oversized, force_restart: false })
        .await
        .unwrap_err();
    assert!(matches!(err, SmError::NoMemory(_)));
}

#[tokio::test]
async fn run_instances_starts_newly_desired_instances_without_network_parameters() {
    let dir = tempfile::tempdir().expect("tempdir");
    let orch = orchestrator(dir.path());
    let inst = plain_instance("inst0");

    let updates = orch
        .run_instances(RunInstancesRequest { services: vec![], layers: vec![], instances: vec![inst], force_restart: false })
        .await
        .expect("run_instances");

    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].instance_id, "inst0");
    assert_eq!(updates[0].state, InstanceRunState::Active);
    assert!(updates[0].error.is_none());
    assert_eq!(orch.store.get_all_instances().expect("instances").len(), 1);
}

#[tokio::test]
async fn run_instances_stops_instances_no_longer_desired() {
    let dir = tempfile::tempdir().expect("tempdir");
    let orch = orchestrator(dir.path());
    let inst = plain_instance("inst0");

    orch.run_instances(RunInstancesRequest { services: vec![], layers: vec![], instances: vec![inst], force_restart: false })
        .await
        .expect("start inst0");
    assert_eq!(orch.store.get_all_instances().expect("instances").len(), 1);

    orch.run_instances(RunInstancesRequest { services: vec![], layers: vec![], instances: vec![], force_restart: false })
        .await
        .expect("stop inst0");
    assert_eq!(orch.store.get_all_instances().expect("instances").len(), 0);
}

#[tokio::test]
async fn run_instances_reports_last_observed_state_for_untouched_instances() {
    let dir = tempfile::tempdir().expect("tempdir");
    let orch = orchestrator(dir.path());
    let inst = plain_instance("inst0");

    orch.run_instances(RunInstancesRequest { services: vec![], layers: vec![], instances: vec![inst.clone()], force_restart: false })
        .await
        .expect("start inst0");

    // Desiring the same instance again leaves it neither stopped nor
    // (re)started; it must keep reporting UL's last observed run state
    // rather than falling back to a default.
    let updates = orch
        .run_instances(RunInstancesRequest { services: vec![], layers: vec![], instances: vec![inst], force_restart: false })
        .await
        .expect("steady-state reconcile");

    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].instance_id, "inst0");
    assert_eq!(updates[0].state, InstanceRunState::Active);
}

#[tokio::test]
async fn start_instance_with_network_parameters_reports_failure_when_add_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(sm_storage::PersistentStore::open(&dir.path().join("sm.db"), 1, &sm_storage::migration::MigrationRegistry::new()).expect("open store"));
    let image = Arc::new(sm_image::ImageHandler::new(sm_image::space::SpaceAllocator::new(0), sm_image::space::SpaceAllocator::new(0), 0, 0));
    let launcher = Arc::new(sm_launcher::UnitLauncher::new(Arc::new(crate::orchestrator::tests::NoopBus), dir.path().join("dropins")));
    let resource = Arc::new(sm_monitor::ResourceUsageProvider::new(Arc::new(crate::orchestrator::tests::NoopTraffic)));
    let tm = Arc::new(sm_network::tm::TrafficMonitor::new(store.clone(), crate::orchestrator::tests::NoopEngine, sm_network::tm::Period::default()));

    let npp = Arc::new(NetworkPluginPipeline::new(dir.path().join("plugins"), dir.path().join("cni-conf"), &FAILING_RUNNER));
    let orch = Orchestrator {
        store,
        image,
        launcher,
        resource,
        npp,
        tm,
        capacities: Capacities::default(),
        service_ttl: ChronoDuration::days(30),
        layer_ttl: ChronoDuration::days(30),
        services_install_dir: dir.path().join("services"),
        layers_install_dir: dir.path().join("layers"),
        layer_space: std::sync::Mutex::new(std::collections::HashMap::new()),
        service_space: std::sync::Mutex::new(std::collections::HashMap::new()),
    };

    let inst = network_instance("inst0");
    let updates = orch
        .run_instances(RunInstancesRequest { services: vec![], layers: vec![], instances: vec![inst], force_restart: false })
        .await
        .expect("run_instances itself succeeds even though the instance failed to start");

    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].state, InstanceRunState::Failed);
    assert!(updates[0].error.is_some());
}

static FAILING_RUNNER: FailingRunner = FailingRunner;

#[tokio::test]
async fn installed_layer_keeps_its_space_reservation_until_gc_removes_it() {
    let dir = tempfile::tempdir().expect("tempdir");
    let layer_space = sm_image::space::SpaceAllocator::new(0);
    let service_space = sm_image::space::SpaceAllocator::new(0);
    let layer_req = make_layer_archive(dir.path(), "layer0");

    let store = Arc::new(sm_storage::PersistentStore::open(&dir.path().join("sm.db"), 1, &sm_storage::migration::MigrationRegistry::new()).expect("open store"));
    let image = Arc::new(sm_image::ImageHandler::new(layer_space.clone(), service_space, 0, 0));
    let launcher = Arc::new(sm_launcher::UnitLauncher::new(Arc::new(crate::orchestrator::tests::NoopBus), dir.path().join("dropins")));
    let resource = Arc::new(sm_monitor::ResourceUsageProvider::new(Arc::new(crate::orchestrator::tests::NoopTraffic)));
    let tm = Arc::new(sm_network::tm::TrafficMonitor::new(store.clone(), crate::orchestrator::tests::NoopEngine, sm_network::tm::Period::default()));
    let npp = Arc::new(NetworkPluginPipeline::new(dir.path().join("plugins"), dir.path().join("cni-conf"), &FAILING_RUNNER));
    let orch = Orchestrator {
        store,
        image,
        launcher,
        resource,
        npp,
        tm,
        capacities: Capacities::default(),
        service_ttl: ChronoDuration::days(30),
        // A zero TTL makes every `Cached` layer immediately eligible for GC.
        layer_ttl: ChronoDuration::seconds(0),
        services_install_dir: dir.path().join("services"),
        layers_install_dir: dir.path().join("layers"),
        layer_space: std::sync::Mutex::new(std::collections::HashMap::new()),
        service_space: std::sync::Mutex::new(std::collections::HashMap::new()),
    };

    orch.run_instances(RunInstancesRequest { services: vec![], layers: vec![layer_req], instances: vec![], force_restart: false })
        .await
        .expect("install the layer");
    assert!(layer_space.used() > 0, "install must reserve space for the layer's on-disk footprint");

    // Desiring nothing marks the layer `Cached`; with a zero TTL the next
    // pass's GC step removes it and must release the reservation.
    orch.run_instances(RunInstancesRequest { services: vec![], layers: vec![], instances: vec![], force_restart: false })
        .await
        .expect("cache the layer");
    orch.run_instances(RunInstancesRequest { services: vec![], layers: vec![], instances: vec![], force_restart: false })
        .await
        .expect("gc the cached layer");

    assert_eq!(layer_space.used(), 0, "gc must release the layer's space reservation");
    assert!(orch.store.get_all_layers().expect("layers").is_empty());
}

#[test]
fn instance_update_to_json_reports_debug_formatted_state() {
    let update = InstanceUpdate { instance_id: "inst0".to_string(), state: InstanceRunState::Active, error: None };
    let json = update.to_json();
    assert_eq!(json["instanceId"], "inst0");
    assert_eq!(json["state"], "Active");
    assert!(json["errorInfo"].is_null());
}

#[test]
fn instance_update_from_instance_status_carries_fields_through() {
    let status = InstanceStatus { instance_id: "inst0".to_string(), state: InstanceRunState::Failed, error: Some("boom".to_string()) };
    let update: InstanceUpdate = status.into();
    assert_eq!(update.instance_id, "inst0");
    assert_eq!(update.state, InstanceRunState::Failed);
    assert_eq!(update.error.as_deref(), Some("boom"));
}
