// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! `aos-servicemanager` entrypoint: wires the persistent store, image
//! handler, network plugin pipeline, traffic monitor, unit launcher,
//! resource monitor, journal alerts/logs, and the upstream client into one
//! running node (§4, §6).

mod adapters;
mod cli;
mod config;
mod orchestrator;
mod signals;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde_json::{json, Value};
use sm_client::messages::{IncomingMessage, OutgoingMessage};
use sm_client::session::{NodeConfigStatusInfo, NodeInfoSource, RunInstancesSnapshotSource, UpstreamClient};
use sm_client::subscription::ObserverRegistry;
use sm_client::transport::Credentials;
use sm_core::{InstanceIdent, SmResult};
use sm_image::{ImageHandler, SpaceAllocator};
use sm_journal::alerts::{AlertReader, AlertSender, AlertVariant, InstanceInfoProvider, JournalAlertsConfig};
use sm_journal::archivator::{LogObserver, PushLog};
use sm_journal::logs::{InstanceFilter, InstanceIdProvider, LogProvider, LoggingConfig, RequestLog};
use sm_launcher::{InstanceStatus, StatusSink, UnitLauncher, UnitMonitor};
use sm_monitor::ResourceUsageProvider;
use sm_network::tm::{Period, TrafficMonitor};
use sm_storage::capacity::Capacities;
use sm_storage::migration::MigrationRegistry;
use sm_storage::PersistentStore;

use adapters::{IptablesEngine, JournalctlFactory, SystemdBus, TrafficMonitorAdapter, WsTransport};
use config::Config;
use orchestrator::{LayerRequest, Orchestrator, RunInstancesRequest, ServiceRequest};

/// Root-owned service units run as this uid/gid unless the daemon itself is
/// deployed under a dedicated account; IAM-backed node identity and
/// per-service user mapping are out of this binary's built scope.
const DEFAULT_OWNER: u32 = 0;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();
    init_tracing(&cli);
    signals::install();

    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "aos-servicemanager exited with an error");
        std::process::exit(1);
    }
}

fn init_tracing(cli: &cli::Cli) {
    // systemd already captures a unit's stderr into the journal, so `-j`
    // only changes the output format, not the destination: no
    // `tracing-journald` crate sits in this workspace's dependency graph.
    let filter = tracing_subscriber::filter::LevelFilter::from_level(cli.log_level());
    let subscriber = tracing_subscriber::fmt().with_max_level(filter).with_target(!cli.journal);
    if cli.journal {
        subscriber.without_time().init();
    } else {
        subscriber.init();
    }
}

async fn run(cli: cli::Cli) -> SmResult<()> {
    let config = Config::load(&cli.config).map_err(|e| sm_core::SmError::failed(e))?;

    for dir in [config.services_dir(), config.layers_dir(), config.download_dir(), config.extract_dir()] {
        std::fs::create_dir_all(&dir).map_err(sm_core::SmError::from)?;
    }
    let dropins_dir = config.working_dir.join("dropins");
    let plugin_bin_dir = config.working_dir.join("cni/bin");
    let cni_conf_dir = config.working_dir.join("cni/conf.d");
    for dir in [&dropins_dir, &plugin_bin_dir, &cni_conf_dir] {
        std::fs::create_dir_all(dir).map_err(sm_core::SmError::from)?;
    }

    let store = Arc::new(PersistentStore::open(&config.db_path(), sm_storage::CURRENT_OPERATION_VERSION, &MigrationRegistry::new())?);

    let layer_space = SpaceAllocator::new(config.layers_part_limit);
    let service_space = SpaceAllocator::new(config.services_part_limit);
    let image = Arc::new(ImageHandler::new(layer_space, service_space, DEFAULT_OWNER, DEFAULT_OWNER));

    let bus = Arc::new(SystemdBus);
    let launcher = Arc::new(UnitLauncher::new(bus.clone(), dropins_dir));

    let tm = Arc::new(TrafficMonitor::new(store.clone(), IptablesEngine, Period::default()));
    let traffic_adapter: Arc<dyn sm_monitor::provider::NetworkTrafficProvider> = Arc::new(TrafficMonitorAdapter::new(tm.clone()));
    let resource = Arc::new(ResourceUsageProvider::new(traffic_adapter));

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        image.clone(),
        launcher.clone(),
        resource.clone(),
        plugin_bin_dir,
        cni_conf_dir,
        tm.clone(),
        Capacities::default(),
        config.service_ttl.as_chrono(),
        config.layer_ttl.as_chrono(),
        config.services_dir(),
        config.layers_dir(),
    ));

    let transport = Arc::new(WsTransport::new());
    let node_info: Arc<dyn NodeInfoSource> = Arc::new(FileNodeInfo { node_config_file: config.node_config_file.clone(), store: store.clone() });
    let run_status: Arc<dyn RunInstancesSnapshotSource> = Arc::new(LauncherSnapshot { launcher: launcher.clone() });
    let observers = Arc::new(ObserverRegistry::new());

    let log_provider = Arc::new(LogProvider::new(
        LoggingConfig { max_part_size: config.logging.max_part_size, max_part_count: config.logging.max_part_count },
        Arc::new(StoreInstanceIds { store: store.clone() }),
        Arc::new(JournalctlFactory),
    ));

    let client = Arc::new_cyclic(|weak: &std::sync::Weak<UpstreamClient>| {
        let handler: Arc<dyn sm_client::session::MessageHandler> = Arc::new(DaemonMessageHandler {
            orchestrator: orchestrator.clone(),
            store: store.clone(),
            client: weak.clone(),
            log_provider: log_provider.clone(),
            resource: resource.clone(),
        });
        UpstreamClient::new(
            transport,
            config.cm_server_url.clone(),
            Credentials::Tls { ca_cert: config.ca_cert.clone() },
            config.cm_reconnect_timeout.as_std(),
            node_info,
            run_status,
            handler,
            observers,
        )
    });

    let status_sink: Arc<dyn StatusSink> = Arc::new(ClientStatusSink { client: client.clone() });
    let unit_monitor = Arc::new(UnitMonitor::new(bus.clone(), launcher.clone(), status_sink));

    let alert_sender: Arc<dyn AlertSender> = Arc::new(ClientAlertSender { client: client.clone() });
    let alert_reader = Arc::new(AlertReader::new(
        JournalAlertsConfig {
            filter: config.journal_alerts.filter.clone(),
            system_alert_priority: config.journal_alerts.system_alert_priority() as i32,
            service_alert_priority: config.journal_alerts.service_alert_priority() as i32,
            sending_period: config.journal_alerts.sending_period.as_std(),
        },
        Arc::new(StoreInstanceInfo { store: store.clone() }),
        store.clone(),
        alert_sender,
        Arc::new(JournalctlFactory),
    )?);

    let log_observer: Arc<dyn LogObserver> = Arc::new(ClientLogObserver { client: client.clone() });
    log_provider.subscribe(log_observer);

    unit_monitor.start();
    client.start();
    alert_reader.start().await?;
    log_provider.start()?;

    wait_for_shutdown().await;

    log_provider.stop().await?;
    alert_reader.stop().await?;
    client.stop().await;
    unit_monitor.stop().await;
    Ok(())
}

async fn wait_for_shutdown() {
    let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to install SIGTERM handler, falling back to Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

struct FileNodeInfo {
    node_config_file: Option<PathBuf>,
    store: Arc<PersistentStore>,
}

impl NodeInfoSource for FileNodeInfo {
    fn node_config_status(&self) -> NodeConfigStatusInfo {
        let version = self.store.get_operation_version().to_string();
        let (node_id, node_type) = self
            .node_config_file
            .as_ref()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
            .map(|v| {
                (
                    v.get("nodeId").and_then(Value::as_str).unwrap_or("unknown").to_string(),
                    v.get("nodeType").and_then(Value::as_str).unwrap_or("unknown").to_string(),
                )
            })
            .unwrap_or_else(|| ("unknown".to_string(), "unknown".to_string()));
        NodeConfigStatusInfo { version, error: None, node_id, node_type }
    }
}

struct LauncherSnapshot {
    launcher: Arc<UnitLauncher>,
}

impl RunInstancesSnapshotSource for LauncherSnapshot {
    fn run_instances_status(&self) -> Vec<Value> {
        self.launcher
            .running_units()
            .into_iter()
            .map(|(instance_id, state)| json!({ "instanceId": instance_id, "state": format!("{state:?}"), "errorInfo": Value::Null }))
            .collect()
    }
}

struct ClientStatusSink {
    client: Arc<UpstreamClient>,
}

impl StatusSink for ClientStatusSink {
    fn send_status(&self, statuses: Vec<InstanceStatus>) {
        let instances = statuses
            .into_iter()
            .map(|s| json!({ "instanceId": s.instance_id, "state": format!("{:?}", s.state), "errorInfo": s.error }))
            .collect();
        if let Err(e) = self.client.send(OutgoingMessage::UpdateInstancesStatus { instances }) {
            tracing::debug!(error = %e, "dropping instance status update, no active upstream session");
        }
    }
}

struct ClientAlertSender {
    client: Arc<UpstreamClient>,
}

impl AlertSender for ClientAlertSender {
    fn send_alert(&self, alert: AlertVariant) {
        let value = match alert {
            AlertVariant::ServiceInstance(a) => json!({
                "kind": "serviceInstance",
                "instanceId": a.instance_ident.instance_id(),
                "serviceVersion": a.service_version,
                "message": a.message,
                "timestamp": a.timestamp,
            }),
            AlertVariant::Core(a) => json!({ "kind": "core", "component": format!("{:?}", a.component), "message": a.message, "timestamp": a.timestamp }),
            AlertVariant::System(a) => json!({ "kind": "system", "message": a.message, "timestamp": a.timestamp }),
        };
        if let Err(e) = self.client.send(OutgoingMessage::Alert { alert: value }) {
            tracing::debug!(error = %e, "dropping alert, no active upstream session");
        }
    }
}

struct ClientLogObserver {
    client: Arc<UpstreamClient>,
}

impl LogObserver for ClientLogObserver {
    fn on_log_received(&self, log: PushLog) {
        let value = json!({
            "logId": log.log_id,
            "part": log.part,
            "partsCount": log.parts_count,
            "status": format!("{:?}", log.status),
            "content": log.content,
            "errorInfo": log.error_info,
        });
        if let Err(e) = self.client.send(OutgoingMessage::LogData { log: value }) {
            tracing::debug!(error = %e, "dropping log part, no active upstream session");
        }
    }
}

struct StoreInstanceInfo {
    store: Arc<PersistentStore>,
}

impl InstanceInfoProvider for StoreInstanceInfo {
    fn instance_info(&self, instance_id: &str) -> SmResult<(InstanceIdent, String)> {
        let instances = self.store.get_all_instances()?;
        let instance = instances
            .into_iter()
            .find(|i| i.instance_id == instance_id)
            .ok_or_else(|| sm_core::SmError::not_found(instance_id))?;

        let versions = self.store.get_service_versions(&instance.ident.service_id);
        let version = versions
            .iter()
            .find(|s| s.state == sm_core::ServiceState::Active)
            .or_else(|| versions.first())
            .map(|s| s.version.clone())
            .unwrap_or_default();

        Ok((instance.ident, version))
    }
}

struct StoreInstanceIds {
    store: Arc<PersistentStore>,
}

impl InstanceIdProvider for StoreInstanceIds {
    fn instance_ids(&self, filter: &InstanceFilter) -> SmResult<Vec<String>> {
        let instances = self.store.get_all_instances()?;
        Ok(instances
            .into_iter()
            .filter(|i| filter.service_id.as_deref().map_or(true, |id| id == i.ident.service_id))
            .filter(|i| filter.subject_id.as_deref().map_or(true, |id| id == i.ident.subject_id))
            .filter(|i| filter.instance.map_or(true, |idx| idx == i.ident.instance_index))
            .map(|i| i.instance_id)
            .collect())
    }
}

struct DaemonMessageHandler {
    orchestrator: Arc<Orchestrator<IptablesEngine>>,
    store: Arc<PersistentStore>,
    client: std::sync::Weak<UpstreamClient>,
    log_provider: Arc<LogProvider>,
    resource: Arc<ResourceUsageProvider>,
}

impl DaemonMessageHandler {
    fn send(&self, message: OutgoingMessage) {
        let Some(client) = self.client.upgrade() else { return };
        if let Err(e) = client.send(message) {
            tracing::debug!(error = %e, "dropping outgoing message, no active upstream session");
        }
    }

    fn handle_run_instances(self: Arc<Self>, services: Vec<Value>, layers: Vec<Value>, instances: Vec<Value>, force_restart: bool) {
        tokio::spawn(async move {
            let request = match build_run_instances_request(services, layers, instances, force_restart) {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!(error = %e, "malformed RunInstances payload");
                    return;
                }
            };
            match self.orchestrator.run_instances(request).await {
                Ok(updates) => {
                    let instances = updates.iter().map(|u| u.to_json()).collect();
                    self.send(OutgoingMessage::RunInstancesStatus { instances });
                }
                Err(e) => tracing::error!(error = %e, "run_instances failed"),
            }
        });
    }
}

fn build_run_instances_request(services: Vec<Value>, layers: Vec<Value>, instances: Vec<Value>, force_restart: bool) -> SmResult<RunInstancesRequest> {
    let services = services
        .into_iter()
        .map(serde_json::from_value::<ServiceRequest>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(sm_core::SmError::from)?;
    let layers = layers
        .into_iter()
        .map(serde_json::from_value::<LayerRequest>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(sm_core::SmError::from)?;
    let instances = instances
        .into_iter()
        .map(serde_json::from_value::<sm_core::Instance>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(sm_core::SmError::from)?;
    Ok(RunInstancesRequest { services, layers, instances, force_restart })
}

fn instance_filter_from(value: Value) -> InstanceFilter {
    InstanceFilter {
        service_id: value.get("serviceId").and_then(Value::as_str).map(str::to_string),
        subject_id: value.get("subjectId").and_then(Value::as_str).map(str::to_string),
        instance: value.get("instance").and_then(Value::as_u64).map(|v| v as u32),
    }
}

impl sm_client::session::MessageHandler for DaemonMessageHandler {
    fn handle(&self, message: IncomingMessage) {
        match message {
            IncomingMessage::GetNodeConfigStatus => {
                // Handled by the session layer itself on (re)connect; a
                // mid-session poll just reports the same stored version.
                tracing::debug!("GetNodeConfigStatus received mid-session");
            }
            IncomingMessage::CheckNodeConfig { version, .. } => {
                tracing::info!(version, "CheckNodeConfig received, node config validation is not implemented");
            }
            IncomingMessage::SetNodeConfig { version, .. } => {
                tracing::info!(version, "SetNodeConfig received, node config application is not implemented");
            }
            IncomingMessage::RunInstances { services, layers, instances, force_restart } => {
                let this = Arc::new(DaemonMessageHandler {
                    orchestrator: self.orchestrator.clone(),
                    store: self.store.clone(),
                    client: self.client.clone(),
                    log_provider: self.log_provider.clone(),
                    resource: self.resource.clone(),
                });
                this.handle_run_instances(services, layers, instances, force_restart);
            }
            IncomingMessage::UpdateNetworks { networks } => {
                for net in networks {
                    match serde_json::from_value::<sm_core::NetworkParameters>(net) {
                        Ok(params) => {
                            if let Err(e) = self.store.add_network_info(&params.network_id, params.clone()) {
                                tracing::error!(network_id = %params.network_id, error = %e, "failed to store network info");
                            }
                        }
                        Err(e) => tracing::error!(error = %e, "malformed network entry in UpdateNetworks"),
                    }
                }
            }
            IncomingMessage::SystemLogRequest { log_id, from, till } => {
                let request = RequestLog { log_id, filter: InstanceFilter::default(), from, till };
                if let Err(e) = self.log_provider.get_system_log(&request) {
                    tracing::error!(error = %e, "system log request failed");
                }
            }
            IncomingMessage::InstanceLogRequest { log_id, filter, from, till } => {
                let request = RequestLog { log_id, filter: instance_filter_from(filter), from, till };
                if let Err(e) = self.log_provider.get_instance_log(&request) {
                    tracing::error!(error = %e, "instance log request failed");
                }
            }
            IncomingMessage::InstanceCrashLogRequest { log_id, filter, from, till } => {
                let request = RequestLog { log_id, filter: instance_filter_from(filter), from, till };
                if let Err(e) = self.log_provider.get_instance_crash_log(&request) {
                    tracing::error!(error = %e, "instance crash log request failed");
                }
            }
            IncomingMessage::OverrideEnvVars { env_vars } => {
                if let Err(e) = self.store.set_override_env_vars(json!(env_vars)) {
                    tracing::error!(error = %e, "failed to persist overridden env vars");
                }
                self.send(OutgoingMessage::OverrideEnvVarStatus { statuses: Vec::new() });
            }
            IncomingMessage::GetAverageMonitoring => match self.resource.node_monitoring_data(&[]) {
                Ok(data) => {
                    let value = json!({ "cpu": data.cpu, "ram": data.ram, "download": data.download, "upload": data.upload });
                    self.send(OutgoingMessage::AverageMonitoring { data: value });
                }
                Err(e) => tracing::error!(error = %e, "failed to collect average monitoring data"),
            },
            IncomingMessage::ConnectionStatus { .. } => {
                // The session layer already notified `ObserverRegistry`
                // before this handler ran.
            }
        }
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
