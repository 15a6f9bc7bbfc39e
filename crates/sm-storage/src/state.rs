// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state built from WAL replay, one map per logical table
//! named in §4.1.

use std::collections::HashMap;

use sm_core::{Instance, Layer, NetworkParameters, Service, TrafficCounter};

use crate::config::ConfigRow;
use crate::op::Operation;

fn service_key(service_id: &str, version: &str) -> String {
    format!("{service_id}@{version}")
}

#[derive(Debug, Clone, Default)]
pub struct MaterializedState {
    pub instances: HashMap<String, Instance>,
    pub services: HashMap<String, Service>,
    pub layers: HashMap<String, Layer>,
    pub networks: HashMap<String, NetworkParameters>,
    pub traffic: HashMap<String, TrafficCounter>,
    pub config: ConfigRow,
}

impl MaterializedState {
    pub fn bootstrap(operation_version: u32) -> Self {
        MaterializedState {
            config: ConfigRow::bootstrap(operation_version),
            ..Default::default()
        }
    }

    /// Drops every table's contents but keeps a freshly-bootstrapped
    /// `config` row at `operation_version` (§4.1 schema bootstrap case b).
    pub fn drop_and_recreate(&mut self, operation_version: u32) {
        *self = MaterializedState::bootstrap(operation_version);
    }

    /// Apply one WAL operation. All handlers are idempotent: applying the
    /// same operation twice (e.g. during replay after a crash mid-append)
    /// produces the same state as applying it once.
    pub fn apply(&mut self, op: &Operation) {
        match op {
            Operation::AddInstance(instance) | Operation::UpdateInstance(instance) => {
                self.instances.insert(instance.instance_id.clone(), instance.clone());
            }
            Operation::RemoveInstance { instance_id } => {
                self.instances.remove(instance_id);
            }

            Operation::AddService(service) | Operation::UpdateService(service) => {
                self.services.insert(service_key(&service.service_id, &service.version), service.clone());
            }
            Operation::RemoveService { service_id, version } => {
                self.services.remove(&service_key(service_id, version));
            }

            Operation::AddLayer(layer) | Operation::UpdateLayer(layer) => {
                self.layers.insert(layer.digest.as_str().to_string(), layer.clone());
            }
            Operation::RemoveLayer { digest } => {
                self.layers.remove(digest);
            }

            Operation::AddNetworkInfo { network_id, params } => {
                self.networks.insert(network_id.clone(), params.clone());
            }
            Operation::RemoveNetworkInfo { network_id } => {
                self.networks.remove(network_id);
            }

            Operation::SetTrafficData { chain, time, value } => {
                self.traffic.insert(
                    chain.clone(),
                    TrafficCounter {
                        chain: chain.clone(),
                        last_update: *time,
                        accumulated_bytes: *value,
                    },
                );
            }
            Operation::RemoveTrafficData { chain } => {
                self.traffic.remove(chain);
            }

            Operation::SetOperationVersion(v) => self.config.operation_version = *v,
            Operation::SetOnlineTime(t) => self.config.online_time = Some(*t),
            Operation::SetOverrideEnvVars(v) => self.config.env_var_overrides = v.clone(),
            Operation::SetJournalCursor(c) => self.config.journal_cursor = Some(c.clone()),
        }
    }

    pub fn service_versions(&self, service_id: &str) -> Vec<&Service> {
        self.services.values().filter(|s| s.service_id == service_id).collect()
    }
}
