// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The persistent store facade (§4.1): one database handle serializing all
//! operations behind a single mutex (§5 "PS").

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use sm_core::{Instance, Layer, NetworkParameters, Service, SmError, SmResult, TrafficCounter};

use crate::capacity::Capacities;
use crate::migration::MigrationRegistry;
use crate::op::Operation;
use crate::state::MaterializedState;
use crate::wal::Wal;

struct Inner {
    wal: Wal<Operation>,
    state: MaterializedState,
}

pub struct PersistentStore {
    inner: Mutex<Inner>,
    capacities: Capacities,
}

impl PersistentStore {
    pub fn open(db_path: &Path, current_version: u32, migrations: &MigrationRegistry) -> SmResult<Self> {
        Self::open_with_capacities(db_path, current_version, migrations, Capacities::default())
    }

    pub fn open_with_capacities(
        db_path: &Path,
        current_version: u32,
        migrations: &MigrationRegistry,
        capacities: Capacities,
    ) -> SmResult<Self> {
        let existed = db_path.exists();

        let (mut state, mut wal) = if existed {
            let mut wal = Wal::<Operation>::open(db_path, 0)?;
            let mut state = MaterializedState::bootstrap(0);
            while let Some(entry) = wal.next_unprocessed()? {
                state.apply(&entry.op);
                wal.mark_processed(entry.seq);
            }
            (state, wal)
        } else {
            (MaterializedState::bootstrap(current_version), Wal::<Operation>::open(db_path, 0)?)
        };

        // Schema bootstrap algorithm (§4.1): version mismatch is a hard
        // blocker resolved by dropping and recreating every table.
        if state.config.operation_version != current_version {
            tracing::warn!(
                stored = state.config.operation_version,
                current = current_version,
                "operation_version mismatch, dropping all tables"
            );
            state.drop_and_recreate(current_version);
            // Truncate: a version mismatch means the old log is unusable
            // going forward, so we start a fresh append-only file rather
            // than carry dead entries that would be replayed on every boot.
            std::fs::File::create(db_path).map_err(SmError::from)?;
            wal = Wal::<Operation>::open(db_path, 0)?;
            wal.append(&Operation::SetOperationVersion(current_version))?;
            wal.flush()?;
        }

        migrations.apply_all(&mut state).map_err(|e| SmError::storage(e))?;

        Ok(PersistentStore {
            inner: Mutex::new(Inner { wal, state }),
            capacities,
        })
    }

    fn append(&self, inner: &mut Inner, op: Operation) -> SmResult<()> {
        inner.state.apply(&op);
        inner.wal.append(&op)?;
        inner.wal.flush()
    }

    // ---- instances -------------------------------------------------

    pub fn add_instance(&self, instance: Instance) -> SmResult<()> {
        let mut inner = self.inner.lock();
        if inner.state.instances.contains_key(&instance.instance_id) {
            return Err(SmError::AlreadyExists(instance.instance_id));
        }
        self.append(&mut inner, Operation::AddInstance(instance))
    }

    pub fn update_instance(&self, instance: Instance) -> SmResult<()> {
        let mut inner = self.inner.lock();
        if !inner.state.instances.contains_key(&instance.instance_id) {
            return Err(SmError::not_found(&instance.instance_id));
        }
        self.append(&mut inner, Operation::UpdateInstance(instance))
    }

    pub fn remove_instance(&self, instance_id: &str) -> SmResult<()> {
        let mut inner = self.inner.lock();
        if !inner.state.instances.contains_key(instance_id) {
            return Err(SmError::not_found(instance_id));
        }
        self.append(&mut inner, Operation::RemoveInstance { instance_id: instance_id.to_string() })
    }

    pub fn get_all_instances(&self) -> SmResult<Vec<Instance>> {
        let inner = self.inner.lock();
        if inner.state.instances.len() > self.capacities.max_instances {
            return Err(SmError::NoMemory("instances".into()));
        }
        Ok(inner.state.instances.values().cloned().collect())
    }

    // ---- services ----------------------------------------------------

    pub fn add_service(&self, service: Service) -> SmResult<()> {
        let mut inner = self.inner.lock();
        let key = service.key();
        if inner.state.services.values().any(|s| s.key() == key) {
            return Err(SmError::AlreadyExists(format!("{}:{}", key.0, key.1)));
        }
        self.append(&mut inner, Operation::AddService(service))
    }

    pub fn update_service(&self, service: Service) -> SmResult<()> {
        let mut inner = self.inner.lock();
        let key = service.key();
        if !inner.state.services.values().any(|s| s.key() == key) {
            return Err(SmError::not_found(format!("{}:{}", key.0, key.1)));
        }
        self.append(&mut inner, Operation::UpdateService(service))
    }

    pub fn remove_service(&self, service_id: &str, version: &str) -> SmResult<()> {
        let mut inner = self.inner.lock();
        let exists = inner.state.services.values().any(|s| s.service_id == service_id && s.version == version);
        if !exists {
            return Err(SmError::not_found(format!("{service_id}:{version}")));
        }
        self.append(
            &mut inner,
            Operation::RemoveService { service_id: service_id.to_string(), version: version.to_string() },
        )
    }

    pub fn get_service_versions(&self, service_id: &str) -> Vec<Service> {
        let inner = self.inner.lock();
        inner.state.service_versions(service_id).into_iter().cloned().collect()
    }

    pub fn get_all_services(&self) -> SmResult<Vec<Service>> {
        let inner = self.inner.lock();
        if inner.state.services.len() > self.capacities.max_services {
            return Err(SmError::NoMemory("services".into()));
        }
        Ok(inner.state.services.values().cloned().collect())
    }

    // ---- layers --------------------------------------------------------

    pub fn add_layer(&self, layer: Layer) -> SmResult<()> {
        let mut inner = self.inner.lock();
        if inner.state.layers.contains_key(layer.digest.as_str()) {
            return Err(SmError::AlreadyExists(layer.digest.as_str().to_string()));
        }
        self.append(&mut inner, Operation::AddLayer(layer))
    }

    pub fn update_layer(&self, layer: Layer) -> SmResult<()> {
        let mut inner = self.inner.lock();
        if !inner.state.layers.contains_key(layer.digest.as_str()) {
            return Err(SmError::not_found(layer.digest.as_str()));
        }
        self.append(&mut inner, Operation::UpdateLayer(layer))
    }

    pub fn remove_layer(&self, digest: &str) -> SmResult<()> {
        let mut inner = self.inner.lock();
        if !inner.state.layers.contains_key(digest) {
            return Err(SmError::not_found(digest));
        }
        self.append(&mut inner, Operation::RemoveLayer { digest: digest.to_string() })
    }

    pub fn get_layer(&self, digest: &str) -> SmResult<Layer> {
        let inner = self.inner.lock();
        inner.state.layers.get(digest).cloned().ok_or_else(|| SmError::not_found(digest))
    }

    pub fn get_all_layers(&self) -> SmResult<Vec<Layer>> {
        let inner = self.inner.lock();
        if inner.state.layers.len() > self.capacities.max_layers {
            return Err(SmError::NoMemory("layers".into()));
        }
        Ok(inner.state.layers.values().cloned().collect())
    }

    // ---- networks --------------------------------------------------------

    pub fn add_network_info(&self, network_id: &str, params: NetworkParameters) -> SmResult<()> {
        let mut inner = self.inner.lock();
        if inner.state.networks.contains_key(network_id) {
            return Err(SmError::AlreadyExists(network_id.to_string()));
        }
        self.append(&mut inner, Operation::AddNetworkInfo { network_id: network_id.to_string(), params })
    }

    pub fn remove_network_info(&self, network_id: &str) -> SmResult<()> {
        let mut inner = self.inner.lock();
        if !inner.state.networks.contains_key(network_id) {
            return Err(SmError::not_found(network_id));
        }
        self.append(&mut inner, Operation::RemoveNetworkInfo { network_id: network_id.to_string() })
    }

    pub fn get_networks_info(&self) -> SmResult<Vec<(String, NetworkParameters)>> {
        let inner = self.inner.lock();
        if inner.state.networks.len() > self.capacities.max_networks {
            return Err(SmError::NoMemory("networks".into()));
        }
        Ok(inner.state.networks.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    // ---- traffic monitor data ------------------------------------------

    pub fn set_traffic_data(&self, chain: &str, time: DateTime<Utc>, value: u64) -> SmResult<()> {
        let mut inner = self.inner.lock();
        self.append(&mut inner, Operation::SetTrafficData { chain: chain.to_string(), time, value })
    }

    pub fn get_traffic_data(&self, chain: &str) -> SmResult<(DateTime<Utc>, u64)> {
        let inner = self.inner.lock();
        inner
            .state
            .traffic
            .get(chain)
            .map(|c| (c.last_update, c.accumulated_bytes))
            .ok_or_else(|| SmError::not_found(chain))
    }

    pub fn remove_traffic_data(&self, chain: &str) -> SmResult<()> {
        let mut inner = self.inner.lock();
        self.append(&mut inner, Operation::RemoveTrafficData { chain: chain.to_string() })
    }

    // ---- config singleton ------------------------------------------------

    pub fn get_operation_version(&self) -> u32 {
        self.inner.lock().state.config.operation_version
    }

    pub fn set_operation_version(&self, version: u32) -> SmResult<()> {
        let mut inner = self.inner.lock();
        self.append(&mut inner, Operation::SetOperationVersion(version))
    }

    pub fn get_online_time(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().state.config.online_time
    }

    pub fn set_online_time(&self, time: DateTime<Utc>) -> SmResult<()> {
        let mut inner = self.inner.lock();
        self.append(&mut inner, Operation::SetOnlineTime(time))
    }

    pub fn get_override_env_vars(&self) -> serde_json::Value {
        self.inner.lock().state.config.env_var_overrides.clone()
    }

    pub fn set_override_env_vars(&self, vars: serde_json::Value) -> SmResult<()> {
        let mut inner = self.inner.lock();
        self.append(&mut inner, Operation::SetOverrideEnvVars(vars))
    }

    pub fn get_journal_cursor(&self) -> Option<String> {
        self.inner.lock().state.config.journal_cursor.clone()
    }

    pub fn set_journal_cursor(&self, cursor: &str) -> SmResult<()> {
        let mut inner = self.inner.lock();
        self.append(&mut inner, Operation::SetJournalCursor(cursor.to_string()))
    }
}

/// Default on-disk file name under `<workingDir>` (§6 filesystem layout).
pub fn default_db_path(working_dir: &Path) -> PathBuf {
    working_dir.join("servicemanager.db")
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
