// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WAL operation log entries. Every mutating PS call appends exactly one of
//! these before it is reflected in [`crate::state::MaterializedState`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sm_core::{Instance, Layer, NetworkParameters, Service};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Operation {
    AddInstance(Instance),
    UpdateInstance(Instance),
    RemoveInstance { instance_id: String },

    AddService(Service),
    UpdateService(Service),
    RemoveService { service_id: String, version: String },

    AddLayer(Layer),
    UpdateLayer(Layer),
    RemoveLayer { digest: String },

    AddNetworkInfo { network_id: String, params: NetworkParameters },
    RemoveNetworkInfo { network_id: String },

    SetTrafficData { chain: String, time: DateTime<Utc>, value: u64 },
    RemoveTrafficData { chain: String },

    SetOperationVersion(u32),
    SetOnlineTime(DateTime<Utc>),
    SetOverrideEnvVars(serde_json::Value),
    SetJournalCursor(String),
}
