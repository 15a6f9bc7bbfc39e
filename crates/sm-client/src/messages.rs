// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Upstream wire contract (§6 "Upstream wire contract (design-level)").
//! Payload shapes for the nested `services`/`layers`/`instances` arrays are
//! left as opaque JSON since their schemas belong to IH/the orchestrator,
//! not to the transport layer itself.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// CM → SM (§6 "Incoming").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IncomingMessage {
    GetNodeConfigStatus,
    CheckNodeConfig {
        version: String,
        node_config: Value,
    },
    SetNodeConfig {
        version: String,
        node_config: Value,
    },
    RunInstances {
        services: Vec<Value>,
        layers: Vec<Value>,
        instances: Vec<Value>,
        force_restart: bool,
    },
    UpdateNetworks {
        networks: Vec<Value>,
    },
    SystemLogRequest {
        log_id: String,
        from: Option<chrono::DateTime<chrono::Utc>>,
        till: Option<chrono::DateTime<chrono::Utc>>,
    },
    InstanceLogRequest {
        log_id: String,
        filter: Value,
        from: Option<chrono::DateTime<chrono::Utc>>,
        till: Option<chrono::DateTime<chrono::Utc>>,
    },
    InstanceCrashLogRequest {
        log_id: String,
        filter: Value,
        from: Option<chrono::DateTime<chrono::Utc>>,
        till: Option<chrono::DateTime<chrono::Utc>>,
    },
    OverrideEnvVars {
        env_vars: Vec<Value>,
    },
    GetAverageMonitoring,
    ConnectionStatus {
        state: ConnectionState,
    },
}

/// SM → CM (§6 "Outgoing").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutgoingMessage {
    NodeConfigStatus { version: String, error: Option<String>, node_id: String, node_type: String },
    RunInstancesStatus { instances: Vec<Value> },
    UpdateInstancesStatus { instances: Vec<Value> },
    OverrideEnvVarStatus { statuses: Vec<Value> },
    LogData { log: Value },
    InstantMonitoring { data: Value },
    AverageMonitoring { data: Value },
    Alert { alert: Value },
    /// Reserved (§6): accepted outbound but not produced by this node yet.
    ImageContentRequest { request: Value },
    /// Reserved (§6): accepted outbound but not produced by this node yet.
    ClockSyncRequest,
}

#[cfg(test)]
#[path = "messages_tests.rs"]
mod tests;
