// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ConfigRow` (§3): the single-row `config` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigRow {
    pub operation_version: u32,
    #[serde(default)]
    pub journal_cursor: Option<String>,
    #[serde(default)]
    pub online_time: Option<DateTime<Utc>>,
    /// JSON array of `{instance_filter, env_vars:[{name,value,ttl?}]}` (§4.1).
    #[serde(default = "default_env_overrides")]
    pub env_var_overrides: serde_json::Value,
}

fn default_env_overrides() -> serde_json::Value {
    serde_json::Value::Array(Vec::new())
}

impl ConfigRow {
    pub fn bootstrap(operation_version: u32) -> Self {
        ConfigRow {
            operation_version,
            journal_cursor: None,
            online_time: None,
            env_var_overrides: default_env_overrides(),
        }
    }
}
