// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `NetworkParameters` (§3). Serialized as compact JSON in PS's
//! `instances.network` column.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
    pub dst_ip: String,
    pub dst_port: u16,
    pub proto: String,
    #[serde(default)]
    pub src_ip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParameters {
    pub network_id: String,
    pub subnet_cidr: String,
    pub ip: String,
    #[serde(default)]
    pub vlan_id: Option<u32>,
    #[serde(default)]
    pub vlan_if_name: Option<String>,
    #[serde(default)]
    pub dns_servers: Vec<String>,
    #[serde(default)]
    pub firewall_rules: Vec<FirewallRule>,
}
