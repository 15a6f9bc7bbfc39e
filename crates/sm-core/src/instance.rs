// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `Instance` (§3): created when a new desired instance appears, removed
//! when the orchestrator removes it, updated on network/placement change.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::ident::InstanceIdent;
use crate::network::NetworkParameters;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: String,
    pub ident: InstanceIdent,
    pub uid: u32,
    pub priority: u32,
    pub storage_path: PathBuf,
    pub state_path: PathBuf,
    pub network_parameters: Option<NetworkParameters>,
}

impl Instance {
    pub fn new(ident: InstanceIdent, uid: u32, priority: u32, storage_path: PathBuf, state_path: PathBuf) -> Self {
        let instance_id = ident.instance_id();
        Self {
            instance_id,
            ident,
            uid,
            priority,
            storage_path,
            state_path,
            network_parameters: None,
        }
    }
}
