// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `Layer` (§3): content-addressed filesystem overlay published
//! independently of services. Key is `digest`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::digest::Digest;
use crate::service::ServiceState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub digest: Digest,
    pub layer_id: String,
    pub path: PathBuf,
    pub os_version: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub state: ServiceState,
    pub size_bytes: u64,
}

impl Layer {
    /// Whether this layer is past its TTL relative to `now`. Only `Cached`
    /// layers are eligible for GC (§4.9), mirroring [`crate::Service::expired`].
    pub fn expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        self.state == ServiceState::Cached && now - self.timestamp > ttl
    }
}
