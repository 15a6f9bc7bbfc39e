// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `Service` (§3). Key is `(service_id, version)`; multiple versions
//! coexist, at most one `Active` at a time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::digest::Digest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceState {
    Active,
    Cached,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub service_id: String,
    pub version: String,
    pub provider_id: String,
    pub image_path: PathBuf,
    pub manifest_digest: Digest,
    pub state: ServiceState,
    pub timestamp: DateTime<Utc>,
    pub size_bytes: u64,
    pub gid: u32,
}

impl Service {
    /// Primary key as used by PS (`service_id, version`).
    pub fn key(&self) -> (String, String) {
        (self.service_id.clone(), self.version.clone())
    }

    /// Whether this version is past its TTL relative to `now`, per the
    /// `serviceTTL` config default of 30 days (§6). Only `Cached` services
    /// are eligible for GC (§4.9).
    pub fn expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        self.state == ServiceState::Cached && now - self.timestamp > ttl
    }
}
