// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `TrafficCounter` (§3): one row per chain, persisted by TM through PS.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SYSTEM_IN: &str = "AOS_SYSTEM_IN";
pub const SYSTEM_OUT: &str = "AOS_SYSTEM_OUT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficCounter {
    pub chain: String,
    pub last_update: DateTime<Utc>,
    pub accumulated_bytes: u64,
}

/// Per-instance chain names, prefixed `AOS_` so start-of-day cleanup can
/// purge leftovers (§4.3). `<h>` is `hex(stable_hash(instance_id))`.
pub fn instance_chain_prefix(instance_id: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    instance_id.hash(&mut hasher);
    format!("AOS_{:016x}", hasher.finish())
}

pub fn instance_in_chain(instance_id: &str) -> String {
    format!("{}_IN", instance_chain_prefix(instance_id))
}

pub fn instance_out_chain(instance_id: &str) -> String {
    format!("{}_OUT", instance_chain_prefix(instance_id))
}
