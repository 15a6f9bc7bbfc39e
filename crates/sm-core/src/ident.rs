// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Instance identity: `(service_id, subject_id, instance_index)` (§3, GLOSSARY).

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceIdent {
    pub service_id: String,
    pub subject_id: String,
    pub instance_index: u32,
}

impl InstanceIdent {
    pub fn new(service_id: impl Into<String>, subject_id: impl Into<String>, instance_index: u32) -> Self {
        Self {
            service_id: service_id.into(),
            subject_id: subject_id.into(),
            instance_index,
        }
    }

    /// Deterministic `instance_id` derived from identity fields. Matches
    /// the shape the orchestrator uses as the primary key for `Instance`.
    pub fn instance_id(&self) -> String {
        format!("{}-{}-{}", self.service_id, self.subject_id, self.instance_index)
    }
}

impl fmt::Display for InstanceIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.instance_id())
    }
}
