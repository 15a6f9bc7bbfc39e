// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error kind, used by every component crate so callers can match on
//! a single taxonomy regardless of which subsystem raised it (§7).

use std::fmt;

/// Result alias used throughout the workspace.
pub type SmResult<T> = Result<T, SmError>;

/// Error kinds from §7. Leaf operations (file IO, engine calls, plugin
/// exits) wrap their native error in `Failed` and bubble up; only PS, TM
/// and UCPC recover locally from specific kinds (see each crate's docs).
#[derive(Debug, thiserror::Error)]
pub enum SmError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid checksum: {0}")]
    InvalidChecksum(String),

    #[error("no memory: {0}")]
    NoMemory(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("failed: {source}")]
    Failed {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl SmError {
    /// Wrap any leaf error as `Failed`, the way every component's IO/exec
    /// errors are expected to bubble up per §7.
    pub fn failed<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        SmError::Failed {
            source: Box::new(source),
        }
    }

    pub fn storage(msg: impl fmt::Display) -> Self {
        SmError::Storage(msg.to_string())
    }

    pub fn not_found(msg: impl fmt::Display) -> Self {
        SmError::NotFound(msg.to_string())
    }

    /// True for kinds PS/TM/UCPC are allowed to swallow on secondary
    /// operations (see §7 "Recovery is local only in three places").
    pub fn is_not_found(&self) -> bool {
        matches!(self, SmError::NotFound(_))
    }
}

impl From<std::io::Error> for SmError {
    fn from(e: std::io::Error) -> Self {
        SmError::failed(e)
    }
}

impl From<serde_json::Error> for SmError {
    fn from(e: serde_json::Error) -> Self {
        SmError::failed(e)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
