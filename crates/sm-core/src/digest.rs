// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Content digests, in the `algorithm:hex` form used across PS and IH (§3).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{SmError, SmResult};

/// A digest of the form `algorithm:hex`. `algorithm` is always `sha256` in
/// this workspace; other algorithms round-trip but are rejected by
/// `validate`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest(String);

impl Digest {
    pub fn new(algorithm: &str, hex: &str) -> Self {
        Digest(format!("{algorithm}:{hex}"))
    }

    pub fn sha256(hex: impl Into<String>) -> Self {
        Digest::new("sha256", &hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn algorithm(&self) -> &str {
        self.0.split_once(':').map(|(a, _)| a).unwrap_or("")
    }

    pub fn hex(&self) -> &str {
        self.0.split_once(':').map(|(_, h)| h).unwrap_or("")
    }

    /// Content-addressed path: `<root>/blobs/<algorithm>/<hex>` (§3).
    pub fn blob_path(&self, root: &Path) -> PathBuf {
        root.join("blobs").join(self.algorithm()).join(self.hex())
    }

    pub fn parse(s: &str) -> SmResult<Self> {
        let (alg, hex) = s
            .split_once(':')
            .ok_or_else(|| SmError::InvalidArgument(format!("malformed digest: {s}")))?;
        if alg.is_empty() || hex.is_empty() {
            return Err(SmError::InvalidArgument(format!("malformed digest: {s}")));
        }
        Ok(Digest(s.to_string()))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<&str> for Digest {
    type Error = SmError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Digest::parse(value)
    }
}

#[cfg(test)]
#[path = "digest_tests.rs"]
mod tests;
