// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use chrono::Utc;

use crate::digest::Digest;
use crate::ident::InstanceIdent;
use crate::instance::Instance;
use crate::layer::Layer;
use crate::service::{Service, ServiceState};

pub fn instance(service_id: &str, subject_id: &str, index: u32) -> Instance {
    let ident = InstanceIdent::new(service_id, subject_id, index);
    Instance::new(ident, 1000, 0, "/storage".into(), "/state".into())
}

pub fn service(service_id: &str, version: &str, state: ServiceState) -> Service {
    Service {
        service_id: service_id.to_string(),
        version: version.to_string(),
        provider_id: "provider0".to_string(),
        image_path: format!("/services/{service_id}").into(),
        manifest_digest: Digest::sha256("deadbeef"),
        state,
        timestamp: Utc::now(),
        size_bytes: 1024,
        gid: 1000,
    }
}

pub fn layer(digest_hex: &str) -> Layer {
    Layer {
        digest: Digest::sha256(digest_hex),
        layer_id: format!("layer-{digest_hex}"),
        path: format!("/layers/{digest_hex}").into(),
        os_version: "1".to_string(),
        version: "1.0.0".to_string(),
        timestamp: Utc::now(),
        state: ServiceState::Active,
        size_bytes: 4096,
    }
}
