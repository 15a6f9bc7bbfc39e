// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Image handler: layer and service install pipelines (§4.4).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sm_core::{Digest, SmError, SmResult};

use crate::archive;
use crate::digest;
use crate::fsutil::chown_recursive;
use crate::manifest::{Descriptor, ImageManifest};
use crate::space::{SpaceAllocator, SpaceHandle};
use crate::whiteout::convert_whiteouts;

const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone)]
pub struct LayerInfo {
    pub size: u64,
    /// Hex-encoded SHA3-256 of the archive (§4.4 step 1).
    pub sha3_256: String,
}

#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub service_id: String,
    pub size: u64,
    pub sha3_256: String,
    pub uid: u32,
    pub gid: u32,
}

pub struct ImageHandler {
    layer_space: Arc<SpaceAllocator>,
    service_space: Arc<SpaceAllocator>,
    uid: u32,
    gid: u32,
}

impl ImageHandler {
    pub fn new(layer_space: Arc<SpaceAllocator>, service_space: Arc<SpaceAllocator>, uid: u32, gid: u32) -> Self {
        ImageHandler { layer_space, service_space, uid, gid }
    }

    /// §4.4 "Install layer".
    pub fn install_layer(&self, archive_path: &Path, install_base: &Path, layer: &LayerInfo) -> SmResult<(PathBuf, SpaceHandle)> {
        check_file_info(archive_path, layer.size, &layer.sha3_256)?;
        std::fs::create_dir_all(install_base)?;

        let extract_dir = tempfile::Builder::new()
            .prefix("extract-")
            .tempdir_in(install_base)
            .map_err(SmError::from)?;
        archive::unpack_archive(archive_path, extract_dir.path())?;

        let manifest = ImageManifest::load(&extract_dir.path().join(MANIFEST_FILE))?;
        let payload_digest = Digest::parse(&manifest.config.digest)?;
        let embedded_archive_path = extract_dir.path().join(payload_digest.hex());

        let embedded_size = archive::unpacked_size(&embedded_archive_path)?;
        let space = self.layer_space.allocate(embedded_size)?;

        let install_dir = payload_digest.blob_path(install_base);
        archive::unpack_archive(&embedded_archive_path, &install_dir)?;
        convert_whiteouts(&install_dir, 0, 0)?;

        tracing::debug!(src = %archive_path.display(), dst = %install_dir.display(), size = embedded_size, "layer installed");
        Ok((install_dir, space))
    }

    /// §4.4 "Install service".
    pub fn install_service(&self, archive_path: &Path, install_base: &Path, service: &ServiceInfo) -> SmResult<(PathBuf, SpaceHandle)> {
        tracing::debug!(archive = %archive_path.display(), install_base = %install_base.display(), service_id = %service.service_id, "install service");

        check_file_info(archive_path, service.size, &service.sha3_256)?;
        std::fs::create_dir_all(install_base)?;

        let unpacked = archive::unpacked_size(archive_path)?;
        let space = self.service_space.allocate(unpacked)?;

        let install_dir = tempfile::Builder::new()
            .prefix("svc-")
            .tempdir_in(install_base)
            .map_err(SmError::from)?;
        archive::unpack_archive(archive_path, install_dir.path())?;

        let manifest_path = install_dir.path().join(MANIFEST_FILE);
        let mut manifest = ImageManifest::load(&manifest_path)?;

        verify_descriptor_on_disk(install_base, &manifest.config)?;
        if let Some(aos_service) = &manifest.aos_service {
            verify_descriptor_on_disk(install_base, aos_service)?;
        }
        let layer0 = manifest
            .layers
            .first()
            .cloned()
            .ok_or_else(|| SmError::InvalidArgument("manifest has no layers".to_string()))?;
        verify_descriptor_on_disk(install_base, &layer0)?;

        let layer0_digest = Digest::parse(&layer0.digest)?;
        let layer0_blob = layer0_digest.blob_path(install_base);
        let rootfs_dir = install_dir.path().join("tmprootfs");
        archive::unpack_archive(&layer0_blob, &rootfs_dir)?;
        std::fs::remove_file(&layer0_blob)?;

        convert_whiteouts(&rootfs_dir, service.uid, service.gid)?;
        chown_recursive(&rootfs_dir, service.uid, service.gid)?;

        let rootfs_digest = digest::hash_dir(&rootfs_dir)?;
        let final_path = rootfs_digest.blob_path(install_base);
        if let Some(parent) = final_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Atomic rename is the commit point (§4.4).
        std::fs::rename(&rootfs_dir, &final_path)?;

        manifest.layers[0].digest = rootfs_digest.as_str().to_string();
        manifest.save(&manifest_path)?;

        tracing::debug!(service_id = %service.service_id, dst = %final_path.display(), "service installed");
        Ok((final_path, space))
    }

    /// Re-validates an already-installed service's manifest descriptors
    /// against their content-addressed blobs under `install_base`.
    pub fn validate_service(&self, install_base: &Path, manifest_path: &Path) -> SmResult<()> {
        let manifest = ImageManifest::load(manifest_path)?;
        verify_descriptor_on_disk(install_base, &manifest.config)?;
        if let Some(aos_service) = &manifest.aos_service {
            verify_descriptor_on_disk(install_base, aos_service)?;
        }
        let layer0 = manifest
            .layers
            .first()
            .ok_or_else(|| SmError::InvalidArgument("manifest has no layers".to_string()))?;
        verify_descriptor_on_disk(install_base, layer0)
    }

    /// §4.4 "Digest validation": files use SHA-256, directories use the
    /// canonical recursive-walk hash.
    pub fn calculate_digest(&self, path: &Path) -> SmResult<Digest> {
        if path.is_dir() {
            digest::hash_dir(path)
        } else {
            digest::hash_file(path)
        }
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn gid(&self) -> u32 {
        self.gid
    }
}

fn verify_descriptor_on_disk(install_base: &Path, descriptor: &Descriptor) -> SmResult<()> {
    let digest = Digest::parse(&descriptor.digest)?;
    let path = digest.blob_path(install_base);
    digest::verify_digest(&path, &digest)
}

/// §4.4 step 1: verify declared size and SHA3-256 hash of an archive before
/// trusting its contents.
fn check_file_info(path: &Path, declared_size: u64, declared_sha3_256: &str) -> SmResult<()> {
    let metadata = std::fs::metadata(path)?;
    if metadata.len() != declared_size {
        return Err(SmError::InvalidChecksum(format!(
            "archive size mismatch: declared {declared_size}, actual {}",
            metadata.len()
        )));
    }

    let actual = digest::hash_file_sha3_256(path)?;
    if actual != declared_sha3_256 {
        return Err(SmError::InvalidChecksum(format!("archive hash mismatch: declared {declared_sha3_256}, actual {actual}")));
    }
    Ok(())
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
