// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest as _, Sha256};
use std::fs;
use std::fs::File;
use std::io::Write;
use tempfile::tempdir;

fn write_tar_gz(path: &Path, files: &[(&str, &[u8])]) {
    let file = File::create(path).expect("create archive file");
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_cksum();
        builder.append_data(&mut header, name, *contents).expect("append");
    }
    builder.into_inner().expect("finish tar").finish().expect("finish gzip").flush().expect("flush");
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn make_layer_archive(dir: &Path) -> (PathBuf, LayerInfo) {
    let embedded_path = dir.join("embedded.tar.gz");
    write_tar_gz(&embedded_path, &[("payload/data.bin", b"layer contents")]);
    let embedded_bytes = fs::read(&embedded_path).expect("read embedded");
    let embedded_hex = sha256_hex(&embedded_bytes);

    let outer_path = dir.join("layer.tar.gz");
    let manifest = ImageManifest {
        schema_version: 2,
        config: Descriptor { media_type: "application/vnd.aos.layer.config.v1+json".to_string(), digest: format!("sha256:{embedded_hex}"), size: embedded_bytes.len() as u64 },
        layers: vec![],
        aos_service: None,
    };
    let manifest_json = serde_json::to_vec(&manifest).expect("serialize manifest");
    write_tar_gz(&outer_path, &[(MANIFEST_FILE, &manifest_json), (&embedded_hex, &embedded_bytes)]);

    let outer_bytes = fs::read(&outer_path).expect("read outer archive");
    let layer = LayerInfo { size: outer_bytes.len() as u64, sha3_256: digest::hash_file_sha3_256(&outer_path).expect("sha3") };
    (outer_path, layer)
}

#[test]
fn install_layer_extracts_embedded_payload_to_content_addressed_path() {
    let dir = tempdir().expect("tempdir");
    let (archive_path, layer) = make_layer_archive(dir.path());
    let install_base = dir.path().join("install");

    let handler = ImageHandler::new(SpaceAllocator::new(0), SpaceAllocator::new(0), 0, 0);
    let (install_dir, _space) = handler.install_layer(&archive_path, &install_base, &layer).expect("install layer");

    assert!(install_dir.starts_with(install_base.join("blobs").join("sha256")));
    let payload = fs::read(install_dir.join("payload/data.bin")).expect("read installed payload");
    assert_eq!(payload, b"layer contents");
}

#[test]
fn install_layer_rejects_mutated_archive() {
    let dir = tempdir().expect("tempdir");
    let (archive_path, layer) = make_layer_archive(dir.path());

    // Flip one byte after the declared checksum was computed from the
    // original bytes (P3: any byte-level mutation fails with InvalidChecksum).
    let mut bytes = fs::read(&archive_path).expect("read archive");
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&archive_path, &bytes).expect("mutate archive");

    let install_base = dir.path().join("install");
    let handler = ImageHandler::new(SpaceAllocator::new(0), SpaceAllocator::new(0), 0, 0);
    let err = handler.install_layer(&archive_path, &install_base, &layer).unwrap_err();
    assert!(matches!(err, SmError::InvalidChecksum(_)));
}

#[test]
fn install_layer_rejects_size_mismatch() {
    let dir = tempdir().expect("tempdir");
    let (archive_path, mut layer) = make_layer_archive(dir.path());
    layer.size += 1;

    let install_base = dir.path().join("install");
    let handler = ImageHandler::new(SpaceAllocator::new(0), SpaceAllocator::new(0), 0, 0);
    let err = handler.install_layer(&archive_path, &install_base, &layer).unwrap_err();
    assert!(matches!(err, SmError::InvalidChecksum(_)));
}

fn write_blob(install_base: &Path, contents: &[u8], media_type: &str) -> Descriptor {
    let hex = sha256_hex(contents);
    let digest = Digest::sha256(hex);
    let path = digest.blob_path(install_base);
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir blob parent");
    fs::write(&path, contents).expect("write blob");
    Descriptor { media_type: media_type.to_string(), digest: digest.as_str().to_string(), size: contents.len() as u64 }
}

fn current_uid_gid() -> (u32, u32) {
    unsafe { (libc::getuid(), libc::getgid()) }
}

#[test]
fn install_service_prepares_rootfs_and_commits_atomically() {
    let dir = tempdir().expect("tempdir");
    let install_base = dir.path().join("install");
    fs::create_dir_all(&install_base).expect("mkdir install base");

    let config = write_blob(&install_base, b"{\"env\":[]}", "application/vnd.aos.service.config.v1+json");
    let aos_service = write_blob(&install_base, b"aos-service-config", "application/vnd.aos.service.v1+json");

    let layer_payload = dir.path().join("layer-payload.tar.gz");
    write_tar_gz(&layer_payload, &[("rootfs/bin/app", b"#!/bin/sh\necho hi\n")]);
    let layer_bytes = fs::read(&layer_payload).expect("read layer payload");
    let layer0 = write_blob(&install_base, &layer_bytes, "application/vnd.oci.image.layer.v1.tar+gzip");

    let manifest = ImageManifest { schema_version: 2, config, layers: vec![layer0], aos_service: Some(aos_service) };
    let manifest_json = serde_json::to_vec(&manifest).expect("serialize manifest");

    let archive_path = dir.path().join("service.tar.gz");
    write_tar_gz(&archive_path, &[(MANIFEST_FILE, &manifest_json)]);
    let archive_bytes = fs::read(&archive_path).expect("read service archive");

    let (uid, gid) = current_uid_gid();
    let service = ServiceInfo {
        service_id: "service0".to_string(),
        size: archive_bytes.len() as u64,
        sha3_256: digest::hash_file_sha3_256(&archive_path).expect("sha3"),
        uid,
        gid,
    };

    let handler = ImageHandler::new(SpaceAllocator::new(0), SpaceAllocator::new(0), uid, gid);
    let (final_path, _space) = handler.install_service(&archive_path, &install_base, &service).expect("install service");

    assert!(final_path.starts_with(install_base.join("blobs").join("sha256")));
    assert_eq!(fs::read(final_path.join("rootfs/bin/app")).expect("read rootfs file"), b"#!/bin/sh\necho hi\n");

    // The old layer0 archive blob must be gone (consumed during rootfs prep).
    let layer0_digest = Digest::sha256(sha256_hex(&layer_bytes));
    assert!(!layer0_digest.blob_path(&install_base).exists());
}

#[test]
fn calculate_digest_dispatches_on_file_vs_directory() {
    let dir = tempdir().expect("tempdir");
    let file_path = dir.path().join("f.txt");
    fs::write(&file_path, b"hello").expect("write");
    let dir_path = dir.path().join("d");
    fs::create_dir(&dir_path).expect("mkdir");
    fs::write(dir_path.join("nested.txt"), b"hi").expect("write");

    let handler = ImageHandler::new(SpaceAllocator::new(0), SpaceAllocator::new(0), 0, 0);
    let file_digest = handler.calculate_digest(&file_path).expect("digest");
    let dir_digest = handler.calculate_digest(&dir_path).expect("digest");
    assert_eq!(file_digest, digest::hash_file(&file_path).expect("hash"));
    assert_eq!(dir_digest, digest::hash_dir(&dir_path).expect("hash"));
}
