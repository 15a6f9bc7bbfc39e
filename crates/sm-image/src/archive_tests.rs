// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use tempfile::tempdir;

fn build_test_archive(path: &Path, files: &[(&str, &[u8])]) {
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

#[test]
fn unpack_archive_writes_files_to_destination() {
    let dir = tempdir().expect("tempdir");
    let archive_path = dir.path().join("layer.tar.gz");
    build_test_archive(&archive_path, &[("manifest.json", b"{}"), ("payload/data.bin", b"hello")]);

    let dest = dir.path().join("extracted");
    unpack_archive(&archive_path, &dest).expect("unpack");

    assert_eq!(std::fs::read(dest.join("manifest.json")).expect("read"), b"{}");
    assert_eq!(std::fs::read(dest.join("payload/data.bin")).expect("read"), b"hello");
}

#[test]
fn unpacked_size_sums_entry_sizes() {
    let dir = tempdir().expect("tempdir");
    let archive_path = dir.path().join("layer.tar.gz");
    build_test_archive(&archive_path, &[("a.txt", b"12345"), ("b.txt", b"1234567890")]);

    let size = unpacked_size(&archive_path).expect("size");
    assert_eq!(size, 15);
}
