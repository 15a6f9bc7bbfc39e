// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File and directory digest computation (§4.4 "Digest validation").

use std::fs;
use std::io::Read;
use std::path::Path;

use sha2::{Digest as _, Sha256};

use sm_core::{Digest, SmError, SmResult};

const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// SHA-256 of a single file's contents.
pub fn hash_file(path: &Path) -> SmResult<Digest> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(Digest::sha256(&hex::encode(hasher.finalize())))
}

/// SHA3-256 of a single file's contents, used for the outer archive digest
/// (§4.4 step 1 "hash (SHA3-256 default)").
pub fn hash_file_sha3_256(path: &Path) -> SmResult<String> {
    use sha3::{Digest as _, Sha3_256};
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha3_256::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Canonical recursive directory hash: entries are visited in sorted,
/// relative-path order so the same tree always yields the same digest
/// regardless of filesystem iteration order (§4.4 "Digest validation").
pub fn hash_dir(path: &Path) -> SmResult<Digest> {
    let mut hasher = Sha256::new();
    hash_dir_into(path, path, &mut hasher)?;
    Ok(Digest::sha256(&hex::encode(hasher.finalize())))
}

fn hash_dir_into(root: &Path, dir: &Path, hasher: &mut Sha256) -> SmResult<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let relative = path.strip_prefix(root).map_err(|e| SmError::failed(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        hasher.update(relative.to_string_lossy().as_bytes());

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            hasher.update(b"D");
            hash_dir_into(root, &path, hasher)?;
        } else if file_type.is_symlink() {
            hasher.update(b"L");
            let target = fs::read_link(&path)?;
            hasher.update(target.to_string_lossy().as_bytes());
        } else {
            hasher.update(b"F");
            let mut file = fs::File::open(&path)?;
            let mut buf = vec![0u8; READ_BUFFER_SIZE];
            loop {
                let n = file.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
        }
    }
    Ok(())
}

/// Verifies `path` (file or directory) hashes to `expected` (§4.4 step 1,
/// "Digest validation").
pub fn verify_digest(path: &Path, expected: &Digest) -> SmResult<()> {
    let actual = if path.is_dir() { hash_dir(path)? } else { hash_file(path)? };
    if actual.as_str() != expected.as_str() {
        return Err(SmError::InvalidChecksum(format!("expected {expected}, got {actual}")));
    }
    Ok(())
}

#[cfg(test)]
#[path = "digest_tests.rs"]
mod tests;
