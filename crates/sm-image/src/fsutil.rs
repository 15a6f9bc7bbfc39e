// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Small filesystem helpers shared by install_layer/install_service.

use std::ffi::CString;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use sm_core::{SmError, SmResult};

/// Recursively `chown`s every entry under `path`, including `path` itself
/// (§4.4 "Install service" step "`chown` to `(uid, gid)`").
pub fn chown_recursive(path: &Path, uid: u32, gid: u32) -> SmResult<()> {
    chown_one(path, uid, gid)?;
    if path.is_dir() {
        let mut entries: Vec<_> = fs::read_dir(path)?.collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            chown_recursive(&entry.path(), uid, gid)?;
        }
    }
    Ok(())
}

fn chown_one(path: &Path, uid: u32, gid: u32) -> SmResult<()> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| SmError::InvalidArgument(format!("path contains NUL: {e}")))?;
    // SAFETY: c_path is a valid NUL-terminated string naming an existing
    // filesystem entry; lchown only touches that entry's ownership.
    let rc = unsafe { libc::lchown(c_path.as_ptr(), uid, gid) };
    if rc != 0 {
        return Err(SmError::failed(std::io::Error::last_os_error()));
    }
    Ok(())
}

#[cfg(test)]
#[path = "fsutil_tests.rs"]
mod tests;
