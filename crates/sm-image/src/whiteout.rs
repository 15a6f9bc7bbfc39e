// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OCI-whiteout to overlayfs conversion (§4.4 "Whiteout conversion").

use std::ffi::CString;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use sm_core::{SmError, SmResult};

const WHITEOUT_PREFIX: &str = ".wh.";
const WHITEOUT_OPAQUE_DIR: &str = ".wh..wh..opq";

/// Walks `path` recursively converting every whiteout marker into the
/// overlayfs-native equivalent, then removes the marker file (§4.4).
pub fn convert_whiteouts(path: &Path, uid: u32, gid: u32) -> SmResult<()> {
    convert_dir(path, uid, gid)
}

fn convert_dir(dir: &Path, uid: u32, gid: u32) -> SmResult<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type()?;
        let name = entry.file_name();
        let name = name.to_string_lossy();

        if file_type.is_dir() {
            convert_dir(&path, uid, gid)?;
            continue;
        }

        if name == WHITEOUT_OPAQUE_DIR {
            set_opaque_xattr(dir)?;
            fs::remove_file(&path)?;
            continue;
        }

        if let Some(target_name) = name.strip_prefix(WHITEOUT_PREFIX) {
            let target_path = dir.join(target_name);
            make_char_device(&target_path, uid, gid)?;
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

fn set_opaque_xattr(dir: &Path) -> SmResult<()> {
    xattr::set(dir, "trusted.overlay.opaque", b"y").map_err(SmError::from)
}

/// Creates a character device with major=0, minor=0 (the overlayfs
/// "whiteout" device) and chowns it (§4.4).
fn make_char_device(path: &Path, uid: u32, gid: u32) -> SmResult<()> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| SmError::InvalidArgument(format!("path contains NUL: {e}")))?;

    // SAFETY: c_path is a valid NUL-terminated string for the lifetime of
    // the call; mknod/chown only touch the filesystem entry it names.
    let rc = unsafe { libc::mknod(c_path.as_ptr(), libc::S_IFCHR, 0) };
    if rc != 0 {
        return Err(SmError::failed(std::io::Error::last_os_error()));
    }

    // SAFETY: same `c_path` as above, still valid.
    let rc = unsafe { libc::chown(c_path.as_ptr(), uid, gid) };
    if rc != 0 {
        return Err(SmError::failed(std::io::Error::last_os_error()));
    }
    Ok(())
}

#[cfg(test)]
#[path = "whiteout_tests.rs"]
mod tests;
