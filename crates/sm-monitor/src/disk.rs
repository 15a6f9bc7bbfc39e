// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Disk usage (§4.6 "Node disk" / "Instance disk"): `statvfs` for node
//! partitions, mount-device resolution plus `quotactl` for per-instance
//! usage.

use std::ffi::CString;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use sm_core::{SmError, SmResult};

const MAJOR_MINOR_INDEX: usize = 2;
const MOUNT_SOURCE_INDEX: usize = 9;

/// `(blocks - bfree) * frsize` (§4.6 "Node disk").
pub fn node_disk_usage(path: &Path) -> SmResult<u64> {
    let stat = nix::sys::statvfs::statvfs(path).map_err(SmError::failed)?;
    Ok((stat.blocks() - stat.blocks_free()) * stat.fragment_size())
}

/// Resolves `path`'s mount source device by matching its `st_dev`
/// major:minor against `/proc/self/mountinfo` (§4.6 "Instance disk").
pub fn path_to_device(path: &Path) -> SmResult<String> {
    path_to_device_in(path, Path::new("/proc/self/mountinfo"))
}

fn path_to_device_in(path: &Path, mountinfo_path: &Path) -> SmResult<String> {
    let meta = std::fs::metadata(path).map_err(SmError::from)?;
    let dev = meta.dev();

    // SAFETY: `major`/`minor` are pure accessors over a `dev_t` value we own.
    let (major, minor) = unsafe { (libc::major(dev), libc::minor(dev)) };
    let major_minor = format!("{major}:{minor}");

    let mountinfo = std::fs::read_to_string(mountinfo_path).map_err(SmError::from)?;
    for line in mountinfo.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() <= MOUNT_SOURCE_INDEX || tokens[MAJOR_MINOR_INDEX] != major_minor {
            continue;
        }
        return Ok(tokens[MOUNT_SOURCE_INDEX].to_string());
    }

    Err(SmError::not_found(format!("no mountinfo entry for device {major_minor}")))
}

#[repr(C)]
#[derive(Default)]
struct Dqblk {
    dqb_bhardlimit: u64,
    dqb_bsoftlimit: u64,
    dqb_curspace: u64,
    dqb_ihardlimit: u64,
    dqb_isoftlimit: u64,
    dqb_curinodes: u64,
    dqb_btime: u64,
    dqb_itime: u64,
    dqb_valid: u32,
}

const Q_GETQUOTA: libc::c_int = 0x0300;
const USRQUOTA: libc::c_int = 0;
const SUBCMDSHIFT: libc::c_int = 8;
const SUBCMDMASK: libc::c_int = 0x00ff;

fn qcmd(subcmd: libc::c_int, quota_type: libc::c_int) -> libc::c_int {
    (subcmd << SUBCMDSHIFT) | (quota_type & SUBCMDMASK)
}

fn get_quota(device: &str, uid: u32) -> SmResult<u64> {
    let device_c = CString::new(device).map_err(|e| SmError::failed(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
    let mut quota = Dqblk::default();
    let cmd = qcmd(Q_GETQUOTA, USRQUOTA);

    // SAFETY: `quota` is a zero-initialized, correctly laid out `#[repr(C)]`
    // buffer sized for `if_dqblk`; `quotactl` with Q_GETQUOTA only writes
    // into it and does not retain the pointer past the call.
    let res = unsafe { libc::quotactl(cmd, device_c.as_ptr(), uid as libc::c_int, &mut quota as *mut Dqblk as *mut libc::c_char) };
    if res != 0 {
        return Err(SmError::failed(io::Error::last_os_error()));
    }
    Ok(quota.dqb_curspace)
}

/// Returns `NotSupported` when quotas are not enabled on the device backing
/// `path`, otherwise the user's current space usage (§4.6 "Instance disk").
pub fn instance_disk_usage(path: &Path, uid: u32) -> SmResult<u64> {
    let device = path_to_device(path)?;
    if get_quota(&device, 0).is_err() {
        return Err(SmError::NotSupported(format!("quotas not enabled on {device}")));
    }
    get_quota(&device, uid)
}

#[cfg(test)]
#[path = "disk_tests.rs"]
mod tests;
