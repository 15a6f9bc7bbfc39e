// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! gzip-tar archive handling (§4.4 steps "Extract archive" / "unpacked
//! size").

use std::fs::File;
use std::path::Path;

use flate2::read::GzDecoder;
use tar::Archive;

use sm_core::SmResult;

/// Extracts a gzip-compressed tar archive into `destination`, creating it if
/// needed.
pub fn unpack_archive(source: &Path, destination: &Path) -> SmResult<()> {
    std::fs::create_dir_all(destination)?;
    let file = File::open(source)?;
    let mut archive = Archive::new(GzDecoder::new(file));
    archive.unpack(destination)?;
    Ok(())
}

/// Sum of every entry's uncompressed size, used to size the space allocator
/// request before extraction (§4.4 step 2).
pub fn unpacked_size(source: &Path) -> SmResult<u64> {
    let file = File::open(source)?;
    let mut archive = Archive::new(GzDecoder::new(file));
    let mut total = 0u64;
    for entry in archive.entries()? {
        let entry = entry?;
        total += entry.header().size()?;
    }
    Ok(total)
}

#[cfg(test)]
#[path = "archive_tests.rs"]
mod tests;
