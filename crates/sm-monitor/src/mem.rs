// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node RAM usage (§4.6 "Node RAM"): `used = MemTotal - MemFree - Buffers
//! - Cached - SReclaimable`, with value units parsed from the line's
//! suffix.

use std::io;

use sm_core::{SmError, SmResult};

const KILOBYTE: u64 = 1024;

fn unit_multiplier(unit: &str) -> u64 {
    match unit.to_uppercase().as_str() {
        "B" => 1,
        "KB" => KILOBYTE,
        "MB" => KILOBYTE * KILOBYTE,
        "GB" => KILOBYTE * KILOBYTE * KILOBYTE,
        "TB" => KILOBYTE * KILOBYTE * KILOBYTE * KILOBYTE,
        _ => 1,
    }
}

pub fn parse_meminfo(content: &str) -> SmResult<u64> {
    let mut total = 0u64;
    let mut free = 0u64;
    let mut buffers = 0u64;
    let mut cached = 0u64;
    let mut sreclaimable = 0u64;

    for line in content.lines() {
        let mut fields = line.split_whitespace();
        let Some(name) = fields.next() else { continue };
        let name = name.trim_end_matches(':');
        let Some(value_str) = fields.next() else { continue };
        let Ok(mut value) = value_str.parse::<u64>() else { continue };
        if let Some(unit) = fields.next() {
            value *= unit_multiplier(unit);
        }

        match name {
            "MemTotal" => total = value,
            "MemFree" => free = value,
            "Buffers" => buffers = value,
            "Cached" => cached = value,
            "SReclaimable" => sreclaimable = value,
            _ => {}
        }
    }

    let used = total.saturating_sub(free).saturating_sub(buffers).saturating_sub(cached).saturating_sub(sreclaimable);
    if used > total {
        return Err(SmError::failed(io::Error::new(io::ErrorKind::InvalidData, "computed RAM usage exceeds MemTotal")));
    }

    Ok(used)
}

#[cfg(test)]
#[path = "mem_tests.rs"]
mod tests;
