// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CPU usage sampling (§4.6 "Node CPU" / "Instance CPU").

use std::io;

use chrono::{DateTime, Utc};
use sm_core::{SmError, SmResult};

const CPU_IDLE_INDEX: usize = 3;
const CPU_USAGE_MIN_ENTRIES: usize = 4;

/// A point-in-time CPU accounting sample, either the node's aggregate
/// `/proc/stat` line or one instance's cgroup `cpu.stat`. `idle` is unused
/// for the instance case.
#[derive(Debug, Clone, Copy)]
pub struct CpuSample {
    pub idle: u64,
    pub total: u64,
    pub timestamp: DateTime<Utc>,
}

impl CpuSample {
    pub fn zero(timestamp: DateTime<Utc>) -> Self {
        CpuSample { idle: 0, total: 0, timestamp }
    }
}

/// Parses the `cpu  ` aggregate line of `/proc/stat` content into a sample
/// (§4.6 "Node CPU").
pub fn parse_stat_line(content: &str, timestamp: DateTime<Utc>) -> SmResult<CpuSample> {
    let line = content
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| SmError::failed(io::Error::new(io::ErrorKind::InvalidData, "no aggregate cpu line in /proc/stat")))?;

    let stats: Vec<u64> = line.trim_start_matches("cpu").split_whitespace().filter_map(|s| s.parse().ok()).collect();
    if stats.len() < CPU_USAGE_MIN_ENTRIES {
        return Err(SmError::failed(io::Error::new(io::ErrorKind::InvalidData, "too few fields on /proc/stat cpu line")));
    }

    Ok(CpuSample { idle: stats[CPU_IDLE_INDEX], total: stats.iter().sum(), timestamp })
}

/// `utilization = 1 - Δidle/Δtotal`, scaled to percent (§4.6 "Node CPU").
pub fn utilization_percent(previous: CpuSample, current: CpuSample) -> f64 {
    let idle_delta = current.idle.saturating_sub(previous.idle) as f64;
    let total_delta = current.total.saturating_sub(previous.total) as f64;
    if total_delta <= 0.0 {
        return 0.0;
    }
    100.0 * (1.0 - idle_delta / total_delta)
}

/// Reads `cpu.stat`'s `usage_usec` field (§4.6 "Instance CPU").
pub fn parse_cgroup_cpu_stat(content: &str) -> SmResult<u64> {
    for line in content.lines() {
        let mut parts = line.split_whitespace();
        if let (Some(key), Some(value)) = (parts.next(), parts.next()) {
            if key == "usage_usec" {
                return value
                    .parse()
                    .map_err(|_| SmError::failed(io::Error::new(io::ErrorKind::InvalidData, "malformed usage_usec")));
            }
        }
    }
    Err(SmError::not_found("usage_usec not present in cpu.stat"))
}

/// Updates `cache` with `usage_usec` and returns the percent CPU used since
/// the previous sample. Wraparound (new usage below cached total, e.g. a
/// cgroup recreation) resets the cached total to zero instead of going
/// negative (§4.6 "Instance CPU").
pub fn instance_cpu_percent(cache: &mut CpuSample, usage_usec: u64, now: DateTime<Utc>, cpu_count: usize) -> f64 {
    if cache.total > usage_usec {
        cache.total = 0;
    }

    let delta_usec = (now - cache.timestamp).num_microseconds().unwrap_or(0) as f64;
    let percent = if delta_usec > 0.0 && cpu_count > 0 {
        usage_usec.saturating_sub(cache.total) as f64 * 100.0 / delta_usec / cpu_count as f64
    } else {
        0.0
    };

    cache.total = usage_usec;
    cache.timestamp = now;
    percent
}

#[cfg(test)]
#[path = "cpu_tests.rs"]
mod tests;
