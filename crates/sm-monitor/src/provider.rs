// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource usage collection (§4.6), tying CPU/RAM/disk sampling together
//! with a caller-supplied network traffic source.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use sm_core::SmResult;

use crate::cpu::{self, CpuSample};
use crate::disk;
use crate::mem;

const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup/system.slice/system-aos\\x2dservice.slice";

/// A disk partition the monitor should report usage for, as configured by
/// the caller (the orchestrator, from node config).
#[derive(Debug, Clone)]
pub struct PartitionSpec {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PartitionUsage {
    pub name: String,
    pub path: PathBuf,
    pub used_size: u64,
}

/// One CPU/RAM/disk/network snapshot, shared shape for node and instance
/// readings (§4.6).
#[derive(Debug, Clone, Default)]
pub struct MonitoringData {
    pub cpu: f64,
    pub ram: u64,
    pub partitions: Vec<PartitionUsage>,
    pub download: u64,
    pub upload: u64,
}

#[derive(Debug, Clone)]
pub struct NodeMonitoringData {
    pub data: MonitoringData,
}

#[derive(Debug, Clone)]
pub struct InstanceMonitoringData {
    pub instance_id: String,
    pub uid: u32,
    pub data: MonitoringData,
}

/// Network counters are owned by TM (§4.4); RM only consumes them through
/// this seam so it never depends on the network crate directly.
pub trait NetworkTrafficProvider: Send + Sync {
    fn system_traffic(&self) -> SmResult<(u64, u64)>;
    fn instance_traffic(&self, instance_id: &str) -> SmResult<(u64, u64)>;
}

pub struct ResourceUsageProvider {
    cpu_file: PathBuf,
    meminfo_file: PathBuf,
    cgroup_root: PathBuf,
    cpu_count: usize,
    prev_sys_cpu: Mutex<CpuSample>,
    instance_cache: Mutex<HashMap<String, CpuSample>>,
    traffic: Arc<dyn NetworkTrafficProvider>,
}

impl ResourceUsageProvider {
    pub fn new(traffic: Arc<dyn NetworkTrafficProvider>) -> Self {
        let cpu_count = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        ResourceUsageProvider {
            cpu_file: PathBuf::from("/proc/stat"),
            meminfo_file: PathBuf::from("/proc/meminfo"),
            cgroup_root: PathBuf::from(DEFAULT_CGROUP_ROOT),
            cpu_count,
            prev_sys_cpu: Mutex::new(CpuSample::zero(Utc::now())),
            instance_cache: Mutex::new(HashMap::new()),
            traffic,
        }
    }

    #[doc(hidden)]
    pub fn with_paths(cpu_file: PathBuf, meminfo_file: PathBuf, cgroup_root: PathBuf, cpu_count: usize, traffic: Arc<dyn NetworkTrafficProvider>) -> Self {
        ResourceUsageProvider {
            cpu_file,
            meminfo_file,
            cgroup_root,
            cpu_count,
            prev_sys_cpu: Mutex::new(CpuSample::zero(Utc::now())),
            instance_cache: Mutex::new(HashMap::new()),
            traffic,
        }
    }

    fn read_partitions(&self, partitions: &[PartitionSpec]) -> SmResult<Vec<PartitionUsage>> {
        partitions
            .iter()
            .map(|p| {
                disk::node_disk_usage(&p.path).map(|used_size| PartitionUsage {
                    name: p.name.clone(),
                    path: p.path.clone(),
                    used_size,
                })
            })
            .collect()
    }

    /// Node-wide CPU, RAM, the given partitions and node network traffic
    /// (§4.6 "Node CPU/RAM/disk").
    pub fn node_monitoring_data(&self, partitions: &[PartitionSpec]) -> SmResult<MonitoringData> {
        let content = std::fs::read_to_string(&self.cpu_file)?;
        let sample = cpu::parse_stat_line(&content, Utc::now())?;
        let cpu_percent = {
            let mut prev = self.prev_sys_cpu.lock();
            let percent = cpu::utilization_percent(*prev, sample);
            *prev = sample;
            percent
        };

        let meminfo = std::fs::read_to_string(&self.meminfo_file)?;
        let ram = mem::parse_meminfo(&meminfo)?;

        let (download, upload) = self.traffic.system_traffic()?;

        Ok(MonitoringData {
            cpu: cpu_percent,
            ram,
            partitions: self.read_partitions(partitions)?,
            download,
            upload,
        })
    }

    /// One instance's CPU (via its cgroup), disk quota usage and network
    /// traffic (§4.6 "Instance CPU/RAM/disk").
    pub fn instance_monitoring_data(&self, instance_id: &str, uid: u32, partitions: &[PartitionSpec]) -> SmResult<MonitoringData> {
        let cgroup_dir = self.cgroup_root.join(format!("aos-service@{instance_id}.service"));

        let stat_content = std::fs::read_to_string(cgroup_dir.join("cpu.stat"))?;
        let usage_usec = cpu::parse_cgroup_cpu_stat(&stat_content)?;
        let cpu_percent = {
            let mut cache = self.instance_cache.lock();
            let entry = cache.entry(instance_id.to_string()).or_insert_with(|| CpuSample::zero(Utc::now()));
            cpu::instance_cpu_percent(entry, usage_usec, Utc::now(), self.cpu_count)
        };

        let ram = std::fs::read_to_string(cgroup_dir.join("memory.current"))?
            .trim()
            .parse::<u64>()
            .map_err(|e| sm_core::SmError::failed(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

        let instance_partitions = partitions
            .iter()
            .map(|p| {
                disk::instance_disk_usage(&p.path, uid).map(|used_size| PartitionUsage {
                    name: p.name.clone(),
                    path: p.path.clone(),
                    used_size,
                })
            })
            .collect::<SmResult<Vec<_>>>()?;

        let (download, upload) = self.traffic.instance_traffic(instance_id)?;

        Ok(MonitoringData {
            cpu: cpu_percent,
            ram,
            partitions: instance_partitions,
            download,
            upload,
        })
    }

    /// Forgets a removed instance's cached CPU accounting state.
    pub fn remove_instance(&self, instance_id: &str) {
        self.instance_cache.lock().remove(instance_id);
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
