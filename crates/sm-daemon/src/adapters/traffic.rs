// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Adapts TM's counter map to RM's `NetworkTrafficProvider` seam (§4.6),
//! so RM stays free of a dependency on the network crate.

use sm_core::traffic::{instance_in_chain, instance_out_chain, SYSTEM_IN, SYSTEM_OUT};
use sm_core::SmResult;
use sm_monitor::provider::NetworkTrafficProvider;
use sm_network::tm::{PacketFilterEngine, TrafficMonitor};
use std::sync::Arc;

pub struct TrafficMonitorAdapter<E: PacketFilterEngine + 'static> {
    tm: Arc<TrafficMonitor<E>>,
}

impl<E: PacketFilterEngine + 'static> TrafficMonitorAdapter<E> {
    pub fn new(tm: Arc<TrafficMonitor<E>>) -> Self {
        TrafficMonitorAdapter { tm }
    }
}

impl<E: PacketFilterEngine + 'static> NetworkTrafficProvider for TrafficMonitorAdapter<E> {
    fn system_traffic(&self) -> SmResult<(u64, u64)> {
        Ok((self.tm.current_value(SYSTEM_IN).unwrap_or(0), self.tm.current_value(SYSTEM_OUT).unwrap_or(0)))
    }

    fn instance_traffic(&self, instance_id: &str) -> SmResult<(u64, u64)> {
        let download = self.tm.current_value(&instance_in_chain(instance_id)).unwrap_or(0);
        let upload = self.tm.current_value(&instance_out_chain(instance_id)).unwrap_or(0);
        Ok((download, upload))
    }
}

#[cfg(test)]
#[path = "traffic_tests.rs"]
mod tests;
