// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traffic monitor: owns the chain → counter map and drives it from a
//! pluggable packet-filter engine (§4.3). The engine itself is an external
//! collaborator (§1 scope); this module only sequences the rules it asks
//! the engine to install.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use sm_core::traffic::{instance_in_chain, instance_out_chain, SYSTEM_IN, SYSTEM_OUT};
use sm_core::{SmError, SmResult};
use sm_storage::PersistentStore;

use super::counter::{QuotaAction, TrafficCounter};
use super::period::Period;

/// RFC1918 + localhost ranges, exempted from quota counting via a RETURN
/// rule appended right after the JUMP (§4.3 "Chain creation").
pub const LOCAL_NETWORK_RANGES: &[&str] =
    &["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16", "127.0.0.0/8", "::1/128"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainDirection {
    In,
    Out,
}

impl ChainDirection {
    /// Parent chain a JUMP rule is inserted into (§4.3 "Chain creation").
    fn parent_chain(self, system: bool) -> &'static str {
        match (system, self) {
            (true, ChainDirection::In) => "INPUT",
            (true, ChainDirection::Out) => "OUTPUT",
            (false, _) => "FORWARD",
        }
    }
}

/// Abstraction over the packet-filter engine (iptables/nftables in
/// production, an in-memory recorder in tests).
#[async_trait]
pub trait PacketFilterEngine: Send + Sync {
    async fn create_chain(&self, chain: &str) -> SmResult<()>;
    async fn delete_chain(&self, chain: &str) -> SmResult<()>;
    async fn insert_jump_rule(&self, parent: &str, chain: &str) -> SmResult<()>;
    async fn delete_jump_rule(&self, parent: &str, chain: &str) -> SmResult<()>;
    async fn clear_chain(&self, chain: &str) -> SmResult<()>;
    async fn append_return_rule(&self, chain: &str, cidr: &str) -> SmResult<()>;
    async fn append_counter_rule(&self, chain: &str, address: &str, direction: ChainDirection) -> SmResult<()>;
    async fn insert_drop_rule(&self, chain: &str, addresses: &[String]) -> SmResult<()>;
    async fn remove_drop_rule(&self, chain: &str, addresses: &[String]) -> SmResult<()>;
    /// Raw byte counter currently accumulated on `chain` by the engine.
    async fn read_counter(&self, chain: &str) -> SmResult<u64>;
}

struct ChainEntry {
    counter: TrafficCounter,
    direction: ChainDirection,
    system: bool,
}

pub struct TrafficMonitor<E: PacketFilterEngine> {
    store: Arc<PersistentStore>,
    engine: E,
    period: Period,
    chains: RwLock<HashMap<String, ChainEntry>>,
}

impl<E: PacketFilterEngine> TrafficMonitor<E> {
    pub fn new(store: Arc<PersistentStore>, engine: E, period: Period) -> Self {
        TrafficMonitor { store, engine, period, chains: RwLock::new(HashMap::new()) }
    }

    pub async fn start(&self) -> SmResult<()> {
        self.create_chain(SYSTEM_IN, ChainDirection::In, true, 0, Vec::new()).await?;
        self.create_chain(SYSTEM_OUT, ChainDirection::Out, true, 0, Vec::new()).await
    }

    pub async fn add_instance(&self, instance_id: &str, address: &str, limit: u64) -> SmResult<()> {
        self.create_chain(&instance_in_chain(instance_id), ChainDirection::In, false, limit, vec![address.to_string()]).await?;
        self.create_chain(&instance_out_chain(instance_id), ChainDirection::Out, false, limit, vec![address.to_string()]).await
    }

    pub async fn remove_instance(&self, instance_id: &str) -> SmResult<()> {
        self.delete_chain(&instance_in_chain(instance_id)).await?;
        self.delete_chain(&instance_out_chain(instance_id)).await
    }

    /// Creates a chain, wires its JUMP/RETURN/counter rules, and restores
    /// persisted progress if PS already has a row for it (§4.3 "Chain
    /// creation").
    async fn create_chain(&self, chain: &str, direction: ChainDirection, system: bool, limit: u64, addresses: Vec<String>) -> SmResult<()> {
        self.engine.create_chain(chain).await?;
        self.engine.insert_jump_rule(direction.parent_chain(system), chain).await?;
        for cidr in LOCAL_NETWORK_RANGES {
            self.engine.append_return_rule(chain, cidr).await?;
        }
        for address in &addresses {
            self.engine.append_counter_rule(chain, address, direction).await?;
        }

        let mut counter = TrafficCounter::new(chain, limit, addresses);
        if let Ok((last_update, current)) = self.store.get_traffic_data(chain) {
            counter = counter.with_loaded(last_update, current);
        }

        self.chains.write().insert(chain.to_string(), ChainEntry { counter, direction, system });
        Ok(())
    }

    /// Flushes the PS row, then tears down the JUMP rule and the chain
    /// itself (§4.3 "Chain deletion").
    async fn delete_chain(&self, chain: &str) -> SmResult<()> {
        let removed = self.chains.write().remove(chain);
        let entry = removed.ok_or_else(|| SmError::not_found(chain))?;

        let _ = self.store.remove_traffic_data(chain);
        self.engine.delete_jump_rule(entry.direction.parent_chain(entry.system), chain).await?;
        self.engine.clear_chain(chain).await?;
        self.engine.delete_chain(chain).await
    }

    /// Runs one sweep: reads every chain's raw counter, applies the quota
    /// state machine, persists `(last_update, current)`, and issues any
    /// drop-rule transition the sample triggered (§4.3 steps 1-5).
    pub async fn sample_all(&self) -> SmResult<()> {
        let now = now_for_monitor();
        let chain_names: Vec<String> = self.chains.read().keys().cloned().collect();

        for chain in chain_names {
            let raw = self.engine.read_counter(&chain).await?;

            let (action, persisted) = {
                let mut guard = self.chains.write();
                let entry = match guard.get_mut(&chain) {
                    Some(e) => e,
                    None => continue,
                };
                let action = entry.counter.sample(now, raw, self.period);
                (action, (now, entry.counter.current))
            };

            self.store.set_traffic_data(&chain, persisted.0, persisted.1)?;

            let addresses = self.chains.read().get(&chain).map(|e| e.counter.addresses.clone()).unwrap_or_default();
            match action {
                QuotaAction::InsertDrop => self.engine.insert_drop_rule(&chain, &addresses).await?,
                QuotaAction::RemoveDrop => self.engine.remove_drop_rule(&chain, &addresses).await?,
                QuotaAction::None => {}
            }
        }
        Ok(())
    }

    pub fn current_value(&self, chain: &str) -> Option<u64> {
        self.chains.read().get(chain).map(|e| e.counter.current)
    }
}

// `Utc::now()` is pulled through one seam so the monitor stays deterministic
// from a test harness that drives `sample_all` with a fake clock-driven
// engine instead.
fn now_for_monitor() -> DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
