// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `PacketFilterEngine` over `iptables` subprocesses (§4.3). Each call
//! shells out once, the same spawn-and-check-status shape
//! `sm-network`'s `PluginExecutor` uses for CNI binaries.

use async_trait::async_trait;
use sm_core::{SmError, SmResult};
use sm_network::tm::{ChainDirection, PacketFilterEngine};
use tokio::process::Command;

pub struct IptablesEngine;

impl IptablesEngine {
    async fn run(&self, args: &[&str]) -> SmResult<String> {
        let output = Command::new("iptables").args(args).output().await.map_err(SmError::failed)?;
        if !output.status.success() {
            return Err(SmError::Runtime(format!("iptables {args:?} failed: {}", String::from_utf8_lossy(&output.stderr))));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Tolerates "no such rule"/"chain already exists" races the way a
    /// second-pass reconcile can trigger (§4.3 "Chain creation"/"deletion"
    /// are expected to be idempotent from the caller's perspective).
    async fn run_tolerating(&self, args: &[&str], marker: &str) -> SmResult<()> {
        match self.run(args).await {
            Ok(_) => Ok(()),
            Err(SmError::Runtime(msg)) if msg.to_lowercase().contains(marker) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl PacketFilterEngine for IptablesEngine {
    async fn create_chain(&self, chain: &str) -> SmResult<()> {
        self.run_tolerating(&["-N", chain], "already exists").await
    }

    async fn delete_chain(&self, chain: &str) -> SmResult<()> {
        self.run_tolerating(&["-X", chain], "no such file").await
    }

    async fn insert_jump_rule(&self, parent: &str, chain: &str) -> SmResult<()> {
        self.run(&["-I", parent, "-j", chain]).await.map(drop)
    }

    async fn delete_jump_rule(&self, parent: &str, chain: &str) -> SmResult<()> {
        self.run_tolerating(&["-D", parent, "-j", chain], "no such rule").await
    }

    async fn clear_chain(&self, chain: &str) -> SmResult<()> {
        self.run(&["-F", chain]).await.map(drop)
    }

    async fn append_return_rule(&self, chain: &str, cidr: &str) -> SmResult<()> {
        self.run(&["-A", chain, "-d", cidr, "-j", "RETURN"]).await.map(drop)
    }

    async fn append_counter_rule(&self, chain: &str, address: &str, direction: ChainDirection) -> SmResult<()> {
        let flag = match direction {
            ChainDirection::In => "-d",
            ChainDirection::Out => "-s",
        };
        self.run(&["-A", chain, flag, address, "-j", "RETURN"]).await.map(drop)
    }

    async fn insert_drop_rule(&self, chain: &str, addresses: &[String]) -> SmResult<()> {
        for address in addresses {
            self.run(&["-I", chain, "1", "-s", address, "-j", "DROP"]).await?;
            self.run(&["-I", chain, "1", "-d", address, "-j", "DROP"]).await?;
        }
        Ok(())
    }

    async fn remove_drop_rule(&self, chain: &str, addresses: &[String]) -> SmResult<()> {
        for address in addresses {
            self.run_tolerating(&["-D", chain, "-s", address, "-j", "DROP"], "no such rule").await?;
            self.run_tolerating(&["-D", chain, "-d", address, "-j", "DROP"], "no such rule").await?;
        }
        Ok(())
    }

    /// Reads the byte counter off the chain's last rule: the RETURN rule
    /// `append_counter_rule` appended after the local-range exemptions, the
    /// one actually matching this chain's instance/system address (§4.3
    /// "Counter semantics").
    async fn read_counter(&self, chain: &str) -> SmResult<u64> {
        let listing = self.run(&["-L", chain, "-v", "-x", "-n"]).await?;
        parse_last_rule_bytes(&listing).ok_or_else(|| SmError::NotFound(chain.to_string()))
    }
}

fn parse_last_rule_bytes(listing: &str) -> Option<u64> {
    let rule_lines: Vec<&str> = listing.lines().skip(2).filter(|l| !l.trim().is_empty()).collect();
    let bytes_column = rule_lines.last()?.split_whitespace().nth(1)?;
    bytes_column.parse().ok()
}

#[cfg(test)]
#[path = "iptables_tests.rs"]
mod tests;
