// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use parking_lot::Mutex as PMutex;
use sm_storage::migration::MigrationRegistry;
use tempfile::tempdir;

#[derive(Default)]
struct RecordingEngine {
    calls: PMutex<Vec<String>>,
    counters: PMutex<HashMap<String, u64>>,
}

impl RecordingEngine {
    fn set_counter(&self, chain: &str, value: u64) {
        self.counters.lock().insert(chain.to_string(), value);
    }

    fn calls_snapshot(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl PacketFilterEngine for RecordingEngine {
    async fn create_chain(&self, chain: &str) -> SmResult<()> {
        self.calls.lock().push(format!("create_chain({chain})"));
        Ok(())
    }
    async fn delete_chain(&self, chain: &str) -> SmResult<()> {
        self.calls.lock().push(format!("delete_chain({chain})"));
        Ok(())
    }
    async fn insert_jump_rule(&self, parent: &str, chain: &str) -> SmResult<()> {
        self.calls.lock().push(format!("jump({parent}->{chain})"));
        Ok(())
    }
    async fn delete_jump_rule(&self, parent: &str, chain: &str) -> SmResult<()> {
        self.calls.lock().push(format!("unjump({parent}->{chain})"));
        Ok(())
    }
    async fn clear_chain(&self, chain: &str) -> SmResult<()> {
        self.calls.lock().push(format!("clear({chain})"));
        Ok(())
    }
    async fn append_return_rule(&self, chain: &str, cidr: &str) -> SmResult<()> {
        self.calls.lock().push(format!("return({chain},{cidr})"));
        Ok(())
    }
    async fn append_counter_rule(&self, chain: &str, address: &str, _direction: ChainDirection) -> SmResult<()> {
        self.calls.lock().push(format!("counter_rule({chain},{address})"));
        Ok(())
    }
    async fn insert_drop_rule(&self, chain: &str, _addresses: &[String]) -> SmResult<()> {
        self.calls.lock().push(format!("insert_drop({chain})"));
        Ok(())
    }
    async fn remove_drop_rule(&self, chain: &str, _addresses: &[String]) -> SmResult<()> {
        self.calls.lock().push(format!("remove_drop({chain})"));
        Ok(())
    }
    async fn read_counter(&self, chain: &str) -> SmResult<u64> {
        Ok(*self.counters.lock().get(chain).unwrap_or(&0))
    }
}

fn open_store(dir: &std::path::Path) -> Arc<PersistentStore> {
    Arc::new(PersistentStore::open(&dir.join("db.log"), 1, &MigrationRegistry::new()).expect("open store"))
}

#[tokio::test]
async fn start_creates_both_system_chains_with_jump_and_return_rules() {
    let dir = tempdir().expect("tempdir");
    let store = open_store(dir.path());
    let monitor = TrafficMonitor::new(store, RecordingEngine::default(), Period::Day);
    monitor.start().await.expect("start succeeds");

    let calls = monitor.engine.calls_snapshot();
    assert!(calls.iter().any(|c| c == "create_chain(AOS_SYSTEM_IN)"));
    assert!(calls.iter().any(|c| c == "create_chain(AOS_SYSTEM_OUT)"));
    assert!(calls.iter().any(|c| c == "jump(INPUT->AOS_SYSTEM_IN)"));
    assert!(calls.iter().any(|c| c == "jump(OUTPUT->AOS_SYSTEM_OUT)"));
    assert!(calls.iter().any(|c| c.starts_with("return(AOS_SYSTEM_IN,10.0.0.0/8)")));
}

#[tokio::test]
async fn add_instance_wires_forward_chain_with_counter_rule_for_address() {
    let dir = tempdir().expect("tempdir");
    let store = open_store(dir.path());
    let monitor = TrafficMonitor::new(store, RecordingEngine::default(), Period::Day);
    monitor.add_instance("service0-subject0-0", "10.1.2.3", 0).await.expect("add instance");

    let calls = monitor.engine.calls_snapshot();
    assert!(calls.iter().any(|c| c.starts_with("jump(FORWARD->AOS_")));
    assert!(calls.iter().any(|c| c.contains("counter_rule") && c.contains("10.1.2.3")));
}

#[tokio::test]
async fn sample_all_persists_current_value_to_store() {
    let dir = tempdir().expect("tempdir");
    let store = open_store(dir.path());
    let monitor = TrafficMonitor::new(store.clone(), RecordingEngine::default(), Period::Day);
    monitor.start().await.expect("start succeeds");

    monitor.engine.set_counter(SYSTEM_IN, 100);
    monitor.sample_all().await.expect("sample succeeds");
    assert_eq!(monitor.current_value(SYSTEM_IN), Some(0));

    monitor.engine.set_counter(SYSTEM_IN, 500);
    monitor.sample_all().await.expect("sample succeeds");
    assert_eq!(monitor.current_value(SYSTEM_IN), Some(400));

    let (_, persisted) = store.get_traffic_data(SYSTEM_IN).expect("traffic data present");
    assert_eq!(persisted, 400);
}

#[tokio::test]
async fn exceeding_limit_triggers_insert_drop_then_removal_when_reset() {
    let dir = tempdir().expect("tempdir");
    let store = open_store(dir.path());
    let monitor = TrafficMonitor::new(store, RecordingEngine::default(), Period::Day);
    monitor.add_instance("service0-subject0-0", "10.1.2.3", 100).await.expect("add instance");

    let chain = instance_in_chain("service0-subject0-0");
    monitor.engine.set_counter(&chain, 0);
    monitor.sample_all().await.expect("sample succeeds");

    monitor.engine.set_counter(&chain, 200);
    monitor.sample_all().await.expect("sample succeeds");
    let calls = monitor.engine.calls_snapshot();
    assert!(calls.iter().any(|c| c == &format!("insert_drop({chain})")));
}

#[tokio::test]
async fn delete_chain_flushes_store_row_and_tears_down_rules() {
    let dir = tempdir().expect("tempdir");
    let store = open_store(dir.path());
    let monitor = TrafficMonitor::new(store.clone(), RecordingEngine::default(), Period::Day);
    monitor.add_instance("service0-subject0-0", "10.1.2.3", 0).await.expect("add instance");

    let in_chain = instance_in_chain("service0-subject0-0");
    monitor.engine.set_counter(&in_chain, 42);
    monitor.sample_all().await.expect("sample succeeds");

    monitor.remove_instance("service0-subject0-0").await.expect("remove instance");

    assert!(store.get_traffic_data(&in_chain).is_err());
    let calls = monitor.engine.calls_snapshot();
    assert!(calls.iter().any(|c| c == &format!("unjump(FORWARD->{in_chain})")));
    assert!(calls.iter().any(|c| c == &format!("clear({in_chain})")));
    assert!(calls.iter().any(|c| c == &format!("delete_chain({in_chain})")));
}

#[tokio::test]
async fn reopening_monitor_restores_persisted_progress() {
    let dir = tempdir().expect("tempdir");
    let store = open_store(dir.path());
    let monitor = TrafficMonitor::new(store.clone(), RecordingEngine::default(), Period::Day);
    monitor.start().await.expect("start succeeds");
    monitor.engine.set_counter(SYSTEM_IN, 300);
    monitor.sample_all().await.expect("sample succeeds");

    let monitor2 = TrafficMonitor::new(store, RecordingEngine::default(), Period::Day);
    monitor2.start().await.expect("restart succeeds");
    assert_eq!(monitor2.current_value(SYSTEM_IN), Some(300));
}
