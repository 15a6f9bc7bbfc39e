// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::archivator::{LogStatus, PushLog};
use chrono::Duration;
use flate2::read::GzDecoder;
use parking_lot::Mutex as PMutex;
use std::io::Read;
use std::sync::atomic::{AtomicIsize, Ordering};

/// An in-memory, hand-rollable `JournalContract` double. It ignores match
/// filters (tests curate the entry list to already match what a real match
/// set would select) so the only filtering exercised is the provider's own
/// instance-id cross-check.
struct FixtureJournal {
    entries: Vec<JournalEntry>,
    pos: AtomicIsize,
}

impl FixtureJournal {
    fn new(entries: Vec<JournalEntry>) -> Self {
        FixtureJournal { entries, pos: AtomicIsize::new(-1) }
    }
}

impl JournalContract for FixtureJournal {
    fn seek_head(&mut self) {
        *self.pos.get_mut() = -1;
    }

    fn seek_tail(&mut self) {
        *self.pos.get_mut() = self.entries.len() as isize;
    }

    fn seek_realtime(&mut self, time: DateTime<Utc>) {
        let idx = self.entries.iter().position(|e| e.realtime >= time).unwrap_or(self.entries.len());
        *self.pos.get_mut() = idx as isize - 1;
    }

    fn seek_cursor(&mut self, cursor: &str) {
        if let Ok(idx) = cursor.parse::<isize>() {
            *self.pos.get_mut() = idx;
        }
    }

    fn add_match(&mut self, _field: &str, _value: &str) {}
    fn add_disjunction(&mut self) {}

    fn next(&mut self) -> bool {
        let pos = self.pos.load(Ordering::SeqCst);
        if pos + 1 < self.entries.len() as isize {
            self.pos.store(pos + 1, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    fn previous(&mut self) -> bool {
        let pos = self.pos.load(Ordering::SeqCst);
        let target = if pos >= self.entries.len() as isize { self.entries.len() as isize - 1 } else { pos - 1 };
        if target >= 0 {
            self.pos.store(target, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    fn get_entry(&self) -> JournalEntry {
        self.entries[self.pos.load(Ordering::SeqCst) as usize].clone()
    }

    fn get_cursor(&self) -> String {
        self.pos.load(Ordering::SeqCst).to_string()
    }
}

struct FixedFactory(PMutex<Option<Vec<JournalEntry>>>);

impl JournalFactory for FixedFactory {
    fn create(&self) -> Box<dyn JournalContract> {
        let entries = self.0.lock().take().expect("factory used more than once in a test");
        Box::new(FixtureJournal::new(entries))
    }
}

struct EmptyIds;
impl InstanceIdProvider for EmptyIds {
    fn instance_ids(&self, _filter: &InstanceFilter) -> SmResult<Vec<String>> {
        Ok(Vec::new())
    }
}

struct FixedIds(Vec<String>);
impl InstanceIdProvider for FixedIds {
    fn instance_ids(&self, _filter: &InstanceFilter) -> SmResult<Vec<String>> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
struct RecordingObserver {
    received: PMutex<Vec<PushLog>>,
}

impl LogObserver for RecordingObserver {
    fn on_log_received(&self, log: PushLog) {
        self.received.lock().push(log);
    }
}

fn gunzip(bytes: &[u8]) -> String {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = String::new();
    decoder.read_to_string(&mut out).expect("gunzip");
    out
}

fn cfg() -> LoggingConfig {
    LoggingConfig { max_part_size: 1 << 20, max_part_count: 10 }
}

#[test]
fn empty_instance_filter_emits_absent_response_without_touching_the_journal() {
    let provider = Arc::new(EmptyIds);
    let factory = Arc::new(FixedFactory(PMutex::new(Some(Vec::new()))));
    let provider_ref: Arc<dyn InstanceIdProvider> = provider;
    let factory_ref: Arc<dyn JournalFactory> = factory;
    let log_provider = LogProvider::new(cfg(), provider_ref, factory_ref);

    let observer = Arc::new(RecordingObserver::default());
    log_provider.subscribe(observer.clone());

    let request = RequestLog {
        log_id: "log0".to_string(),
        filter: InstanceFilter { service_id: Some("logservice0".to_string()), subject_id: Some("subject0".to_string()), instance: Some(0) },
        from: None,
        till: None,
    };
    log_provider.get_instance_log(&request).expect("schedule");

    let received = observer.received.lock();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].status, LogStatus::Absent);
    assert_eq!(received[0].log_id, "log0");
}

#[tokio::test]
async fn crash_log_detection_includes_boundary_through_process_exited_and_excludes_later_entry() {
    let t0 = Utc::now();
    let cgroup = "/system.slice/system-aos@service.slice/aos-service@service0.service".to_string();
    let mk = |offset_secs: i64, monotonic: u64, message: &str| JournalEntry {
        realtime: t0 + Duration::seconds(offset_secs),
        monotonic_usec: monotonic,
        message: message.to_string(),
        systemd_unit: "aos-service@service0.service".to_string(),
        systemd_cgroup: cgroup.clone(),
        priority: 6,
        unit: None,
    };

    let entries = vec![
        mk(0, 1_000, "Started aos-service@service0.service"),
        mk(1, 2_000, "somelog1"),
        mk(2, 3_000, "somelog3"),
        mk(3, 4_000, "process exited, code=exited status=1"),
        mk(4, 1_004_000, "skip log"),
    ];

    let provider: Arc<dyn InstanceIdProvider> = Arc::new(FixedIds(vec!["service0".to_string()]));
    let factory: Arc<dyn JournalFactory> = Arc::new(FixedFactory(PMutex::new(Some(entries))));
    let log_provider = Arc::new(LogProvider::new(cfg(), provider, factory));
    log_provider.start().expect("start");

    let observer = Arc::new(RecordingObserver::default());
    log_provider.subscribe(observer.clone());

    let request = RequestLog {
        log_id: "crash0".to_string(),
        filter: InstanceFilter { service_id: Some("logservice0".to_string()), subject_id: None, instance: Some(0) },
        from: None,
        till: None,
    };
    log_provider.get_instance_crash_log(&request).expect("schedule crash log");

    log_provider.stop().await.expect("stop");

    let received = observer.received.lock();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].status, LogStatus::Ok);

    let content = gunzip(&received[0].content);
    assert!(content.contains("Started"));
    assert!(content.contains("somelog1"));
    assert!(content.contains("somelog3"));
    assert!(content.contains("process exited"));
    assert!(!content.contains("skip log"));
}

#[tokio::test]
async fn no_crash_found_emits_absent_response() {
    let t0 = Utc::now();
    let entries = vec![JournalEntry {
        realtime: t0,
        monotonic_usec: 1_000,
        message: "all is well".to_string(),
        systemd_unit: "aos-service@service0.service".to_string(),
        systemd_cgroup: "/system.slice/aos-service@service0.service".to_string(),
        priority: 6,
        unit: None,
    }];

    let provider: Arc<dyn InstanceIdProvider> = Arc::new(FixedIds(vec!["service0".to_string()]));
    let factory: Arc<dyn JournalFactory> = Arc::new(FixedFactory(PMutex::new(Some(entries))));
    let log_provider = Arc::new(LogProvider::new(cfg(), provider, factory));
    log_provider.start().expect("start");

    let observer = Arc::new(RecordingObserver::default());
    log_provider.subscribe(observer.clone());

    let request = RequestLog {
        log_id: "crash1".to_string(),
        filter: InstanceFilter::default(),
        from: None,
        till: None,
    };
    log_provider.get_instance_crash_log(&request).expect("schedule crash log");

    log_provider.stop().await.expect("stop");

    let received = observer.received.lock();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].status, LogStatus::Absent);
}
