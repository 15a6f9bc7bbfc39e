// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log request handling (§4.5 "Log request handling" / "Request queue"):
//! system, instance, and instance-crash log requests, served off a bounded
//! FIFO by a single dedicated worker.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sm_core::{SmError, SmResult};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::archivator::{absent_response, error_response, Archivator, ArchivatorConfig, LogObserver};
use crate::journal::{JournalContract, JournalEntry, JournalFactory};

const AOS_SERVICE_PREFIX: &str = "aos-service@";
const QUEUE_CAPACITY: usize = 32;

#[derive(Debug, Clone, Default)]
pub struct InstanceFilter {
    pub service_id: Option<String>,
    pub subject_id: Option<String>,
    pub instance: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct RequestLog {
    pub log_id: String,
    pub filter: InstanceFilter,
    pub from: Option<DateTime<Utc>>,
    pub till: Option<DateTime<Utc>>,
}

/// Resolves the instance IDs a log request's filter selects.
pub trait InstanceIdProvider: Send + Sync {
    fn instance_ids(&self, filter: &InstanceFilter) -> SmResult<Vec<String>>;
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub max_part_size: u64,
    pub max_part_count: u64,
}

struct QueuedRequest {
    instance_ids: Vec<String>,
    log_id: String,
    from: Option<DateTime<Utc>>,
    till: Option<DateTime<Utc>>,
    crash_log: bool,
}

pub struct LogProvider {
    config: LoggingConfig,
    instance_provider: Arc<dyn InstanceIdProvider>,
    factory: Arc<dyn JournalFactory>,
    observer: parking_lot::Mutex<Option<Arc<dyn LogObserver>>>,
    tx: parking_lot::Mutex<Option<mpsc::Sender<QueuedRequest>>>,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl LogProvider {
    pub fn new(config: LoggingConfig, instance_provider: Arc<dyn InstanceIdProvider>, factory: Arc<dyn JournalFactory>) -> Self {
        LogProvider {
            config,
            instance_provider,
            factory,
            observer: parking_lot::Mutex::new(None),
            tx: parking_lot::Mutex::new(None),
            worker: parking_lot::Mutex::new(None),
        }
    }

    pub fn subscribe(&self, observer: Arc<dyn LogObserver>) {
        *self.observer.lock() = Some(observer);
    }

    pub fn unsubscribe(&self) {
        *self.observer.lock() = None;
    }

    /// Starts the single worker that drains the request queue (§4.5
    /// "Request queue").
    pub fn start(self: &Arc<Self>) -> SmResult<()> {
        let (tx, mut rx) = mpsc::channel(QUEUE_CAPACITY);
        *self.tx.lock() = Some(tx);

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            while let Some(req) = rx.recv().await {
                this.process(req);
            }
        });
        *self.worker.lock() = Some(handle);
        Ok(())
    }

    /// Closes the queue (letting the worker finish whatever it is already
    /// processing) and joins it, guaranteeing no worker outlives `stop`.
    pub async fn stop(&self) -> SmResult<()> {
        self.tx.lock().take();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        Ok(())
    }

    pub fn get_instance_log(&self, request: &RequestLog) -> SmResult<()> {
        self.schedule(request, false)
    }

    pub fn get_instance_crash_log(&self, request: &RequestLog) -> SmResult<()> {
        self.schedule(request, true)
    }

    pub fn get_system_log(&self, request: &RequestLog) -> SmResult<()> {
        self.enqueue(QueuedRequest {
            instance_ids: Vec::new(),
            log_id: request.log_id.clone(),
            from: request.from,
            till: request.till,
            crash_log: false,
        })
    }

    fn schedule(&self, request: &RequestLog, crash_log: bool) -> SmResult<()> {
        let instance_ids = match self.instance_provider.instance_ids(&request.filter) {
            Ok(ids) => ids,
            Err(e) => {
                self.emit_direct(error_response(&request.log_id, &e.to_string()));
                return Err(e);
            }
        };

        if instance_ids.is_empty() {
            tracing::debug!(log_id = %request.log_id, "no instance ids for log request");
            self.emit_direct(absent_response(&request.log_id, "no service instance found"));
            return Ok(());
        }

        self.enqueue(QueuedRequest { instance_ids, log_id: request.log_id.clone(), from: request.from, till: request.till, crash_log })
    }

    fn enqueue(&self, req: QueuedRequest) -> SmResult<()> {
        let guard = self.tx.lock();
        let tx = guard.as_ref().ok_or_else(|| SmError::Runtime("log provider not started".to_string()))?;
        tx.try_send(req).map_err(|_| SmError::Runtime("log request queue full".to_string()))
    }

    fn emit_direct(&self, log: crate::archivator::PushLog) {
        if let Some(observer) = self.observer.lock().clone() {
            observer.on_log_received(log);
        }
    }

    fn process(&self, req: QueuedRequest) {
        if req.crash_log {
            self.handle_crash_log(&req.instance_ids, &req.log_id, req.from, req.till);
        } else {
            self.handle_get_log(&req.instance_ids, &req.log_id, req.from, req.till);
        }
    }

    fn handle_get_log(&self, instance_ids: &[String], log_id: &str, from: Option<DateTime<Utc>>, till: Option<DateTime<Utc>>) {
        let Some(observer) = self.observer.lock().clone() else { return };

        let mut journal = self.factory.create();
        let need_unit_field = instance_ids.is_empty();
        if !instance_ids.is_empty() {
            add_service_cgroup_filter(journal.as_mut(), instance_ids);
        }
        seek_to_time(journal.as_mut(), from);

        let mut archivator = self.new_archivator();
        let result = process_journal_logs(journal.as_mut(), till, need_unit_field, &mut archivator);
        self.finish(result, archivator, log_id, observer.as_ref());
    }

    fn handle_crash_log(&self, instance_ids: &[String], log_id: &str, from: Option<DateTime<Utc>>, till: Option<DateTime<Utc>>) {
        let Some(observer) = self.observer.lock().clone() else { return };

        let mut journal = self.factory.create();
        add_unit_filter(journal.as_mut(), instance_ids);
        match till {
            Some(t) => journal.seek_realtime(t),
            None => journal.seek_tail(),
        }

        let Some((crash_time, boundary)) = get_crash_time(journal.as_mut(), from) else {
            observer.on_log_received(absent_response(log_id, "no instance crash found"));
            return;
        };

        journal.add_disjunction();
        add_service_cgroup_filter(journal.as_mut(), instance_ids);

        let mut archivator = self.new_archivator();
        let result = (|| {
            if let Some(boundary) = &boundary {
                if matches_any_instance(boundary, instance_ids) {
                    archivator.add_log(&format_log_entry(boundary, false))?;
                }
            }
            process_journal_crash_logs(journal.as_mut(), crash_time, instance_ids, &mut archivator)
        })();
        self.finish(result, archivator, log_id, observer.as_ref());
    }

    fn new_archivator(&self) -> Archivator {
        Archivator::new(ArchivatorConfig { max_part_size: self.config.max_part_size, max_part_count: self.config.max_part_count })
    }

    fn finish(&self, result: SmResult<()>, archivator: Archivator, log_id: &str, observer: &dyn LogObserver) {
        let outcome = result.and_then(|()| archivator.send_log(log_id, observer));
        if let Err(e) = outcome {
            tracing::error!(log_id, error = %e, "log request failed");
            observer.on_log_received(error_response(log_id, &e.to_string()));
        }
    }
}

fn seek_to_time(journal: &mut dyn JournalContract, from: Option<DateTime<Utc>>) {
    match from {
        Some(t) => journal.seek_realtime(t),
        None => journal.seek_head(),
    }
}

fn add_service_cgroup_filter(journal: &mut dyn JournalContract, instance_ids: &[String]) {
    for id in instance_ids {
        journal.add_match("_SYSTEMD_CGROUP", &format!("/system.slice/system-aos\\x2dservice.slice/aos-service@{id}.service"));
        journal.add_match("_SYSTEMD_CGROUP", &format!("/system.slice/system-aos\\x2dservice.slice/{id}"));
    }
}

fn add_unit_filter(journal: &mut dyn JournalContract, instance_ids: &[String]) {
    for id in instance_ids {
        journal.add_match("UNIT", &format!("{AOS_SERVICE_PREFIX}{id}.service"));
    }
}

fn process_journal_logs(journal: &mut dyn JournalContract, till: Option<DateTime<Utc>>, need_unit_field: bool, archivator: &mut Archivator) -> SmResult<()> {
    while journal.next() {
        let entry = journal.get_entry();
        if let Some(till) = till {
            if entry.realtime > till {
                return Ok(());
            }
        }
        archivator.add_log(&format_log_entry(&entry, need_unit_field))?;
    }
    Ok(())
}

fn process_journal_crash_logs(journal: &mut dyn JournalContract, crash_time: u64, instance_ids: &[String], archivator: &mut Archivator) -> SmResult<()> {
    while journal.next() {
        let entry = journal.get_entry();
        if entry.monotonic_usec > crash_time {
            break;
        }

        if matches_any_instance(&entry, instance_ids) {
            archivator.add_log(&format_log_entry(&entry, false))?;
        }
    }
    Ok(())
}

fn matches_any_instance(entry: &JournalEntry, instance_ids: &[String]) -> bool {
    instance_ids.iter().any(|id| unit_name_from_log(entry).contains(&format!("{AOS_SERVICE_PREFIX}{id}.service")))
}

/// Walks backwards looking for the first `"process exited"` message, then
/// keeps walking until a `"Started"` message bounds the crash window
/// (§4.5 "Instance crash log"). The bounding `"Started"` entry, when found,
/// is returned alongside the crash time so the caller can include it in the
/// crash log (the forward walk that follows starts strictly after it).
fn get_crash_time(journal: &mut dyn JournalContract, from: Option<DateTime<Utc>>) -> Option<(u64, Option<JournalEntry>)> {
    let mut crash_time = None;
    while journal.previous() {
        let entry = journal.get_entry();
        if let Some(from) = from {
            if entry.realtime <= from {
                break;
            }
        }

        if crash_time.is_none() {
            if entry.message.contains("process exited") {
                crash_time = Some(entry.monotonic_usec);
            }
        } else if entry.message.starts_with("Started") {
            return crash_time.map(|t| (t, Some(entry)));
        }
    }
    crash_time.map(|t| (t, None))
}

fn format_log_entry(entry: &JournalEntry, add_unit: bool) -> String {
    let ts = entry.realtime.to_rfc3339();
    if add_unit {
        format!("{ts} {} {}\n", entry.systemd_unit, entry.message)
    } else {
        format!("{ts} {} \n", entry.message)
    }
}

fn unit_name_from_log(entry: &JournalEntry) -> String {
    let basename = entry.systemd_cgroup.rsplit('/').next().unwrap_or("").to_string();
    if basename.contains(AOS_SERVICE_PREFIX) {
        basename
    } else {
        format!("{AOS_SERVICE_PREFIX}{basename}.service")
    }
}

#[cfg(test)]
#[path = "logs_tests.rs"]
mod tests;
