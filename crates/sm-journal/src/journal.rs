// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Common journal contract (§4.5 "Common journal contract"): the minimal
//! surface the alert reader and log provider both drive, independent of
//! whatever backs it (the real systemd journal, or a fixture in tests).

use chrono::{DateTime, Utc};

/// One journal record. `monotonic_usec` is the journal's own monotonic clock
/// reading (µs since boot), used only for relative ordering within a single
/// boot id, never compared across reboots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub realtime: DateTime<Utc>,
    pub monotonic_usec: u64,
    pub message: String,
    pub systemd_unit: String,
    pub systemd_cgroup: String,
    pub priority: i32,
    /// `UNIT=` field, present on entries produced by the `init.scope` unit.
    pub unit: Option<String>,
}

/// A live cursor into the journal. `next`/`previous` return `false` once
/// there is nothing more in that direction; both remain on the current
/// entry in that case, matching `sd_journal_next`/`sd_journal_previous`.
pub trait JournalContract: Send {
    fn seek_head(&mut self);
    fn seek_tail(&mut self);
    fn seek_realtime(&mut self, time: DateTime<Utc>);
    fn seek_cursor(&mut self, cursor: &str);
    fn add_match(&mut self, field: &str, value: &str);
    fn add_disjunction(&mut self);
    fn next(&mut self) -> bool;
    fn previous(&mut self) -> bool;
    fn get_entry(&self) -> JournalEntry;
    fn get_cursor(&self) -> String;
}

/// Constructs fresh, independently-filtered journal handles. Each reader
/// opens its own handle rather than sharing one (mirrors `CreateJournal()`
/// being called once per monitoring session / per log request).
pub trait JournalFactory: Send + Sync {
    fn create(&self) -> Box<dyn JournalContract>;
}
