// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `JournalFactory` over `journalctl` subprocesses (§4.5 "Common journal
//! contract"). No `systemd`/`libsystemd` crate sits in this workspace's
//! dependency graph, so there is no `sd_journal_*` binding to wrap; a
//! `journalctl --output=json --follow` child process, tailed line-by-line
//! on a background thread, stands in for it. This trades exact
//! `sd_journal_previous`/seek-then-rewind semantics for a one-directional
//! stream, which is sufficient for both callers: `AlertReader` only ever
//! tails forward, and `LogProvider`'s bounded queries terminate once the
//! subprocess reaches the live tail and the short read timeout elapses.

use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use sm_journal::{JournalContract, JournalEntry, JournalFactory};

/// How long a single `next()`/`previous()` call waits for a line before
/// reporting "nothing more right now". Short enough that `AlertReader`'s
/// one-second poll tick stays responsive, long enough that `journalctl`'s
/// own startup latency doesn't make a fresh historical query look empty.
const READ_TIMEOUT: Duration = Duration::from_millis(200);

pub struct JournalctlFactory;

impl JournalFactory for JournalctlFactory {
    fn create(&self) -> Box<dyn JournalContract> {
        Box::new(JournalctlCursor::new())
    }
}

#[derive(Clone)]
enum Seek {
    Tail,
    Head,
    Realtime(DateTime<Utc>),
    Cursor(String),
}

struct JournalctlCursor {
    and_group: Vec<String>,
    groups: Vec<Vec<String>>,
    seek: Seek,
    child: Option<Child>,
    lines: Option<Receiver<String>>,
    current: Option<(JournalEntry, String)>,
}

impl JournalctlCursor {
    fn new() -> Self {
        JournalctlCursor { and_group: Vec::new(), groups: Vec::new(), seek: Seek::Tail, child: None, lines: None, current: None }
    }

    fn ensure_started(&mut self) {
        if self.child.is_some() {
            return;
        }
        if !self.and_group.is_empty() {
            self.groups.push(std::mem::take(&mut self.and_group));
        }

        let mut args = vec!["--output=json".to_string(), "--follow".to_string(), "--no-pager".to_string()];
        match &self.seek {
            Seek::Tail => args.push("--lines=0".to_string()),
            Seek::Head => args.push("--lines=all".to_string()),
            Seek::Realtime(t) => args.push(format!("--since=@{}", t.timestamp())),
            Seek::Cursor(c) => args.push(format!("--after-cursor={c}")),
        }
        for (i, group) in self.groups.iter().enumerate() {
            if i > 0 {
                args.push("+".to_string());
            }
            args.extend(group.iter().cloned());
        }

        let mut child = match Command::new("journalctl").args(&args).stdout(Stdio::piped()).stderr(Stdio::null()).spawn() {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "failed to spawn journalctl");
                return;
            }
        };
        let stdout = child.stdout.take().expect("piped stdout");
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        self.child = Some(child);
        self.lines = Some(rx);
    }

    fn advance(&mut self) -> bool {
        self.ensure_started();
        let Some(rx) = self.lines.as_ref() else { return false };
        loop {
            match rx.recv_timeout(READ_TIMEOUT) {
                Ok(line) => match parse_line(&line) {
                    Some(parsed) => {
                        self.current = Some(parsed);
                        return true;
                    }
                    None => continue,
                },
                Err(_) => return false,
            }
        }
    }
}

impl Drop for JournalctlCursor {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl JournalContract for JournalctlCursor {
    fn seek_head(&mut self) {
        self.seek = Seek::Head;
    }

    fn seek_tail(&mut self) {
        self.seek = Seek::Tail;
    }

    fn seek_realtime(&mut self, time: DateTime<Utc>) {
        self.seek = Seek::Realtime(time);
    }

    fn seek_cursor(&mut self, cursor: &str) {
        self.seek = Seek::Cursor(cursor.to_string());
    }

    fn add_match(&mut self, field: &str, value: &str) {
        self.and_group.push(format!("{field}={value}"));
    }

    fn add_disjunction(&mut self) {
        self.groups.push(std::mem::take(&mut self.and_group));
    }

    fn next(&mut self) -> bool {
        self.advance()
    }

    /// `journalctl --follow` has no rewind; a no-op is correct for the one
    /// caller that uses it (`setup_journal` calls `previous()` once right
    /// after `seek_tail()`, before any entry has been read).
    fn previous(&mut self) -> bool {
        false
    }

    fn get_entry(&self) -> JournalEntry {
        self.current.as_ref().expect("get_entry called before a successful next()").0.clone()
    }

    fn get_cursor(&self) -> String {
        self.current.as_ref().map(|(_, cursor)| cursor.clone()).unwrap_or_default()
    }
}

fn parse_line(line: &str) -> Option<(JournalEntry, String)> {
    let value: Value = serde_json::from_str(line).ok()?;
    let cursor = value.get("__CURSOR")?.as_str()?.to_string();
    let realtime_usec: i64 = field_str(&value, "__REALTIME_TIMESTAMP")?.parse().ok()?;
    let monotonic_usec: u64 = field_str(&value, "__MONOTONIC_TIMESTAMP").and_then(|s| s.parse().ok()).unwrap_or(0);
    let priority: i32 = field_str(&value, "PRIORITY").and_then(|s| s.parse().ok()).unwrap_or(6);

    let entry = JournalEntry {
        realtime: Utc.timestamp_micros(realtime_usec).single()?,
        monotonic_usec,
        message: field_str(&value, "MESSAGE").unwrap_or_default(),
        systemd_unit: field_str(&value, "_SYSTEMD_UNIT").unwrap_or_default(),
        systemd_cgroup: field_str(&value, "_SYSTEMD_CGROUP").unwrap_or_default(),
        priority,
        unit: field_str(&value, "UNIT"),
    };
    Some((entry, cursor))
}

fn field_str(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(|v| v.as_str()).map(str::to_string)
}

#[cfg(test)]
#[path = "journal_tests.rs"]
mod tests;
