// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log archivator (§4.5 "Archivator"): accumulates gzip-compressed log text
//! into size-bounded parts and emits one `PushLog` per part.

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;

use sm_core::{SmError, SmResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStatus {
    Ok,
    Empty,
    Error,
    Absent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PushLog {
    pub log_id: String,
    pub part: u64,
    pub parts_count: u64,
    pub status: LogStatus,
    pub content: Vec<u8>,
    pub error_info: Option<String>,
}

pub trait LogObserver: Send + Sync {
    fn on_log_received(&self, log: PushLog);
}

pub struct ArchivatorConfig {
    pub max_part_size: u64,
    pub max_part_count: u64,
}

/// One gzip part under construction.
struct Part {
    encoder: GzEncoder<Vec<u8>>,
    size: u64,
}

impl Part {
    fn new() -> Self {
        Part { encoder: GzEncoder::new(Vec::new(), Compression::best()), size: 0 }
    }

    fn finish(self) -> SmResult<Vec<u8>> {
        self.encoder.finish().map_err(SmError::from)
    }
}

pub struct Archivator {
    config: ArchivatorConfig,
    parts: Vec<Part>,
    part_count: u64,
}

impl Archivator {
    pub fn new(config: ArchivatorConfig) -> Self {
        Archivator { config, parts: vec![Part::new()], part_count: 0 }
    }

    /// Appends `message` to the current part, rolling over to a new part
    /// once the current one exceeds `max_part_size` (§4.5 "Archivator").
    pub fn add_log(&mut self, message: &str) -> SmResult<()> {
        if self.part_count >= self.config.max_part_count {
            return Err(SmError::InvalidArgument("archivator part count limit reached".to_string()));
        }

        let current = self.parts.last_mut().expect("at least one part always present");
        current.encoder.write_all(message.as_bytes()).map_err(SmError::from)?;
        current.size += message.len() as u64;

        if current.size > self.config.max_part_size {
            self.part_count += 1;
            self.parts.push(Part::new());
            tracing::debug!(part_count = self.part_count, "max part size reached");
        }

        Ok(())
    }

    /// Finalizes every part and returns the `PushLog` sequence for them,
    /// or a single `Empty` message if nothing was ever written (§4.5;
    /// P2).
    pub fn finish(self, log_id: &str) -> SmResult<Vec<PushLog>> {
        let Archivator { parts, .. } = self;

        let non_empty: Vec<Part> = {
            let mut parts = parts;
            if parts.last().map(|p| p.size == 0).unwrap_or(false) && parts.len() > 1 {
                parts.pop();
            }
            parts
        };

        if non_empty.iter().all(|p| p.size == 0) {
            return Ok(vec![PushLog {
                log_id: log_id.to_string(),
                part: 1,
                parts_count: 1,
                status: LogStatus::Empty,
                content: Vec::new(),
                error_info: None,
            }]);
        }

        let parts_count = non_empty.len() as u64;
        let mut out = Vec::with_capacity(non_empty.len());
        for (i, part) in non_empty.into_iter().enumerate() {
            let content = part.finish()?;
            out.push(PushLog {
                log_id: log_id.to_string(),
                part: i as u64 + 1,
                parts_count,
                status: LogStatus::Ok,
                content,
                error_info: None,
            });
        }
        Ok(out)
    }

    /// Finalizes and pushes every part straight to `observer`, matching
    /// `Archivator::SendLog`.
    pub fn send_log(self, log_id: &str, observer: &dyn LogObserver) -> SmResult<()> {
        for log in self.finish(log_id)? {
            observer.on_log_received(log);
        }
        Ok(())
    }
}

pub fn error_response(log_id: &str, message: &str) -> PushLog {
    PushLog {
        log_id: log_id.to_string(),
        part: 0,
        parts_count: 0,
        status: LogStatus::Error,
        content: Vec::new(),
        error_info: Some(message.to_string()),
    }
}

pub fn absent_response(log_id: &str, message: &str) -> PushLog {
    PushLog {
        log_id: log_id.to_string(),
        part: 1,
        parts_count: 1,
        status: LogStatus::Absent,
        content: Vec::new(),
        error_info: Some(message.to_string()),
    }
}

#[cfg(test)]
#[path = "archivator_tests.rs"]
mod tests;
