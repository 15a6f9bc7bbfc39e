// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only, line-delimited JSON write-ahead log, generic over the
//! operation type it carries.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use sm_core::{SmError, SmResult};

/// A single WAL record: its sequence number plus the operation it carries.
#[derive(Debug, Clone)]
pub struct WalEntry<Op> {
    pub seq: u64,
    pub op: Op,
}

/// Line-delimited JSON WAL. `Op` must round-trip through serde_json.
pub struct Wal<Op> {
    path: PathBuf,
    file: File,
    write_seq: u64,
    processed_seq: u64,
    read_pos: u64,
    _marker: std::marker::PhantomData<Op>,
}

impl<Op: Serialize + DeserializeOwned> Wal<Op> {
    /// Opens (creating if absent) the WAL at `path`. `processed_seq` is the
    /// sequence number already applied to a prior snapshot; entries at or
    /// below it are skipped by `next_unprocessed`.
    pub fn open(path: &Path, processed_seq: u64) -> SmResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)
            .map_err(SmError::from)?;

        let write_seq = count_lines(path)? as u64;

        Ok(Wal {
            path: path.to_path_buf(),
            file,
            write_seq,
            processed_seq,
            read_pos: 0,
            _marker: std::marker::PhantomData,
        })
    }

    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    pub fn processed_seq(&self) -> u64 {
        self.processed_seq
    }

    /// Appends `op`, returning its assigned sequence number. Not flushed
    /// until [`Wal::flush`] is called.
    pub fn append(&mut self, op: &Op) -> SmResult<u64> {
        self.write_seq += 1;
        let line = serde_json::to_string(op)?;
        writeln!(self.file, "{line}").map_err(SmError::from)?;
        Ok(self.write_seq)
    }

    pub fn flush(&mut self) -> SmResult<()> {
        self.file.flush().map_err(SmError::from)
    }

    /// Returns the next entry after `processed_seq`/previous call, or
    /// `None` once the log is exhausted. Used both at startup (full replay)
    /// and is harmless to call again afterward (returns `None`).
    pub fn next_unprocessed(&mut self) -> SmResult<Option<WalEntry<Op>>> {
        let mut reader = BufReader::new(File::open(&self.path).map_err(SmError::from)?);
        reader.seek(SeekFrom::Start(self.read_pos)).map_err(SmError::from)?;

        let mut line = String::new();
        let mut seq = self.processed_seq;
        loop {
            line.clear();
            let n = reader.read_line(&mut line).map_err(SmError::from)?;
            if n == 0 {
                return Ok(None);
            }
            seq += 1;
            self.read_pos += n as u64;
            if seq <= self.processed_seq {
                continue;
            }
            let trimmed = line.trim_end();
            if trimmed.is_empty() {
                continue;
            }
            let op: Op = serde_json::from_str(trimmed)?;
            return Ok(Some(WalEntry { seq, op }));
        }
    }

    pub fn mark_processed(&mut self, seq: u64) {
        if seq > self.processed_seq {
            self.processed_seq = seq;
        }
    }
}

fn count_lines(path: &Path) -> SmResult<usize> {
    if !path.exists() {
        return Ok(0);
    }
    let file = File::open(path).map_err(SmError::from)?;
    let reader = BufReader::new(file);
    Ok(reader.lines().filter(|l| l.as_ref().map(|s| !s.is_empty()).unwrap_or(false)).count())
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
