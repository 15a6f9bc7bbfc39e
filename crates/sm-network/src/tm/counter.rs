// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-chain counter state and the sample/quota logic (§4.3 "Counter
//! semantics").

use chrono::{DateTime, Utc};

use super::period::Period;

/// What the caller must do to the packet-filter engine after a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaAction {
    None,
    InsertDrop,
    RemoveDrop,
}

#[derive(Debug, Clone)]
pub struct TrafficCounter {
    pub chain: String,
    pub initial: u64,
    pub sub: u64,
    pub current: u64,
    pub limit: u64,
    pub disabled: bool,
    pub last_update: Option<DateTime<Utc>>,
    pub addresses: Vec<String>,
}

impl TrafficCounter {
    /// `last_update` starts unset (not seeded to `now`) so the very first
    /// `sample()` call always takes the "new period" branch regardless of
    /// when it lands relative to creation (§4.3 steps 1-4).
    pub fn new(chain: impl Into<String>, limit: u64, addresses: Vec<String>) -> Self {
        TrafficCounter {
            chain: chain.into(),
            initial: 0,
            sub: 0,
            current: 0,
            limit,
            disabled: false,
            last_update: None,
            addresses,
        }
    }

    /// Restores counter progress loaded from PS (`initial`/`current` carried
    /// over; `sub` always starts at zero for the new process, since the engine's
    /// raw value is whatever it is now).
    pub fn with_loaded(mut self, last_update: DateTime<Utc>, current: u64) -> Self {
        self.last_update = Some(last_update);
        self.current = current;
        self.initial = current;
        self
    }

    /// Applies one raw engine reading `v` at time `now` (§4.3 steps 1-4).
    pub fn sample(&mut self, now: DateTime<Utc>, v: u64, period: Period) -> QuotaAction {
        let same_period = self.last_update.is_some_and(|last| period.is_same_period(now, last));
        if !same_period {
            self.initial = 0;
            self.sub = v;
            self.current = 0;
        } else {
            self.current = self.initial.saturating_add(v).saturating_sub(self.sub);
        }
        self.last_update = Some(now);

        let mut action = QuotaAction::None;
        if self.limit > 0 && self.current > self.limit && !self.disabled {
            self.disabled = true;
            self.initial = self.current;
            self.sub = 0;
            action = QuotaAction::InsertDrop;
        } else if self.disabled && self.current < self.limit {
            self.disabled = false;
            self.initial = self.current;
            self.sub = 0;
            action = QuotaAction::RemoveDrop;
        }
        action
    }
}

#[cfg(test)]
#[path = "counter_tests.rs"]
mod tests;
