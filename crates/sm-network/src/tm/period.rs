// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Period boundary detection for the traffic sampler (§4.3 step 1).

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    Minute,
    Hour,
    Day,
    Month,
    Year,
}

impl Default for Period {
    fn default() -> Self {
        Period::Day
    }
}

impl Period {
    /// True when `a` and `b` fall in the same bucket for this period.
    pub fn is_same_period(self, a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
        match self {
            Period::Minute => a.year() == b.year() && a.ordinal() == b.ordinal() && a.hour() == b.hour() && a.minute() == b.minute(),
            Period::Hour => a.year() == b.year() && a.ordinal() == b.ordinal() && a.hour() == b.hour(),
            Period::Day => a.year() == b.year() && a.ordinal() == b.ordinal(),
            Period::Month => a.year() == b.year() && a.month() == b.month(),
            Period::Year => a.year() == b.year(),
        }
    }
}

#[cfg(test)]
#[path = "period_tests.rs"]
mod tests;
