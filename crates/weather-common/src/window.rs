//! Fetch windows: closed date intervals submitted to upstream as one request.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{WeatherError, WeatherResult};

/// Compact date format used by the upstream API and the cache layout.
pub const COMPACT_DATE_FORMAT: &str = "%Y%m%d";

/// A closed date interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Window {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Window {
    pub fn new(start: NaiveDate, end: NaiveDate) -> WeatherResult<Self> {
        if start > end {
            return Err(WeatherError::InvalidRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Window start as `YYYYMMDD`.
    pub fn start_compact(&self) -> String {
        self.start.format(COMPACT_DATE_FORMAT).to_string()
    }

    /// Window end as `YYYYMMDD`.
    pub fn end_compact(&self) -> String {
        self.end.format(COMPACT_DATE_FORMAT).to_string()
    }

    /// True if the whole window lies strictly before `date`.
    pub fn ends_before(&self, date: NaiveDate) -> bool {
        self.end < date
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Number of days covered, both bounds included.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start_compact(), self.end_compact())
    }
}
