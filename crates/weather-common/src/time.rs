//! Date parsing and sampling granularities.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{WeatherError, WeatherResult};

/// Parse a `YYYY-MM-DD` date as accepted on the command line.
pub fn parse_date(s: &str) -> WeatherResult<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| WeatherError::InvalidDate(s.to_string()))
}

/// Coarse sampling granularity used by the aggregation queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    Day,
    Week,
    Month,
}

impl Granularity {
    /// Short form used in URLs (`1d`, `1w`, `1m`).
    pub fn as_sample(&self) -> &'static str {
        match self {
            Granularity::Day => "1d",
            Granularity::Week => "1w",
            Granularity::Month => "1m",
        }
    }

    /// Start of the calendar bucket containing `date`.
    ///
    /// Weeks start on Monday.
    pub fn bucket_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Day => date,
            Granularity::Week => {
                date - Duration::days(date.weekday().num_days_from_monday() as i64)
            }
            Granularity::Month => date.with_day(1).unwrap_or(date),
        }
    }
}

impl FromStr for Granularity {
    type Err = WeatherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1d" => Ok(Granularity::Day),
            "1w" => Ok(Granularity::Week),
            "1m" => Ok(Granularity::Month),
            other => Err(WeatherError::UnknownGranularity(other.to_string())),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sample())
    }
}
