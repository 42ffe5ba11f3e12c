//! Run reports: what every window ended up as, per station and per run.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use weather_common::{Station, Window};

use crate::state::TaskStatus;

/// A window whose rows reached storage.
#[derive(Debug, Clone, Serialize)]
pub struct StoredWindow {
    pub window: Window,
    pub rows: u64,
}

/// A window that ended `Failed` or `Fatal`.
#[derive(Debug, Clone, Serialize)]
pub struct FailedFetch {
    pub station: Station,
    pub window: Window,
    pub attempts: u32,
    pub status: TaskStatus,
    pub cause: String,
}

impl fmt::Display for FailedFetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} after {} attempt(s): {}",
            self.station, self.window, self.status, self.attempts, self.cause
        )
    }
}

/// Outcome of one station run.
#[derive(Debug, Clone, Serialize)]
pub struct StationReport {
    pub station: Station,
    pub succeeded: Vec<StoredWindow>,
    pub no_more_data: Vec<Window>,
    pub cancelled: Vec<Window>,
    pub failures: Vec<FailedFetch>,
    /// Earliest date upstream has data for, if a run hit it
    pub boundary: Option<NaiveDate>,
}

impl StationReport {
    pub fn new(station: Station) -> Self {
        Self {
            station,
            succeeded: Vec::new(),
            no_more_data: Vec::new(),
            cancelled: Vec::new(),
            failures: Vec::new(),
            boundary: None,
        }
    }

    pub fn rows_written(&self) -> u64 {
        self.succeeded.iter().map(|s| s.rows).sum()
    }

    /// Total windows accounted for.
    pub fn windows(&self) -> usize {
        self.succeeded.len() + self.no_more_data.len() + self.cancelled.len() + self.failures.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Aggregate of every station processed in one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct BackfillReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stations: Vec<StationReport>,
}

impl BackfillReport {
    pub fn new(started_at: DateTime<Utc>, stations: Vec<StationReport>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            finished_at: Utc::now(),
            stations,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &FailedFetch> {
        self.stations.iter().flat_map(|s| s.failures.iter())
    }

    pub fn has_failures(&self) -> bool {
        self.stations.iter().any(StationReport::has_failures)
    }

    pub fn rows_written(&self) -> u64 {
        self.stations.iter().map(StationReport::rows_written).sum()
    }

    /// Log every failure with enough context to re-run just that slice,
    /// then a one-line summary per station.
    pub fn log_summary(&self) {
        for failure in self.failures() {
            error!(
                run_id = %self.run_id,
                station = %failure.station,
                window = %failure.window,
                start_date = %failure.window.start,
                end_date = %failure.window.end,
                attempts = failure.attempts,
                status = %failure.status,
                cause = %failure.cause,
                "Window failed"
            );
        }

        for station in &self.stations {
            info!(
                run_id = %self.run_id,
                station = %station.station,
                succeeded = station.succeeded.len(),
                no_more_data = station.no_more_data.len(),
                cancelled = station.cancelled.len(),
                failed = station.failures.len(),
                rows = station.rows_written(),
                boundary = ?station.boundary,
                "Station backfill complete"
            );
        }
    }
}

impl fmt::Display for BackfillReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Backfill run {}", self.run_id)?;
        for station in &self.stations {
            writeln!(
                f,
                "  {}: {} stored ({} rows), {} no data, {} cancelled, {} failed",
                station.station,
                station.succeeded.len(),
                station.rows_written(),
                station.no_more_data.len(),
                station.cancelled.len(),
                station.failures.len(),
            )?;
        }
        for failure in self.failures() {
            writeln!(f, "  FAILED {}", failure)?;
        }
        write!(
            f,
            "Total: {} rows written, {} failures",
            self.rows_written(),
            self.failures().count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(y: i32, m: u32) -> Window {
        let start = NaiveDate::from_ymd_opt(y, m, 1).unwrap();
        Window::new(start, start + chrono::Duration::days(27)).unwrap()
    }

    #[test]
    fn test_station_totals() {
        let mut report = StationReport::new(Station::new("KSFO"));
        report.succeeded.push(StoredWindow { window: window(2024, 2), rows: 10 });
        report.succeeded.push(StoredWindow { window: window(2024, 1), rows: 5 });
        report.cancelled.push(window(2023, 11));
        assert_eq!(report.rows_written(), 15);
        assert_eq!(report.windows(), 3);
        assert!(!report.has_failures());
    }

    #[test]
    fn test_failures_are_listed() {
        let station = Station::new("KSFO");
        let mut report = StationReport::new(station.clone());
        report.failures.push(FailedFetch {
            station,
            window: window(2024, 1),
            attempts: 5,
            status: TaskStatus::Failed,
            cause: "HTTP 409".to_string(),
        });

        let backfill = BackfillReport::new(Utc::now(), vec![report]);
        assert!(backfill.has_failures());

        let text = backfill.to_string();
        assert!(text.contains("FAILED KSFO 20240101-20240128 failed after 5 attempt(s): HTTP 409"));
        assert!(text.ends_with("Total: 0 rows written, 1 failures"));
    }
}
