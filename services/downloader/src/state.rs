//! Per-window task state and the shared cancellation boundary.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use weather_common::{Station, Window};

/// Lifecycle of one window fetch.
///
/// `Pending -> InFlight -> {Succeeded | Retrying -> InFlight | Failed | Cancelled}`,
/// plus `NoMoreData` for the boundary window itself and `Fatal` for
/// unretried errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InFlight,
    Retrying,
    Succeeded,
    NoMoreData,
    Failed,
    Fatal,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Retrying => "retrying",
            Self::Succeeded => "succeeded",
            Self::NoMoreData => "no_more_data",
            Self::Failed => "failed",
            Self::Fatal => "fatal",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the scheduler is still responsible for the task.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::InFlight | Self::Retrying)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One window of one station, owned by the scheduler.
#[derive(Debug, Clone)]
pub struct FetchTask {
    pub station: Station,
    pub window: Window,
    /// Fetch attempts made so far
    pub attempts: u32,
    pub status: TaskStatus,
}

impl FetchTask {
    pub fn new(station: Station, window: Window) -> Self {
        Self {
            station,
            window,
            attempts: 0,
            status: TaskStatus::Pending,
        }
    }
}

const NO_BOUNDARY: i64 = i64::MIN;

/// Earliest date upstream still has data for, once known.
///
/// Shared between the coordinator and the workers. The boundary only ever
/// moves forward in time.
#[derive(Debug, Clone)]
pub struct CancellationBoundary {
    days: Arc<AtomicI64>,
}

impl Default for CancellationBoundary {
    fn default() -> Self {
        Self {
            days: Arc::new(AtomicI64::new(NO_BOUNDARY)),
        }
    }
}

impl CancellationBoundary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the boundary to `date` unless it is already later.
    pub fn raise(&self, date: NaiveDate) {
        self.days
            .fetch_max(date.num_days_from_ce() as i64, Ordering::SeqCst);
    }

    pub fn get(&self) -> Option<NaiveDate> {
        match self.days.load(Ordering::SeqCst) {
            NO_BOUNDARY => None,
            days => i32::try_from(days)
                .ok()
                .and_then(NaiveDate::from_num_days_from_ce_opt),
        }
    }

    /// True if the window lies entirely before the boundary.
    pub fn cancels(&self, window: &Window) -> bool {
        let days = self.days.load(Ordering::SeqCst);
        days != NO_BOUNDARY && (window.end.num_days_from_ce() as i64) < days
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_status_activity() {
        assert!(TaskStatus::Pending.is_active());
        assert!(TaskStatus::Retrying.is_active());
        assert!(!TaskStatus::Cancelled.is_active());
        assert!(!TaskStatus::NoMoreData.is_active());
        assert_eq!(TaskStatus::InFlight.to_string(), "in_flight");
    }

    #[test]
    fn test_boundary_starts_unset() {
        let boundary = CancellationBoundary::new();
        assert_eq!(boundary.get(), None);
        let window = Window::new(date(1900, 1, 1), date(1900, 1, 31)).unwrap();
        assert!(!boundary.cancels(&window));
    }

    #[test]
    fn test_boundary_cancels_strictly_earlier_windows() {
        let boundary = CancellationBoundary::new();
        boundary.raise(date(1970, 1, 1));

        let before = Window::new(date(1969, 12, 1), date(1969, 12, 31)).unwrap();
        let at = Window::new(date(1970, 1, 1), date(1970, 1, 31)).unwrap();
        assert!(boundary.cancels(&before));
        assert!(!boundary.cancels(&at));
    }

    #[test]
    fn test_boundary_only_moves_forward() {
        let boundary = CancellationBoundary::new();
        boundary.raise(date(1975, 6, 1));
        boundary.raise(date(1970, 1, 1));
        assert_eq!(boundary.get(), Some(date(1975, 6, 1)));

        // Clones share the same boundary
        let shared = boundary.clone();
        shared.raise(date(1980, 1, 1));
        assert_eq!(boundary.get(), Some(date(1980, 1, 1)));
    }
}
