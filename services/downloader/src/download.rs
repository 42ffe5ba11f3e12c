//! Backfill driver: plans the windows and runs each station through the
//! scheduler in turn.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{info, instrument};

use storage::ObservationSink;
use weather_common::{Station, WeatherResult};

use crate::planner::plan_windows;
use crate::report::BackfillReport;
use crate::scheduler::{FetchScheduler, SchedulerConfig};
use crate::source::ObservationSource;

/// Downloads a date range for a list of stations.
pub struct Downloader {
    scheduler: FetchScheduler,
}

impl Downloader {
    pub fn new(
        source: Arc<dyn ObservationSource>,
        sink: Arc<dyn ObservationSink>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            scheduler: FetchScheduler::new(source, sink, config),
        }
    }

    /// Backfill `[start, end]` for every station, one station at a time.
    ///
    /// Only an invalid range is an error. Per-window failures are carried
    /// in the returned report.
    #[instrument(skip(self, stations), fields(stations = stations.len()))]
    pub async fn download(
        &self,
        stations: &[Station],
        start: NaiveDate,
        end: NaiveDate,
    ) -> WeatherResult<BackfillReport> {
        let windows = plan_windows(start, end)?;
        let started_at = Utc::now();

        info!(
            windows = windows.len(),
            max_workers = self.scheduler.config().max_workers,
            "Starting backfill"
        );

        let mut reports = Vec::with_capacity(stations.len());
        for station in stations {
            reports.push(self.scheduler.run_station(station, windows.clone()).await);
        }

        let report = BackfillReport::new(started_at, reports);
        info!(
            run_id = %report.run_id,
            rows = report.rows_written(),
            failures = report.failures().count(),
            "Backfill complete"
        );
        Ok(report)
    }
}
