//! Historical weather observation backfill.
//!
//! Splits a date range into month windows, fetches them with bounded
//! parallelism and retry, stops early once upstream runs out of history,
//! and streams every fetched window into per-station storage.

pub mod config;
pub mod download;
pub mod planner;
pub mod report;
pub mod scheduler;
pub mod source;
pub mod state;

pub use config::AppConfig;
pub use download::Downloader;
pub use planner::plan_windows;
pub use report::{BackfillReport, FailedFetch, StationReport, StoredWindow};
pub use scheduler::{FetchScheduler, RetryPolicy, SchedulerConfig};
pub use source::{
    FetchError, FetchOutcome, ObservationSource, SourceConfig, WeatherComSource, DEFAULT_BASE_URL,
};
pub use state::{CancellationBoundary, FetchTask, TaskStatus};
