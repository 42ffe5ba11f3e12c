//! Storage abstractions for the weather backfill services.
//!
//! Provides:
//! - A file-backed cache of raw upstream responses, one file per window
//! - SQLite-backed per-station observation tables with upsert semantics

pub mod cache;
pub mod observations;

pub use cache::{CacheStats, CacheStore};
pub use observations::{ObservationSink, ObservationStore};
