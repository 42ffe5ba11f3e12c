//! Historical weather observation downloader.
//!
//! Backfills a date range for every configured station:
//! - Month windows, most recent first
//! - Bounded parallel fetches with exponential backoff on conflicts
//! - Early stop once upstream has no earlier data
//! - On-disk response cache so re-runs skip the network
//! - Idempotent upserts into per-station SQLite tables

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use downloader::{AppConfig, Downloader, SourceConfig, WeatherComSource, DEFAULT_BASE_URL};
use storage::{CacheStore, ObservationStore};
use weather_common::{parse_date, Station};

#[derive(Parser, Debug)]
#[command(name = "downloader")]
#[command(about = "Backfill historical weather observations into SQLite")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long, env = "WEATHER_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Comma-separated station codes (overrides station_list)
    #[arg(short, long, value_delimiter = ',')]
    stations: Vec<String>,

    /// First day to fetch (YYYY-MM-DD)
    #[arg(long, default_value = "1970-01-01")]
    start_date: String,

    /// Last day to fetch (YYYY-MM-DD, default: today)
    #[arg(long)]
    end_date: Option<String>,

    /// Maximum concurrent window fetches per station
    #[arg(long, env = "MAX_WORKERS")]
    max_workers: Option<usize>,

    /// Bypass the response cache
    #[arg(long)]
    no_cache: bool,

    /// Root for the response cache and default database
    #[arg(long, env = "DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Database URL (default: sqlite file under the data directory)
    #[arg(long, env = "DATABASE_URL")]
    database: Option<String>,

    /// Upstream API base URL
    #[arg(long, env = "WEATHER_BASE_URL")]
    base_url: Option<String>,

    /// Upstream API key
    #[arg(long, env = "WEATHER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn resolve_date(value: &str) -> Result<NaiveDate> {
    parse_date(value).with_context(|| format!("Invalid date '{}'", value))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .json()
        .init();

    info!("Starting weather observation downloader");

    let mut config = AppConfig::load(&args.config)?;
    if !args.stations.is_empty() {
        config.station_list = args.stations.clone();
    }
    if let Some(max_workers) = args.max_workers {
        config.max_workers = max_workers;
    }
    if let Some(data_dir) = &args.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(base_url) = &args.base_url {
        config.base_url = Some(base_url.clone());
    }
    if let Some(api_key) = &args.api_key {
        config.api_key = api_key.clone();
    }
    if args.no_cache {
        config.is_cache_enabled = false;
    }
    config.validate()?;

    if config.station_list.is_empty() {
        bail!("No stations configured; set station_list or pass --stations");
    }

    let start = resolve_date(&args.start_date)?;
    let end = match &args.end_date {
        Some(value) => resolve_date(value)?,
        None => Utc::now().date_naive(),
    };

    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.data_dir.display()))?;

    let store = match &args.database {
        Some(url) => ObservationStore::connect(url).await?,
        None => ObservationStore::open(&config.database_path()).await?,
    };
    let store = Arc::new(store);

    let cache = Arc::new(CacheStore::new(&config.data_dir, config.is_cache_enabled));
    let source = Arc::new(WeatherComSource::new(
        SourceConfig {
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: config.api_key.clone(),
            ..Default::default()
        },
        cache.clone(),
    )?);

    let stations: Vec<Station> = config.station_list.iter().map(Station::new).collect();
    info!(
        stations = stations.len(),
        start = %start,
        end = %end,
        cache = config.is_cache_enabled,
        "Backfill configured"
    );

    let downloader = Downloader::new(source.clone(), store, config.scheduler_config());
    let report = downloader.download(&stations, start, end).await?;

    report.log_summary();

    let cache_stats = cache.stats();
    info!(
        network_requests = source.network_requests(),
        cache_hits = cache_stats.hits,
        cache_misses = cache_stats.misses,
        cache_writes = cache_stats.writes,
        "Download session complete"
    );

    println!("{}", report);

    if report.has_failures() {
        error!(
            failures = report.failures().count(),
            "Backfill finished with failures"
        );
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}
