//! Per-station observation tables in SQLite.
//!
//! Each station owns one table keyed by `valid_time_gmt` (unix seconds).
//! Rows carry a `partition_year` column, indexed, as the coarse time
//! partition. Inserting an existing timestamp replaces the stored row, so
//! re-running a window is idempotent.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tokio::sync::Mutex;
use tracing::{debug, info};

use weather_common::station::TABLE_PREFIX;
use weather_common::{
    ObservationField, ObservationRow, Station, WeatherError, WeatherResult, TIMESTAMP_COLUMN,
};

/// Destination for fetched observation rows.
#[async_trait]
pub trait ObservationSink: Send + Sync {
    /// Insert or replace rows keyed by timestamp. Returns rows written.
    async fn upsert(&self, station: &Station, rows: &[ObservationRow]) -> WeatherResult<u64>;
}

/// Observation storage backed by a SQLite pool.
pub struct ObservationStore {
    pool: SqlitePool,
    /// Tables known to exist, so DDL runs once per station
    created: Mutex<HashSet<String>>,
}

fn storage_err(context: &str, e: sqlx::Error) -> WeatherError {
    WeatherError::Storage(format!("{}: {}", context, e))
}

/// Value as written to storage: NaN becomes NULL, non-negative fields are
/// clamped to zero.
pub fn storage_value(field: ObservationField, value: f64) -> Option<f64> {
    if value.is_nan() {
        None
    } else if field.is_non_negative() {
        Some(value.max(0.0))
    } else {
        Some(value)
    }
}

fn quoted_columns() -> Vec<String> {
    ObservationField::ALL
        .iter()
        .map(|f| format!("\"{}\"", f.column()))
        .collect()
}

impl ObservationStore {
    /// Open or create the database file at the given path.
    pub async fn open(path: &Path) -> WeatherResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                WeatherError::Storage(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| storage_err("Failed to open SQLite database", e))?;

        info!(path = %path.display(), "Opened observation database");
        Ok(Self::with_pool(pool))
    }

    /// Connect using a `sqlite:` URL.
    pub async fn connect(database_url: &str) -> WeatherResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| storage_err("Invalid database URL", e))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| storage_err("Failed to connect", e))?;

        info!(url = %database_url, "Connected to observation database");
        Ok(Self::with_pool(pool))
    }

    /// Open an in-memory database (for testing).
    pub async fn open_memory() -> WeatherResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);

        // A single connection that never expires keeps the database alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| storage_err("Failed to open in-memory database", e))?;

        Ok(Self::with_pool(pool))
    }

    fn with_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            created: Mutex::new(HashSet::new()),
        }
    }

    /// Create the station table if this process has not done so yet.
    pub async fn ensure_table(&self, station: &Station) -> WeatherResult<()> {
        let table = station.table_name();
        let mut created = self.created.lock().await;
        if created.contains(&table) {
            return Ok(());
        }

        let columns: Vec<String> = quoted_columns()
            .into_iter()
            .map(|c| format!("{} REAL", c))
            .collect();

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{table}" (
                {ts} INTEGER PRIMARY KEY,
                partition_year INTEGER NOT NULL,
                {columns}
            )
            "#,
            table = table,
            ts = TIMESTAMP_COLUMN,
            columns = columns.join(",\n                "),
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| storage_err("Create table failed", e))?;

        sqlx::query(&format!(
            r#"CREATE INDEX IF NOT EXISTS "idx_{table}_partition" ON "{table}"(partition_year)"#,
            table = table,
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| storage_err("Create index failed", e))?;

        created.insert(table.clone());
        info!(station = %station, table = %table, "Observation table ready");
        Ok(())
    }

    /// Whether the station has a table in the database.
    pub async fn table_exists(&self, station: &Station) -> WeatherResult<bool> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(station.table_name())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| storage_err("Table lookup failed", e))?;

        Ok(count.0 > 0)
    }

    /// Station names derived from existing tables, prefix stripped.
    pub async fn list_stations(&self) -> WeatherResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT name FROM sqlite_master
            WHERE type = 'table' AND name LIKE 'weather\_%' ESCAPE '\'
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_err("Listing tables failed", e))?;

        Ok(rows
            .into_iter()
            .filter_map(|(name,)| name.strip_prefix(TABLE_PREFIX).map(str::to_string))
            .collect())
    }

    /// Number of stored observations for a station.
    pub async fn row_count(&self, station: &Station) -> WeatherResult<u64> {
        if !self.table_exists(station).await? {
            return Ok(0);
        }

        let count: (i64,) = sqlx::query_as(&format!(
            r#"SELECT COUNT(*) FROM "{}""#,
            station.table_name()
        ))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| storage_err("Count failed", e))?;

        Ok(count.0 as u64)
    }

    /// All stored rows for a station, oldest first. NULLs read back as NaN.
    pub async fn fetch_rows(&self, station: &Station) -> WeatherResult<Vec<ObservationRow>> {
        if !self.table_exists(station).await? {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(&format!(
            r#"SELECT {ts}, {columns} FROM "{table}" ORDER BY {ts} ASC"#,
            ts = TIMESTAMP_COLUMN,
            columns = quoted_columns().join(", "),
            table = station.table_name(),
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_err("Select failed", e))?;

        rows.into_iter()
            .map(|row| {
                let seconds: i64 = row
                    .try_get(0)
                    .map_err(|e| storage_err("Bad timestamp column", e))?;
                let mut observation = ObservationRow::empty(timestamp_from_seconds(seconds)?);
                for field in ObservationField::ALL {
                    let value: Option<f64> = row
                        .try_get(field.index() + 1)
                        .map_err(|e| storage_err("Bad value column", e))?;
                    observation.set(field, value.unwrap_or(f64::NAN));
                }
                Ok(observation)
            })
            .collect()
    }

    /// Non-missing `(timestamp, value)` pairs of one field, oldest first.
    pub async fn series(
        &self,
        station: &Station,
        field: ObservationField,
    ) -> WeatherResult<Vec<(DateTime<Utc>, f64)>> {
        let rows: Vec<(i64, f64)> = sqlx::query_as(&format!(
            r#"SELECT {ts}, "{col}" FROM "{table}" WHERE "{col}" IS NOT NULL ORDER BY {ts} ASC"#,
            ts = TIMESTAMP_COLUMN,
            col = field.column(),
            table = station.table_name(),
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_err("Series query failed", e))?;

        rows.into_iter()
            .map(|(seconds, value)| Ok((timestamp_from_seconds(seconds)?, value)))
            .collect()
    }
}

fn timestamp_from_seconds(seconds: i64) -> WeatherResult<DateTime<Utc>> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| WeatherError::Storage(format!("Invalid stored timestamp {}", seconds)))
}

#[async_trait]
impl ObservationSink for ObservationStore {
    async fn upsert(&self, station: &Station, rows: &[ObservationRow]) -> WeatherResult<u64> {
        self.ensure_table(station).await?;

        if rows.is_empty() {
            return Ok(0);
        }

        let columns = quoted_columns();
        let placeholders = vec!["?"; columns.len() + 2].join(", ");
        let updates: Vec<String> = std::iter::once("partition_year".to_string())
            .chain(columns.iter().cloned())
            .map(|c| format!("{c} = excluded.{c}"))
            .collect();

        let sql = format!(
            r#"
            INSERT INTO "{table}" ({ts}, partition_year, {columns})
            VALUES ({placeholders})
            ON CONFLICT({ts}) DO UPDATE SET {updates}
            "#,
            table = station.table_name(),
            ts = TIMESTAMP_COLUMN,
            columns = columns.join(", "),
            placeholders = placeholders,
            updates = updates.join(", "),
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_err("Begin transaction failed", e))?;

        for row in rows {
            let mut query = sqlx::query(&sql)
                .bind(row.timestamp.timestamp())
                .bind(row.timestamp.year());
            for field in ObservationField::ALL {
                query = query.bind(storage_value(field, row.get(field)));
            }
            query
                .execute(&mut *tx)
                .await
                .map_err(|e| storage_err("Upsert failed", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| storage_err("Commit failed", e))?;

        debug!(station = %station, rows = rows.len(), "Upserted observations");
        Ok(rows.len() as u64)
    }
}
