//! File-backed cache of raw upstream responses.
//!
//! Entries live at `<data_dir>/download_cache/<station>/<start>-<end>.json`
//! and are never invalidated; delete the files to force a re-download.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::fs;
use tracing::debug;

use weather_common::{Station, WeatherError, WeatherResult, Window};

/// Name of the cache directory below the data directory.
pub const CACHE_DIR_NAME: &str = "download_cache";

/// Read-through/write-through cache keyed by (station, window).
///
/// When disabled, `get` always misses and `put` does nothing.
#[derive(Debug)]
pub struct CacheStore {
    root: PathBuf,
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

impl CacheStore {
    pub fn new(data_dir: impl AsRef<Path>, enabled: bool) -> Self {
        Self {
            root: data_dir.as_ref().join(CACHE_DIR_NAME),
            enabled,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    pub fn disabled() -> Self {
        Self::new(PathBuf::new(), false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Path of the entry for a station window.
    pub fn path_for(&self, station: &Station, window: &Window) -> PathBuf {
        self.root
            .join(station.cache_dir_name())
            .join(format!("{}.json", window))
    }

    /// Look up a cached response body.
    pub async fn get(&self, station: &Station, window: &Window) -> WeatherResult<Option<Bytes>> {
        if !self.enabled {
            return Ok(None);
        }

        let path = self.path_for(station, window);
        match fs::read(&path).await {
            Ok(data) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(station = %station, window = %window, "Cache hit");
                Ok(Some(Bytes::from(data)))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            Err(e) => Err(WeatherError::Cache(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Store a response body. Existing entries are replaced atomically.
    pub async fn put(&self, station: &Station, window: &Window, data: &[u8]) -> WeatherResult<()> {
        if !self.enabled {
            return Ok(());
        }

        let path = self.path_for(station, window);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                WeatherError::Cache(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        // Write then rename so readers never observe a partial entry
        let temp_path = path.with_extension(format!("json.{}.tmp", std::process::id()));
        fs::write(&temp_path, data).await.map_err(|e| {
            WeatherError::Cache(format!("Failed to write {}: {}", temp_path.display(), e))
        })?;
        if let Err(e) = fs::rename(&temp_path, &path).await {
            fs::remove_file(&temp_path).await.ok();
            return Err(WeatherError::Cache(format!(
                "Failed to move {} into place: {}",
                path.display(),
                e
            )));
        }

        self.writes.fetch_add(1, Ordering::Relaxed);
        debug!(station = %station, window = %window, bytes = data.len(), "Cached response");
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn window() -> Window {
        Window::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_path_layout() {
        let cache = CacheStore::new("/data", true);
        let path = cache.path_for(&Station::new("KSFO:9:US"), &window());
        assert_eq!(
            path,
            PathBuf::from("/data/download_cache/KSFO:9:US/20240101-20240131.json")
        );
    }

    #[test]
    fn test_dot_station_stays_under_cache_root() {
        let cache = CacheStore::new("/data", true);
        let path = cache.path_for(&Station::new(".."), &window());
        assert_eq!(
            path,
            PathBuf::from("/data/download_cache/__/20240101-20240131.json")
        );
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let dir = TempDir::new().unwrap();
        let cache = CacheStore::new(dir.path(), true);
        let station = Station::new("KSFO:9:US");

        assert!(cache.get(&station, &window()).await.unwrap().is_none());

        cache.put(&station, &window(), b"{\"observations\":[]}").await.unwrap();
        let data = cache.get(&station, &window()).await.unwrap().unwrap();
        assert_eq!(&data[..], b"{\"observations\":[]}");

        let stats = cache.stats();
        assert_eq!(stats, CacheStats { hits: 1, misses: 1, writes: 1 });
        assert_eq!(stats.hit_rate(), 50.0);
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let cache = CacheStore::new(dir.path(), true);
        let station = Station::new("EGLL:9:GB");

        cache.put(&station, &window(), b"first").await.unwrap();
        cache.put(&station, &window(), b"second").await.unwrap();

        let data = cache.get(&station, &window()).await.unwrap().unwrap();
        assert_eq!(&data[..], b"second");

        // No temp files left behind
        let entries: Vec<_> = std::fs::read_dir(cache.path_for(&station, &window()).parent().unwrap())
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_cache_never_hits() {
        let dir = TempDir::new().unwrap();
        let cache = CacheStore::new(dir.path(), false);
        let station = Station::new("KSFO:9:US");

        cache.put(&station, &window(), b"data").await.unwrap();
        assert!(cache.get(&station, &window()).await.unwrap().is_none());
        assert!(!cache.path_for(&station, &window()).exists());
        assert_eq!(cache.stats(), CacheStats::default());
    }
}
