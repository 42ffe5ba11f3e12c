//! Application state for the weather API.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusHandle;

use storage::ObservationStore;

/// Shared application state.
pub struct AppState {
    /// Observation tables written by the downloader.
    pub store: Arc<ObservationStore>,

    /// Renders `/metrics`; absent when no recorder is installed.
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(store: Arc<ObservationStore>, prometheus: Option<PrometheusHandle>) -> Self {
        Self { store, prometheus }
    }

    /// Open the database at `database_url`, or the SQLite file at `path`.
    pub async fn open(
        database_url: Option<&str>,
        path: &Path,
        prometheus: Option<PrometheusHandle>,
    ) -> Result<Self> {
        let store = match database_url {
            Some(url) => ObservationStore::connect(url)
                .await
                .with_context(|| format!("Failed to connect to {}", url))?,
            None => ObservationStore::open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?,
        };
        Ok(Self::new(Arc::new(store), prometheus))
    }
}
