//! HTTP handlers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Extension, Path},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use metrics::{counter, histogram};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error};

use weather_common::{Granularity, ObservationField, Station, WeatherError};

use crate::aggregate::{bucket_series, reduce, Transformer};
use crate::layout::split_by;
use crate::state::AppState;

/// Error response carrying the status implied by the underlying error.
#[derive(Debug)]
pub struct ApiError(pub WeatherError);

impl From<WeatherError> for ApiError {
    fn from(err: WeatherError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub stations: Vec<String>,
    pub observations: Vec<&'static str>,
    pub transformers: Vec<&'static str>,
}

/// GET /index.json - stations, fields and transformers available
pub async fn index_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<IndexResponse>, ApiError> {
    counter!("weather_api_requests_total", "endpoint" => "index").increment(1);

    let stations = state.store.list_stations().await?;
    Ok(Json(IndexResponse {
        stations,
        observations: ObservationField::ALL.iter().map(|f| f.column()).collect(),
        transformers: Transformer::ALL.iter().map(|t| t.name()).collect(),
    }))
}

#[derive(Debug, Serialize)]
pub struct WeatherDataResponse {
    /// One `label × year` matrix per transformer
    pub values: BTreeMap<&'static str, Vec<Vec<Option<f64>>>>,
    pub x_axis: Vec<i32>,
    pub y_axis: Vec<String>,
}

/// GET /weather_data/:station/:sample/:observation.json
pub async fn weather_data_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((station, sample, observation)): Path<(String, String, String)>,
) -> Result<Json<WeatherDataResponse>, ApiError> {
    let started = Instant::now();
    counter!("weather_api_requests_total", "endpoint" => "weather_data").increment(1);

    let granularity: Granularity = sample.parse()?;
    let field: ObservationField = observation
        .strip_suffix(".json")
        .ok_or_else(|| WeatherError::UnknownField(observation.clone()))?
        .parse()?;

    let station = Station::new(station);
    if !state.store.table_exists(&station).await? {
        return Err(WeatherError::StationNotFound(station.code().to_string()).into());
    }

    let series = state.store.series(&station, field).await?;
    let buckets = bucket_series(&series, granularity);

    let mut values = BTreeMap::new();
    let mut x_axis = Vec::new();
    let mut y_axis = Vec::new();
    for transformer in Transformer::ALL {
        let grid = split_by(granularity, &reduce(&buckets, transformer));
        values.insert(transformer.name(), grid.values);
        x_axis = grid.x_axis;
        y_axis = grid.y_axis;
    }

    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    histogram!("weather_api_query_duration_ms", "sample" => granularity.as_sample())
        .record(elapsed_ms);
    debug!(
        station = %station,
        sample = %granularity,
        field = %field,
        points = series.len(),
        buckets = buckets.len(),
        elapsed_ms,
        "Served weather data"
    );

    Ok(Json(WeatherDataResponse {
        values,
        x_axis,
        y_axis,
    }))
}

/// GET /health - Basic health check
pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "service": "weather-api" }))
}

/// GET /metrics - Prometheus metrics
pub async fn metrics_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    let body = state
        .prometheus
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default();

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}
