//! Weather API service library.
//!
//! Serves chart-ready aggregates of the observation tables the downloader
//! fills: per-station series bucketed by day, week or month and reduced by
//! each transformer, laid out as `label × year` matrices.

pub mod aggregate;
pub mod handlers;
pub mod layout;
pub mod state;

use std::sync::Arc;

use axum::{extract::Extension, routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// Build the application router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/index.json", get(handlers::index_handler))
        .route(
            "/weather_data/:station/:sample/:observation",
            get(handlers::weather_data_handler),
        )
        // Health and metrics
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        // Middleware
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
