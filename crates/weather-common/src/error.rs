//! Error types for the weather backfill crates.

use thiserror::Error;

/// Result type alias using WeatherError.
pub type WeatherResult<T> = Result<T, WeatherError>;

/// Primary error type shared by the library crates.
#[derive(Debug, Error)]
pub enum WeatherError {
    // === Request Errors ===
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidRange { start: String, end: String },

    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Unknown observation field: {0}")]
    UnknownField(String),

    #[error("Unknown sample duration: {0}")]
    UnknownGranularity(String),

    #[error("Station not found: {0}")]
    StationNotFound(String),

    // === Data Errors ===
    #[error("Failed to decode observations: {0}")]
    Decode(String),

    // === Storage Errors ===
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl WeatherError {
    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            WeatherError::InvalidRange { .. }
            | WeatherError::InvalidDate(_)
            | WeatherError::UnknownField(_)
            | WeatherError::UnknownGranularity(_) => 400,

            WeatherError::StationNotFound(_) => 404,

            _ => 500,
        }
    }
}

impl From<std::io::Error> for WeatherError {
    fn from(err: std::io::Error) -> Self {
        WeatherError::Cache(err.to_string())
    }
}

impl From<serde_json::Error> for WeatherError {
    fn from(err: serde_json::Error) -> Self {
        WeatherError::Decode(err.to_string())
    }
}
