//! Observation rows as returned by the historical observations API.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{WeatherError, WeatherResult};

/// Dedup and partition key of every observation table.
pub const TIMESTAMP_COLUMN: &str = "valid_time_gmt";

/// Numeric observation fields, in storage column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObservationField {
    Temperature,
    HeatIndex,
    WindChill,
    FeelsLike,
    DewPoint,
    RelativeHumidity,
    Pressure,
    PrecipTotal,
    PrecipHourly,
    SnowHourly,
    WindSpeed,
    WindDirection,
}

impl ObservationField {
    pub const ALL: [ObservationField; 12] = [
        ObservationField::Temperature,
        ObservationField::HeatIndex,
        ObservationField::WindChill,
        ObservationField::FeelsLike,
        ObservationField::DewPoint,
        ObservationField::RelativeHumidity,
        ObservationField::Pressure,
        ObservationField::PrecipTotal,
        ObservationField::PrecipHourly,
        ObservationField::SnowHourly,
        ObservationField::WindSpeed,
        ObservationField::WindDirection,
    ];

    /// Upstream key and storage column name.
    pub fn column(&self) -> &'static str {
        match self {
            ObservationField::Temperature => "temp",
            ObservationField::HeatIndex => "heat_index",
            ObservationField::WindChill => "wc",
            ObservationField::FeelsLike => "feels_like",
            ObservationField::DewPoint => "dewPt",
            ObservationField::RelativeHumidity => "rh",
            ObservationField::Pressure => "pressure",
            ObservationField::PrecipTotal => "precip_total",
            ObservationField::PrecipHourly => "precip_hrly",
            ObservationField::SnowHourly => "snow_hrly",
            ObservationField::WindSpeed => "wspd",
            ObservationField::WindDirection => "wdir",
        }
    }

    /// Whether the physical quantity can never be negative.
    ///
    /// These fields are clamped to zero at write time; the median aggregate
    /// downstream rejects negative inputs.
    pub fn is_non_negative(&self) -> bool {
        !matches!(
            self,
            ObservationField::Temperature
                | ObservationField::HeatIndex
                | ObservationField::WindChill
                | ObservationField::FeelsLike
                | ObservationField::DewPoint
        )
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl FromStr for ObservationField {
    type Err = WeatherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObservationField::ALL
            .iter()
            .copied()
            .find(|f| f.column() == s)
            .ok_or_else(|| WeatherError::UnknownField(s.to_string()))
    }
}

impl fmt::Display for ObservationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// One time-stamped reading. Missing values are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRow {
    pub timestamp: DateTime<Utc>,
    pub values: [f64; 12],
}

impl ObservationRow {
    /// A row with every field missing.
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            values: [f64::NAN; 12],
        }
    }

    pub fn get(&self, field: ObservationField) -> f64 {
        self.values[field.index()]
    }

    pub fn set(&mut self, field: ObservationField, value: f64) {
        self.values[field.index()] = value;
    }

    pub fn with(mut self, field: ObservationField, value: f64) -> Self {
        self.set(field, value);
        self
    }
}

/// Upstream response envelope. Extra keys are ignored.
#[derive(Debug, Deserialize)]
struct ObservationsBody {
    #[serde(default)]
    observations: Option<Vec<RawObservation>>,
}

#[derive(Debug, Deserialize)]
struct RawObservation {
    valid_time_gmt: i64,
    temp: Option<f64>,
    heat_index: Option<f64>,
    wc: Option<f64>,
    feels_like: Option<f64>,
    #[serde(rename = "dewPt")]
    dew_pt: Option<f64>,
    rh: Option<f64>,
    pressure: Option<f64>,
    precip_total: Option<f64>,
    precip_hrly: Option<f64>,
    snow_hrly: Option<f64>,
    wspd: Option<f64>,
    wdir: Option<f64>,
}

impl TryFrom<RawObservation> for ObservationRow {
    type Error = WeatherError;

    fn try_from(raw: RawObservation) -> Result<Self, Self::Error> {
        let timestamp = Utc
            .timestamp_opt(raw.valid_time_gmt, 0)
            .single()
            .ok_or_else(|| {
                WeatherError::Decode(format!("invalid {}: {}", TIMESTAMP_COLUMN, raw.valid_time_gmt))
            })?;

        let values = [
            raw.temp,
            raw.heat_index,
            raw.wc,
            raw.feels_like,
            raw.dew_pt,
            raw.rh,
            raw.pressure,
            raw.precip_total,
            raw.precip_hrly,
            raw.snow_hrly,
            raw.wspd,
            raw.wdir,
        ]
        .map(|v| v.unwrap_or(f64::NAN));

        Ok(ObservationRow { timestamp, values })
    }
}

/// Decode a raw response body into observation rows.
///
/// An empty body or a body without `observations` yields no rows.
pub fn decode_observations(body: &[u8]) -> WeatherResult<Vec<ObservationRow>> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Vec::new());
    }

    let parsed: ObservationsBody = serde_json::from_slice(body)?;
    parsed
        .observations
        .unwrap_or_default()
        .into_iter()
        .map(ObservationRow::try_from)
        .collect()
}
