//! Common test fixtures for the weather backfill tests.
//!
//! Bodies mimic the historical observations API: a `metadata` object and an
//! `observations` array whose rows carry many keys beyond the stored ones.

use chrono::{Datelike, NaiveTime, TimeZone, Utc};
use serde_json::{json, Value};

use weather_common::{ObservationRow, Window};

/// A row at `seconds` since the epoch with every field missing.
pub fn observation_at(seconds: i64) -> ObservationRow {
    ObservationRow::empty(Utc.timestamp_opt(seconds, 0).unwrap())
}

/// Row equality where missing (NaN) values compare equal to each other.
pub fn same_rows(left: &[ObservationRow], right: &[ObservationRow]) -> bool {
    left.len() == right.len()
        && left.iter().zip(right).all(|(a, b)| {
            a.timestamp == b.timestamp
                && a.values
                    .iter()
                    .zip(b.values.iter())
                    .all(|(x, y)| (x.is_nan() && y.is_nan()) || x == y)
        })
}

/// One upstream observation object.
pub fn observation_json(valid_time_gmt: i64, temp: f64) -> Value {
    json!({
        "key": "KSFO",
        "class": "observation",
        "expire_time_gmt": valid_time_gmt + 7200,
        "obs_id": "KSFO",
        "obs_name": "San Francisco",
        "valid_time_gmt": valid_time_gmt,
        "day_ind": "D",
        "temp": temp,
        "wx_icon": 26,
        "dewPt": temp - 5.0,
        "heat_index": temp,
        "rh": 80,
        "pressure": 29.92,
        "vis": 10,
        "wc": temp,
        "wdir": 270,
        "wdir_cardinal": "W",
        "gust": null,
        "wspd": 12,
        "max_temp": null,
        "min_temp": null,
        "precip_total": null,
        "precip_hrly": 0.0,
        "snow_hrly": null,
        "uv_desc": "Low",
        "feels_like": temp,
        "uv_index": 0,
        "wx_phrase": "Mostly Cloudy"
    })
}

/// Wrap observation objects in a response envelope.
pub fn observations_body(observations: Vec<Value>) -> String {
    json!({
        "metadata": {
            "language": "en-US",
            "transaction_id": "1704067200000:123456789",
            "version": "1",
            "location_id": "KSFO:9:US",
            "units": "e",
            "expire_time_gmt": 1704070800,
            "status_code": 200
        },
        "observations": observations
    })
    .to_string()
}

/// A body with one noon observation per day of the window.
///
/// The temperature encodes the day of month so rows are distinguishable.
pub fn window_body(window: &Window) -> String {
    let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
    let observations = window
        .start
        .iter_days()
        .take_while(|d| *d <= window.end)
        .map(|d| {
            let ts = Utc.from_utc_datetime(&d.and_time(noon)).timestamp();
            observation_json(ts, 40.0 + d.day() as f64)
        })
        .collect();
    observations_body(observations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use weather_common::decode_observations;

    #[test]
    fn test_window_body_has_one_row_per_day() {
        let window = Window::new(
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
        )
        .unwrap();

        let rows = decode_observations(window_body(&window).as_bytes()).unwrap();
        assert_eq!(rows.len(), 29);
        assert_eq!(rows[0].timestamp.date_naive(), window.start);
        assert_eq!(rows[28].timestamp.date_naive(), window.end);
        assert!(same_rows(&rows, &rows.clone()));
        assert!(!same_rows(&rows, &rows[1..]));
    }
}
