//! Chart layouts: reshape per-bucket values into a `label × year` matrix.
//!
//! Rows are the position within the year (day, week or month), columns are
//! the calendar years from the first to the last bucket.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use weather_common::Granularity;

/// Non-leap reference year for day labels.
const REFERENCE_YEAR: i32 = 2001;

const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

pub const DAY_ROWS: usize = 365;
pub const WEEK_ROWS: usize = 53;
pub const MONTH_ROWS: usize = 12;

/// A `rows × years` matrix with `None` for gaps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartGrid {
    pub values: Vec<Vec<Option<f64>>>,
    pub x_axis: Vec<i32>,
    pub y_axis: Vec<String>,
}

/// Row index of `date` in the day layout; `None` for February 29.
pub fn day_index(date: NaiveDate) -> Option<usize> {
    NaiveDate::from_ymd_opt(REFERENCE_YEAR, date.month(), date.day())
        .map(|d| d.ordinal0() as usize)
}

pub fn week_index(date: NaiveDate) -> usize {
    (date.ordinal0() as usize / 7).min(WEEK_ROWS - 1)
}

pub fn month_index(date: NaiveDate) -> usize {
    date.month0() as usize
}

pub fn day_labels() -> Vec<String> {
    NaiveDate::from_ymd_opt(REFERENCE_YEAR, 1, 1)
        .map(|first| {
            first
                .iter_days()
                .take(DAY_ROWS)
                .map(|d| d.format("%m-%d").to_string())
                .collect()
        })
        .unwrap_or_default()
}

pub fn week_labels() -> Vec<String> {
    (1..=WEEK_ROWS).map(|w| format!("W{:02}", w)).collect()
}

pub fn month_labels() -> Vec<String> {
    MONTH_LABELS.iter().map(|m| m.to_string()).collect()
}

fn split(
    data: &[(NaiveDate, Option<f64>)],
    labels: Vec<String>,
    index: impl Fn(NaiveDate) -> Option<usize>,
) -> ChartGrid {
    let first = data.iter().map(|(d, _)| d.year()).min();
    let last = data.iter().map(|(d, _)| d.year()).max();
    let years: Vec<i32> = match (first, last) {
        (Some(first), Some(last)) => (first..=last).collect(),
        _ => Vec::new(),
    };

    let mut values = vec![vec![None; years.len()]; labels.len()];
    if let Some(&first_year) = years.first() {
        for (date, value) in data {
            if let Some(row) = index(*date) {
                let column = (date.year() - first_year) as usize;
                values[row][column] = *value;
            }
        }
    }

    ChartGrid {
        values,
        x_axis: years,
        y_axis: labels,
    }
}

/// 365 rows labelled `MM-DD`; leap days are dropped.
pub fn split_by_days(data: &[(NaiveDate, Option<f64>)]) -> ChartGrid {
    split(data, day_labels(), day_index)
}

/// 53 rows labelled `W01..W53`, indexed by day-of-year / 7.
pub fn split_by_weeks(data: &[(NaiveDate, Option<f64>)]) -> ChartGrid {
    split(data, week_labels(), |d| Some(week_index(d)))
}

/// 12 rows labelled `Jan..Dec`.
pub fn split_by_months(data: &[(NaiveDate, Option<f64>)]) -> ChartGrid {
    split(data, month_labels(), |d| Some(month_index(d)))
}

pub fn split_by(granularity: Granularity, data: &[(NaiveDate, Option<f64>)]) -> ChartGrid {
    match granularity {
        Granularity::Day => split_by_days(data),
        Granularity::Week => split_by_weeks(data),
        Granularity::Month => split_by_months(data),
    }
}
