//! Calendar bucketing and the per-bucket reducers ("transformers").

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};

use weather_common::Granularity;

/// Reducer applied to the values of one calendar bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transformer {
    Avg,
    Median,
    Max,
    Min,
    Stddev,
}

impl Transformer {
    pub const ALL: [Transformer; 5] = [
        Transformer::Avg,
        Transformer::Median,
        Transformer::Max,
        Transformer::Min,
        Transformer::Stddev,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Transformer::Avg => "avg",
            Transformer::Median => "median",
            Transformer::Max => "max",
            Transformer::Min => "min",
            Transformer::Stddev => "stddev",
        }
    }

    /// Reduce `values`. `None` for an empty bucket, and for `Stddev` with
    /// fewer than two values.
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        match self {
            Transformer::Avg => Some(mean(values)),
            Transformer::Median => Some(median(values)),
            Transformer::Max => values.iter().copied().reduce(f64::max),
            Transformer::Min => values.iter().copied().reduce(f64::min),
            Transformer::Stddev => sample_stddev(values),
        }
    }
}

impl fmt::Display for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn sample_stddev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values);
    let variance =
        values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Values grouped by the start date of their calendar bucket, in date order.
pub type Buckets = BTreeMap<NaiveDate, Vec<f64>>;

/// Group a time series into calendar buckets (UTC dates).
pub fn bucket_series(series: &[(DateTime<Utc>, f64)], granularity: Granularity) -> Buckets {
    let mut buckets = Buckets::new();
    for (timestamp, value) in series {
        if value.is_nan() {
            continue;
        }
        let key = granularity.bucket_start(timestamp.date_naive());
        buckets.entry(key).or_default().push(*value);
    }
    buckets
}

/// Reduce every bucket with `transformer`.
pub fn reduce(buckets: &Buckets, transformer: Transformer) -> Vec<(NaiveDate, Option<f64>)> {
    buckets
        .iter()
        .map(|(start, values)| (*start, transformer.apply(values)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use test_utils::assert_approx_eq;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_reducers() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(Transformer::Avg.apply(&values), Some(2.5));
        assert_eq!(Transformer::Median.apply(&values), Some(2.5));
        assert_eq!(Transformer::Max.apply(&values), Some(4.0));
        assert_eq!(Transformer::Min.apply(&values), Some(1.0));
        assert_approx_eq!(Transformer::Stddev.apply(&values).unwrap(), 1.290994, 1e-6);
    }

    #[test]
    fn test_median_odd_count() {
        assert_eq!(Transformer::Median.apply(&[9.0, -1.0, 5.0]), Some(5.0));
    }

    #[test]
    fn test_stddev_needs_two_values() {
        assert_eq!(Transformer::Stddev.apply(&[3.0]), None);
        assert_eq!(Transformer::Stddev.apply(&[3.0, 3.0]), Some(0.0));
    }

    #[test]
    fn test_empty_bucket_is_none() {
        for t in Transformer::ALL {
            assert_eq!(t.apply(&[]), None, "{}", t);
        }
    }

    #[test]
    fn test_transformer_names() {
        let names: Vec<_> = Transformer::ALL.iter().map(Transformer::name).collect();
        assert_eq!(names, vec!["avg", "median", "max", "min", "stddev"]);
    }

    #[test]
    fn test_bucket_by_week_starts_monday() {
        let series = vec![
            (at(2024, 1, 14, 12), 1.0), // Sunday
            (at(2024, 1, 15, 0), 2.0),  // Monday
            (at(2024, 1, 21, 23), 3.0), // Sunday
            (at(2024, 1, 22, 1), f64::NAN),
        ];
        let buckets = bucket_series(&series, Granularity::Week);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[&date(2024, 1, 8)], vec![1.0]);
        assert_eq!(buckets[&date(2024, 1, 15)], vec![2.0, 3.0]);
    }

    #[test]
    fn test_reduce_by_month() {
        let series = vec![
            (at(2024, 1, 1, 0), 10.0),
            (at(2024, 1, 31, 23), 20.0),
            (at(2024, 2, 29, 12), 5.0),
        ];
        let buckets = bucket_series(&series, Granularity::Month);
        assert_eq!(
            reduce(&buckets, Transformer::Avg),
            vec![(date(2024, 1, 1), Some(15.0)), (date(2024, 2, 1), Some(5.0))]
        );
        assert_eq!(
            reduce(&buckets, Transformer::Stddev)[1],
            (date(2024, 2, 1), None)
        );
    }
}
