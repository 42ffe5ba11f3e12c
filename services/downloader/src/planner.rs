//! Window planning: split a date range into month-aligned fetch windows,
//! most recent first.

use chrono::{Datelike, NaiveDate};

use weather_common::{WeatherError, WeatherResult, Window};

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Plan the windows covering `[start, end]`.
///
/// The first window runs from the later of `start` and the first of `end`'s
/// month up to `end`. Each following window is the whole preceding calendar
/// month, and the earliest one is clamped to `start`.
pub fn plan_windows(start: NaiveDate, end: NaiveDate) -> WeatherResult<Vec<Window>> {
    if start > end {
        return Err(WeatherError::InvalidRange {
            start: start.to_string(),
            end: end.to_string(),
        });
    }

    let mut windows = Vec::new();
    let mut window_end = end;

    loop {
        let month_start = first_of_month(window_end);
        let window_start = month_start.max(start);
        windows.push(Window {
            start: window_start,
            end: window_end,
        });

        if window_start <= start {
            break;
        }

        window_end = match month_start.pred_opt() {
            Some(date) => date,
            None => break,
        };
    }

    Ok(windows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn w(start: NaiveDate, end: NaiveDate) -> Window {
        Window::new(start, end).unwrap()
    }

    fn assert_covers(windows: &[Window], start: NaiveDate, end: NaiveDate) {
        assert!(!windows.is_empty());
        assert_eq!(windows.first().unwrap().end, end);
        assert_eq!(windows.last().unwrap().start, start);

        for window in windows {
            assert!(window.start <= window.end, "{} is inverted", window);
        }

        // Strictly descending and contiguous: no gaps, no overlap
        for pair in windows.windows(2) {
            assert_eq!(pair[1].end + Duration::days(1), pair[0].start);
        }

        // Every window but the earliest starts on the first of a month
        for window in &windows[..windows.len() - 1] {
            assert_eq!(window.start.day(), 1, "{} is not month aligned", window);
        }

        let total: i64 = windows.iter().map(Window::days).sum();
        assert_eq!(total, (end - start).num_days() + 1);
    }

    #[test]
    fn test_single_day() {
        let d = date(2024, 3, 15);
        assert_eq!(plan_windows(d, d).unwrap(), vec![w(d, d)]);
    }

    #[test]
    fn test_within_one_month() {
        let windows = plan_windows(date(2024, 3, 5), date(2024, 3, 20)).unwrap();
        assert_eq!(windows, vec![w(date(2024, 3, 5), date(2024, 3, 20))]);
    }

    #[test]
    fn test_mid_month_bounds() {
        let windows = plan_windows(date(2023, 11, 20), date(2024, 2, 10)).unwrap();
        assert_eq!(
            windows,
            vec![
                w(date(2024, 2, 1), date(2024, 2, 10)),
                w(date(2024, 1, 1), date(2024, 1, 31)),
                w(date(2023, 12, 1), date(2023, 12, 31)),
                w(date(2023, 11, 20), date(2023, 11, 30)),
            ]
        );
    }

    #[test]
    fn test_leap_february() {
        let windows = plan_windows(date(2024, 2, 1), date(2024, 3, 1)).unwrap();
        assert_eq!(windows[1], w(date(2024, 2, 1), date(2024, 2, 29)));
    }

    #[test]
    fn test_multi_decade() {
        let windows = plan_windows(date(1970, 1, 1), date(2024, 1, 31)).unwrap();
        assert_eq!(windows.len(), 54 * 12 + 1);
        assert_eq!(windows[0], w(date(2024, 1, 1), date(2024, 1, 31)));
        assert_eq!(*windows.last().unwrap(), w(date(1970, 1, 1), date(1970, 1, 31)));
    }

    #[test]
    fn test_inverted_range_rejected() {
        assert!(matches!(
            plan_windows(date(2024, 2, 1), date(2024, 1, 1)),
            Err(WeatherError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_coverage_over_date_grid() {
        let base = date(2019, 12, 1);
        for i in 0..60 {
            let start = base + Duration::days(i * 13);
            for j in 0..40 {
                let end = start + Duration::days(j * 17);
                let windows = plan_windows(start, end).unwrap();
                assert_covers(&windows, start, end);
            }
        }
    }
}
