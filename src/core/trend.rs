//! Trend and acceleration summaries over the trailing readings.

use crate::models::reading::{DerivedRecord, Trend, TrendSummary};

/// How many trailing readings the summary looks at by default.
pub const DEFAULT_TREND_POINTS: usize = 5;

const MS_PER_MINUTE: f64 = 60_000.0;

/// Summarizes the trailing `points` records (fewer if unavailable).
///
/// Pairwise rates here are deliberately unclamped: a falling cumulative
/// series (sensor recalibration, line flush) must be able to register as
/// `Decreasing`, unlike the per-point displayed rates which clamp at zero.
pub fn trend_summary(records: &[DerivedRecord], points: usize) -> TrendSummary {
    let tail_len = records.len().min(points.max(2));
    let tail = &records[records.len() - tail_len..];

    if tail.len() < 2 {
        return TrendSummary {
            average_rate_ml_per_min: 0.0,
            trend: Trend::Stable,
            acceleration: 0.0,
        };
    }

    let pairwise: Vec<f64> = tail.windows(2).map(|w| signed_rate(&w[0], &w[1])).collect();
    let average_rate = pairwise.iter().sum::<f64>() / pairwise.len() as f64;

    let mid = tail.len() / 2;
    let acceleration = round2(endpoint_rate(&tail[mid..]) - endpoint_rate(&tail[..mid]));

    TrendSummary {
        average_rate_ml_per_min: average_rate,
        trend: label_for(average_rate),
        acceleration,
    }
}

fn label_for(average_rate: f64) -> Trend {
    if average_rate > 10.0 {
        Trend::RapidIncrease
    } else if average_rate > 5.0 {
        Trend::Increasing
    } else if average_rate > 1.0 {
        Trend::SlowIncrease
    } else if average_rate < -1.0 {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}

/// Pairwise rate without the non-negativity clamp. Non-positive time deltas
/// still yield 0 so the summary stays total.
fn signed_rate(previous: &DerivedRecord, current: &DerivedRecord) -> f64 {
    let delta_minutes = current
        .timestamp
        .signed_duration_since(previous.timestamp)
        .num_milliseconds() as f64
        / MS_PER_MINUTE;
    if delta_minutes > 0.0 {
        (current.cumulative_volume_ml - previous.cumulative_volume_ml) / delta_minutes
    } else {
        0.0
    }
}

/// Endpoint-to-endpoint rate across one half of the trailing window.
fn endpoint_rate(half: &[DerivedRecord]) -> f64 {
    match (half.first(), half.last()) {
        (Some(first), Some(last)) if half.len() >= 2 => signed_rate(first, last),
        _ => 0.0,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::core::engine::{derive, EngineConfig};
    use crate::models::reading::Reading;

    fn derived(points: &[(i64, f64)]) -> Vec<DerivedRecord> {
        let readings: Vec<Reading> = points
            .iter()
            .map(|&(min, vol)| {
                Reading::new("p-1", Utc.timestamp_millis_opt(min * 60_000).unwrap(), vol)
            })
            .collect();
        derive(&readings, &EngineConfig::default())
    }

    #[test]
    fn empty_and_singleton_are_stable() {
        let summary = trend_summary(&[], DEFAULT_TREND_POINTS);
        assert_eq!(summary.trend, Trend::Stable);
        assert_eq!(summary.average_rate_ml_per_min, 0.0);
        assert_eq!(summary.acceleration, 0.0);

        let summary = trend_summary(&derived(&[(0, 40.0)]), DEFAULT_TREND_POINTS);
        assert_eq!(summary.trend, Trend::Stable);
        assert_eq!(summary.acceleration, 0.0);
    }

    #[test]
    fn rapid_increase_above_ten() {
        // 15 mL/min throughout the trailing window.
        let summary = trend_summary(
            &derived(&[(0, 0.0), (1, 15.0), (2, 30.0), (3, 45.0), (4, 60.0)]),
            DEFAULT_TREND_POINTS,
        );
        assert_eq!(summary.trend, Trend::RapidIncrease);
        assert_eq!(summary.average_rate_ml_per_min, 15.0);
    }

    #[test]
    fn increasing_between_five_and_ten() {
        let summary = trend_summary(
            &derived(&[(0, 0.0), (1, 7.0), (2, 14.0), (3, 21.0), (4, 28.0)]),
            DEFAULT_TREND_POINTS,
        );
        assert_eq!(summary.trend, Trend::Increasing);
    }

    #[test]
    fn slow_increase_between_one_and_five() {
        let summary = trend_summary(
            &derived(&[(0, 0.0), (1, 2.0), (2, 4.0), (3, 6.0), (4, 8.0)]),
            DEFAULT_TREND_POINTS,
        );
        assert_eq!(summary.trend, Trend::SlowIncrease);
    }

    #[test]
    fn flat_series_is_stable() {
        let summary = trend_summary(
            &derived(&[(0, 100.0), (1, 100.0), (2, 100.5), (3, 100.5), (4, 101.0)]),
            DEFAULT_TREND_POINTS,
        );
        assert_eq!(summary.trend, Trend::Stable);
    }

    #[test]
    fn falling_series_registers_decreasing() {
        // The summary sees the unclamped pairwise rates even though the
        // per-point displayed rates clamp at zero.
        let summary = trend_summary(
            &derived(&[(0, 100.0), (1, 95.0), (2, 90.0), (3, 85.0), (4, 80.0)]),
            DEFAULT_TREND_POINTS,
        );
        assert_eq!(summary.trend, Trend::Decreasing);
        assert_eq!(summary.average_rate_ml_per_min, -5.0);
    }

    #[test]
    fn acceleration_compares_window_halves() {
        // First half (2 points): 5 mL/min. Second half (3 points): 20 mL/min
        // endpoint-to-endpoint. Acceleration = 20 - 5 = 15.00.
        let summary = trend_summary(
            &derived(&[(0, 0.0), (1, 5.0), (2, 15.0), (3, 35.0), (4, 55.0)]),
            DEFAULT_TREND_POINTS,
        );
        assert_eq!(summary.acceleration, 15.0);
    }

    #[test]
    fn acceleration_is_rounded_to_two_decimals() {
        // Second half runs at 10/3 mL/min endpoint-to-endpoint; first half at 1.
        let summary = trend_summary(
            &derived(&[(0, 0.0), (1, 1.0), (2, 2.0), (3, 7.0), (5, 12.0)]),
            DEFAULT_TREND_POINTS,
        );
        assert_eq!(summary.acceleration, 2.33);
    }

    #[test]
    fn only_trailing_points_are_considered() {
        // A large early spike outside the trailing five must not leak in.
        let summary = trend_summary(
            &derived(&[
                (0, 0.0),
                (1, 400.0),
                (2, 400.0),
                (3, 400.5),
                (4, 400.5),
                (5, 401.0),
                (6, 401.0),
            ]),
            DEFAULT_TREND_POINTS,
        );
        assert_eq!(summary.trend, Trend::Stable);
    }
}
