//! Aggregates over a map's engagement metrics.
//!
//! Peaks take the maximum, counts take the sum and per-player rates take
//! the mean (rounded to 2 decimals). Null intervals are ignored; a metric
//! with no values at all summarizes to `None`.

use statrs::statistics::Statistics;

use super::stats;
use crate::types::{MapMetrics, MetricsSummary};

pub const PEAK_CCU: &str = "peak-ccu";
pub const FAVORITES: &str = "favorites";
pub const PLAYS: &str = "plays";
pub const MINUTES_PLAYED: &str = "minutes-played";
pub const UNIQUE_PLAYERS: &str = "unique-players";
pub const MINUTES_PER_PLAYER: &str = "average-minutes-per-player";
pub const RETENTION: &str = "retention";

fn values(metrics: &MapMetrics, name: &str) -> Option<Vec<f64>> {
    let values = metrics.get(name)?.values();
    (!values.is_empty()).then_some(values)
}

fn max_of(metrics: &MapMetrics, name: &str) -> Option<f64> {
    values(metrics, name).map(|v| Statistics::max(v.iter()))
}

fn total_of(metrics: &MapMetrics, name: &str) -> Option<f64> {
    values(metrics, name).map(|v| v.iter().sum::<f64>())
}

fn avg_of(metrics: &MapMetrics, name: &str) -> Option<f64> {
    values(metrics, name).map(|v| (stats::mean(&v) * 100.0).round() / 100.0)
}

pub fn summarize_metrics(metrics: &MapMetrics) -> MetricsSummary {
    MetricsSummary {
        peak_ccu: max_of(metrics, PEAK_CCU),
        total_favorites: total_of(metrics, FAVORITES),
        total_plays: total_of(metrics, PLAYS),
        total_minutes_played: total_of(metrics, MINUTES_PLAYED),
        unique_players: total_of(metrics, UNIQUE_PLAYERS),
        avg_session_length: avg_of(metrics, MINUTES_PER_PLAYER),
        avg_retention: avg_of(metrics, RETENTION),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MetricInterval, MetricSeries};

    fn series(values: &[Option<f64>]) -> MetricSeries {
        MetricSeries {
            intervals: values
                .iter()
                .enumerate()
                .map(|(i, &value)| MetricInterval {
                    timestamp: format!("2025-11-{:02}T00:00:00.000Z", i + 1),
                    value,
                })
                .collect(),
        }
    }

    #[test]
    fn test_max_total_and_average() {
        let mut metrics = MapMetrics::new();
        metrics.insert(PEAK_CCU.into(), series(&[Some(120.0), None, Some(340.0), Some(90.0)]));
        metrics.insert(PLAYS.into(), series(&[Some(10.0), Some(20.0), None]));
        metrics.insert(RETENTION.into(), series(&[Some(0.1), Some(0.2), Some(0.25)]));

        let summary = summarize_metrics(&metrics);
        assert_eq!(summary.peak_ccu, Some(340.0));
        assert_eq!(summary.total_plays, Some(30.0));
        assert_eq!(summary.avg_retention, Some(0.18));
        assert_eq!(summary.total_favorites, None);
    }

    #[test]
    fn test_all_null_metric_is_none() {
        let mut metrics = MapMetrics::new();
        metrics.insert(FAVORITES.into(), series(&[None, None]));
        metrics.insert(MINUTES_PER_PLAYER.into(), MetricSeries::default());

        let summary = summarize_metrics(&metrics);
        assert_eq!(summary.total_favorites, None);
        assert_eq!(summary.avg_session_length, None);
    }

    #[test]
    fn test_empty_metrics() {
        assert_eq!(summarize_metrics(&MapMetrics::new()), MetricsSummary::default());
    }
}
