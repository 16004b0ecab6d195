//! 7-Day Forecast Generator
//!
//! Projects a daily CCU curve from the baseline and trend slope by linear
//! extrapolation, attaches MAE-derived confidence bands, classifies the
//! resulting trend and derives short insights. Also ranks the explanatory
//! factors behind a forecast using the model's feature importances.

use std::collections::HashMap;

use crate::types::{
    DailyForecast, FactorExplanation, Forecast, Impact, Trend, TrendFeatures, TrendStrength,
};

use super::stats;

/// Forecast horizon in days.
pub const HORIZON_DAYS: u32 = 7;

/// Default confidence band width, in multiples of the model MAE.
pub const DEFAULT_INTERVAL_MULTIPLIER: f64 = 1.5;

/// Maximum insights attached to one forecast.
pub const MAX_INSIGHTS: usize = 4;

/// Total % change above which a trend is Growing (below the negation, Declining).
const TREND_THRESHOLD_PCT: f64 = 10.0;

/// Total % change above which a trend is Strong.
const STRONG_THRESHOLD_PCT: f64 = 25.0;

/// Stateless 7-day forecast generator.
pub struct ForecastGenerator;

impl ForecastGenerator {
    /// Build the 7-day forecast.
    ///
    /// # Arguments
    /// * `features` - Trend features; `trend_slope` drives the projection
    /// * `mae` - Mean absolute error of the reference model
    /// * `interval_multiplier` - Band half-width in multiples of `mae`
    pub fn forecast(features: &TrendFeatures, mae: f64, interval_multiplier: f64) -> Forecast {
        let baseline = features.baseline_ccu;
        let daily_rate = features.trend_slope / 100.0 / f64::from(HORIZON_DAYS);
        let half_width = interval_multiplier * mae.max(0.0);

        let daily_forecast: Vec<DailyForecast> = (1..=HORIZON_DAYS)
            .map(|day| {
                let raw = baseline * (1.0 + daily_rate * f64::from(day));
                let predicted = raw.round_ties_even().max(0.0);
                DailyForecast {
                    day,
                    predicted_ccu: predicted as i64,
                    lower_bound: (predicted - half_width).max(0.0).round_ties_even() as i64,
                    upper_bound: (predicted + half_width).round_ties_even() as i64,
                }
            })
            .collect();

        let predicted_ccu_7d = daily_forecast.last().map_or(0, |d| d.predicted_ccu);
        let total_change_pct = if baseline > 0.0 {
            (predicted_ccu_7d as f64 - baseline) / baseline * 100.0
        } else {
            0.0
        };
        let (trend, trend_strength) = classify_trend(total_change_pct);
        let key_insights = Self::insights(baseline, &daily_forecast, trend, total_change_pct);

        Forecast {
            daily_forecast,
            predicted_ccu_7d,
            total_change_pct,
            trend,
            trend_strength,
            key_insights,
        }
    }

    /// Ordered insights, capped at `MAX_INSIGHTS`.
    fn insights(
        baseline: f64,
        daily: &[DailyForecast],
        trend: Trend,
        total_change_pct: f64,
    ) -> Vec<String> {
        let mut insights = Vec::new();
        let values: Vec<f64> = daily.iter().map(|d| d.predicted_ccu as f64).collect();

        // Steepest move between consecutive forecast days; baseline to Day 1 is not a day
        let mut steepest: Option<(u32, f64)> = None;
        for pair in daily.windows(2) {
            let pct = stats::pct_change(pair[0].predicted_ccu as f64, pair[1].predicted_ccu as f64);
            if steepest.map_or(true, |(_, best)| pct.abs() > best.abs()) {
                steepest = Some((pair[1].day, pct));
            }
        }
        if let Some((day, pct)) = steepest {
            if pct.abs() > 5.0 {
                insights.push(format!("Steepest daily change: {pct:+.1}% on Day {day}."));
            }
        }

        match trend {
            Trend::Declining => {
                if let Some(d) = daily.iter().find(|d| (d.predicted_ccu as f64) < 0.9 * baseline) {
                    insights.push(format!(
                        "CCU projected to fall below 90% of the current baseline by Day {}. Launch a campaign before then to hold the player base.",
                        d.day
                    ));
                }
            }
            Trend::Growing => {
                let mut peak = &daily[0];
                for d in daily {
                    if d.predicted_ccu > peak.predicted_ccu {
                        peak = d;
                    }
                }
                if peak.day < 6 {
                    insights.push(format!(
                        "Forecast peaks on Day {}. Time a campaign boost around then to extend the momentum.",
                        peak.day
                    ));
                }
            }
            Trend::Stable => {}
        }

        let cv = stats::coefficient_of_variation(&values);
        if cv > 0.2 {
            insights.push(format!(
                "High forecast volatility (CV {cv:.2}). Expect uneven daily player counts."
            ));
        } else if cv < 0.05 {
            insights.push(format!("Forecast is stable day to day (CV {cv:.2})."));
        }

        if total_change_pct.abs() > 20.0 {
            insights.push(format!(
                "Week-over-week change of {total_change_pct:+.1}% projected."
            ));
        }

        insights.truncate(MAX_INSIGHTS);
        insights
    }
}

/// Forecast with the default confidence band width.
pub fn forecast_7day(features: &TrendFeatures, mae: f64) -> Forecast {
    ForecastGenerator::forecast(features, mae, DEFAULT_INTERVAL_MULTIPLIER)
}

/// Classify a week's total % change into a trend and strength.
///
/// Growing/Declining require a change strictly beyond ±10%; Strong requires
/// strictly beyond ±25%. Stable is always Weak.
pub fn classify_trend(total_change_pct: f64) -> (Trend, TrendStrength) {
    let strength = if total_change_pct.abs() > STRONG_THRESHOLD_PCT {
        TrendStrength::Strong
    } else {
        TrendStrength::Moderate
    };

    if total_change_pct > TREND_THRESHOLD_PCT {
        (Trend::Growing, strength)
    } else if total_change_pct < -TREND_THRESHOLD_PCT {
        (Trend::Declining, strength)
    } else {
        (Trend::Stable, TrendStrength::Weak)
    }
}

// ============================================================================
// Explanatory Factors
// ============================================================================

/// Features ranked when explaining a forecast, in tie-break order.
pub const EXPLAINED_FEATURES: [&str; 5] = [
    "baseline_ccu",
    "trend_slope",
    "recent_momentum",
    "creator_followers",
    "volatility",
];

/// Classify the direction a feature value pushes the forecast.
pub fn factor_impact(feature: &str, value: f64) -> Impact {
    let (positive, negative) = match feature {
        "baseline_ccu" => (value > 300.0, value < 100.0),
        "trend_slope" => (value > 5.0, value < -5.0),
        "recent_momentum" => (value > 0.0, value < 0.0),
        "creator_followers" => (value > 10_000.0, value < 1_000.0),
        "volatility" => (value < 0.2, value > 0.5),
        _ => (false, false),
    };
    if positive {
        Impact::Positive
    } else if negative {
        Impact::Negative
    } else {
        Impact::Neutral
    }
}

/// Rank the explained features by model importance, highest first.
///
/// Features missing from `importances` rank with importance 0.
pub fn rank_factors(
    features: &TrendFeatures,
    creator_followers: u64,
    importances: &HashMap<String, f64>,
) -> Vec<FactorExplanation> {
    let mut factors: Vec<FactorExplanation> = EXPLAINED_FEATURES
        .iter()
        .map(|&name| {
            let value = match name {
                "baseline_ccu" => features.baseline_ccu,
                "trend_slope" => features.trend_slope,
                "recent_momentum" => features.recent_momentum,
                "creator_followers" => creator_followers as f64,
                _ => features.volatility,
            };
            FactorExplanation {
                feature: name.to_string(),
                value,
                importance: importances.get(name).copied().unwrap_or(0.0),
                impact: factor_impact(name, value),
            }
        })
        .collect();

    factors.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    factors
}

/// The highest-importance factor with a non-neutral impact.
pub fn primary_driver(factors: &[FactorExplanation]) -> Option<&FactorExplanation> {
    factors.iter().find(|f| f.impact != Impact::Neutral)
}

/// One-sentence explanation of a forecast.
pub fn explain(forecast: &Forecast, driver: Option<&FactorExplanation>) -> String {
    let headline = format!(
        "{} {} trend: {:+.1}% expected over the next 7 days",
        forecast.trend_strength, forecast.trend, forecast.total_change_pct
    );
    let Some(driver) = driver else {
        return format!("{headline}. No single factor dominates the outlook.");
    };

    let reason = match (driver.feature.as_str(), driver.impact) {
        ("baseline_ccu", Impact::Positive) => {
            format!("a solid existing player base (~{:.0} average CCU)", driver.value)
        }
        ("baseline_ccu", _) => format!("a small player base (~{:.0} average CCU)", driver.value),
        ("trend_slope", Impact::Positive) => {
            format!("sustained growth over the past week ({:+.1}%)", driver.value)
        }
        ("trend_slope", _) => format!("a decline over the past week ({:+.1}%)", driver.value),
        ("recent_momentum", Impact::Positive) => {
            format!("rising recent momentum ({:+.1}%)", driver.value)
        }
        ("recent_momentum", _) => format!("fading recent momentum ({:+.1}%)", driver.value),
        ("creator_followers", Impact::Positive) => {
            format!("a large creator audience ({:.0} followers)", driver.value)
        }
        ("creator_followers", _) => {
            format!("a small creator audience ({:.0} followers)", driver.value)
        }
        (_, Impact::Positive) => format!("steady, predictable traffic (volatility {:.2})", driver.value),
        _ => format!("erratic traffic (volatility {:.2})", driver.value),
    };
    format!("{headline}, driven mainly by {reason}.")
}
