//! Seasonal-residual detector
//!
//! Classical additive decomposition with a daily period:
//! 1. Trend: centred moving average (2×period MA for even periods)
//! 2. Seasonal: per-phase mean of the detrended series, re-centred to zero
//! 3. Residual: series − trend − seasonal
//!
//! Residuals above `Q3 + k × IQR` are flagged. The fence is upper-tail only:
//! dips are never reported.

use std::collections::BTreeSet;

use crate::ml_engine::stats;
use crate::types::MethodName;

use super::{DetectionError, SpikeMethod};

/// Additive decomposition of a series.
///
/// Trend and residual are `None` where the centred moving average is
/// undefined (the first and last `period / 2` samples).
#[derive(Debug, Clone)]
pub struct Decomposition {
    pub trend: Vec<Option<f64>>,
    pub seasonal: Vec<f64>,
    pub residual: Vec<Option<f64>>,
}

/// Decompose `series` into trend, seasonal and residual components.
///
/// Requires at least two full periods.
pub fn decompose(series: &[f64], period: usize) -> Result<Decomposition, DetectionError> {
    let n = series.len();
    if period < 2 || n < 2 * period {
        return Err(DetectionError::InsufficientData {
            needed: 2 * period.max(2),
            got: n,
        });
    }

    let trend = centred_moving_average(series, period);

    let mut phase_sums = vec![0.0; period];
    let mut phase_counts = vec![0usize; period];
    for (i, t) in trend.iter().enumerate() {
        if let Some(t) = t {
            phase_sums[i % period] += series[i] - t;
            phase_counts[i % period] += 1;
        }
    }
    let mut phase_means: Vec<f64> = phase_sums
        .iter()
        .zip(&phase_counts)
        .map(|(s, &c)| if c > 0 { s / c as f64 } else { 0.0 })
        .collect();
    let centre = stats::mean(&phase_means);
    for m in &mut phase_means {
        *m -= centre;
    }

    let seasonal: Vec<f64> = (0..n).map(|i| phase_means[i % period]).collect();
    let residual = trend
        .iter()
        .enumerate()
        .map(|(i, t)| t.map(|t| series[i] - t - seasonal[i]))
        .collect();

    Ok(Decomposition {
        trend,
        seasonal,
        residual,
    })
}

/// Centred moving average over one period.
///
/// Even periods use the 2×MA filter `[0.5, 1, …, 1, 0.5] / period` so the
/// window stays centred on the sample.
fn centred_moving_average(series: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = series.len();
    let half = period / 2;
    let even = period % 2 == 0;
    let mut out = vec![None; n];

    for (i, slot) in out.iter_mut().enumerate().take(n - half).skip(half) {
        let window = &series[i - half..=i + half];
        let value = if even {
            let inner: f64 = window[1..window.len() - 1].iter().sum();
            let edges = 0.5 * (window[0] + window[window.len() - 1]);
            (inner + edges) / period as f64
        } else {
            window.iter().sum::<f64>() / period as f64
        };
        *slot = Some(value);
    }
    out
}

/// Flags residuals in the upper IQR tail of a daily-seasonal decomposition.
#[derive(Debug, Clone)]
pub struct SeasonalResidualDetector {
    period: usize,
    iqr_multiplier: f64,
}

impl SeasonalResidualDetector {
    pub fn new(period: usize, iqr_multiplier: f64) -> Self {
        Self {
            period,
            iqr_multiplier,
        }
    }
}

impl SpikeMethod for SeasonalResidualDetector {
    fn name(&self) -> MethodName {
        MethodName::SeasonalResidual
    }

    fn detect(&self, series: &[f64]) -> Result<BTreeSet<usize>, DetectionError> {
        let decomposition = decompose(series, self.period)?;

        let valid: Vec<f64> = decomposition.residual.iter().flatten().copied().collect();
        let (Some(q1), Some(q3)) = (stats::percentile(&valid, 25.0), stats::percentile(&valid, 75.0))
        else {
            return Ok(BTreeSet::new());
        };
        let upper = q3 + self.iqr_multiplier * (q3 - q1);

        // Rounding noise from the moving average must not register as a spike
        let scale = series.iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));
        let tolerance = scale * 1e-9;

        Ok(decomposition
            .residual
            .iter()
            .enumerate()
            .filter_map(|(i, r)| match r {
                Some(r) if *r > upper + tolerance => Some(i),
                _ => None,
            })
            .collect())
    }
}
