//! Local-outlier-factor detector
//!
//! Embeds each sample as a 2-D point `(ccu, time index)`, standardizes both
//! axes, and scores points with the local outlier factor over `k` nearest
//! neighbours. The top `contamination` fraction of scores is flagged.

use std::collections::BTreeSet;

use crate::ml_engine::stats;
use crate::types::MethodName;

use super::{DetectionError, SpikeMethod};

/// Added to mean reachability distances so duplicate points stay finite.
const REACH_EPSILON: f64 = 1e-10;

/// Local outlier factor of every point in a 2-D point set.
///
/// Scores near 1.0 mean density comparable to the neighbourhood; larger
/// scores mean the point is isolated relative to its neighbours.
pub fn local_outlier_factors(points: &[(f64, f64)], k: usize) -> Vec<f64> {
    let n = points.len();
    if n < 2 {
        return vec![1.0; n];
    }
    let k = k.clamp(1, n - 1);

    let dist = |a: (f64, f64), b: (f64, f64)| ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt();

    // k nearest neighbours (self excluded) and k-distance per point
    let mut neighbours: Vec<Vec<(usize, f64)>> = Vec::with_capacity(n);
    let mut k_distance = Vec::with_capacity(n);
    for (i, &p) in points.iter().enumerate() {
        let mut candidates: Vec<(usize, f64)> = points
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(j, &q)| (j, dist(p, q)))
            .collect();
        candidates.select_nth_unstable_by(k - 1, |a, b| a.1.total_cmp(&b.1));
        candidates.truncate(k);
        candidates.sort_by(|a, b| a.1.total_cmp(&b.1));
        k_distance.push(candidates[k - 1].1);
        neighbours.push(candidates);
    }

    let lrd: Vec<f64> = neighbours
        .iter()
        .map(|nbrs| {
            let reach_sum: f64 = nbrs.iter().map(|&(o, d)| d.max(k_distance[o])).sum();
            1.0 / (reach_sum / k as f64 + REACH_EPSILON)
        })
        .collect();

    neighbours
        .iter()
        .enumerate()
        .map(|(i, nbrs)| {
            let neighbour_lrd: f64 = nbrs.iter().map(|&(o, _)| lrd[o]).sum::<f64>() / k as f64;
            neighbour_lrd / lrd[i]
        })
        .collect()
}

/// Flags the most isolated points in (value, time) space.
#[derive(Debug, Clone)]
pub struct LocalOutlierDetector {
    neighbors: usize,
    contamination: f64,
}

impl LocalOutlierDetector {
    pub fn new(neighbors: usize, contamination: f64) -> Self {
        Self {
            neighbors,
            contamination,
        }
    }
}

impl SpikeMethod for LocalOutlierDetector {
    fn name(&self) -> MethodName {
        MethodName::LocalOutlierFactor
    }

    fn detect(&self, series: &[f64]) -> Result<BTreeSet<usize>, DetectionError> {
        let n = series.len();
        if n < 3 {
            return Err(DetectionError::InsufficientData { needed: 3, got: n });
        }
        // No variation in value means no density contrast worth reporting
        if stats::std_dev(series) == 0.0 {
            return Ok(BTreeSet::new());
        }

        let values = stats::standardize(series);
        let times: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let times = stats::standardize(&times);
        let points: Vec<(f64, f64)> = values.into_iter().zip(times).collect();

        let scores = local_outlier_factors(&points, self.neighbors);
        let Some(cutoff) = stats::percentile(&scores, 100.0 * (1.0 - self.contamination)) else {
            return Ok(BTreeSet::new());
        };

        Ok(scores
            .iter()
            .enumerate()
            .filter_map(|(i, &s)| (s > cutoff).then_some(i))
            .collect())
    }
}
