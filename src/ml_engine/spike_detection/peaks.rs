//! Peak-prominence detector
//!
//! Finds local maxima (flat tops resolve to their middle sample), thins them
//! to a minimum inter-peak distance keeping the tallest, and keeps the peaks
//! whose topographic prominence reaches a percentile of all detected peaks'
//! prominences. The cut-off is relative to the series itself.

use std::collections::BTreeSet;

use crate::ml_engine::stats;
use crate::types::MethodName;

use super::{DetectionError, SpikeMethod};

/// A local maximum with its prominence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub index: usize,
    pub value: f64,
    pub prominence: f64,
}

/// Indices of local maxima. Plateaus count once, at their middle sample.
/// The first and last samples are never peaks.
pub fn local_maxima(x: &[f64]) -> Vec<usize> {
    let n = x.len();
    let mut peaks = Vec::new();
    if n < 3 {
        return peaks;
    }

    let mut i = 1;
    let i_max = n - 1;
    while i < i_max {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < i_max && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                let left_edge = i;
                let right_edge = ahead - 1;
                peaks.push((left_edge + right_edge) / 2);
                i = ahead;
                continue;
            }
        }
        i += 1;
    }
    peaks
}

/// Thin `peaks` so that no two are closer than `distance` samples,
/// keeping higher peaks first.
pub fn select_by_distance(x: &[f64], peaks: &[usize], distance: usize) -> Vec<usize> {
    if distance <= 1 || peaks.len() < 2 {
        return peaks.to_vec();
    }

    let m = peaks.len();
    let mut keep = vec![true; m];
    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&a, &b| x[peaks[a]].total_cmp(&x[peaks[b]]));

    for &j in order.iter().rev() {
        if !keep[j] {
            continue;
        }
        let mut k = j;
        while k > 0 && peaks[j] - peaks[k - 1] < distance {
            keep[k - 1] = false;
            k -= 1;
        }
        let mut k = j + 1;
        while k < m && peaks[k] - peaks[j] < distance {
            keep[k] = false;
            k += 1;
        }
    }

    peaks
        .iter()
        .zip(keep)
        .filter_map(|(&p, k)| k.then_some(p))
        .collect()
}

/// Topographic prominence of the peak at `peak`.
///
/// Walks outward on each side until a strictly higher sample or the series
/// boundary, takes the lowest point on each side, and measures the peak
/// against the higher of the two bases.
pub fn prominence(x: &[f64], peak: usize) -> f64 {
    let height = x[peak];

    let mut left_min = height;
    let mut i = peak;
    loop {
        if x[i] > height {
            break;
        }
        left_min = left_min.min(x[i]);
        if i == 0 {
            break;
        }
        i -= 1;
    }

    let mut right_min = height;
    for &v in &x[peak..] {
        if v > height {
            break;
        }
        right_min = right_min.min(v);
    }

    height - left_min.max(right_min)
}

/// Find distance-thinned peaks with their prominences.
pub fn find_peaks(x: &[f64], distance: usize) -> Vec<Peak> {
    let maxima = local_maxima(x);
    select_by_distance(x, &maxima, distance)
        .into_iter()
        .map(|index| Peak {
            index,
            value: x[index],
            prominence: prominence(x, index),
        })
        .collect()
}

/// Flags peaks in the top prominence percentile.
#[derive(Debug, Clone)]
pub struct PeakProminenceDetector {
    distance: usize,
    percentile: f64,
}

impl PeakProminenceDetector {
    pub fn new(distance: usize, percentile: f64) -> Self {
        Self {
            distance,
            percentile,
        }
    }
}

impl SpikeMethod for PeakProminenceDetector {
    fn name(&self) -> MethodName {
        MethodName::PeakProminence
    }

    fn detect(&self, series: &[f64]) -> Result<BTreeSet<usize>, DetectionError> {
        let peaks = find_peaks(series, self.distance);
        let prominences: Vec<f64> = peaks.iter().map(|p| p.prominence).collect();
        let Some(cutoff) = stats::percentile(&prominences, self.percentile) else {
            return Ok(BTreeSet::new());
        };

        Ok(peaks
            .iter()
            .filter(|p| p.prominence >= cutoff)
            .map(|p| p.index)
            .collect())
    }
}
