//! IQR based outlier removal.
//!
//! Quartiles use linear interpolation between closest ranks.

use crate::{dataset::RunWithMetrics, metrics::Metric};
use serde::Serialize;

/// Bounds are `Q1 - k*IQR` and `Q3 + k*IQR`.
pub const IQR_MULTIPLIER: f64 = 1.5;

/// Fewer values than this and quartiles are not meaningful.
pub const MIN_QUARTILE_SAMPLES: usize = 4;

/// Percentile `p` (0..=100) of `samples`, `None` for an empty slice.
pub fn percentile(samples: &[f64], p: f64) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len();
    let rank = (p / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
    let lower_idx = rank.floor() as usize;
    let upper_idx = (lower_idx + 1).min(n - 1);
    let fraction = rank - lower_idx as f64;

    Some(sorted[lower_idx] + fraction * (sorted[upper_idx] - sorted[lower_idx]))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IqrBounds {
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
}
impl IqrBounds {
    /// `None` when there are fewer than [`MIN_QUARTILE_SAMPLES`] values.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.len() < MIN_QUARTILE_SAMPLES {
            return None;
        }

        let q1 = percentile(values, 25.0)?;
        let q3 = percentile(values, 75.0)?;
        let iqr = q3 - q1;

        Some(Self {
            q1,
            q3,
            lower: q1 - IQR_MULTIPLIER * iqr,
            upper: q3 + IQR_MULTIPLIER * iqr,
        })
    }

    /// Inclusive on both ends.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Values inside the IQR bounds, or all of them unchanged when quartiles are degenerate.
pub fn filter_values(values: &[f64]) -> Vec<f64> {
    match IqrBounds::from_values(values) {
        Some(bounds) => values.iter().copied().filter(|v| bounds.contains(*v)).collect(),
        None => values.to_vec(),
    }
}

#[derive(Debug)]
pub struct OutlierOutcome<'a> {
    pub kept: Vec<&'a RunWithMetrics>,
    /// `None` when there were too few values to compute quartiles and nothing was removed.
    pub bounds: Option<IqrBounds>,
    /// Number of values the bounds were computed from.
    pub sample_count: usize,
}
impl OutlierOutcome<'_> {
    pub fn is_degenerate(&self) -> bool {
        self.bounds.is_none()
    }
}

/// Removes rows whose `metric` lies outside the IQR bounds of the group. Rows with an undefined
/// metric are dropped as well unless the group is degenerate, in which case it is returned
/// untouched.
pub fn filter_outliers<'a>(group: &[&'a RunWithMetrics], metric: Metric) -> OutlierOutcome<'a> {
    let values = group.iter().filter_map(|run| metric.value(run)).collect::<Vec<_>>();

    match IqrBounds::from_values(&values) {
        Some(bounds) => OutlierOutcome {
            kept: group
                .iter()
                .copied()
                .filter(|run| metric.value(run).is_some_and(|v| bounds.contains(v)))
                .collect(),
            bounds: Some(bounds),
            sample_count: values.len(),
        },
        None => OutlierOutcome {
            kept: group.to_vec(),
            bounds: None,
            sample_count: values.len(),
        },
    }
}
