use anyhow::bail;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fixed-width bins over `[min, max]`. Every bin is half open `[lower, upper)` except the last,
/// which also holds `max`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Binning {
    pub min: f64,
    pub max: f64,
    pub bins: usize,
}
impl Default for Binning {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 100.0,
            bins: 10,
        }
    }
}
impl Binning {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bins == 0 {
            bail!("Binning needs at least one bin");
        }
        if !self.min.is_finite() || !self.max.is_finite() {
            bail!("Binning bounds must be finite, got [{}, {}]", self.min, self.max);
        }
        if self.min >= self.max {
            bail!("Binning min ({}) must be below max ({})", self.min, self.max);
        }
        Ok(())
    }

    /// Edge `i` of `bins + 1`. Computed from the range directly so that the last edge is exactly
    /// `max`.
    fn edge(&self, i: usize) -> f64 {
        if i >= self.bins {
            return self.max;
        }
        self.min + (self.max - self.min) * i as f64 / self.bins as f64
    }

    pub fn bounds(&self, index: usize) -> (f64, f64) {
        (self.edge(index), self.edge(index + 1))
    }

    /// Bin holding `x`, `None` for values outside the domain or not finite, or when there are
    /// no bins at all.
    pub fn bin_index(&self, x: f64) -> Option<usize> {
        if !x.is_finite() || x < self.min || x > self.max {
            return None;
        }

        let last = self.bins.checked_sub(1)?;
        let scaled = (x - self.min) / (self.max - self.min) * self.bins as f64;
        let mut index = (scaled.floor() as usize).min(last);

        // division may land one bin off near an edge
        if index > 0 && x < self.edge(index) {
            index -= 1;
        } else if index < last && x >= self.edge(index + 1) {
            index += 1;
        }

        Some(index)
    }
}

/// A finished bin, the per-bin means of both coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendPoint {
    pub lower: f64,
    pub upper: f64,
    pub mean_x: f64,
    pub mean_y: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct BinAccumulator {
    sum_x: f64,
    sum_y: f64,
    count: usize,
}
impl BinAccumulator {
    fn add(&mut self, x: f64, y: f64) {
        self.sum_x += x;
        self.sum_y += y;
        self.count += 1;
    }

    fn finish(&self, (lower, upper): (f64, f64)) -> Option<TrendPoint> {
        if self.count == 0 {
            return None;
        }

        let n = self.count as f64;
        Some(TrendPoint {
            lower,
            upper,
            mean_x: self.sum_x / n,
            mean_y: self.sum_y / n,
            count: self.count,
        })
    }
}

/// Bins `(x, y)` pairs on `x` and returns the non-empty bins in order.
///
/// # Errors
///
/// If `binning` does not validate.
pub fn trend(
    binning: &Binning,
    points: impl IntoIterator<Item = (f64, f64)>,
) -> anyhow::Result<Vec<TrendPoint>> {
    binning.validate()?;

    let mut accumulators = vec![BinAccumulator::default(); binning.bins];
    let mut skipped = 0;

    for (x, y) in points {
        match binning.bin_index(x) {
            Some(index) if y.is_finite() => accumulators[index].add(x, y),
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!(
            "{} values outside [{}, {}] or undefined were not binned",
            skipped, binning.min, binning.max
        );
    }

    Ok(accumulators
        .iter()
        .enumerate()
        .filter_map(|(i, acc)| acc.finish(binning.bounds(i)))
        .collect())
}
