use crate::{dataset::RunWithMetrics, metrics::Metric};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum Comparison {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}
impl Comparison {
    pub fn holds(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparison::Lt => lhs < rhs,
            Comparison::Le => lhs <= rhs,
            Comparison::Gt => lhs > rhs,
            Comparison::Ge => lhs >= rhs,
        }
    }
}
impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparison::Lt => write!(f, "<"),
            Comparison::Le => write!(f, "<="),
            Comparison::Gt => write!(f, ">"),
            Comparison::Ge => write!(f, ">="),
        }
    }
}

/// A threshold predicate such as `violation_pct < 10`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Threshold {
    pub metric: Metric,
    pub op: Comparison,
    pub value: f64,
}
impl Threshold {
    pub fn new(metric: Metric, op: Comparison, value: f64) -> Self {
        Self { metric, op, value }
    }

    /// A run whose metric is undefined never satisfies a threshold.
    pub fn matches(&self, run: &RunWithMetrics) -> bool {
        self.metric
            .value(run)
            .is_some_and(|v| self.op.holds(v, self.value))
    }
}
impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.metric, self.op, self.value)
    }
}
impl FromStr for Threshold {
    type Err = String;

    /// Parses `<metric><op><value>`, e.g. `violation_pct<10` or `power_consumption >= 220`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pos = s
            .find(|c: char| c == '<' || c == '>')
            .ok_or_else(|| format!("Threshold {s:?} has no comparison operator"))?;
        let (metric, rest) = s.split_at(pos);

        let (op, value) = if let Some(value) = rest.strip_prefix("<=") {
            (Comparison::Le, value)
        } else if let Some(value) = rest.strip_prefix(">=") {
            (Comparison::Ge, value)
        } else if let Some(value) = rest.strip_prefix('<') {
            (Comparison::Lt, value)
        } else {
            (Comparison::Gt, &rest[1..])
        };

        let metric = metric.parse::<Metric>()?;
        let value = value
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("Threshold {s:?} has an invalid value"))?;

        Ok(Threshold { metric, op, value })
    }
}

/// How the representative row of a group is chosen.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Smallest value wins, ties go to the first row.
    MinBy(Metric),
    /// Largest value wins, ties go to the first row.
    MaxBy(Metric),
    /// First row satisfying the predicate.
    FirstValid(Threshold),
    /// First row.
    First,
}
impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionPolicy::MinBy(metric) => write!(f, "min_by({})", metric),
            SelectionPolicy::MaxBy(metric) => write!(f, "max_by({})", metric),
            SelectionPolicy::FirstValid(threshold) => write!(f, "first_valid({})", threshold),
            SelectionPolicy::First => write!(f, "first"),
        }
    }
}

/// Representative of a group together with the number of rows that survived the filter.
#[derive(Debug, Clone, Copy)]
pub struct Selection<'a> {
    pub representative: &'a RunWithMetrics,
    pub candidates: usize,
}

pub fn passes(run: &RunWithMetrics, filter: &[Threshold]) -> bool {
    filter.iter().all(|threshold| threshold.matches(run))
}

/// Filters a group with every threshold in `filter` and then picks one row under `policy`.
///
/// # Returns
///
/// `None` if no row survives the filter or no surviving row is eligible under the policy (for
/// example when the selection metric is undefined for all of them).
pub fn select<'a>(
    group: &[&'a RunWithMetrics],
    filter: &[Threshold],
    policy: &SelectionPolicy,
) -> Option<Selection<'a>> {
    let candidates = group
        .iter()
        .copied()
        .filter(|run| passes(run, filter))
        .collect_vec();

    let representative = match policy {
        SelectionPolicy::MinBy(metric) => extreme_by(&candidates, *metric, |best, v| v < best),
        SelectionPolicy::MaxBy(metric) => extreme_by(&candidates, *metric, |best, v| v > best),
        SelectionPolicy::FirstValid(threshold) => {
            candidates.iter().copied().find(|run| threshold.matches(run))
        }
        SelectionPolicy::First => candidates.first().copied(),
    }?;

    Some(Selection {
        representative,
        candidates: candidates.len(),
    })
}

/// Keeps the first run unless a later one is strictly better, so ties resolve to the earliest.
fn extreme_by<'a>(
    runs: &[&'a RunWithMetrics],
    metric: Metric,
    better: impl Fn(f64, f64) -> bool,
) -> Option<&'a RunWithMetrics> {
    runs.iter()
        .filter_map(|run| metric.value(run).map(|v| (*run, v)))
        .fold(None, |best, (run, v)| match best {
            Some((_, best_v)) if !better(best_v, v) => best,
            _ => Some((run, v)),
        })
        .map(|(run, _)| run)
}
