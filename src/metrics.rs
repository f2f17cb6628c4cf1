use crate::{
    dataset::RunWithMetrics,
    diagnostics::{Diagnostic, Diagnostics},
    source::RunRecord,
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The set of records whose maximum power normalizes `energy_saved_pct`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Every record of every loaded source.
    Dataset,
    /// Every record of one source file.
    #[default]
    Source,
    /// Every record of one algorithm family within one source file.
    Family,
}
impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Dataset => write!(f, "dataset"),
            Scope::Source => write!(f, "source"),
            Scope::Family => write!(f, "family"),
        }
    }
}
impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dataset" => Ok(Scope::Dataset),
            "source" | "file" => Ok(Scope::Source),
            "family" => Ok(Scope::Family),
            other => Err(format!("Unknown scope: {}", other)),
        }
    }
}

/// A numeric column of a run, raw or derived, that recipes can filter, select, bin or summarize
/// on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    PowerConsumption,
    ViolationPct,
    TotalTimeTaken,
    SlaSuccessPct,
    EnergySavedPct,
}
impl Metric {
    /// Value of this metric for a run, `None` if it is undefined (energy saved in an empty
    /// scope).
    pub fn value(&self, run: &RunWithMetrics) -> Option<f64> {
        match self {
            Metric::PowerConsumption => Some(run.record().power_consumption),
            Metric::ViolationPct => Some(run.record().violation_pct),
            Metric::TotalTimeTaken => Some(run.record().total_time_taken),
            Metric::SlaSuccessPct => Some(run.metrics().sla_success_pct),
            Metric::EnergySavedPct => run.metrics().energy_saved_pct,
        }
    }

    /// Column name used in reduced tables.
    pub fn column(&self) -> &'static str {
        match self {
            Metric::PowerConsumption => "PowerConsumption",
            Metric::ViolationPct => "ViolationPct",
            Metric::TotalTimeTaken => "TotalTimeTaken",
            Metric::SlaSuccessPct => "SLA_SuccessPct",
            Metric::EnergySavedPct => "EnergySavedPct",
        }
    }

    /// Column name used for per-bin means in trend tables.
    pub fn trend_column(&self) -> &'static str {
        match self {
            Metric::SlaSuccessPct => "SLA_Success",
            Metric::EnergySavedPct => "EnergySaved",
            other => other.column(),
        }
    }
}
impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::PowerConsumption => "power_consumption",
            Metric::ViolationPct => "violation_pct",
            Metric::TotalTimeTaken => "total_time_taken",
            Metric::SlaSuccessPct => "sla_success_pct",
            Metric::EnergySavedPct => "energy_saved_pct",
        };
        write!(f, "{}", name)
    }
}
impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "power_consumption" | "powerconsumption" | "power" => Ok(Metric::PowerConsumption),
            "violation_pct" | "violationpct" | "violation" => Ok(Metric::ViolationPct),
            "total_time_taken" | "totaltimetaken" | "time" => Ok(Metric::TotalTimeTaken),
            "sla_success_pct" | "sla_successpct" | "sla_success" => Ok(Metric::SlaSuccessPct),
            "energy_saved_pct" | "energysavedpct" | "energy_saved" | "energysaved" => {
                Ok(Metric::EnergySavedPct)
            }
            other => Err(format!("Unknown metric: {}", other)),
        }
    }
}

/// Normalized metrics derived from one run record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DerivedMetrics {
    pub sla_success_pct: f64,
    /// `None` when the record's scope has no usable maximum power.
    pub energy_saved_pct: Option<f64>,
}

pub fn sla_success_pct(violation_pct: f64) -> f64 {
    100.0 - violation_pct
}

pub fn energy_saved_pct(max_power: f64, power_consumption: f64) -> f64 {
    (max_power - power_consumption) / max_power * 100.0
}

/// Maximum power consumption in a scope.
///
/// # Returns
///
/// An `EmptyScope` diagnostic if the scope has no records or its maximum is zero.
pub fn max_power(scope: &str, records: &[&RunRecord]) -> Result<f64, Diagnostic> {
    let max = records
        .iter()
        .map(|r| r.power_consumption)
        .max_by(|a, b| a.total_cmp(b))
        .ok_or_else(|| Diagnostic::EmptyScope {
            scope: scope.to_string(),
            reason: "scope has no records".to_string(),
        })?;

    if max <= 0.0 {
        return Err(Diagnostic::EmptyScope {
            scope: scope.to_string(),
            reason: "maximum power is zero".to_string(),
        });
    }

    Ok(max)
}

/// Derives metrics for every record of a single scope, in input order. The maximum is computed
/// from exactly the records given, callers pass one scope at a time.
pub fn derive_scope(
    scope: &str,
    records: &[&RunRecord],
    diagnostics: &mut Diagnostics,
) -> Vec<DerivedMetrics> {
    let max = match max_power(scope, records) {
        Ok(max) => Some(max),
        Err(diagnostic) => {
            diagnostics.push(diagnostic);
            None
        }
    };

    records
        .iter()
        .map(|r| DerivedMetrics {
            sla_success_pct: sla_success_pct(r.violation_pct),
            energy_saved_pct: max.map(|max| energy_saved_pct(max, r.power_consumption)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticKind;

    fn records(powers: &[f64]) -> Vec<RunRecord> {
        powers
            .iter()
            .map(|p| RunRecord::new("ACO_times_1", *p, 10.0, 1.0))
            .collect()
    }

    #[test]
    fn energy_saved_is_relative_to_scope_maximum() {
        let records = records(&[50.0, 100.0]);
        let refs = records.iter().collect::<Vec<_>>();
        let mut diagnostics = Diagnostics::new();

        let derived = derive_scope("test", &refs, &mut diagnostics);
        let saved = derived
            .iter()
            .map(|d| d.energy_saved_pct)
            .collect::<Vec<_>>();

        assert_eq!(saved, vec![Some(50.0), Some(0.0)]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn minimum_power_record_saves_the_most_energy() {
        let records = records(&[210.0, 180.0, 95.5, 160.0, 95.5001]);
        let refs = records.iter().collect::<Vec<_>>();
        let derived = derive_scope("test", &refs, &mut Diagnostics::new());

        let best = derived
            .iter()
            .filter_map(|d| d.energy_saved_pct)
            .fold(f64::NEG_INFINITY, f64::max);
        assert!((derived[2].energy_saved_pct.unwrap() - best).abs() < 1e-9);
        assert_eq!(derived[0].energy_saved_pct, Some(0.0));
    }

    #[test]
    fn sla_success_complements_violations_exactly() {
        for violation in [0.0, 5.0, 12.5, 40.0, 99.75, 100.0] {
            let success = sla_success_pct(violation);
            assert_eq!(success + violation, 100.0);
        }
    }

    #[test]
    fn zero_maximum_power_is_an_empty_scope() {
        let records = records(&[0.0, 0.0]);
        let refs = records.iter().collect::<Vec<_>>();
        let mut diagnostics = Diagnostics::new();

        let derived = derive_scope("idle.csv", &refs, &mut diagnostics);

        assert!(derived.iter().all(|d| d.energy_saved_pct.is_none()));
        assert!(derived.iter().all(|d| d.sla_success_pct == 90.0));
        assert_eq!(diagnostics.count(DiagnosticKind::EmptyScope), 1);
    }

    #[test]
    fn no_records_is_an_empty_scope() {
        let err = max_power("nothing", &[]).expect_err("empty scope should be reported");
        assert_eq!(err.kind(), DiagnosticKind::EmptyScope);
    }

    #[test]
    fn metrics_can_be_parsed_by_name_or_column() {
        assert_eq!("violation_pct".parse::<Metric>(), Ok(Metric::ViolationPct));
        assert_eq!("PowerConsumption".parse::<Metric>(), Ok(Metric::PowerConsumption));
        assert_eq!("SLA_SuccessPct".parse::<Metric>(), Ok(Metric::SlaSuccessPct));
        assert!("co2".parse::<Metric>().is_err());

        for metric in [Metric::TotalTimeTaken, Metric::EnergySavedPct] {
            assert_eq!(metric.to_string().parse::<Metric>(), Ok(metric));
        }
    }

    #[test]
    fn scope_can_be_parsed() {
        assert_eq!("family".parse::<Scope>(), Ok(Scope::Family));
        assert_eq!("File".parse::<Scope>(), Ok(Scope::Source));
        assert!("galaxy".parse::<Scope>().is_err());
    }
}
