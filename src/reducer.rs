use crate::{
    binning::{self, Binning, TrendPoint},
    dataset::{Group, GroupBy, RunWithMetrics, SourceDataset, SweepDataset},
    diagnostics::{Diagnostic, Diagnostics, ReduceError},
    label::{Hyperparameters, LabelParser},
    metrics::{Metric, Scope},
    outliers::{self, filter_outliers},
    selector::{self, SelectionPolicy, Threshold},
    source::{self, Source},
};
use anyhow::bail;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};
use tracing::{debug, info};

/// Field of a reduced record that can be summarized per algorithm family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryField {
    PowerConsumption,
    ViolationPct,
    TotalTimeTaken,
    SlaSuccessPct,
    EnergySavedPct,
    TimePerIteration,
}
impl SummaryField {
    pub fn value(&self, record: &ReducedRecord) -> Option<f64> {
        match self {
            SummaryField::PowerConsumption => Some(record.power_consumption),
            SummaryField::ViolationPct => Some(record.violation_pct),
            SummaryField::TotalTimeTaken => Some(record.total_time_taken),
            SummaryField::SlaSuccessPct => Some(record.sla_success_pct),
            SummaryField::EnergySavedPct => record.energy_saved_pct,
            SummaryField::TimePerIteration => Some(record.time_per_iteration),
        }
    }
}
impl fmt::Display for SummaryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SummaryField::PowerConsumption => "PowerConsumption",
            SummaryField::ViolationPct => "ViolationPct",
            SummaryField::TotalTimeTaken => "TotalTimeTaken",
            SummaryField::SlaSuccessPct => "SLA_SuccessPct",
            SummaryField::EnergySavedPct => "EnergySavedPct",
            SummaryField::TimePerIteration => "TimePerIteration",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TrendSpec {
    pub x: Metric,
    pub y: Metric,
    #[serde(default)]
    pub binning: Binning,
}

/// A named reduction: which scope normalizes energy, how rows are grouped, filtered and reduced.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Recipe {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub group_by: GroupBy,
    /// Applied to group members before anything else.
    #[serde(default)]
    pub filter: Vec<Threshold>,
    /// Metric used for IQR outlier removal, applied after `filter`.
    #[serde(default)]
    pub outliers: Option<Metric>,
    #[serde(default)]
    pub select: Option<SelectionPolicy>,
    #[serde(default)]
    pub trend: Option<TrendSpec>,
    /// Applied to reduced records.
    #[serde(default)]
    pub post_filter: Vec<Threshold>,
    #[serde(default)]
    pub summarize: Option<SummaryField>,
}

/// What a recipe does with each filtered group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reduction<'a> {
    Select(&'a SelectionPolicy),
    Trend(&'a TrendSpec),
    Passthrough,
}

impl Recipe {
    pub fn reduction(&self) -> anyhow::Result<Reduction<'_>> {
        match (&self.select, &self.trend) {
            (Some(_), Some(_)) => bail!(
                "Recipe {} sets both select and trend, only one reduction is allowed",
                self.name
            ),
            (Some(policy), None) => Ok(Reduction::Select(policy)),
            (None, Some(trend)) => Ok(Reduction::Trend(trend)),
            (None, None) => Ok(Reduction::Passthrough),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            bail!("Recipe name must not be empty");
        }

        if let Reduction::Trend(trend) = self.reduction()? {
            trend.binning.validate()?;

            if !self.post_filter.is_empty() || self.summarize.is_some() {
                bail!(
                    "Recipe {} produces a trend, post_filter and summarize only apply to records",
                    self.name
                );
            }
        }

        Ok(())
    }
}

/// One row of a reduced table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReducedRecord {
    pub source: String,
    pub group: String,
    pub label: String,
    pub family: String,
    pub run_id: Option<u64>,
    pub hyperparameters: Option<Hyperparameters>,
    pub power_consumption: f64,
    pub violation_pct: f64,
    pub total_time_taken: f64,
    pub sla_success_pct: f64,
    pub energy_saved_pct: Option<f64>,
    /// Group members that passed the filter.
    pub candidates: usize,
    pub time_per_iteration: f64,
    #[serde(serialize_with = "source::serialize_columns")]
    pub extra: Vec<(String, String)>,
}
impl ReducedRecord {
    fn new(run: &RunWithMetrics, group: &Group, candidates: usize) -> Self {
        let record = run.record();

        Self {
            source: run.source_name().to_string(),
            group: group.key().to_string(),
            label: record.label.clone(),
            family: run.label().family.clone(),
            run_id: run.label().run_id,
            hyperparameters: run.label().hyperparameters.clone(),
            power_consumption: record.power_consumption,
            violation_pct: record.violation_pct,
            total_time_taken: record.total_time_taken,
            sla_success_pct: run.metrics().sla_success_pct,
            energy_saved_pct: run.metrics().energy_saved_pct,
            candidates,
            time_per_iteration: record.total_time_taken / candidates as f64,
            extra: record.extra.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendLine {
    pub source: String,
    pub group: String,
    pub x: Metric,
    pub y: Metric,
    pub points: Vec<TrendPoint>,
}

/// Distribution of one field over the reduced records of one algorithm family.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FamilySummary {
    pub family: String,
    pub field: SummaryField,
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// Everything a recipe produced.
#[derive(Debug, Clone, Serialize)]
pub struct SweepSummary {
    pub recipe: String,
    pub records: Vec<ReducedRecord>,
    pub trends: Vec<TrendLine>,
    pub families: Vec<FamilySummary>,
    pub diagnostics: Diagnostics,
}
impl SweepSummary {
    /// Hyperparameter markers present in the records, in order of first appearance.
    pub fn hyperparameter_names(&self) -> Vec<&str> {
        self.records
            .iter()
            .filter_map(|r| r.hyperparameters.as_ref())
            .flat_map(|h| h.iter().map(|(name, _)| name))
            .unique()
            .collect_vec()
    }

    /// Passthrough column names present in the records, in order of first appearance.
    pub fn extra_columns(&self) -> Vec<&str> {
        self.records
            .iter()
            .flat_map(|r| r.extra.iter().map(|(name, _)| name.as_str()))
            .unique()
            .collect_vec()
    }
}

/// Merges reduced records of all sources per algorithm family. Families keep the order in which
/// they first appear; records whose field is undefined are left out.
pub fn summarize_by_family(records: &[ReducedRecord], field: SummaryField) -> Vec<FamilySummary> {
    records
        .iter()
        .map(|r| r.family.as_str())
        .unique()
        .filter_map(|family| {
            let values = records
                .iter()
                .filter(|r| r.family == family)
                .filter_map(|r| field.value(r))
                .collect_vec();

            let (min, max) = values.iter().copied().minmax_by(|a, b| a.total_cmp(b)).into_option()?;
            let mean = values.iter().sum::<f64>() / values.len() as f64;

            Some(FamilySummary {
                family: family.to_string(),
                field,
                count: values.len(),
                mean,
                min,
                q1: outliers::percentile(&values, 25.0)?,
                median: outliers::percentile(&values, 50.0)?,
                q3: outliers::percentile(&values, 75.0)?,
                max,
            })
        })
        .collect_vec()
}

/// Runs a recipe over a set of sources.
#[derive(Debug, Clone)]
pub struct SweepReducer {
    recipe: Recipe,
    parser: LabelParser,
}
impl SweepReducer {
    pub fn new(recipe: Recipe, parser: LabelParser) -> anyhow::Result<Self> {
        recipe.validate()?;
        Ok(Self { recipe, parser })
    }

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    /// Loads every path as its own source and reduces them. Directories contribute each `*.csv`
    /// file they contain. Sources that fail to load are skipped and reported.
    pub fn reduce_paths(&self, paths: &[PathBuf]) -> anyhow::Result<SweepSummary> {
        let mut diagnostics = Diagnostics::new();

        let sources = source::discover_sources(paths, &mut diagnostics)
            .iter()
            .filter_map(|path| match Source::from_path(path, &mut diagnostics) {
                Ok(source) => Some(source),
                Err(diagnostic) => {
                    diagnostics.push(diagnostic);
                    None
                }
            })
            .collect_vec();

        self.reduce_with(&sources, diagnostics)
    }

    /// # Returns
    ///
    /// The reduced records or trend lines of every source together with any diagnostics, or
    /// [`ReduceError::NoData`] when no source produced anything.
    pub fn reduce(&self, sources: &[Source]) -> anyhow::Result<SweepSummary> {
        self.reduce_with(sources, Diagnostics::new())
    }

    fn reduce_with(
        &self,
        sources: &[Source],
        mut diagnostics: Diagnostics,
    ) -> anyhow::Result<SweepSummary> {
        let recipe = &self.recipe;
        let reduction = recipe.reduction()?;
        info!(
            "Running recipe {} over {} sources (scope {}, grouped by {:?})",
            recipe.name,
            sources.len(),
            recipe.scope,
            recipe.group_by
        );

        let dataset = SweepDataset::build(sources, &self.parser, recipe.scope, &mut diagnostics);

        let mut records = vec![];
        let mut trends = vec![];
        for source_dataset in dataset.by_source() {
            let groups = source_dataset.group(recipe.group_by, &mut diagnostics);
            debug!(
                "{}: {} records in {} groups",
                source_dataset.source_name(),
                source_dataset.data().len(),
                groups.len()
            );

            for group in groups.iter() {
                self.reduce_group(
                    &source_dataset,
                    group,
                    reduction,
                    &mut records,
                    &mut trends,
                    &mut diagnostics,
                )?;
            }
        }

        if records.is_empty() && trends.is_empty() {
            return Err(ReduceError::NoData {
                diagnostics: diagnostics.len(),
            }
            .into());
        }

        let families = recipe
            .summarize
            .map(|field| summarize_by_family(&records, field))
            .unwrap_or_default();

        info!(
            "Recipe {} produced {} records, {} trend lines and {} family summaries",
            recipe.name,
            records.len(),
            trends.len(),
            families.len()
        );

        Ok(SweepSummary {
            recipe: recipe.name.clone(),
            records,
            trends,
            families,
            diagnostics,
        })
    }

    fn reduce_group(
        &self,
        source_dataset: &SourceDataset,
        group: &Group,
        reduction: Reduction,
        records: &mut Vec<ReducedRecord>,
        trends: &mut Vec<TrendLine>,
        diagnostics: &mut Diagnostics,
    ) -> anyhow::Result<()> {
        let recipe = &self.recipe;
        let empty_group = || Diagnostic::EmptyGroupAfterFilter {
            source_name: source_dataset.source_name().to_string(),
            group: group.key().to_string(),
        };

        let mut members = group
            .data()
            .iter()
            .copied()
            .filter(|run| selector::passes(run, &recipe.filter))
            .collect_vec();

        if members.is_empty() {
            diagnostics.push(empty_group());
            return Ok(());
        }

        if let Some(metric) = recipe.outliers {
            let outcome = filter_outliers(&members, metric);
            if outcome.is_degenerate() {
                diagnostics.push(Diagnostic::DegenerateQuartiles {
                    source_name: source_dataset.source_name().to_string(),
                    group: group.key().to_string(),
                    count: outcome.sample_count,
                });
            } else {
                debug!(
                    "{}: removed {} outliers on {}",
                    group.key(),
                    members.len() - outcome.kept.len(),
                    metric
                );
            }
            members = outcome.kept;
        }

        if members.is_empty() {
            diagnostics.push(empty_group());
            return Ok(());
        }

        match reduction {
            Reduction::Select(policy) => match selector::select(&members, &[], policy) {
                Some(selection) => {
                    let record = ReducedRecord::new(selection.representative, group, members.len());
                    if selector::passes(selection.representative, &recipe.post_filter) {
                        records.push(record);
                    } else {
                        debug!("{}: representative {} dropped by post filter", group.key(), record.label);
                    }
                }
                None => diagnostics.push(empty_group()),
            },

            Reduction::Trend(spec) => {
                let points = binning::trend(
                    &spec.binning,
                    members.iter().map(|run| {
                        (
                            spec.x.value(run).unwrap_or(f64::NAN),
                            spec.y.value(run).unwrap_or(f64::NAN),
                        )
                    }),
                )?;

                if points.is_empty() {
                    debug!("{}: no values inside the binning domain", group.key());
                    return Ok(());
                }

                trends.push(TrendLine {
                    source: source_dataset.source_name().to_string(),
                    group: group.key().to_string(),
                    x: spec.x,
                    y: spec.y,
                    points,
                });
            }

            Reduction::Passthrough => {
                let candidates = members.len();
                records.extend(
                    members
                        .iter()
                        .filter(|run| selector::passes(run, &recipe.post_filter))
                        .map(|run| ReducedRecord::new(run, group, candidates)),
                );
            }
        }

        Ok(())
    }
}
