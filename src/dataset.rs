use crate::{
    diagnostics::{Diagnostic, Diagnostics},
    label::{LabelParser, ParsedLabel},
    metrics::{self, DerivedMetrics, Scope},
    source::{RunRecord, Source},
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, str::FromStr};
use tracing::trace;

/// Associates a single run record with its parsed label and derived metrics.
#[derive(Debug, Clone)]
pub struct RunWithMetrics {
    source_index: usize,
    source_name: String,
    record: RunRecord,
    label: ParsedLabel,
    metrics: DerivedMetrics,
}
impl RunWithMetrics {
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn record(&self) -> &RunRecord {
        &self.record
    }

    pub fn label(&self) -> &ParsedLabel {
        &self.label
    }

    pub fn metrics(&self) -> &DerivedMetrics {
        &self.metrics
    }
}

/// How rows of a source are partitioned before reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    /// One group per (family, run id). Rows without a run id are left out.
    #[default]
    Run,
    /// One group per algorithm family.
    Family,
    /// One group per exact label, i.e. per hyperparameter configuration.
    Label,
    /// The whole source is a single group.
    Source,
}
impl FromStr for GroupBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "run" => Ok(GroupBy::Run),
            "family" => Ok(GroupBy::Family),
            "label" => Ok(GroupBy::Label),
            "source" => Ok(GroupBy::Source),
            other => Err(format!("Unknown grouping: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum GroupKey {
    Run { family: String, run_id: u64 },
    Family(String),
    Label(String),
    Source(String),
}
impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Run { family, run_id } => write!(f, "{}#{}", family, run_id),
            GroupKey::Family(family) => write!(f, "{}", family),
            GroupKey::Label(label) => write!(f, "{}", label),
            GroupKey::Source(source) => write!(f, "{}", source),
        }
    }
}

/// Every record of a sweep, across all loaded sources, with metrics already derived for the
/// requested scope.
#[derive(Debug)]
pub struct SweepDataset {
    data: Vec<RunWithMetrics>,
}
impl<'a> SweepDataset {
    /// Parses every label and derives metrics. Each scope's maximum power is computed from that
    /// scope's members only. Sources are told apart by position, never by name.
    pub fn build(
        sources: &[Source],
        parser: &LabelParser,
        scope: Scope,
        diagnostics: &mut Diagnostics,
    ) -> Self {
        let parsed = sources
            .iter()
            .enumerate()
            .flat_map(|(source_index, source)| {
                source
                    .records()
                    .iter()
                    .map(move |record| (source_index, record, parser.parse(&record.label)))
            })
            .collect_vec();

        let scope_keys = parsed
            .iter()
            .map(|(source_index, _, label)| match scope {
                Scope::Dataset => ScopeKey::Dataset,
                Scope::Source => ScopeKey::Source(*source_index),
                Scope::Family => ScopeKey::Family(*source_index, label.family.as_str()),
            })
            .collect_vec();

        // derive metrics one scope at a time
        let mut derived: Vec<Option<DerivedMetrics>> = vec![None; parsed.len()];
        for scope_key in scope_keys.iter().unique() {
            let members = scope_keys
                .iter()
                .enumerate()
                .filter(|(_, key)| *key == scope_key)
                .map(|(i, _)| i)
                .collect_vec();
            let records = members.iter().map(|i| parsed[*i].1).collect_vec();

            let scope_name = scope_key.name(sources);
            trace!("Deriving metrics for scope {} ({} records)", scope_name, records.len());
            let scope_metrics = metrics::derive_scope(&scope_name, &records, diagnostics);
            for (i, m) in members.into_iter().zip(scope_metrics) {
                derived[i] = Some(m);
            }
        }

        let data = parsed
            .iter()
            .zip(derived)
            .filter_map(|((source_index, record, label), metrics)| {
                metrics.map(|metrics| RunWithMetrics {
                    source_index: *source_index,
                    source_name: sources[*source_index].name().to_string(),
                    record: (*record).clone(),
                    label: label.clone(),
                    metrics,
                })
            })
            .collect();

        Self { data }
    }

    pub fn data(&'a self) -> &'a [RunWithMetrics] {
        &self.data
    }

    pub fn by_source(&'a self) -> Vec<SourceDataset<'a>> {
        let source_indices = self.data.iter().map(|x| x.source_index).unique().collect_vec();

        source_indices
            .into_iter()
            .filter_map(|source_index| {
                let data = self
                    .data
                    .iter()
                    .filter(|x| x.source_index == source_index)
                    .collect_vec();
                let source_name = data.first()?.source_name.as_str();

                Some(SourceDataset { source_name, data })
            })
            .collect_vec()
    }
}

/// Which records share a maximum power.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ScopeKey<'a> {
    Dataset,
    Source(usize),
    Family(usize, &'a str),
}
impl ScopeKey<'_> {
    fn name(&self, sources: &[Source]) -> String {
        match self {
            ScopeKey::Dataset => "dataset".to_string(),
            ScopeKey::Source(i) => sources[*i].name().to_string(),
            ScopeKey::Family(i, family) => format!("{} family {}", sources[*i].name(), family),
        }
    }
}

/// Records of a single source, in file order.
#[derive(Debug)]
pub struct SourceDataset<'a> {
    source_name: &'a str,
    data: Vec<&'a RunWithMetrics>,
}
impl<'a> SourceDataset<'a> {
    pub fn source_name(&self) -> &'a str {
        self.source_name
    }

    pub fn data(&self) -> &[&'a RunWithMetrics] {
        &self.data
    }

    /// Partitions the source into groups, ordered by first appearance. Records that lack the
    /// grouping key are reported once per distinct label and left out.
    pub fn group(&self, by: GroupBy, diagnostics: &mut Diagnostics) -> Vec<Group<'a>> {
        let mut index: HashMap<GroupKey, usize> = HashMap::new();
        let mut groups: Vec<Group<'a>> = vec![];
        let mut mismatched: Vec<&str> = vec![];

        for run in self.data.iter().copied() {
            let key = match group_key(run, by) {
                Ok(key) => key,
                Err(_) if mismatched.contains(&run.record.label.as_str()) => continue,
                Err(reason) => {
                    mismatched.push(&run.record.label);
                    diagnostics.push(Diagnostic::ParseMismatch {
                        source_name: self.source_name.to_string(),
                        label: run.record.label.clone(),
                        reason,
                    });
                    continue;
                }
            };

            match index.get(&key).copied() {
                Some(i) => groups[i].data.push(run),
                None => {
                    index.insert(key.clone(), groups.len());
                    groups.push(Group {
                        key,
                        data: vec![run],
                    });
                }
            }
        }

        groups
    }
}

fn group_key(run: &RunWithMetrics, by: GroupBy) -> Result<GroupKey, String> {
    match by {
        GroupBy::Run => match run.label.run_id {
            Some(run_id) if !run.label.family.is_empty() => Ok(GroupKey::Run {
                family: run.label.family.clone(),
                run_id,
            }),
            _ => Err("has no run id".to_string()),
        },
        GroupBy::Family if run.label.family.is_empty() => {
            Err("has no algorithm family".to_string())
        }
        GroupBy::Family => Ok(GroupKey::Family(run.label.family.clone())),
        GroupBy::Label => Ok(GroupKey::Label(run.record.label.clone())),
        GroupBy::Source => Ok(GroupKey::Source(run.source_name.clone())),
    }
}

/// Records sharing one grouping key. Guaranteed non-empty.
#[derive(Debug)]
pub struct Group<'a> {
    key: GroupKey,
    data: Vec<&'a RunWithMetrics>,
}
impl<'a> Group<'a> {
    pub fn key(&self) -> &GroupKey {
        &self.key
    }

    pub fn data(&self) -> &[&'a RunWithMetrics] {
        &self.data
    }
}
