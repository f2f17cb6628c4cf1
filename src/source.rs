use crate::diagnostics::{Diagnostic, Diagnostics};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{ser::SerializeMap, Serialize, Serializer};
use std::{
    collections::HashMap,
    fs::{self, File},
    io::Read,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

pub const LABEL_COLUMN: &str = "Algorithm";
pub const POWER_COLUMN: &str = "PowerConsumption";
pub const VIOLATION_COLUMN: &str = "ViolationPct";
pub const TIME_COLUMN: &str = "TotalTimeTaken";

/// One row of raw telemetry, immutable once read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub label: String,
    pub power_consumption: f64,
    pub violation_pct: f64,
    pub total_time_taken: f64,
    /// Every other column of the row, in header order.
    #[serde(serialize_with = "serialize_columns")]
    pub extra: Vec<(String, String)>,
}
impl RunRecord {
    pub fn new(label: &str, power_consumption: f64, violation_pct: f64, total_time_taken: f64) -> Self {
        Self {
            label: label.to_string(),
            power_consumption,
            violation_pct,
            total_time_taken,
            extra: vec![],
        }
    }

    pub fn extra_value(&self, column: &str) -> Option<&str> {
        self.extra
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }
}

pub(crate) fn serialize_columns<S: Serializer>(
    columns: &[(String, String)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(columns.len()))?;
    for (name, value) in columns {
        map.serialize_entry(name, value)?;
    }
    map.end()
}

/// A single tabular input. Every source is its own comparison scope unless a recipe says
/// otherwise.
#[derive(Debug, Clone)]
pub struct Source {
    name: String,
    extra_columns: Vec<String>,
    records: Vec<RunRecord>,
}
impl Source {
    pub fn new(name: &str, records: Vec<RunRecord>) -> Self {
        let extra_columns = records
            .first()
            .map(|r| r.extra.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default();

        Self {
            name: name.to_string(),
            extra_columns,
            records,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn records(&self) -> &[RunRecord] {
        &self.records
    }

    pub fn extra_columns(&self) -> &[String] {
        &self.extra_columns
    }

    /// Loads a CSV file.
    ///
    /// # Returns
    ///
    /// The source, or a `MalformedSource` diagnostic if the file cannot be read, lacks one of the
    /// required columns or contains no usable rows. Individual bad rows are skipped and reported
    /// in `diagnostics`.
    pub fn from_path(path: &Path, diagnostics: &mut Diagnostics) -> Result<Source, Diagnostic> {
        let name = path.display().to_string();
        let file = File::open(path).map_err(|err| Diagnostic::MalformedSource {
            source_name: name.clone(),
            reason: format!("cannot open file ({err})"),
        })?;

        Source::from_reader(&name, file, diagnostics)
    }

    /// Reads CSV from any reader, see [`Source::from_path`].
    pub fn from_reader<R: Read>(
        name: &str,
        reader: R,
        diagnostics: &mut Diagnostics,
    ) -> Result<Source, Diagnostic> {
        let malformed = |reason: String| Diagnostic::MalformedSource {
            source_name: name.to_string(),
            reason,
        };

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .from_reader(reader);

        let headers = reader
            .headers()
            .map_err(|err| malformed(format!("cannot read header row ({err})")))?
            .clone();
        if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
            return Err(malformed("file is empty".to_string()));
        }

        let layout = ColumnLayout::from_headers(&headers).map_err(malformed)?;

        let mut records = vec![];
        for (i, row) in reader.records().enumerate() {
            // header is line 1
            let fallback_line = i as u64 + 2;
            let row = match row {
                Ok(row) => row,
                Err(err) => {
                    let line = err.position().map(|p| p.line()).unwrap_or(fallback_line);
                    diagnostics.push(Diagnostic::MalformedRow {
                        source_name: name.to_string(),
                        line,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            let line = row.position().map(|p| p.line()).unwrap_or(fallback_line);
            match layout.read(&row) {
                Ok(record) => records.push(record),
                Err(reason) => diagnostics.push(Diagnostic::MalformedRow {
                    source_name: name.to_string(),
                    line,
                    reason,
                }),
            }
        }

        if records.is_empty() {
            return Err(malformed("no data rows".to_string()));
        }

        debug!("Loaded {} rows from {}", records.len(), name);
        Ok(Source {
            name: name.to_string(),
            extra_columns: layout.extra.iter().map(|(_, h)| h.clone()).collect(),
            records,
        })
    }
}

/// Positions of the required and passthrough columns in a header row.
struct ColumnLayout {
    label: usize,
    power: usize,
    violation: usize,
    time: usize,
    extra: Vec<(usize, String)>,
}
impl ColumnLayout {
    fn from_headers(headers: &StringRecord) -> Result<Self, String> {
        let find = |column: &str| {
            headers
                .iter()
                .position(|h| h == column)
                .ok_or_else(|| format!("missing required column {column}"))
        };

        let label = find(LABEL_COLUMN)?;
        let power = find(POWER_COLUMN)?;
        let violation = find(VIOLATION_COLUMN)?;
        let time = find(TIME_COLUMN)?;

        let required = [label, power, violation, time];
        let extra = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| !required.contains(i))
            .map(|(i, h)| (i, h.to_string()))
            .collect();

        Ok(Self {
            label,
            power,
            violation,
            time,
            extra,
        })
    }

    fn read(&self, row: &StringRecord) -> Result<RunRecord, String> {
        let label = row
            .get(self.label)
            .ok_or_else(|| format!("missing {LABEL_COLUMN} value"))?;
        if label.is_empty() {
            return Err(format!("empty {LABEL_COLUMN} value"));
        }

        let power_consumption = number(row, self.power, POWER_COLUMN)?;
        if power_consumption < 0.0 {
            return Err(format!("{POWER_COLUMN} is negative"));
        }
        let violation_pct = number(row, self.violation, VIOLATION_COLUMN)?;
        if !(0.0..=100.0).contains(&violation_pct) {
            return Err(format!("{VIOLATION_COLUMN} {violation_pct} is outside [0, 100]"));
        }
        let total_time_taken = number(row, self.time, TIME_COLUMN)?;

        let extra = self
            .extra
            .iter()
            .map(|(i, name)| (name.clone(), row.get(*i).unwrap_or_default().to_string()))
            .collect();

        Ok(RunRecord {
            label: label.to_string(),
            power_consumption,
            violation_pct,
            total_time_taken,
            extra,
        })
    }
}

fn number(row: &StringRecord, index: usize, column: &str) -> Result<f64, String> {
    let cell = row
        .get(index)
        .ok_or_else(|| format!("missing {column} value"))?;
    match cell.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(format!("{column} value {cell:?} is not a finite number")),
    }
}

/// Expands directories into the `*.csv` files they contain (sorted by name). Plain file paths
/// are passed through untouched, load failures are reported per source. A file reached through
/// more than one path is kept once, at its first position.
pub fn discover_sources(paths: &[PathBuf], diagnostics: &mut Diagnostics) -> Vec<PathBuf> {
    let mut sources = SourcePaths::default();
    for path in paths {
        if !path.is_dir() {
            sources.push(path.clone(), diagnostics);
            continue;
        }

        let entries = match fs::read_dir(path) {
            Ok(entries) => entries,
            Err(err) => {
                diagnostics.push(Diagnostic::MalformedSource {
                    source_name: path.display().to_string(),
                    reason: format!("cannot read directory ({err})"),
                });
                continue;
            }
        };

        let mut csv_files = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("csv"))
            .collect::<Vec<_>>();
        csv_files.sort();

        info!("Found {} csv files in {}", csv_files.len(), path.display());
        for csv_file in csv_files {
            sources.push(csv_file, diagnostics);
        }
    }

    sources.paths
}

/// Discovered paths, deduplicated on their canonical form.
#[derive(Default)]
struct SourcePaths {
    paths: Vec<PathBuf>,
    seen: HashMap<PathBuf, usize>,
}
impl SourcePaths {
    fn push(&mut self, path: PathBuf, diagnostics: &mut Diagnostics) {
        // missing files cannot be canonicalized, they fail on load
        let key = fs::canonicalize(&path).unwrap_or_else(|_| path.clone());

        match self.seen.get(&key) {
            Some(first) => diagnostics.push(Diagnostic::DuplicateSource {
                source_name: path.display().to_string(),
                first: self.paths[*first].display().to_string(),
            }),
            None => {
                self.seen.insert(key, self.paths.len());
                self.paths.push(path);
            }
        }
    }
}
