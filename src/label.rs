use anyhow::Context;
use itertools::Itertools;
use regex::Regex;
use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};

const NUMBER: &str = r"(\d+(?:\.\d+)?)";

/// Describes how run labels are laid out, e.g. `ACO_Ants10_Iters50_Evap0.1_times_3`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LabelSchema {
    /// Separates the algorithm family from the rest of the label.
    pub separator: char,
    /// Literal token preceding the run's sequence number.
    pub run_marker: String,
    /// Ordered hyperparameter markers, each followed by a number in the label.
    pub hyperparameters: Vec<String>,
}
impl Default for LabelSchema {
    fn default() -> Self {
        Self {
            separator: '_',
            run_marker: "times_".to_string(),
            hyperparameters: vec!["Ants".to_string(), "Iters".to_string(), "Evap".to_string()],
        }
    }
}

/// Named numeric values extracted from a sweep label, in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct Hyperparameters(Vec<(String, f64)>);
impl Hyperparameters {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0
            .iter()
            .find(|(marker, _)| marker == name)
            .map(|(_, value)| *value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(marker, value)| (marker.as_str(), *value))
    }
}
impl Serialize for Hyperparameters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (marker, value) in self.0.iter() {
            map.serialize_entry(marker, value)?;
        }
        map.end()
    }
}

/// Structured fields pulled out of a free-form label. Fields the label does not carry are `None`,
/// it is up to the caller to decide whether that disqualifies the record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedLabel {
    pub family: String,
    pub run_id: Option<u64>,
    pub hyperparameters: Option<Hyperparameters>,
}

/// Compiled form of a [`LabelSchema`].
#[derive(Debug, Clone)]
pub struct LabelParser {
    separator: char,
    run_marker: String,
    run_id: Regex,
    markers: Vec<String>,
    hyperparameters: Option<Regex>,
}
impl LabelParser {
    pub fn new(schema: &LabelSchema) -> anyhow::Result<Self> {
        if schema.run_marker.is_empty() {
            anyhow::bail!("Label schema run_marker must not be empty");
        }

        let run_id = Regex::new(&format!("{}(\\d+)", regex::escape(&schema.run_marker)))
            .context("Invalid run marker in label schema")?;

        let sep = regex::escape(&schema.separator.to_string());
        let hyperparameters = match schema.hyperparameters.is_empty() {
            true => None,
            false => {
                let tokens = schema
                    .hyperparameters
                    .iter()
                    .map(|marker| format!("{}{}", regex::escape(marker), NUMBER))
                    .join(&sep);
                let pattern = format!("(?:^|{sep}){tokens}(?:{sep}|$)");
                Some(Regex::new(&pattern).context("Invalid hyperparameter markers in label schema")?)
            }
        };

        Ok(Self {
            separator: schema.separator,
            run_marker: schema.run_marker.clone(),
            run_id,
            markers: schema.hyperparameters.clone(),
            hyperparameters,
        })
    }

    /// Extracts family, run id and hyperparameters from a label. Never fails.
    pub fn parse(&self, label: &str) -> ParsedLabel {
        let family = match label.split_once(self.separator) {
            Some((family, _)) => family,
            None => {
                return ParsedLabel {
                    family: label.to_string(),
                    run_id: None,
                    hyperparameters: None,
                }
            }
        };

        let run_id = self
            .run_id
            .captures(label)
            .and_then(|caps| caps[1].parse::<u64>().ok());

        ParsedLabel {
            family: family.to_string(),
            run_id,
            hyperparameters: self.parse_hyperparameters(label),
        }
    }

    fn parse_hyperparameters(&self, label: &str) -> Option<Hyperparameters> {
        let caps = self.hyperparameters.as_ref()?.captures(label)?;

        let values = self
            .markers
            .iter()
            .enumerate()
            .map(|(i, marker)| {
                let value = caps.get(i + 1)?.as_str().parse::<f64>().ok()?;
                Some((marker.clone(), value))
            })
            .collect::<Option<Vec<_>>>()?;

        Some(Hyperparameters(values))
    }

    /// Renders a parsed label back into the canonical `family_Marker<v>..._<run_marker><id>`
    /// form. Parsing the result yields an equal `ParsedLabel`.
    pub fn reassemble(&self, parsed: &ParsedLabel) -> String {
        let mut parts = vec![parsed.family.clone()];
        if let Some(hyperparameters) = &parsed.hyperparameters {
            parts.extend(
                hyperparameters
                    .iter()
                    .map(|(marker, value)| format!("{marker}{value}")),
            );
        }
        if let Some(run_id) = parsed.run_id {
            parts.push(format!("{}{}", self.run_marker, run_id));
        }

        parts.join(&self.separator.to_string())
    }
}
