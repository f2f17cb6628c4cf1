use serde::Serialize;
use thiserror::Error;
use tracing::warn;

/// A recoverable problem found while reducing a sweep. None of these abort a reduction, they are
/// collected in [`Diagnostics`] and reported alongside the result.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind")]
pub enum Diagnostic {
    #[error("{source_name}: label {label:?} {reason}")]
    ParseMismatch {
        source_name: String,
        label: String,
        reason: String,
    },

    #[error("scope {scope}: {reason}, energy saved is undefined")]
    EmptyScope { scope: String, reason: String },

    #[error("{source_name}: group {group} has no records passing the filter")]
    EmptyGroupAfterFilter { source_name: String, group: String },

    #[error("{source_name}: skipped, {reason}")]
    MalformedSource { source_name: String, reason: String },

    #[error("{source_name}: skipped, same file as {first}")]
    DuplicateSource { source_name: String, first: String },

    #[error("{source_name} line {line}: row skipped, {reason}")]
    MalformedRow {
        source_name: String,
        line: u64,
        reason: String,
    },

    #[error("{source_name}: group {group} has {count} values, too few for quartiles")]
    DegenerateQuartiles {
        source_name: String,
        group: String,
        count: usize,
    },
}
impl Diagnostic {
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            Diagnostic::ParseMismatch { .. } => DiagnosticKind::ParseMismatch,
            Diagnostic::EmptyScope { .. } => DiagnosticKind::EmptyScope,
            Diagnostic::EmptyGroupAfterFilter { .. } => DiagnosticKind::EmptyGroupAfterFilter,
            Diagnostic::MalformedSource { .. } => DiagnosticKind::MalformedSource,
            Diagnostic::DuplicateSource { .. } => DiagnosticKind::DuplicateSource,
            Diagnostic::MalformedRow { .. } => DiagnosticKind::MalformedRow,
            Diagnostic::DegenerateQuartiles { .. } => DiagnosticKind::DegenerateQuartiles,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DiagnosticKind {
    ParseMismatch,
    EmptyScope,
    EmptyGroupAfterFilter,
    MalformedSource,
    DuplicateSource,
    MalformedRow,
    DegenerateQuartiles,
}

/// Log of every diagnostic raised during a reduction. Pushing a diagnostic also emits it as a
/// warning through `tracing`.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}
impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        warn!("{}", diagnostic);
        self.entries.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.entries.iter().filter(|d| d.kind() == kind).count()
    }
}

/// The only condition that fails a reduction outright.
#[derive(Debug, Error)]
pub enum ReduceError {
    #[error("no data to summarize ({diagnostics} diagnostics reported)")]
    NoData { diagnostics: usize },
}
