//! Reduces hyperparameter sweeps of scheduling-algorithm telemetry into comparable summaries.
//!
//! Each CSV source holds one row per run with an `Algorithm` label such as
//! `ACO_Ants10_Iters50_Evap0.1_times_3`, the power it consumed, the percentage of SLA violations
//! and the time it took. A [`reducer::Recipe`] names how those rows are normalized, grouped,
//! filtered and reduced; [`reducer::SweepReducer`] runs it and returns a
//! [`reducer::SweepSummary`] alongside every non-fatal [`diagnostics::Diagnostic`].

pub mod binning;
pub mod clap_args;
pub mod config;
pub mod dataset;
pub mod diagnostics;
pub mod label;
pub mod metrics;
pub mod outliers;
pub mod output;
pub mod reducer;
pub mod selector;
pub mod source;
