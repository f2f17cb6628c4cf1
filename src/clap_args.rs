use crate::{metrics::Scope, output::OutputFormat, selector::Threshold};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author = "Oliver Winks (@ohuu), William Kimbell (@seal)", version, about, long_about = None)]
pub struct Cli {
    /// Verbose mode (-v, --verbose), log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reduce sweep results with a recipe
    Reduce {
        /// Name of the recipe to run
        #[arg(short, long)]
        recipe: String,

        /// Recipe file, the built-in recipes are used when omitted
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,

        #[arg(short = 'f', long = "format", value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        /// Write output to this file instead of stdout
        #[arg(short = 'o', long = "out")]
        out: Option<PathBuf>,

        /// Extra threshold applied before reduction, e.g. "violation_pct<10" (repeatable)
        #[arg(long = "filter")]
        filter: Vec<Threshold>,

        /// Override the recipe's normalization scope (dataset, source or family)
        #[arg(long)]
        scope: Option<Scope>,

        /// Output the per-family summary instead of the records
        #[arg(long)]
        families: bool,

        /// CSV files or directories of CSV files
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// List the available recipes
    Recipes {
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
    },

    /// Write an example sweep.toml to the current directory
    Init,
}
