use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use std::{
    fs::File,
    io::{self, Write},
    path::{Path, PathBuf},
};
use sweep_reducer::{
    clap_args::{Cli, Commands},
    config::Config,
    label::LabelParser,
    metrics::Scope,
    output::{self, OutputFormat, View},
    reducer::SweepReducer,
    selector::Threshold,
};
use tracing::{info, subscriber::set_global_default, Subscriber};
use tracing_subscriber::EnvFilter;

fn load_config(path: &Option<PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::try_from_path(path),
        None => Config::builtin(),
    }
}

fn get_subscriber(env_filter: &str) -> impl Subscriber + Sync + Send {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(env_filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .finish()
}

#[allow(clippy::too_many_arguments)]
fn reduce(
    recipe_name: &str,
    config: &Option<PathBuf>,
    format: OutputFormat,
    out: &Option<PathBuf>,
    filter: Vec<Threshold>,
    scope: Option<Scope>,
    families: bool,
    paths: &[PathBuf],
) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let mut recipe = config.find_recipe(recipe_name)?.clone();
    recipe.filter.extend(filter);
    if let Some(scope) = scope {
        recipe.scope = scope;
    }

    let parser = LabelParser::new(&config.labels)?;
    let summary = SweepReducer::new(recipe, parser)?.reduce_paths(paths)?;

    let view = match families {
        true if summary.families.is_empty() => {
            anyhow::bail!("Recipe {} does not summarize per family", summary.recipe)
        }
        true => View::Families,
        false => View::primary(&summary),
    };

    let mut writer: Box<dyn Write> = match out {
        Some(path) => Box::new(
            File::create(path).context(format!("Unable to create {}", path.display()))?,
        ),
        None => Box::new(io::stdout()),
    };

    match format {
        OutputFormat::Table => writeln!(writer, "{}", output::render_table(&summary, view))?,
        OutputFormat::Csv => output::write_csv(&summary, view, &mut writer)?,
        OutputFormat::Json => output::write_json(&summary, &mut writer)?,
    }

    if let Some(path) = out {
        info!("Wrote {} to {}", summary.recipe, path.display());
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let level = if args.verbose { "debug" } else { "info" };
    set_global_default(get_subscriber(level)).context("Failed to set tracing subscriber")?;

    match args.command {
        Commands::Reduce {
            recipe,
            config,
            format,
            out,
            filter,
            scope,
            families,
            paths,
        } => reduce(&recipe, &config, format, &out, filter, scope, families, &paths)?,

        Commands::Recipes { config } => {
            let config = load_config(&config)?;
            println!("{}", output::render_recipes(&config));
        }

        Commands::Init => {
            let path = Path::new("sweep.toml");
            Config::write_example_to_file(path)?;
            println!("{} {}", "Created".green(), path.display());
        }
    }

    Ok(())
}
