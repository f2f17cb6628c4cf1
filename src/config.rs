use crate::{label::LabelSchema, reducer::Recipe};
use anyhow::{bail, Context};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::{Read, Write},
    path::Path,
};

static EXAMPLE_CONFIG: &str = include_str!("templates/sweep.toml");

// ******** ******** ********
// **    CONFIGURATION     **
// ******** ******** ********
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub labels: LabelSchema,
    #[serde(rename(serialize = "recipe", deserialize = "recipe"))]
    pub recipes: Vec<Recipe>,
}
impl Config {
    /// The recipes shipped with the binary, used when no config file is given.
    pub fn builtin() -> anyhow::Result<Config> {
        Config::try_from_str(EXAMPLE_CONFIG).context("Built-in recipes are invalid")
    }

    /// Writes the built-in recipes to `path`. Fails if the file already exists.
    pub fn write_example_to_file(path: &Path) -> anyhow::Result<File> {
        let mut file = File::create_new(path)
            .context(format!("Unable to create {}, does it already exist?", path.display()))?;
        File::write_all(&mut file, EXAMPLE_CONFIG.as_bytes())?;
        Ok(file)
    }

    pub fn try_from_path(path: &Path) -> anyhow::Result<Config> {
        let mut config_str = String::new();
        fs::File::open(path)
            .context(format!("Unable to open config file {}", path.display()))?
            .read_to_string(&mut config_str)?;
        Config::try_from_str(&config_str)
    }

    pub fn try_from_str(conf_str: &str) -> anyhow::Result<Config> {
        let config = toml::from_str::<Config>(conf_str)
            .map_err(|e| anyhow::anyhow!("TOML parsing error: {}", e))?;

        let duplicates = config
            .recipes
            .iter()
            .map(|recipe| recipe.name.as_str())
            .duplicates()
            .collect_vec();
        if !duplicates.is_empty() {
            bail!("Duplicate recipe names: {}", duplicates.join(", "));
        }

        for recipe in config.recipes.iter() {
            recipe.validate()?;
        }

        Ok(config)
    }

    pub fn find_recipe(&self, recipe_name: &str) -> anyhow::Result<&Recipe> {
        self.recipes
            .iter()
            .find(|recipe| recipe.name == recipe_name)
            .context(format!(
                "Unable to find recipe with name {}, available recipes: {}",
                recipe_name,
                self.recipes.iter().map(|r| r.name.as_str()).join(", ")
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dataset::GroupBy,
        metrics::{Metric, Scope},
        reducer::{Reduction, SummaryField},
        selector::{Comparison, SelectionPolicy, Threshold},
    };

    #[test]
    fn builtin_recipes_load() -> anyhow::Result<()> {
        let cfg = Config::builtin()?;
        let names = cfg.recipes.iter().map(|r| r.name.as_str()).collect_vec();
        assert_eq!(
            names,
            vec![
                "best-energy-per-config",
                "sla-vs-power-saved",
                "energy-trend",
                "hyperparameter-best",
                "compute-time",
                "best-power-per-run",
            ]
        );
        assert_eq!(cfg.labels, LabelSchema::default());
        Ok(())
    }

    #[test]
    fn builtin_recipes_name_their_scope() -> anyhow::Result<()> {
        let cfg = Config::builtin()?;

        let recipe = cfg.find_recipe("sla-vs-power-saved")?;
        assert_eq!(recipe.scope, Scope::Family);
        assert_eq!(recipe.group_by, GroupBy::Family);
        assert_eq!(recipe.reduction()?, Reduction::Passthrough);

        let recipe = cfg.find_recipe("best-power-per-run")?;
        assert_eq!(recipe.scope, Scope::Source);
        assert_eq!(
            recipe.filter,
            vec![Threshold::new(Metric::ViolationPct, Comparison::Lt, 10.0)]
        );
        assert_eq!(
            recipe.select,
            Some(SelectionPolicy::MinBy(Metric::PowerConsumption))
        );
        assert_eq!(recipe.summarize, Some(SummaryField::PowerConsumption));

        let recipe = cfg.find_recipe("energy-trend")?;
        match recipe.reduction()? {
            Reduction::Trend(trend) => {
                assert_eq!(trend.x, Metric::EnergySavedPct);
                assert_eq!(trend.binning.bins, 10);
            }
            other => panic!("expected a trend, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn can_load_config_file() -> anyhow::Result<()> {
        let cfg = Config::try_from_path(Path::new("./fixtures/sweep.toml"))?;
        assert_eq!(cfg.labels.hyperparameters, vec!["Ants", "Iters"]);
        Ok(())
    }

    #[test]
    fn can_find_recipe_by_name() -> anyhow::Result<()> {
        let cfg = Config::try_from_path(Path::new("./fixtures/sweep.toml"))?;
        assert!(cfg.find_recipe("cheapest-run").is_ok());
        assert!(cfg.find_recipe("nope").is_err());
        Ok(())
    }

    #[test]
    fn duplicate_recipes_are_rejected() {
        let conf = r#"
            [[recipe]]
            name = "twice"

            [[recipe]]
            name = "twice"
            select = "first"
        "#;
        assert!(Config::try_from_str(conf).is_err());
    }

    #[test]
    fn invalid_recipes_are_rejected() {
        let conf = r#"
            [[recipe]]
            name = "both"
            select = "first"
            trend = { x = "energy_saved_pct", y = "sla_success_pct" }
        "#;
        assert!(Config::try_from_str(conf).is_err());

        let conf = r#"
            [[recipe]]
            name = "no-bins"
            trend = { x = "energy_saved_pct", y = "sla_success_pct", binning = { bins = 0 } }
        "#;
        assert!(Config::try_from_str(conf).is_err());
    }

    #[test]
    fn example_is_not_overwritten() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sweep.toml");

        Config::write_example_to_file(&path)?;
        Config::try_from_path(&path)?;
        assert!(Config::write_example_to_file(&path).is_err());
        Ok(())
    }
}
