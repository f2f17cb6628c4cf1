use itertools::Itertools;
use std::{fs, path::PathBuf, process::Command};
use sweep_reducer::{
    config::Config,
    diagnostics::{DiagnosticKind, ReduceError},
    label::LabelParser,
    reducer::{SummaryField, SweepReducer},
};

fn reducer(config: &Config, recipe: &str) -> anyhow::Result<SweepReducer> {
    let recipe = config.find_recipe(recipe)?.clone();
    let parser = LabelParser::new(&config.labels)?;
    SweepReducer::new(recipe, parser)
}

fn sweeps() -> Vec<PathBuf> {
    vec![PathBuf::from("./fixtures/sweeps")]
}

#[test]
fn best_power_per_run_over_a_directory() -> anyhow::Result<()> {
    let summary = reducer(&Config::builtin()?, "best-power-per-run")?.reduce_paths(&sweeps())?;

    let groups = summary.records.iter().map(|r| r.group.as_str()).collect_vec();
    assert_eq!(groups, vec!["ACO#1", "ACO#2", "PSO#1", "PSO#2"]);

    let powers = summary.records.iter().map(|r| r.power_consumption).collect_vec();
    assert_eq!(powers, vec![80.0, 120.0, 150.0, 140.0]);

    // the empty file is skipped, the others are unaffected
    assert_eq!(summary.diagnostics.count(DiagnosticKind::MalformedSource), 1);

    let families = summary
        .families
        .iter()
        .map(|f| (f.family.as_str(), f.field, f.count, f.mean))
        .collect_vec();
    assert_eq!(
        families,
        vec![
            ("ACO", SummaryField::PowerConsumption, 2, 100.0),
            ("PSO", SummaryField::PowerConsumption, 2, 145.0),
        ]
    );
    Ok(())
}

#[test]
fn compute_time_per_family() -> anyhow::Result<()> {
    let summary = reducer(&Config::builtin()?, "compute-time")?.reduce_paths(&sweeps())?;

    let times = summary.records.iter().map(|r| r.time_per_iteration).collect_vec();
    assert_eq!(times, vec![20.0, 36.0, 6.0, 10.0]);

    let means = summary.families.iter().map(|f| (f.family.as_str(), f.mean)).collect_vec();
    assert_eq!(means, vec![("ACO", 28.0), ("PSO", 8.0)]);
    Ok(())
}

#[test]
fn a_file_named_twice_is_reduced_once() -> anyhow::Result<()> {
    let paths = vec![
        PathBuf::from("./fixtures/sweeps"),
        PathBuf::from("./fixtures/sweeps/aco.csv"),
    ];
    let summary = reducer(&Config::builtin()?, "compute-time")?.reduce_paths(&paths)?;

    let runs = summary
        .records
        .iter()
        .map(|r| (r.group.as_str(), r.candidates, r.time_per_iteration))
        .collect_vec();
    assert_eq!(
        runs,
        vec![("ACO#1", 2, 20.0), ("ACO#2", 1, 36.0), ("PSO#1", 2, 6.0), ("PSO#2", 1, 10.0)]
    );
    assert_eq!(summary.diagnostics.count(DiagnosticKind::DuplicateSource), 1);
    Ok(())
}

#[test]
fn energy_trend_of_a_parameter_sweep() -> anyhow::Result<()> {
    let summary = reducer(&Config::builtin()?, "energy-trend")?
        .reduce_paths(&[PathBuf::from("./fixtures/aco_param_sweep.csv")])?;

    assert_eq!(summary.trends.len(), 1);
    let points = &summary.trends[0].points;
    let bins = points.iter().map(|p| (p.lower, p.upper, p.count)).collect_vec();
    assert_eq!(bins, vec![(0.0, 10.0, 1), (10.0, 20.0, 2), (20.0, 30.0, 2)]);

    assert_eq!(points[0].mean_y, 98.0);
    assert_eq!(points[1].mean_y, 80.0);
    assert_eq!(points[2].mean_y, 77.5);
    for p in points {
        assert!(p.mean_x >= p.lower && p.mean_x < p.upper);
    }
    Ok(())
}

#[test]
fn hyperparameter_best_keeps_compliant_configurations() -> anyhow::Result<()> {
    let summary = reducer(&Config::builtin()?, "hyperparameter-best")?
        .reduce_paths(&[PathBuf::from("./fixtures/aco_param_sweep.csv")])?;

    let configs = summary
        .records
        .iter()
        .map(|r| {
            let h = r.hyperparameters.as_ref().expect("sweep labels carry hyperparameters");
            (h.get("Ants"), h.get("Evap"), r.power_consumption)
        })
        .collect_vec();
    assert_eq!(
        configs,
        vec![
            (Some(10.0), Some(0.1), 210.0),
            (Some(20.0), Some(0.2), 190.0),
        ]
    );
    Ok(())
}

#[test]
fn dataset_scope_normalizes_across_files() -> anyhow::Result<()> {
    let config = Config::try_from_path(&PathBuf::from("./fixtures/sweep.toml"))?;
    let summary = reducer(&config, "compliant-runs")?.reduce_paths(&sweeps())?;

    let saved = summary
        .records
        .iter()
        .map(|r| (r.family.as_str(), r.energy_saved_pct))
        .collect_vec();
    assert_eq!(
        saved,
        vec![
            ("ACO", Some(50.0)),
            ("ACO", Some(60.0)),
            ("ACO", Some(40.0)),
            ("PSO", Some(0.0)),
            ("PSO", Some(25.0)),
            ("PSO", Some(30.0)),
        ]
    );
    Ok(())
}

#[test]
fn custom_label_schema_is_used() -> anyhow::Result<()> {
    let config = Config::try_from_path(&PathBuf::from("./fixtures/sweep.toml"))?;
    let summary = reducer(&config, "cheapest-run")?.reduce_paths(&sweeps())?;

    let powers = summary.records.iter().map(|r| r.power_consumption).collect_vec();
    assert_eq!(powers, vec![60.0, 110.0, 150.0, 140.0]);
    assert!(summary
        .records
        .iter()
        .all(|r| r.extra.iter().any(|(name, value)| name == "Hosts" && value == "8")));
    Ok(())
}

#[test]
fn unusable_sources_are_reported_and_skipped() -> anyhow::Result<()> {
    let paths = vec![
        PathBuf::from("./fixtures/missing_power.csv"),
        PathBuf::from("./fixtures/does_not_exist.csv"),
        PathBuf::from("./fixtures/sweeps/pso.csv"),
    ];
    let summary = reducer(&Config::builtin()?, "best-power-per-run")?.reduce_paths(&paths)?;

    assert_eq!(summary.records.len(), 2);
    assert_eq!(summary.diagnostics.count(DiagnosticKind::MalformedSource), 2);
    Ok(())
}

#[test]
fn no_usable_source_is_no_data() -> anyhow::Result<()> {
    let err = reducer(&Config::builtin()?, "best-power-per-run")?
        .reduce_paths(&[PathBuf::from("./fixtures/sweeps/empty.csv")])
        .expect_err("an empty file has nothing to summarize");

    match err.downcast_ref::<ReduceError>() {
        Some(ReduceError::NoData { diagnostics }) => assert_eq!(*diagnostics, 1),
        None => panic!("expected NoData, got {err}"),
    }
    Ok(())
}

#[test]
fn cli_writes_csv_to_a_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let out = dir.path().join("best.csv");

    let status = Command::new(env!("CARGO_BIN_EXE_sweep-reducer"))
        .args(["reduce", "-r", "best-power-per-run", "-f", "csv", "--filter", "power_consumption<145"])
        .arg("-o")
        .arg(&out)
        .arg("./fixtures/sweeps")
        .status()?;
    assert!(status.success());

    let csv = fs::read_to_string(&out)?;
    let lines = csv.lines().collect_vec();
    assert!(lines[0].starts_with("Source,Group,Algorithm,AlgorithmFamily,RunId,PowerConsumption"));
    assert!(lines[0].ends_with("TimePerIteration,Hosts"));
    // PSO#1 has no row under 145 W left after the extra filter
    assert_eq!(lines.len(), 4);
    Ok(())
}

#[test]
fn cli_lists_recipes() -> anyhow::Result<()> {
    let output = Command::new(env!("CARGO_BIN_EXE_sweep-reducer"))
        .arg("recipes")
        .env("NO_COLOR", "1")
        .output()?;
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout)?;
    for name in ["best-energy-per-config", "energy-trend", "compute-time"] {
        assert!(stdout.contains(name));
    }
    Ok(())
}
