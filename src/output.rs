use crate::{
    config::Config,
    reducer::{ReducedRecord, Reduction, SweepSummary},
};
use colored::Colorize;
use itertools::Itertools;
use std::io::Write;
use term_table::{row::Row, table_cell::TableCell, Table, TableStyle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Csv,
    Json,
}

/// Which table of a summary to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Records,
    Trends,
    Families,
}
impl View {
    /// Trend lines if the recipe produced any, reduced records otherwise.
    pub fn primary(summary: &SweepSummary) -> Self {
        match summary.trends.is_empty() {
            true => View::Records,
            false => View::Trends,
        }
    }
}

fn opt(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Header of the records table, hyperparameter markers and passthrough columns included.
pub fn record_header(summary: &SweepSummary) -> Vec<String> {
    let mut header = vec!["Source", "Group", "Algorithm", "AlgorithmFamily", "RunId"]
        .into_iter()
        .map(String::from)
        .collect_vec();
    header.extend(summary.hyperparameter_names().iter().map(|s| s.to_string()));
    header.extend(
        [
            "PowerConsumption",
            "ViolationPct",
            "TotalTimeTaken",
            "SLA_SuccessPct",
            "EnergySavedPct",
            "Candidates",
            "TimePerIteration",
        ]
        .map(String::from),
    );
    header.extend(summary.extra_columns().iter().map(|s| s.to_string()));
    header
}

fn record_row(record: &ReducedRecord, markers: &[&str], extra_columns: &[&str]) -> Vec<String> {
    let mut row = vec![
        record.source.clone(),
        record.group.clone(),
        record.label.clone(),
        record.family.clone(),
        record.run_id.map(|id| id.to_string()).unwrap_or_default(),
    ];
    row.extend(markers.iter().map(|marker| {
        opt(record
            .hyperparameters
            .as_ref()
            .and_then(|h| h.get(marker)))
    }));
    row.extend([
        record.power_consumption.to_string(),
        record.violation_pct.to_string(),
        record.total_time_taken.to_string(),
        record.sla_success_pct.to_string(),
        opt(record.energy_saved_pct),
        record.candidates.to_string(),
        record.time_per_iteration.to_string(),
    ]);
    row.extend(extra_columns.iter().map(|column| {
        record
            .extra
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.clone())
            .unwrap_or_default()
    }));
    row
}

fn trend_header(summary: &SweepSummary) -> Vec<String> {
    let (x, y) = summary
        .trends
        .first()
        .map(|t| (t.x.trend_column(), t.y.trend_column()))
        .unwrap_or(("MeanX", "MeanY"));

    ["Source", "Group", "BinLower", "BinUpper", x, y, "Count"]
        .map(String::from)
        .to_vec()
}

fn trend_rows(summary: &SweepSummary) -> Vec<Vec<String>> {
    summary
        .trends
        .iter()
        .flat_map(|line| {
            line.points.iter().map(|p| {
                vec![
                    line.source.clone(),
                    line.group.clone(),
                    p.lower.to_string(),
                    p.upper.to_string(),
                    p.mean_x.to_string(),
                    p.mean_y.to_string(),
                    p.count.to_string(),
                ]
            })
        })
        .collect_vec()
}

const FAMILY_HEADER: [&str; 9] = [
    "AlgorithmFamily",
    "Field",
    "Count",
    "Mean",
    "Min",
    "Q1",
    "Median",
    "Q3",
    "Max",
];

fn family_rows(summary: &SweepSummary) -> Vec<Vec<String>> {
    summary
        .families
        .iter()
        .map(|f| {
            vec![
                f.family.clone(),
                f.field.to_string(),
                f.count.to_string(),
                f.mean.to_string(),
                f.min.to_string(),
                f.q1.to_string(),
                f.median.to_string(),
                f.q3.to_string(),
                f.max.to_string(),
            ]
        })
        .collect_vec()
}

fn table_data(summary: &SweepSummary, view: View) -> (Vec<String>, Vec<Vec<String>>) {
    match view {
        View::Records => {
            let markers = summary.hyperparameter_names();
            let extra_columns = summary.extra_columns();
            let rows = summary
                .records
                .iter()
                .map(|r| record_row(r, &markers, &extra_columns))
                .collect_vec();
            (record_header(summary), rows)
        }
        View::Trends => (trend_header(summary), trend_rows(summary)),
        View::Families => (
            FAMILY_HEADER.map(String::from).to_vec(),
            family_rows(summary),
        ),
    }
}

/// Writes one table of the summary as CSV. Undefined values are empty cells.
pub fn write_csv<W: Write>(summary: &SweepSummary, view: View, writer: W) -> anyhow::Result<()> {
    let (header, rows) = table_data(summary, view);

    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(&header)?;
    for row in rows {
        writer.write_record(&row)?;
    }
    writer.flush()?;

    Ok(())
}

/// Writes the whole summary, diagnostics included, as pretty printed JSON.
pub fn write_json<W: Write>(summary: &SweepSummary, writer: W) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(writer, summary)?;
    Ok(())
}

fn short(value: &str) -> String {
    match value.parse::<f64>() {
        Ok(v) if v.fract() != 0.0 => format!("{:.3}", v),
        _ => value.to_string(),
    }
}

/// Renders one table of the summary for the terminal.
pub fn render_table(summary: &SweepSummary, view: View) -> String {
    let (header, rows) = table_data(summary, view);

    let mut table_rows = vec![Row::new(
        header
            .iter()
            .map(|h| TableCell::new(h.as_str().bold()))
            .collect_vec(),
    )];
    table_rows.extend(rows.iter().map(|row| {
        Row::new(
            row.iter()
                .map(|cell| match cell.is_empty() {
                    true => TableCell::new("--".bright_black()),
                    false => TableCell::new(short(cell)),
                })
                .collect_vec(),
        )
    }));

    let table = Table::builder()
        .rows(table_rows)
        .style(TableStyle::rounded())
        .build();

    let title = format!(" {} ", summary.recipe).reversed().green();
    let status = match summary.diagnostics.is_empty() {
        true => "no diagnostics".green(),
        false => format!("{} diagnostics, see log", summary.diagnostics.len()).yellow(),
    };

    format!("\n{}\n{}\n{}\n", title, table.render().trim_end(), status)
}

/// Lists the recipes of a config for the terminal.
pub fn render_recipes(config: &Config) -> String {
    let mut table_rows = vec![Row::new(
        ["Recipe", "Scope", "Group by", "Reduction", "Description"]
            .map(|h| TableCell::new(h.bold()))
            .to_vec(),
    )];
    table_rows.extend(config.recipes.iter().map(|recipe| {
        let reduction = match recipe.reduction() {
            Ok(Reduction::Select(policy)) => policy.to_string(),
            Ok(Reduction::Trend(trend)) => format!("trend({} over {})", trend.y, trend.x),
            Ok(Reduction::Passthrough) => "passthrough".to_string(),
            Err(_) => "invalid".to_string(),
        };

        Row::new(vec![
            TableCell::new(recipe.name.green()),
            TableCell::new(recipe.scope),
            TableCell::new(format!("{:?}", recipe.group_by).to_lowercase()),
            TableCell::new(reduction),
            TableCell::new(&recipe.description),
        ])
    }));

    Table::builder()
        .rows(table_rows)
        .style(TableStyle::rounded())
        .build()
        .render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        diagnostics::Diagnostics,
        label::{LabelParser, LabelSchema},
        metrics::Metric,
        reducer::{Recipe, SweepReducer},
        selector::SelectionPolicy,
        source::Source,
    };

    fn summary() -> anyhow::Result<SweepSummary> {
        let csv = "\
Algorithm,PowerConsumption,ViolationPct,TotalTimeTaken,Hosts
ACO_Ants10_Iters5_Evap0.1_times_1,100,5,40,8
ACO_Ants10_Iters5_Evap0.1_times_1,80,5,40,8
PSO_times_1,200,1,10,4
";
        let source = Source::from_reader("sweep.csv", csv.as_bytes(), &mut Diagnostics::new())
            .map_err(|d| anyhow::anyhow!("{d}"))?;
        let recipe: Recipe = toml::from_str(
            r#"
            name = "cheapest"
            select = { min_by = "power_consumption" }
            "#,
        )?;
        assert_eq!(recipe.select, Some(SelectionPolicy::MinBy(Metric::PowerConsumption)));

        let parser = LabelParser::new(&LabelSchema::default())?;
        SweepReducer::new(recipe, parser)?.reduce(&[source])
    }

    #[test]
    fn records_csv_has_hyperparameter_and_passthrough_columns() -> anyhow::Result<()> {
        let summary = summary()?;
        let mut out = vec![];
        write_csv(&summary, View::Records, &mut out)?;
        let out = String::from_utf8(out)?;
        let lines = out.lines().collect_vec();

        assert_eq!(
            lines[0],
            "Source,Group,Algorithm,AlgorithmFamily,RunId,Ants,Iters,Evap,PowerConsumption,\
ViolationPct,TotalTimeTaken,SLA_SuccessPct,EnergySavedPct,Candidates,TimePerIteration,Hosts"
        );
        assert_eq!(
            lines[1],
            "sweep.csv,ACO#1,ACO_Ants10_Iters5_Evap0.1_times_1,ACO,1,10,5,0.1,80,5,40,95,60,2,20,8"
        );
        // PSO carries no hyperparameters
        assert_eq!(lines[2], "sweep.csv,PSO#1,PSO_times_1,PSO,1,,,,200,1,10,99,0,1,10,4");
        Ok(())
    }

    #[test]
    fn json_contains_records_and_diagnostics() -> anyhow::Result<()> {
        let summary = summary()?;
        let mut out = vec![];
        write_json(&summary, &mut out)?;
        let json: serde_json::Value = serde_json::from_slice(&out)?;

        assert_eq!(json["recipe"], "cheapest");
        assert_eq!(json["records"][0]["hyperparameters"]["Ants"], 10.0);
        assert_eq!(json["records"][0]["extra"]["Hosts"], "8");
        assert!(json["diagnostics"].as_array().is_some_and(|d| d.is_empty()));
        Ok(())
    }

    #[test]
    fn table_lists_every_record() -> anyhow::Result<()> {
        colored::control::set_override(false);
        let summary = summary()?;
        let rendered = render_table(&summary, View::primary(&summary));

        assert!(rendered.contains("cheapest"));
        assert!(rendered.contains("ACO#1"));
        assert!(rendered.contains("PSO#1"));
        assert!(rendered.contains("TimePerIteration"));
        // PSO has no hyperparameters
        assert!(rendered.contains("--"));
        Ok(())
    }

    #[test]
    fn recipes_are_listed_with_their_reduction() -> anyhow::Result<()> {
        colored::control::set_override(false);
        let rendered = render_recipes(&Config::builtin()?);

        assert!(rendered.contains("best-power-per-run"));
        assert!(rendered.contains("min_by(power_consumption)"));
        assert!(rendered.contains("trend(sla_success_pct over energy_saved_pct)"));
        assert!(rendered.contains("passthrough"));
        Ok(())
    }
}
