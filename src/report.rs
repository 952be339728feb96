use std::fmt::Write;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::dataset::Dataset;
use crate::hygiene;
use crate::models::{
    ClientProfile, FlaggedVisit, GroupRanking, LatestVisit, MultiTrendPoint, ScoreColumn, ScoreSet,
    ScoreTrend,
};

const NO_DATA: &str = "No data for this farm.";
const BAR_WIDTH: f64 = 40.0;

pub fn fmt_pct(value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{value:.2}%"),
        None => "n/a".to_string(),
    }
}

/// Horizontal bar for a 0-100 percentage.
fn bar(value: Option<f64>) -> String {
    let Some(value) = value else {
        return String::new();
    };
    let filled = (value.clamp(0.0, 100.0) / 100.0 * BAR_WIDTH).round() as usize;
    "#".repeat(filled)
}

pub fn to_json<T: Serialize>(farm: &str, view: &str, value: &T) -> anyhow::Result<String> {
    let mut object = Map::new();
    object.insert("farm".to_string(), Value::from(farm));
    object.insert(view.to_string(), serde_json::to_value(value)?);
    Ok(serde_json::to_string_pretty(&Value::Object(object))?)
}

pub fn render_header(profile: &ClientProfile) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "{}", profile.name);
    if let Some(logo) = &profile.logo {
        let _ = writeln!(output, "logo: {}", logo.display());
    }
    output
}

pub fn render_farms(farms: &[&str]) -> String {
    let mut output = String::new();
    if farms.is_empty() {
        let _ = writeln!(output, "No farms with clean visit data.");
        return output;
    }
    for farm in farms {
        let _ = writeln!(output, "- {farm}");
    }
    output
}

fn write_scores(output: &mut String, scores: &ScoreSet) {
    for column in ScoreColumn::ALL {
        let _ = writeln!(output, "- {} (%): {}", column.label(), fmt_pct(scores.get(column)));
    }
}

pub fn render_latest(latest: Option<&LatestVisit>) -> String {
    let mut output = String::new();
    let Some(latest) = latest else {
        let _ = writeln!(output, "{NO_DATA}");
        return output;
    };
    let _ = writeln!(
        output,
        "Date: {} | Group: {}",
        latest.visit_date,
        latest.group_id.as_deref().unwrap_or("n/a")
    );
    write_scores(&mut output, &latest.scores);
    output
}

pub fn render_averages(averages: Option<&ScoreSet>) -> String {
    let mut output = String::new();
    match averages {
        Some(averages) => write_scores(&mut output, averages),
        None => {
            let _ = writeln!(output, "{NO_DATA}");
        }
    }
    output
}

pub fn render_rankings(ranking: Option<&GroupRanking>) -> String {
    let mut output = String::new();
    match ranking {
        Some(ranking) => {
            let _ = writeln!(
                output,
                "Best Hygiene (lowest Score 3 %): {} {:.2}%",
                ranking.best.group_id, ranking.best.score_3_pct
            );
            let _ = writeln!(
                output,
                "Worst Hygiene (highest Score 3 %): {} {:.2}%",
                ranking.worst.group_id, ranking.worst.score_3_pct
            );
        }
        None => {
            let _ = writeln!(output, "{NO_DATA}");
        }
    }
    output
}

pub fn render_trend(trend: &ScoreTrend) -> String {
    let mut output = String::new();
    if trend.points.is_empty() {
        let _ = writeln!(output, "{NO_DATA}");
        return output;
    }
    let _ = writeln!(output, "{} over time (% of cows)", trend.score);
    for point in &trend.points {
        let _ = writeln!(
            output,
            "{}  {:>8}  {}",
            point.visit_date,
            fmt_pct(point.value),
            bar(point.value)
        );
    }
    output
}

pub fn render_all_trends(trend: &[MultiTrendPoint]) -> String {
    let mut output = String::new();
    if trend.is_empty() {
        let _ = writeln!(output, "{NO_DATA}");
        return output;
    }
    let _ = writeln!(
        output,
        "{:<10}  {:>8}  {:>8}  {:>8}  {:>8}",
        "date", "Score 1", "Score 2", "Score 3", "Score 4"
    );
    for point in trend {
        let _ = write!(output, "{}", point.visit_date);
        for column in ScoreColumn::ALL {
            let _ = write!(output, "  {:>8}", fmt_pct(point.scores.get(column)));
        }
        let _ = writeln!(output);
    }
    output
}

fn fmt_count(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |value| format!("{value}"))
}

pub fn render_flagged(flagged: Option<&[FlaggedVisit]>) -> String {
    let mut output = String::new();
    let Some(flagged) = flagged else {
        let _ = writeln!(output, "No 'data_issue' column found in dataset.");
        return output;
    };
    if flagged.is_empty() {
        let _ = writeln!(output, "No flagged visits for this farm.");
        return output;
    }
    let _ = writeln!(
        output,
        "| visit_date | group_id | score_1 | score_2 | score_3 | score_4 |"
    );
    let _ = writeln!(output, "|---|---|---|---|---|---|");
    for visit in flagged {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {} | {} |",
            visit
                .visit_date
                .map_or_else(|| "-".to_string(), |date| date.to_string()),
            visit.group_id.as_deref().unwrap_or("-"),
            fmt_count(visit.score_1),
            fmt_count(visit.score_2),
            fmt_count(visit.score_3),
            fmt_count(visit.score_4)
        );
    }
    output
}

/// Every view for one farm as a single markdown document.
pub fn build_report(profile: &ClientProfile, dataset: &Dataset, farm: &str) -> String {
    let farm_data = hygiene::farm_data(dataset.clean(), farm);

    let mut output = String::new();
    let _ = writeln!(output, "# Udder Hygiene Dashboard: {}", profile.name);
    let _ = writeln!(
        output,
        "Farm {} ({} clean visits, {} flagged in dataset)",
        farm,
        farm_data.len(),
        dataset.flagged().count()
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Last Visit Summary");
    output.push_str(&render_latest(hygiene::latest_visit_summary(&farm_data).as_ref()));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Historical Averages");
    output.push_str(&render_averages(hygiene::historical_averages(&farm_data).as_ref()));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Group Hygiene Rankings");
    output.push_str(&render_rankings(hygiene::group_rankings(&farm_data).as_ref()));

    let _ = writeln!(output);
    let _ = writeln!(output, "## All Score Trends");
    let _ = writeln!(output, "```");
    output.push_str(&render_all_trends(&hygiene::all_score_trend(&farm_data)));
    let _ = writeln!(output, "```");

    if dataset.has_issue_column() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Needs Review (Flagged Data)");
        output.push_str(&render_flagged(
            hygiene::flagged_review(dataset, farm).as_deref(),
        ));
    }

    output
}
