use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::error::LoadError;
use crate::models::VisitRecord;

const REQUIRED_COLUMNS: [&str; 6] = [
    "farm_name",
    "visit_date",
    "score_1_pct",
    "score_2_pct",
    "score_3_pct",
    "score_4_pct",
];

const ISSUE_COLUMN: &str = "data_issue";

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y", "%Y%m%d"];

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Visit rows held in memory for one session. Views over it are recomputed
/// on demand and never mutate the rows.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    records: Vec<VisitRecord>,
    has_issue_column: bool,
}

#[derive(Deserialize)]
struct CsvRow {
    #[serde(default)]
    farm_name: Option<String>,
    #[serde(default)]
    group_id: Option<String>,
    #[serde(default, deserialize_with = "tolerant_date")]
    visit_date: Option<NaiveDate>,
    #[serde(default)]
    score_1_pct: Option<f64>,
    #[serde(default)]
    score_2_pct: Option<f64>,
    #[serde(default)]
    score_3_pct: Option<f64>,
    #[serde(default)]
    score_4_pct: Option<f64>,
    #[serde(default)]
    score_1: Option<f64>,
    #[serde(default)]
    score_2: Option<f64>,
    #[serde(default)]
    score_3: Option<f64>,
    #[serde(default)]
    score_4: Option<f64>,
    #[serde(default, deserialize_with = "issue_flag")]
    data_issue: Option<bool>,
}

impl From<CsvRow> for VisitRecord {
    fn from(row: CsvRow) -> Self {
        VisitRecord {
            farm_name: row.farm_name,
            group_id: row.group_id,
            visit_date: row.visit_date,
            score_1_pct: finite(row.score_1_pct),
            score_2_pct: finite(row.score_2_pct),
            score_3_pct: finite(row.score_3_pct),
            score_4_pct: finite(row.score_4_pct),
            score_1: finite(row.score_1),
            score_2: finite(row.score_2),
            score_3: finite(row.score_3),
            score_4: finite(row.score_4),
            data_issue: row.data_issue,
        }
    }
}

impl Dataset {
    pub fn from_records(records: Vec<VisitRecord>, has_issue_column: bool) -> Self {
        Dataset {
            records,
            has_issue_column,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let file = File::open(path)?;
        let dataset = Self::from_reader(file)?;
        debug!(
            path = %path.display(),
            rows = dataset.records.len(),
            "loaded visit dataset"
        );
        Ok(dataset)
    }

    /// Reads a CSV dataset from any byte source, e.g. an uploaded file
    /// buffered in memory.
    pub fn from_reader<R: Read>(source: R) -> Result<Self, LoadError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        let headers = reader.headers()?.clone();

        if headers.is_empty() || headers.iter().all(str::is_empty) {
            return Err(LoadError::NotTabular);
        }
        for column in REQUIRED_COLUMNS {
            if !headers.iter().any(|header| header == column) {
                return Err(LoadError::MissingColumn(column));
            }
        }
        let has_issue_column = headers.iter().any(|header| header == ISSUE_COLUMN);

        let mut records = Vec::new();
        for result in reader.deserialize::<CsvRow>() {
            records.push(VisitRecord::from(result?));
        }

        Ok(Dataset {
            records,
            has_issue_column,
        })
    }

    pub fn records(&self) -> &[VisitRecord] {
        &self.records
    }

    pub fn has_issue_column(&self) -> bool {
        self.has_issue_column
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    /// Rows usable for analytics.
    pub fn clean(&self) -> impl Iterator<Item = &VisitRecord> {
        self.records.iter().filter(|record| !record.is_flagged())
    }

    /// Rows marked with a data issue, kept for review.
    pub fn flagged(&self) -> impl Iterator<Item = &VisitRecord> {
        self.records.iter().filter(|record| record.is_flagged())
    }

    /// Distinct farm names among clean rows, in order of first appearance.
    pub fn farms(&self) -> Vec<&str> {
        let mut farms: Vec<&str> = Vec::new();
        for name in self.clean().filter_map(|record| record.farm_name.as_deref()) {
            if !farms.contains(&name) {
                farms.push(name);
            }
        }
        farms
    }
}

/// Parses a visit date, returning `None` for anything unrecognised.
pub fn parse_visit_date(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
                .map(|datetime| datetime.date())
        })
}

fn parse_issue_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "1.0" => Some(true),
        "false" | "0" | "0.0" => Some(false),
        _ => None,
    }
}

fn tolerant_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let parsed = raw.as_deref().and_then(parse_visit_date);
    if parsed.is_none() {
        if let Some(value) = raw.as_deref().filter(|value| !value.trim().is_empty()) {
            debug!(value, "unparseable visit_date treated as missing");
        }
    }
    Ok(parsed)
}

fn issue_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_issue_flag))
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|number| number.is_finite())
}
