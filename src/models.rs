use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;

/// One row of the visit dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitRecord {
    pub farm_name: Option<String>,
    pub group_id: Option<String>,
    pub visit_date: Option<NaiveDate>,
    pub score_1_pct: Option<f64>,
    pub score_2_pct: Option<f64>,
    pub score_3_pct: Option<f64>,
    pub score_4_pct: Option<f64>,
    pub score_1: Option<f64>,
    pub score_2: Option<f64>,
    pub score_3: Option<f64>,
    pub score_4: Option<f64>,
    pub data_issue: Option<bool>,
}

impl VisitRecord {
    pub fn is_flagged(&self) -> bool {
        self.data_issue == Some(true)
    }

    pub fn score(&self, column: ScoreColumn) -> Option<f64> {
        match column {
            ScoreColumn::Score1 => self.score_1_pct,
            ScoreColumn::Score2 => self.score_2_pct,
            ScoreColumn::Score3 => self.score_3_pct,
            ScoreColumn::Score4 => self.score_4_pct,
        }
    }
}

/// The four hygiene-score percentage columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScoreColumn {
    Score1,
    Score2,
    Score3,
    Score4,
}

impl ScoreColumn {
    pub const ALL: [ScoreColumn; 4] = [
        ScoreColumn::Score1,
        ScoreColumn::Score2,
        ScoreColumn::Score3,
        ScoreColumn::Score4,
    ];

    pub fn column_name(self) -> &'static str {
        match self {
            ScoreColumn::Score1 => "score_1_pct",
            ScoreColumn::Score2 => "score_2_pct",
            ScoreColumn::Score3 => "score_3_pct",
            ScoreColumn::Score4 => "score_4_pct",
        }
    }

    /// Chart-style label, e.g. "Score 3".
    pub fn label(self) -> &'static str {
        match self {
            ScoreColumn::Score1 => "Score 1",
            ScoreColumn::Score2 => "Score 2",
            ScoreColumn::Score3 => "Score 3",
            ScoreColumn::Score4 => "Score 4",
        }
    }
}

impl fmt::Display for ScoreColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

impl FromStr for ScoreColumn {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ScoreColumn::ALL
            .into_iter()
            .find(|column| column.column_name() == value)
            .ok_or_else(|| {
                format!("unknown score column `{value}` (expected score_1_pct..score_4_pct)")
            })
    }
}

/// Registry entry for a client, read-only once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientProfile {
    pub name: String,
    pub logo: Option<PathBuf>,
    pub data: Option<PathBuf>,
}

/// Per-column values for the four score percentages. Missing means no
/// value was available to report for that column.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ScoreSet {
    pub score_1_pct: Option<f64>,
    pub score_2_pct: Option<f64>,
    pub score_3_pct: Option<f64>,
    pub score_4_pct: Option<f64>,
}

impl ScoreSet {
    pub fn get(&self, column: ScoreColumn) -> Option<f64> {
        match column {
            ScoreColumn::Score1 => self.score_1_pct,
            ScoreColumn::Score2 => self.score_2_pct,
            ScoreColumn::Score3 => self.score_3_pct,
            ScoreColumn::Score4 => self.score_4_pct,
        }
    }

    pub fn set(&mut self, column: ScoreColumn, value: Option<f64>) {
        match column {
            ScoreColumn::Score1 => self.score_1_pct = value,
            ScoreColumn::Score2 => self.score_2_pct = value,
            ScoreColumn::Score3 => self.score_3_pct = value,
            ScoreColumn::Score4 => self.score_4_pct = value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestVisit {
    pub visit_date: NaiveDate,
    pub group_id: Option<String>,
    pub scores: ScoreSet,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupScore {
    pub group_id: String,
    pub score_3_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRanking {
    pub best: GroupScore,
    pub worst: GroupScore,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub visit_date: NaiveDate,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreTrend {
    pub score: &'static str,
    pub points: Vec<TrendPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiTrendPoint {
    pub visit_date: NaiveDate,
    pub scores: ScoreSet,
}

/// A data_issue row surfaced for manual correction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlaggedVisit {
    pub visit_date: Option<NaiveDate>,
    pub group_id: Option<String>,
    pub score_1: Option<f64>,
    pub score_2: Option<f64>,
    pub score_3: Option<f64>,
    pub score_4: Option<f64>,
}
