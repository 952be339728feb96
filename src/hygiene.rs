use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::dataset::Dataset;
use crate::models::{
    FlaggedVisit, GroupRanking, GroupScore, LatestVisit, MultiTrendPoint, ScoreColumn, ScoreSet,
    ScoreTrend, TrendPoint, VisitRecord,
};

#[derive(Debug, Clone, Copy, Default)]
struct Mean {
    total: f64,
    count: usize,
}

impl Mean {
    fn push(&mut self, value: Option<f64>) {
        if let Some(value) = value {
            self.total += value;
            self.count += 1;
        }
    }

    fn value(self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.total / self.count as f64)
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ScoreMeans([Mean; 4]);

impl ScoreMeans {
    fn push(&mut self, record: &VisitRecord) {
        for (slot, column) in self.0.iter_mut().zip(ScoreColumn::ALL) {
            slot.push(record.score(column));
        }
    }

    fn values(self) -> ScoreSet {
        let mut set = ScoreSet::default();
        for (slot, column) in self.0.into_iter().zip(ScoreColumn::ALL) {
            set.set(column, slot.value());
        }
        set
    }
}

/// Two-decimal rounding with ties to even.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

/// Clean rows belonging to `farm`, matched exactly.
pub fn farm_data<'a, I>(records: I, farm: &str) -> Vec<&'a VisitRecord>
where
    I: IntoIterator<Item = &'a VisitRecord>,
{
    records
        .into_iter()
        .filter(|record| !record.is_flagged())
        .filter(|record| record.farm_name.as_deref() == Some(farm))
        .collect()
}

/// The most recent dated visit. Rows without a date never qualify; on a
/// date tie the row appearing last wins.
pub fn latest_visit_summary(farm_data: &[&VisitRecord]) -> Option<LatestVisit> {
    farm_data
        .iter()
        .filter_map(|record| record.visit_date.map(|date| (date, *record)))
        .max_by_key(|(date, _)| *date)
        .map(|(visit_date, record)| LatestVisit {
            visit_date,
            group_id: record.group_id.clone(),
            scores: ScoreSet {
                score_1_pct: record.score_1_pct,
                score_2_pct: record.score_2_pct,
                score_3_pct: record.score_3_pct,
                score_4_pct: record.score_4_pct,
            },
        })
}

/// Column means over every row, rounded to two decimals. Columns with no
/// values stay empty.
pub fn historical_averages(farm_data: &[&VisitRecord]) -> Option<ScoreSet> {
    if farm_data.is_empty() {
        return None;
    }

    let mut means = ScoreMeans::default();
    for record in farm_data {
        means.push(record);
    }

    let mut averages = means.values();
    for column in ScoreColumn::ALL {
        averages.set(column, averages.get(column).map(round2));
    }
    Some(averages)
}

/// Best and worst group by mean score 3 percentage. Ties resolve to the
/// lexicographically first group id.
pub fn group_rankings(farm_data: &[&VisitRecord]) -> Option<GroupRanking> {
    let mut groups: BTreeMap<&str, Mean> = BTreeMap::new();
    for record in farm_data {
        if let Some(group_id) = record.group_id.as_deref() {
            groups.entry(group_id).or_default().push(record.score_3_pct);
        }
    }

    let mut best: Option<(&str, f64)> = None;
    let mut worst: Option<(&str, f64)> = None;
    for (group_id, mean) in groups {
        let Some(value) = mean.value() else {
            continue;
        };
        if best.map_or(true, |(_, current)| value < current) {
            best = Some((group_id, value));
        }
        if worst.map_or(true, |(_, current)| value > current) {
            worst = Some((group_id, value));
        }
    }

    let (best, worst) = best.zip(worst)?;
    Some(GroupRanking {
        best: GroupScore {
            group_id: best.0.to_string(),
            score_3_pct: round2(best.1),
        },
        worst: GroupScore {
            group_id: worst.0.to_string(),
            score_3_pct: round2(worst.1),
        },
    })
}

/// Per-date mean of one score column, ascending by date.
pub fn score_trend(farm_data: &[&VisitRecord], column: ScoreColumn) -> ScoreTrend {
    let mut by_date: BTreeMap<NaiveDate, Mean> = BTreeMap::new();
    for record in farm_data {
        if let Some(date) = record.visit_date {
            by_date.entry(date).or_default().push(record.score(column));
        }
    }

    ScoreTrend {
        score: column.column_name(),
        points: by_date
            .into_iter()
            .map(|(visit_date, mean)| TrendPoint {
                visit_date,
                value: mean.value(),
            })
            .collect(),
    }
}

/// Per-date means of all four score columns on a shared date axis.
pub fn all_score_trend(farm_data: &[&VisitRecord]) -> Vec<MultiTrendPoint> {
    let mut by_date: BTreeMap<NaiveDate, ScoreMeans> = BTreeMap::new();
    for record in farm_data {
        if let Some(date) = record.visit_date {
            by_date.entry(date).or_default().push(record);
        }
    }

    by_date
        .into_iter()
        .map(|(visit_date, means)| MultiTrendPoint {
            visit_date,
            scores: means.values(),
        })
        .collect()
}

/// Flagged rows for `farm` with their raw counts. `None` when the dataset
/// carries no data_issue column at all.
pub fn flagged_review(dataset: &Dataset, farm: &str) -> Option<Vec<FlaggedVisit>> {
    if !dataset.has_issue_column() {
        return None;
    }

    Some(
        dataset
            .flagged()
            .filter(|record| record.farm_name.as_deref() == Some(farm))
            .map(|record| FlaggedVisit {
                visit_date: record.visit_date,
                group_id: record.group_id.clone(),
                score_1: record.score_1,
                score_2: record.score_2,
                score_3: record.score_3,
                score_4: record.score_4,
            })
            .collect(),
    )
}
