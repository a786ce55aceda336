//! Numbers behind the prediction viewer and the model-comparison monitor.

use crate::data_models::PredictionRow;
use crate::registry::RunRecord;
use chrono::NaiveDateTime;

#[derive(Debug, Clone, PartialEq)]
pub struct StationSummary {
    pub station_id: String,
    pub total_predicted: f64,
    pub peak_predicted: f64,
    pub peak_at: NaiveDateTime,
    pub hours: usize,
}

/// Distinct station ids, sorted.
pub fn station_ids(rows: &[PredictionRow]) -> Vec<String> {
    let mut ids: Vec<String> = rows.iter().map(|r| r.station_id.clone()).collect();
    ids.sort();
    ids.dedup();
    ids
}

/// Rows of one station, ascending by timestamp.
pub fn station_rows(rows: &[PredictionRow], station_id: &str) -> Vec<PredictionRow> {
    let mut selected: Vec<PredictionRow> = rows
        .iter()
        .filter(|r| r.station_id == station_id)
        .cloned()
        .collect();
    selected.sort_by_key(|r| r.timestamp);
    selected
}

pub fn summarize_station(rows: &[PredictionRow], station_id: &str) -> Option<StationSummary> {
    let station = station_rows(rows, station_id);
    let first = station.first()?;
    let mut summary = StationSummary {
        station_id: station_id.to_string(),
        total_predicted: 0.0,
        peak_predicted: first.predicted_ride_count,
        peak_at: first.timestamp,
        hours: station.len(),
    };
    for row in &station {
        summary.total_predicted += row.predicted_ride_count;
        if row.predicted_ride_count > summary.peak_predicted {
            summary.peak_predicted = row.predicted_ride_count;
            summary.peak_at = row.timestamp;
        }
    }
    Some(summary)
}

/// Summaries for every station, ordered by station id.
pub fn summarize_all(rows: &[PredictionRow]) -> Vec<StationSummary> {
    station_ids(rows)
        .iter()
        .filter_map(|id| summarize_station(rows, id))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelScore {
    pub model: String,
    pub run_id: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelComparison {
    pub metric: String,
    /// Ascending by score.
    pub scores: Vec<ModelScore>,
}

impl ModelComparison {
    /// Runs without the metric are left out. Unnamed runs are labelled
    /// `Run <n>` by their position in `runs`.
    pub fn from_runs(runs: &[RunRecord], metric: &str) -> Self {
        let mut scores: Vec<ModelScore> = runs
            .iter()
            .enumerate()
            .filter_map(|(i, run)| {
                run.metric(metric).map(|score| ModelScore {
                    model: run
                        .display_name()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("Run {}", i + 1)),
                    run_id: run.run_id.clone(),
                    score,
                })
            })
            .collect();
        scores.sort_by(|a, b| a.score.total_cmp(&b.score));
        Self {
            metric: metric.to_string(),
            scores,
        }
    }

    pub fn best(&self) -> Option<&ModelScore> {
        self.scores.first()
    }

    pub fn worst(&self) -> Option<&ModelScore> {
        self.scores.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    fn row(station: &str, hour: u32, value: f64) -> PredictionRow {
        PredictionRow {
            station_id: station.to_string(),
            timestamp: NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
            predicted_ride_count: value,
        }
    }

    #[test]
    fn test_station_summary() {
        let rows = vec![row("B", 0, 1.0), row("A", 1, 4.5), row("A", 0, 2.0), row("A", 2, 3.0)];
        assert_eq!(station_ids(&rows), vec!["A", "B"]);

        let a = summarize_station(&rows, "A").unwrap();
        assert_relative_eq!(a.total_predicted, 9.5);
        assert_relative_eq!(a.peak_predicted, 4.5);
        assert_eq!(a.peak_at, row("A", 1, 0.0).timestamp);
        assert_eq!(a.hours, 3);

        assert!(summarize_station(&rows, "Z").is_none());
        assert_eq!(summarize_all(&rows).len(), 2);
    }

    #[test]
    fn test_station_rows_sorted() {
        let rows = vec![row("A", 5, 1.0), row("A", 2, 1.0), row("B", 1, 1.0)];
        let hours: Vec<u32> = station_rows(&rows, "A")
            .iter()
            .map(|r| chrono::Timelike::hour(&r.timestamp))
            .collect();
        assert_eq!(hours, vec![2, 5]);
    }

    #[test]
    fn test_model_comparison_names_and_order() {
        let run = |id: &str, name: Option<&str>, mae: Option<f64>| RunRecord {
            run_id: id.to_string(),
            experiment_id: "0".to_string(),
            run_name: name.map(str::to_string),
            metrics: mae.map(|v| HashMap::from([("mae".to_string(), v)])).unwrap_or_default(),
            tags: HashMap::new(),
        };
        let runs = vec![
            run("r1", Some("xgboost"), Some(3.2)),
            run("r2", None, Some(2.1)),
            run("r3", Some("baseline"), None),
        ];
        let comparison = ModelComparison::from_runs(&runs, "mae");

        assert_eq!(comparison.scores.len(), 2);
        assert_eq!(comparison.best().unwrap().model, "Run 2");
        assert_eq!(comparison.worst().unwrap().model, "xgboost");
        assert_relative_eq!(comparison.best().unwrap().score, 2.1);
    }
}
