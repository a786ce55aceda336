use log::info;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Global metrics instance
pub static METRICS: Lazy<Mutex<Metrics>> = Lazy::new(|| Mutex::new(Metrics::new()));

/// Counters and stage timings for one inference run
#[derive(Debug, Default)]
pub struct Metrics {
    pub feature_rows_loaded: u64,
    pub stations_seen: u64,
    pub rows_selected: u64,
    pub predictions_written: u64,
    pub selected_run_id: Option<String>,
    pub selected_metric_value: Option<f64>,
    /// Stage name and duration, in execution order.
    pub stage_times: Vec<(String, Duration)>,
    pub start_time: Option<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    /// Clear everything and restart the clock.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn record_features_loaded(&mut self, rows: u64, stations: u64) {
        self.feature_rows_loaded += rows;
        self.stations_seen = stations;
    }

    pub fn record_selection(&mut self, rows: u64) {
        self.rows_selected += rows;
    }

    pub fn record_selected_run(&mut self, run_id: &str, metric_value: Option<f64>) {
        self.selected_run_id = Some(run_id.to_string());
        self.selected_metric_value = metric_value;
    }

    pub fn record_predictions_written(&mut self, count: u64) {
        self.predictions_written += count;
    }

    pub fn record_stage_time(&mut self, stage: String, duration: Duration) {
        self.stage_times.push((stage, duration));
    }

    pub fn get_total_duration(&self) -> Duration {
        self.start_time
            .map(|start| start.elapsed())
            .unwrap_or_default()
    }

    pub fn log_summary(&self) {
        info!("========== Inference Run Summary ==========");
        info!("Total Duration: {:.2?}", self.get_total_duration());
        info!("Feature Rows Loaded: {}", self.feature_rows_loaded);
        info!("Stations: {}", self.stations_seen);
        info!("Rows In Recency Window: {}", self.rows_selected);
        match (&self.selected_run_id, self.selected_metric_value) {
            (Some(run), Some(value)) => info!("Model Run: {} (metric {:.4})", run, value),
            (Some(run), None) => info!("Model Run: {}", run),
            _ => info!("Model Run: <not resolved>"),
        }
        info!("Predictions Written: {}", self.predictions_written);
        for (stage, duration) in &self.stage_times {
            info!("  {}: {:.2?}", stage, duration);
        }
        info!("===========================================");
    }
}

/// Helper macro to time an operation
#[macro_export]
macro_rules! time_operation {
    ($name:expr, $op:expr) => {{
        let start = std::time::Instant::now();
        let result = $op;
        let duration = start.elapsed();
        $crate::metrics::METRICS
            .lock()
            .record_stage_time($name.to_string(), duration);
        result
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let mut metrics = Metrics::new();
        metrics.record_features_loaded(50, 1);
        metrics.record_selection(48);
        metrics.record_selected_run("b", Some(2.1));
        metrics.record_predictions_written(48);
        metrics.record_stage_time("predict".to_string(), Duration::from_millis(3));

        assert_eq!(metrics.feature_rows_loaded, 50);
        assert_eq!(metrics.rows_selected, 48);
        assert_eq!(metrics.selected_run_id.as_deref(), Some("b"));
        assert_eq!(metrics.stage_times.len(), 1);

        metrics.reset();
        assert_eq!(metrics.predictions_written, 0);
        assert!(metrics.selected_run_id.is_none());
    }
}
