//! The inference batch job: load features, keep each station's recent
//! window, resolve the best model, predict, write.
//!
//! Steps run strictly in sequence and the first failure aborts the run. No
//! state survives between invocations.

use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::feature_contract::FeatureContract;
use crate::metrics::METRICS;
use crate::parsers::csv_parser::read_feature_table;
use crate::predictor::Predictor;
use crate::registry::TrackingStore;
use crate::resolver::ModelResolver;
use crate::retry::tracking_retry_config;
use crate::selection::select_recent;
use crate::time_operation;
use crate::writer::write_predictions;
use log::info;
use std::path::PathBuf;

/// What one successful run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceSummary {
    pub run_id: String,
    pub model_uri: String,
    pub metric_value: Option<f64>,
    pub stations: usize,
    pub predictions: usize,
    pub output_path: PathBuf,
}

pub async fn run_inference<S: TrackingStore>(
    config: &PipelineConfig,
    store: &S,
    contract: FeatureContract,
) -> Result<InferenceSummary, PipelineError> {
    config.validate()?;
    METRICS.lock().reset();

    let table = time_operation!("load features", read_feature_table(&config.features_path))?;
    let stations = table.station_count();
    METRICS
        .lock()
        .record_features_loaded(table.len() as u64, stations as u64);

    let recent = time_operation!("select recent", select_recent(&table, config.window));
    METRICS.lock().record_selection(recent.len() as u64);
    info!(
        "Selected {} rows (last {} per station) from {} stations",
        recent.len(),
        config.window,
        stations
    );

    let resolver = ModelResolver::new(store, &config.metric)
        .with_max_results(config.max_results)
        .with_retry(tracking_retry_config(config.retry_max_attempts));
    let (run, model) = time_operation!(
        "resolve model",
        resolver.resolve(&config.experiment_name).await
    )?;
    let metric_value = run.metric(&config.metric);
    METRICS.lock().record_selected_run(&run.run_id, metric_value);
    let model_uri = model.uri.to_string();

    let predictor = Predictor::new(model, contract)?;
    let predictions = time_operation!("predict", predictor.predict(&recent))?;

    time_operation!(
        "write predictions",
        write_predictions(&config.output_path, &predictions)
    )?;
    METRICS
        .lock()
        .record_predictions_written(predictions.len() as u64);

    Ok(InferenceSummary {
        run_id: run.run_id,
        model_uri,
        metric_value,
        stations: recent.station_count(),
        predictions: predictions.len(),
        output_path: config.output_path.clone(),
    })
}
