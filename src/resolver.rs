use crate::errors::RegistryError;
use crate::model::LoadedModel;
use crate::registry::{ModelUri, RunQuery, RunRecord, TrackingStore};
use crate::retry::{retry_with_backoff, RetryConfig};
use log::info;

/// Finds the lowest-error run of an experiment and loads its model.
pub struct ModelResolver<'a, S: TrackingStore> {
    store: &'a S,
    metric: String,
    max_results: usize,
    retry: RetryConfig,
}

impl<'a, S: TrackingStore> ModelResolver<'a, S> {
    pub fn new(store: &'a S, metric: &str) -> Self {
        Self {
            store,
            metric: metric.to_string(),
            max_results: 1,
            retry: RetryConfig {
                max_attempts: 1,
                ..RetryConfig::default()
            },
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The run with the minimum metric value. Ties keep the store's order.
    pub async fn best_run(&self, experiment_name: &str) -> Result<RunRecord, RegistryError> {
        let query = &RunQuery::best_by(&self.metric, self.max_results);
        let store = self.store;
        let runs = retry_with_backoff(
            &self.retry,
            "list runs",
            RegistryError::is_transient,
            move || store.list_runs(experiment_name, query),
        )
        .await?;

        let metric = self.metric.as_str();
        let best = runs
            .into_iter()
            .filter_map(|run| run.metric(metric).map(|value| (value, run)))
            // NaN or infinite scores never win
            .filter(|(value, _)| value.is_finite())
            .fold(None, |best: Option<(f64, RunRecord)>, (value, run)| match best {
                Some((best_value, _)) if best_value <= value => best,
                _ => Some((value, run)),
            });

        let (value, run) = best.ok_or_else(|| RegistryError::NoRuns {
            experiment: experiment_name.to_string(),
            metric: self.metric.clone(),
        })?;
        info!(
            "Best run in '{}': {} ({} = {})",
            experiment_name, run.run_id, self.metric, value
        );
        Ok(run)
    }

    pub async fn load(&self, run: &RunRecord) -> Result<LoadedModel, RegistryError> {
        let uri = ModelUri::for_run(&run.run_id);
        let store = self.store;
        let uri_ref = &uri;
        let artifact = retry_with_backoff(
            &self.retry,
            "load model",
            RegistryError::is_transient,
            move || store.load_model(uri_ref),
        )
        .await?;
        info!("Loaded model {}", uri);
        Ok(LoadedModel { uri, artifact })
    }

    /// Best run plus its loaded model.
    pub async fn resolve(&self, experiment_name: &str) -> Result<(RunRecord, LoadedModel), RegistryError> {
        let run = self.best_run(experiment_name).await?;
        let model = self.load(&run).await?;
        Ok((run, model))
    }
}
