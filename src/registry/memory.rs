use super::{ModelUri, RunQuery, RunRecord, TrackingStore};
use crate::errors::RegistryError;
use crate::model::ModelArtifact;
use std::collections::HashMap;

/// Tracking store held entirely in memory. Insertion order is the tie order
/// when two runs share a metric value.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTrackingStore {
    experiments: Vec<(String, Vec<RunRecord>)>,
    models: HashMap<String, ModelArtifact>,
}

impl InMemoryTrackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_experiment(&mut self, name: &str) {
        if !self.experiments.iter().any(|(n, _)| n == name) {
            self.experiments.push((name.to_string(), Vec::new()));
        }
    }

    /// Add a run, creating the experiment if needed. The run's
    /// `experiment_id` is set to the experiment name.
    pub fn add_run(&mut self, experiment_name: &str, mut run: RunRecord, artifact: Option<ModelArtifact>) {
        self.create_experiment(experiment_name);
        run.experiment_id = experiment_name.to_string();
        if let Some(artifact) = artifact {
            self.models.insert(run.run_id.clone(), artifact);
        }
        if let Some((_, runs)) = self.experiments.iter_mut().find(|(n, _)| n == experiment_name) {
            runs.push(run);
        }
    }
}

impl TrackingStore for InMemoryTrackingStore {
    async fn list_runs(
        &self,
        experiment_name: &str,
        query: &RunQuery,
    ) -> Result<Vec<RunRecord>, RegistryError> {
        let runs = self
            .experiments
            .iter()
            .find(|(n, _)| n == experiment_name)
            .map(|(_, runs)| runs.clone())
            .ok_or_else(|| RegistryError::ExperimentNotFound {
                name: experiment_name.to_string(),
            })?;
        Ok(query.apply(runs))
    }

    async fn load_model(&self, uri: &ModelUri) -> Result<ModelArtifact, RegistryError> {
        let artifact = self
            .models
            .get(uri.run_id())
            .cloned()
            .ok_or_else(|| RegistryError::ArtifactNotFound {
                uri: uri.to_string(),
            })?;
        artifact
            .validate()
            .map_err(|message| RegistryError::InvalidArtifact {
                uri: uri.to_string(),
                message,
            })?;
        Ok(artifact)
    }
}
