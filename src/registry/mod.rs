//! Access to the experiment-tracking service.
//!
//! The pipeline only needs two capabilities from a tracking backend: list the
//! runs of an experiment ordered by a metric, and load the model stored with a
//! run. [`TrackingStore`] captures exactly that.

pub mod file_store;
pub mod memory;
pub mod mlflow;

use crate::config::TrackingConfig;
use crate::errors::RegistryError;
use crate::model::ModelArtifact;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub use file_store::FileTrackingStore;
pub use memory::InMemoryTrackingStore;
pub use mlflow::MlflowClient;

/// Artifact directory the training job logs the model under.
pub const MODEL_ARTIFACT_PATH: &str = "model";
/// File inside [`MODEL_ARTIFACT_PATH`] holding the portable model export.
pub const MODEL_FILE_NAME: &str = "model.json";

/// Tag under which MLflow stores a run's display name.
pub const RUN_NAME_TAG: &str = "mlflow.runName";

/// Metadata about one completed training run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub run_id: String,
    pub experiment_id: String,
    pub run_name: Option<String>,
    pub metrics: HashMap<String, f64>,
    pub tags: HashMap<String, String>,
}

impl RunRecord {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    /// Name shown in model comparisons: the run-name tag, then the run name.
    pub fn display_name(&self) -> Option<&str> {
        self.tags
            .get(RUN_NAME_TAG)
            .map(String::as_str)
            .or(self.run_name.as_deref())
    }
}

/// How runs are ordered and limited when listed.
#[derive(Debug, Clone, PartialEq)]
pub struct RunQuery {
    /// Metric to sort on, ascending. Runs lacking it sort last.
    pub order_by_metric: String,
    pub max_results: Option<usize>,
}

impl RunQuery {
    pub fn best_by(metric: &str, max_results: usize) -> Self {
        Self {
            order_by_metric: metric.to_string(),
            max_results: Some(max_results),
        }
    }

    pub fn all_by(metric: &str) -> Self {
        Self {
            order_by_metric: metric.to_string(),
            max_results: None,
        }
    }

    /// Stable ascending sort plus limit, for backends that hold runs locally.
    pub(crate) fn apply(&self, mut runs: Vec<RunRecord>) -> Vec<RunRecord> {
        let metric = self.order_by_metric.as_str();
        runs.sort_by(|a, b| match (a.metric(metric), b.metric(metric)) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        if let Some(limit) = self.max_results {
            runs.truncate(limit);
        }
        runs
    }
}

/// Reference to a model stored with a run, `runs:/<run_id>/<artifact_path>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelUri {
    run_id: String,
    artifact_path: String,
}

impl ModelUri {
    pub fn for_run(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            artifact_path: MODEL_ARTIFACT_PATH.to_string(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn artifact_path(&self) -> &str {
        &self.artifact_path
    }

    /// Run-relative path of the model export file.
    pub fn model_file_path(&self) -> String {
        format!("{}/{}", self.artifact_path, MODEL_FILE_NAME)
    }
}

impl fmt::Display for ModelUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "runs:/{}/{}", self.run_id, self.artifact_path)
    }
}

impl FromStr for ModelUri {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |message: &str| RegistryError::InvalidModelUri {
            uri: s.to_string(),
            message: message.to_string(),
        };
        let rest = s
            .strip_prefix("runs:/")
            .ok_or_else(|| invalid("expected the 'runs:/' scheme"))?;
        let (run_id, artifact_path) = rest
            .split_once('/')
            .ok_or_else(|| invalid("expected runs:/<run_id>/<artifact_path>"))?;
        let artifact_path = artifact_path.trim_end_matches('/');
        if run_id.is_empty() || artifact_path.is_empty() {
            return Err(invalid("run id and artifact path must be non-empty"));
        }
        Ok(Self {
            run_id: run_id.to_string(),
            artifact_path: artifact_path.to_string(),
        })
    }
}

/// Capability interface over a tracking service.
#[allow(async_fn_in_trait)]
pub trait TrackingStore {
    /// Runs of the named experiment, ordered by `query.order_by_metric`
    /// ascending. Ties keep the backend's own order.
    async fn list_runs(
        &self,
        experiment_name: &str,
        query: &RunQuery,
    ) -> Result<Vec<RunRecord>, RegistryError>;

    /// Fetch and decode the model stored at `uri`.
    async fn load_model(&self, uri: &ModelUri) -> Result<ModelArtifact, RegistryError>;
}

/// Backend picked from the tracking URI: HTTP(S) goes to an MLflow server,
/// anything else is a local registry directory.
#[derive(Debug)]
pub enum TrackingBackend {
    Mlflow(MlflowClient),
    File(FileTrackingStore),
}

impl TrackingBackend {
    pub fn from_config(config: &TrackingConfig) -> Result<Self, RegistryError> {
        let uri = config.tracking_uri.as_str();
        if uri.starts_with("http://") || uri.starts_with("https://") {
            Ok(TrackingBackend::Mlflow(MlflowClient::new(config)?))
        } else {
            let root = uri.strip_prefix("file://").unwrap_or(uri);
            Ok(TrackingBackend::File(FileTrackingStore::new(root)))
        }
    }
}

impl TrackingStore for TrackingBackend {
    async fn list_runs(
        &self,
        experiment_name: &str,
        query: &RunQuery,
    ) -> Result<Vec<RunRecord>, RegistryError> {
        match self {
            TrackingBackend::Mlflow(client) => client.list_runs(experiment_name, query).await,
            TrackingBackend::File(store) => store.list_runs(experiment_name, query).await,
        }
    }

    async fn load_model(&self, uri: &ModelUri) -> Result<ModelArtifact, RegistryError> {
        match self {
            TrackingBackend::Mlflow(client) => client.load_model(uri).await,
            TrackingBackend::File(store) => store.load_model(uri).await,
        }
    }
}

/// Decode and validate a downloaded model export.
pub(crate) fn decode_artifact(uri: &ModelUri, bytes: &[u8]) -> Result<ModelArtifact, RegistryError> {
    let artifact: ModelArtifact =
        serde_json::from_slice(bytes).map_err(|e| RegistryError::InvalidArtifact {
            uri: uri.to_string(),
            message: e.to_string(),
        })?;
    artifact
        .validate()
        .map_err(|message| RegistryError::InvalidArtifact {
            uri: uri.to_string(),
            message,
        })?;
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(id: &str, mae: Option<f64>) -> RunRecord {
        RunRecord {
            run_id: id.to_string(),
            experiment_id: "1".to_string(),
            run_name: None,
            metrics: mae.map(|v| HashMap::from([("mae".to_string(), v)])).unwrap_or_default(),
            tags: HashMap::new(),
        }
    }

    #[test]
    fn test_model_uri_round_trip() {
        let uri = ModelUri::for_run("abc123");
        assert_eq!(uri.to_string(), "runs:/abc123/model");
        assert_eq!("runs:/abc123/model".parse::<ModelUri>().unwrap(), uri);
        assert_eq!(uri.model_file_path(), "model/model.json");
    }

    #[test]
    fn test_model_uri_rejects_other_schemes() {
        assert!("models:/citibike/1".parse::<ModelUri>().is_err());
        assert!("runs:/abc123".parse::<ModelUri>().is_err());
        assert!("runs://model".parse::<ModelUri>().is_err());
    }

    #[test]
    fn test_query_orders_ascending_and_limits() {
        let runs = vec![run("a", Some(3.2)), run("b", None), run("c", Some(2.1)), run("d", Some(2.1))];
        let ordered = RunQuery::all_by("mae").apply(runs.clone());
        let ids: Vec<&str> = ordered.iter().map(|r| r.run_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "d", "a", "b"]);

        let best = RunQuery::best_by("mae", 1).apply(runs);
        assert_eq!(best.len(), 1);
        assert_eq!(best[0].run_id, "c");
    }

    #[test]
    fn test_display_name_prefers_tag() {
        let mut record = run("a", Some(1.0));
        assert_eq!(record.display_name(), None);
        record.run_name = Some("bright-owl-42".to_string());
        assert_eq!(record.display_name(), Some("bright-owl-42"));
        record.tags.insert(RUN_NAME_TAG.to_string(), "xgboost".to_string());
        assert_eq!(record.display_name(), Some("xgboost"));
    }
}
