//! Tracking registry kept in a local directory.
//!
//! ```text
//! <root>/<experiment_name>/<run_id>/run.json
//! <root>/<experiment_name>/<run_id>/artifacts/model/model.json
//! ```

use super::{decode_artifact, ModelUri, RunQuery, RunRecord, TrackingStore};
use crate::errors::RegistryError;
use crate::model::ModelArtifact;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const RUN_FILE: &str = "run.json";
const ARTIFACTS_DIR: &str = "artifacts";

#[derive(Debug, Clone)]
pub struct FileTrackingStore {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct RunFile {
    run_id: String,
    #[serde(default)]
    run_name: Option<String>,
    #[serde(default)]
    metrics: HashMap<String, f64>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> RegistryError + '_ {
    move |source| RegistryError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Sub-directories of `dir`, sorted by name.
fn sorted_subdirs(dir: &Path) -> Result<Vec<PathBuf>, RegistryError> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error(dir))? {
        let entry = entry.map_err(io_error(dir))?;
        if entry.file_type().map_err(io_error(dir))?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

impl FileTrackingStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Record a finished run and its model export.
    pub fn log_run(
        &self,
        experiment_name: &str,
        record: &RunRecord,
        artifact: &ModelArtifact,
    ) -> Result<(), RegistryError> {
        let run_dir = self.root.join(experiment_name).join(&record.run_id);
        let uri = ModelUri::for_run(&record.run_id);
        let model_dir = run_dir.join(ARTIFACTS_DIR).join(uri.artifact_path());
        fs::create_dir_all(&model_dir).map_err(io_error(&model_dir))?;

        let run_file = RunFile {
            run_id: record.run_id.clone(),
            run_name: record.run_name.clone(),
            metrics: record.metrics.clone(),
            tags: record.tags.clone(),
        };
        let run_path = run_dir.join(RUN_FILE);
        let encoded = serde_json::to_vec_pretty(&run_file).map_err(|e| RegistryError::Io {
            path: run_path.clone(),
            source: e.into(),
        })?;
        fs::write(&run_path, encoded).map_err(io_error(&run_path))?;

        let model_path = run_dir.join(ARTIFACTS_DIR).join(uri.model_file_path());
        let encoded = serde_json::to_vec_pretty(artifact).map_err(|e| RegistryError::Io {
            path: model_path.clone(),
            source: e.into(),
        })?;
        fs::write(&model_path, encoded).map_err(io_error(&model_path))?;
        Ok(())
    }

    fn read_run(&self, experiment_id: &str, run_dir: &Path) -> Result<Option<RunRecord>, RegistryError> {
        let path = run_dir.join(RUN_FILE);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Skipping {}: no {}", run_dir.display(), RUN_FILE);
                return Ok(None);
            }
            Err(e) => return Err(io_error(&path)(e)),
        };
        let run: RunFile = serde_json::from_slice(&bytes).map_err(|e| RegistryError::Io {
            path: path.clone(),
            source: e.into(),
        })?;
        Ok(Some(RunRecord {
            run_id: run.run_id,
            experiment_id: experiment_id.to_string(),
            run_name: run.run_name,
            metrics: run.metrics,
            tags: run.tags,
        }))
    }

    fn find_run_dir(&self, run_id: &str) -> Result<Option<PathBuf>, RegistryError> {
        if !self.root.is_dir() {
            return Ok(None);
        }
        for experiment_dir in sorted_subdirs(&self.root)? {
            let candidate = experiment_dir.join(run_id);
            if candidate.is_dir() {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }
}

impl TrackingStore for FileTrackingStore {
    async fn list_runs(
        &self,
        experiment_name: &str,
        query: &RunQuery,
    ) -> Result<Vec<RunRecord>, RegistryError> {
        let experiment_dir = self.root.join(experiment_name);
        if !experiment_dir.is_dir() {
            return Err(RegistryError::ExperimentNotFound {
                name: experiment_name.to_string(),
            });
        }
        let mut runs = Vec::new();
        for run_dir in sorted_subdirs(&experiment_dir)? {
            if let Some(run) = self.read_run(experiment_name, &run_dir)? {
                runs.push(run);
            }
        }
        debug!(
            "Found {} runs under {}",
            runs.len(),
            experiment_dir.display()
        );
        Ok(query.apply(runs))
    }

    async fn load_model(&self, uri: &ModelUri) -> Result<ModelArtifact, RegistryError> {
        let not_found = || RegistryError::ArtifactNotFound {
            uri: uri.to_string(),
        };
        let run_dir = self.find_run_dir(uri.run_id())?.ok_or_else(not_found)?;
        let path = run_dir.join(ARTIFACTS_DIR).join(uri.model_file_path());
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(io_error(&path)(e)),
        };
        decode_artifact(uri, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LinearModel;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "citibike_forecast_file_store_{}_{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn record(run_id: &str, mae: f64) -> RunRecord {
        RunRecord {
            run_id: run_id.to_string(),
            experiment_id: String::new(),
            run_name: Some(format!("{}-name", run_id)),
            metrics: HashMap::from([("mae".to_string(), mae)]),
            tags: HashMap::new(),
        }
    }

    fn artifact(intercept: f64) -> ModelArtifact {
        ModelArtifact::Linear(LinearModel {
            feature_names: vec!["hour".to_string()],
            intercept,
            coefficients: vec![1.0],
        })
    }

    #[tokio::test]
    async fn test_logged_runs_are_listed_and_loadable() {
        let root = scratch_dir("listed");
        let store = FileTrackingStore::new(&root);
        store.log_run("citibike", &record("r1", 3.2), &artifact(1.0)).unwrap();
        store.log_run("citibike", &record("r2", 2.1), &artifact(2.0)).unwrap();

        let runs = store
            .list_runs("citibike", &RunQuery::all_by("mae"))
            .await
            .unwrap();
        let ids: Vec<&str> = runs.iter().map(|r| r.run_id.as_str()).collect();
        assert_eq!(ids, vec!["r2", "r1"]);
        assert_eq!(runs[0].experiment_id, "citibike");

        let loaded = store.load_model(&ModelUri::for_run("r2")).await.unwrap();
        assert_eq!(loaded, artifact(2.0));

        fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_unknown_experiment_and_run() {
        let root = scratch_dir("unknown");
        let store = FileTrackingStore::new(&root);
        store.log_run("citibike", &record("r1", 1.0), &artifact(0.0)).unwrap();

        let err = store
            .list_runs("nope", &RunQuery::best_by("mae", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::ExperimentNotFound { .. }));

        let err = store.load_model(&ModelUri::for_run("r404")).await.unwrap_err();
        assert!(matches!(err, RegistryError::ArtifactNotFound { .. }));

        fs::remove_dir_all(&root).unwrap();
    }
}
