//! Client for an MLflow-compatible tracking server (self-hosted or DagsHub).

use super::{decode_artifact, ModelUri, RunQuery, RunRecord, TrackingStore};
use crate::config::TrackingConfig;
use crate::errors::RegistryError;
use crate::model::ModelArtifact;
use log::{debug, info};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Page size used when listing every run of an experiment.
const SEARCH_PAGE_SIZE: usize = 1000;

#[derive(Debug)]
pub struct MlflowClient {
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    http_client: reqwest::Client,
}

impl MlflowClient {
    pub fn new(config: &TrackingConfig) -> Result<Self, RegistryError> {
        let base_url = config.tracking_uri.trim_end_matches('/').to_string();
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RegistryError::Transport {
                endpoint: base_url.clone(),
                source: e,
            })?;
        let (username, password) = match &config.credentials {
            Some(creds) => (Some(creds.username.clone()), Some(creds.password.clone())),
            None => (None, None),
        };
        Ok(Self {
            base_url,
            username,
            password,
            http_client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(user) => request.basic_auth(user, self.password.as_ref()),
            None => request,
        }
    }

    async fn send(&self, endpoint: &str, request: RequestBuilder) -> Result<Response, RegistryError> {
        debug!("Tracking request: {}", endpoint);
        self.authorize(request)
            .send()
            .await
            .map_err(|e| RegistryError::Transport {
                endpoint: endpoint.to_string(),
                source: e,
            })
    }

    /// Look up an experiment id by name.
    pub async fn experiment_id(&self, name: &str) -> Result<String, RegistryError> {
        let endpoint = self.endpoint("api/2.0/mlflow/experiments/get-by-name");
        let request = self
            .http_client
            .get(&endpoint)
            .query(&[("experiment_name", name)]);
        let response = self.send(&endpoint, request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(RegistryError::ExperimentNotFound {
                name: name.to_string(),
            });
        }
        let body: GetExperimentResponse = json_body(&endpoint, response).await?;
        Ok(body.experiment.experiment_id)
    }

    async fn search_page(
        &self,
        experiment_id: &str,
        query: &RunQuery,
        max_results: usize,
        page_token: Option<String>,
    ) -> Result<SearchRunsResponse, RegistryError> {
        let endpoint = self.endpoint("api/2.0/mlflow/runs/search");
        let payload = SearchRunsRequest {
            experiment_ids: vec![experiment_id.to_string()],
            order_by: vec![format!("metrics.{} ASC", query.order_by_metric)],
            max_results,
            page_token,
        };
        let request = self.http_client.post(&endpoint).json(&payload);
        let response = self.send(&endpoint, request).await?;
        json_body(&endpoint, response).await
    }
}

impl TrackingStore for MlflowClient {
    async fn list_runs(
        &self,
        experiment_name: &str,
        query: &RunQuery,
    ) -> Result<Vec<RunRecord>, RegistryError> {
        let experiment_id = self.experiment_id(experiment_name).await?;
        info!(
            "Searching runs of experiment '{}' (id {}) ordered by {}",
            experiment_name, experiment_id, query.order_by_metric
        );

        let mut runs = Vec::new();
        if query.max_results == Some(0) {
            return Ok(runs);
        }
        let mut page_token = None;
        loop {
            let page_size = match query.max_results {
                Some(limit) => limit.saturating_sub(runs.len()).min(SEARCH_PAGE_SIZE),
                None => SEARCH_PAGE_SIZE,
            };
            let page = self
                .search_page(&experiment_id, query, page_size, page_token.take())
                .await?;
            runs.extend(page.runs.into_iter().map(RunPayload::into_record));

            let reached_limit = query.max_results.map_or(false, |limit| runs.len() >= limit);
            match page.next_page_token {
                Some(token) if !token.is_empty() && !reached_limit => page_token = Some(token),
                _ => break,
            }
        }
        Ok(runs)
    }

    async fn load_model(&self, uri: &ModelUri) -> Result<ModelArtifact, RegistryError> {
        let endpoint = self.endpoint("get-artifact");
        let path = uri.model_file_path();
        let request = self
            .http_client
            .get(&endpoint)
            .query(&[("path", path.as_str()), ("run_uuid", uri.run_id())]);
        let response = self.send(&endpoint, request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(RegistryError::ArtifactNotFound {
                uri: uri.to_string(),
            });
        }
        let response = check_status(&endpoint, response).await?;
        let bytes = response.bytes().await.map_err(|e| RegistryError::Transport {
            endpoint: endpoint.clone(),
            source: e,
        })?;
        debug!("Downloaded {} bytes for {}", bytes.len(), uri);
        decode_artifact(uri, &bytes)
    }
}

async fn check_status(endpoint: &str, response: Response) -> Result<Response, RegistryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(RegistryError::Unauthorized {
            status: status.as_u16(),
        });
    }
    let body = response.text().await.unwrap_or_default();
    Err(RegistryError::Http {
        status: status.as_u16(),
        endpoint: endpoint.to_string(),
        body,
    })
}

async fn json_body<T: DeserializeOwned>(endpoint: &str, response: Response) -> Result<T, RegistryError> {
    let response = check_status(endpoint, response).await?;
    let bytes = response.bytes().await.map_err(|e| RegistryError::Transport {
        endpoint: endpoint.to_string(),
        source: e,
    })?;
    serde_json::from_slice(&bytes).map_err(|e| RegistryError::InvalidResponse {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })
}

// --- REST payloads ---

#[derive(Debug, Serialize)]
struct SearchRunsRequest {
    experiment_ids: Vec<String>,
    order_by: Vec<String>,
    max_results: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GetExperimentResponse {
    experiment: ExperimentPayload,
}

#[derive(Debug, Deserialize)]
struct ExperimentPayload {
    experiment_id: String,
}

#[derive(Debug, Deserialize, Default)]
struct SearchRunsResponse {
    #[serde(default)]
    runs: Vec<RunPayload>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunPayload {
    info: RunInfoPayload,
    #[serde(default)]
    data: RunDataPayload,
}

#[derive(Debug, Deserialize)]
struct RunInfoPayload {
    run_id: String,
    experiment_id: String,
    #[serde(default)]
    run_name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RunDataPayload {
    #[serde(default)]
    metrics: Vec<MetricPayload>,
    #[serde(default)]
    tags: Vec<TagPayload>,
}

#[derive(Debug, Deserialize)]
struct MetricPayload {
    key: String,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct TagPayload {
    key: String,
    value: String,
}

impl RunPayload {
    fn into_record(self) -> RunRecord {
        let metrics: HashMap<String, f64> = self
            .data
            .metrics
            .into_iter()
            .map(|m| (m.key, m.value))
            .collect();
        let tags: HashMap<String, String> = self
            .data
            .tags
            .into_iter()
            .map(|t| (t.key, t.value))
            .collect();
        RunRecord {
            run_id: self.info.run_id,
            experiment_id: self.info.experiment_id,
            run_name: self.info.run_name,
            metrics,
            tags,
        }
    }
}
