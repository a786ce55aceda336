use crate::errors::ConfigError;
use crate::selection::RECENCY_WINDOW;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const TRACKING_URI_ENV: &str = "MLFLOW_TRACKING_URI";
pub const TRACKING_USERNAME_ENV: &str = "MLFLOW_TRACKING_USERNAME";
pub const TRACKING_PASSWORD_ENV: &str = "MLFLOW_TRACKING_PASSWORD";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings for one inference run. Any field may be overridden by a JSON
/// config file and then by CLI flags.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub features_path: PathBuf,
    pub output_path: PathBuf,
    pub experiment_name: String,
    /// Error metric the best run is chosen by (lower is better).
    pub metric: String,
    pub window: usize,
    /// Runs fetched when resolving the best one.
    pub max_results: usize,
    pub retry_max_attempts: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            features_path: PathBuf::from("./data/features/citibike_features.csv"),
            output_path: PathBuf::from("./data/predictions/predictions.csv"),
            experiment_name: String::from("citibike_trip_prediction"),
            metric: String::from("mae"),
            window: RECENCY_WINDOW,
            max_results: 1,
            retry_max_attempts: 3,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window == 0 {
            return Err(ConfigError::InvalidValue {
                field: "window".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.max_results == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_results".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.retry_max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry_max_attempts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.experiment_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "experiment_name".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Load a [`PipelineConfig`] from a JSON file. Missing keys take defaults.
pub fn load_config(path: &Path) -> Result<PipelineConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let file = File::open(path).map_err(|e| ConfigError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    let config: PipelineConfig =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| ConfigError::JsonParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
    debug!("Loaded pipeline config from {}: {:?}", path.display(), config);
    Ok(config)
}

#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Where the tracking service lives and how to authenticate. Values are
/// opaque: only their presence is checked.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingConfig {
    pub tracking_uri: String,
    pub credentials: Option<Credentials>,
    pub request_timeout: Duration,
}

impl TrackingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let tracking_uri = get(TRACKING_URI_ENV).ok_or_else(|| ConfigError::MissingEnv {
            name: TRACKING_URI_ENV.to_string(),
        })?;

        let credentials = match (get(TRACKING_USERNAME_ENV), get(TRACKING_PASSWORD_ENV)) {
            (Some(username), Some(password)) => Some(Credentials { username, password }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(ConfigError::PartialCredentials {
                    present: TRACKING_USERNAME_ENV.to_string(),
                    missing: TRACKING_PASSWORD_ENV.to_string(),
                })
            }
            (None, Some(_)) => {
                return Err(ConfigError::PartialCredentials {
                    present: TRACKING_PASSWORD_ENV.to_string(),
                    missing: TRACKING_USERNAME_ENV.to_string(),
                })
            }
        };

        Ok(Self {
            tracking_uri,
            credentials,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_tracking_config_with_credentials() {
        let config = TrackingConfig::from_lookup(lookup(&[
            (TRACKING_URI_ENV, "https://dagshub.com/u/citibike.mlflow"),
            (TRACKING_USERNAME_ENV, "u"),
            (TRACKING_PASSWORD_ENV, "token"),
        ]))
        .unwrap();
        assert_eq!(config.tracking_uri, "https://dagshub.com/u/citibike.mlflow");
        assert_eq!(
            config.credentials,
            Some(Credentials {
                username: "u".to_string(),
                password: "token".to_string()
            })
        );
        assert!(!format!("{:?}", config).contains("token"));
    }

    #[test]
    fn test_tracking_uri_required() {
        let err = TrackingConfig::from_lookup(lookup(&[(TRACKING_URI_ENV, "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv { .. }));
    }

    #[test]
    fn test_half_credentials_rejected() {
        let err = TrackingConfig::from_lookup(lookup(&[
            (TRACKING_URI_ENV, "./mlruns"),
            (TRACKING_USERNAME_ENV, "u"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::PartialCredentials { .. }));

        let anonymous = TrackingConfig::from_lookup(lookup(&[(TRACKING_URI_ENV, "./mlruns")])).unwrap();
        assert!(anonymous.credentials.is_none());
    }

    #[test]
    fn test_partial_json_config_uses_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"experiment_name": "citibike_v2", "window": 24}"#).unwrap();
        assert_eq!(config.experiment_name, "citibike_v2");
        assert_eq!(config.window, 24);
        assert_eq!(config.metric, "mae");
        assert_eq!(config.output_path, PathBuf::from("./data/predictions/predictions.csv"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_window_invalid() {
        let config = PipelineConfig {
            window: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_config_file() {
        let err = load_config(Path::new("/nonexistent/forecast.json")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }
}
