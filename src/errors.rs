use chrono::NaiveDateTime;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading config file {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse JSON configuration in {path}: {source}")]
    JsonParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Configuration file not found at {path}")]
    NotFound { path: PathBuf },
    #[error("{name} environment variable not set")]
    MissingEnv { name: String },
    #[error("Tracking credentials are incomplete: {present} is set but {missing} is not")]
    PartialCredentials { present: String, missing: String },
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Top-level failure of one pipeline invocation. Nothing downstream of the
/// failing step runs.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Failed to load feature table: {0}")]
    Input(#[from] ParseError),
    #[error("Failed to resolve model: {0}")]
    Registry(#[from] RegistryError),
    #[error("Feature schema mismatch: {0}")]
    Schema(#[from] SchemaError),
    #[error("Failed to write predictions to {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to encode predictions for {path}: {source}")]
    OutputEncode {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error reading data file {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Error reading CSV headers in {path}: {source}")]
    HeaderReadError {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("Error reading CSV record in {path} at row {row}: {source}")]
    RecordReadError {
        path: PathBuf,
        row: usize,
        #[source]
        source: csv::Error,
    },
    #[error("Required column '{column}' not found in {path}")]
    MissingColumn { path: PathBuf, column: String },
    #[error("Timestamp parsing error in {path} at row {row} for value '{value}': {message}")]
    TimestampParseError {
        path: PathBuf,
        row: usize,
        value: String,
        message: String,
    },
    #[error("Invalid predicted value in {path} at row {row}: '{value}'")]
    ValueParseError {
        path: PathBuf,
        row: usize,
        value: String,
    },
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Experiment '{name}' does not exist")]
    ExperimentNotFound { name: String },
    #[error("No runs found in experiment '{experiment}' with metric '{metric}'")]
    NoRuns { experiment: String, metric: String },
    #[error("Model artifact not found for {uri}")]
    ArtifactNotFound { uri: String },
    #[error("Tracking service rejected the credentials (HTTP {status})")]
    Unauthorized { status: u16 },
    #[error("Tracking service returned HTTP {status} for {endpoint}: {body}")]
    Http {
        status: u16,
        endpoint: String,
        body: String,
    },
    #[error("Tracking service request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Unexpected response from {endpoint}: {message}")]
    InvalidResponse { endpoint: String, message: String },
    #[error("Invalid model URI '{uri}': {message}")]
    InvalidModelUri { uri: String, message: String },
    #[error("Invalid model artifact for {uri}: {message}")]
    InvalidArtifact { uri: String, message: String },
    #[error("IO error reading registry path {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RegistryError {
    /// Whether the failure may go away on a retry. Only connectivity problems,
    /// throttling and server-side errors qualify.
    pub fn is_transient(&self) -> bool {
        match self {
            RegistryError::Transport { .. } => true,
            RegistryError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum SchemaError {
    #[error("Feature table (contract v{version}) is missing columns: {missing:?}")]
    MissingColumns { version: u32, missing: Vec<String> },
    #[error("Model expects features {model:?} but contract v{version} declares {contract:?}")]
    ContractMismatch {
        version: u32,
        model: Vec<String>,
        contract: Vec<String>,
    },
    #[error("Missing value for feature '{column}' at station {station_id}, {timestamp}")]
    MissingValue {
        station_id: String,
        timestamp: NaiveDateTime,
        column: String,
    },
}
