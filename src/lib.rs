//! Batch inference for hourly Citi Bike ride counts.
//!
//! Loads the per-station feature table, keeps each station's most recent
//! window, resolves the lowest-error model from the tracking registry and
//! writes one prediction per selected row.

pub mod config;
pub mod data_models;
pub mod errors;
pub mod feature_contract;
pub mod metrics;
pub mod model;
pub mod parsers;
pub mod pipeline;
pub mod predictor;
pub mod registry;
pub mod report;
pub mod resolver;
pub mod retry;
pub mod selection;
pub mod utils;
pub mod writer;

pub use config::{PipelineConfig, TrackingConfig};
pub use errors::PipelineError;
pub use feature_contract::FeatureContract;
pub use pipeline::{run_inference, InferenceSummary};
