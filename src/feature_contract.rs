//! The named, ordered set of input columns a model expects.

use crate::data_models::FeatureTable;
use crate::errors::SchemaError;

/// Features used to train the ride-count model, in training order.
pub const CITIBIKE_FEATURES_V1: [&str; 10] = [
    "rolling_mean_24",
    "hour",
    "rolling_std_6",
    "rolling_mean_12",
    "day",
    "rolling_mean_6",
    "lag_1",
    "weekday",
    "month",
    "lag_21",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureContract {
    pub version: u32,
    pub names: Vec<String>,
}

impl FeatureContract {
    pub fn new(version: u32, names: Vec<String>) -> Self {
        Self { version, names }
    }

    pub fn citibike_v1() -> Self {
        Self::new(1, CITIBIKE_FEATURES_V1.iter().map(|s| s.to_string()).collect())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Check that a model was trained on exactly this contract.
    pub fn check_model_features(&self, model_features: &[String]) -> Result<(), SchemaError> {
        if model_features == self.names.as_slice() {
            Ok(())
        } else {
            Err(SchemaError::ContractMismatch {
                version: self.version,
                model: model_features.to_vec(),
                contract: self.names.clone(),
            })
        }
    }

    /// Map every contract name to its column index in `table`. All missing
    /// names are reported together.
    pub fn bind(&self, table: &FeatureTable) -> Result<BoundContract, SchemaError> {
        let mut indices = Vec::with_capacity(self.names.len());
        let mut missing = Vec::new();
        for name in &self.names {
            match table.column_index(name) {
                Some(idx) => indices.push(idx),
                None => missing.push(name.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(SchemaError::MissingColumns {
                version: self.version,
                missing,
            });
        }
        Ok(BoundContract { indices })
    }
}

impl Default for FeatureContract {
    fn default() -> Self {
        Self::citibike_v1()
    }
}

/// A contract resolved against one table's column layout.
#[derive(Debug, Clone)]
pub struct BoundContract {
    indices: Vec<usize>,
}

impl BoundContract {
    /// Table column index for each contract position.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}
