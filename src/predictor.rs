use crate::data_models::{FeatureTable, PredictionRow};
use crate::errors::SchemaError;
use crate::feature_contract::FeatureContract;
use crate::model::Model;
use log::debug;

/// Applies a model to feature rows through an explicit feature contract.
pub struct Predictor<M: Model> {
    model: M,
    contract: FeatureContract,
}

impl<M: Model> Predictor<M> {
    /// Fails if the model was trained on a different feature list than the
    /// contract declares.
    pub fn new(model: M, contract: FeatureContract) -> Result<Self, SchemaError> {
        contract.check_model_features(model.feature_names())?;
        Ok(Self { model, contract })
    }

    /// One prediction per row, in row order. The whole feature matrix is
    /// assembled before the model runs, so a schema problem yields no output.
    pub fn predict(&self, table: &FeatureTable) -> Result<Vec<PredictionRow>, SchemaError> {
        let bound = self.contract.bind(table)?;

        let matrix = table
            .rows
            .iter()
            .map(|row| {
                bound
                    .indices()
                    .iter()
                    .map(|&idx| {
                        row.values[idx].ok_or_else(|| SchemaError::MissingValue {
                            station_id: row.station_id.clone(),
                            timestamp: row.timestamp,
                            column: table.columns[idx].clone(),
                        })
                    })
                    .collect::<Result<Vec<f64>, SchemaError>>()
            })
            .collect::<Result<Vec<Vec<f64>>, SchemaError>>()?;
        debug!(
            "Built {}x{} feature matrix (contract v{})",
            matrix.len(),
            self.contract.len(),
            self.contract.version
        );

        let predictions = self.model.predict(&matrix);
        Ok(table
            .rows
            .iter()
            .zip(predictions)
            .map(|(row, predicted_ride_count)| PredictionRow {
                station_id: row.station_id.clone(),
                timestamp: row.timestamp,
                predicted_ride_count,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_models::FeatureRow;
    use crate::feature_contract::CITIBIKE_FEATURES_V1;
    use crate::model::{LinearModel, ModelArtifact};
    use approx::assert_relative_eq;
    use chrono::{Duration, NaiveDate};

    fn hour_model() -> ModelArtifact {
        // predicts 10 + hour
        let mut coefficients = vec![0.0; 10];
        coefficients[1] = 1.0;
        ModelArtifact::Linear(LinearModel {
            feature_names: CITIBIKE_FEATURES_V1.iter().map(|s| s.to_string()).collect(),
            intercept: 10.0,
            coefficients,
        })
    }

    fn table(columns: &[&str], hours: &[i64]) -> FeatureTable {
        let start = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mut table = FeatureTable::new(columns.iter().map(|c| c.to_string()).collect());
        let hour_idx = table.column_index("hour");
        for &h in hours {
            let values = (0..columns.len())
                .map(|i| if Some(i) == hour_idx { Some(h as f64) } else { Some(1.0) })
                .collect();
            table.rows.push(FeatureRow {
                station_id: "S1".to_string(),
                timestamp: start + Duration::hours(h),
                values,
            });
        }
        table
    }

    #[test]
    fn test_predictions_align_with_rows() {
        let mut columns: Vec<&str> = vec!["temperature"];
        columns.extend(CITIBIKE_FEATURES_V1.iter().rev());
        let table = table(&columns, &[3, 4, 5]);

        let predictor = Predictor::new(hour_model(), FeatureContract::citibike_v1()).unwrap();
        let rows = predictor.predict(&table).unwrap();

        assert_eq!(rows.len(), 3);
        for (row, input) in rows.iter().zip(&table.rows) {
            assert_eq!(row.station_id, input.station_id);
            assert_eq!(row.timestamp, input.timestamp);
        }
        assert_relative_eq!(rows[0].predicted_ride_count, 13.0);
        assert_relative_eq!(rows[2].predicted_ride_count, 15.0);
    }

    #[test]
    fn test_missing_column_fails_before_any_output() {
        let columns: Vec<&str> = CITIBIKE_FEATURES_V1
            .iter()
            .copied()
            .filter(|c| *c != "lag_21")
            .collect();
        let table = table(&columns, &[1, 2]);

        let predictor = Predictor::new(hour_model(), FeatureContract::citibike_v1()).unwrap();
        let err = predictor.predict(&table).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingColumns {
                version: 1,
                missing: vec!["lag_21".to_string()]
            }
        );
    }

    #[test]
    fn test_missing_value_is_reported() {
        let mut table = table(&CITIBIKE_FEATURES_V1, &[1, 2]);
        let lag_idx = table.column_index("lag_1").unwrap();
        table.rows[1].values[lag_idx] = None;

        let predictor = Predictor::new(hour_model(), FeatureContract::citibike_v1()).unwrap();
        match predictor.predict(&table).unwrap_err() {
            SchemaError::MissingValue { column, .. } => assert_eq!(column, "lag_1"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_contract_mismatch_rejected_at_construction() {
        let contract = FeatureContract::new(2, vec!["hour".to_string(), "lag_1".to_string()]);
        assert!(matches!(
            Predictor::new(hour_model(), contract),
            Err(SchemaError::ContractMismatch { version: 2, .. })
        ));
    }
}
