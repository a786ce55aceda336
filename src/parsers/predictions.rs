//! Reader for the predictions file produced by the pipeline, used by the
//! reporting views.

use crate::data_models::{PredictionRow, DATETIME_COLUMN, PREDICTION_COLUMN, STATION_COLUMN};
use crate::errors::ParseError;
use crate::utils::{normalize_station_id, parse_timestamp};
use csv::ReaderBuilder;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Outcome of looking for the predictions file. A missing file is a normal
/// state before the first inference run, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionsStatus {
    NotRunYet,
    Available(Vec<PredictionRow>),
}

pub fn read_predictions(path: &Path) -> Result<PredictionsStatus, ParseError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(PredictionsStatus::NotRunYet),
        Err(e) => {
            return Err(ParseError::IoError {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    read_predictions_from_reader(file, path).map(PredictionsStatus::Available)
}

pub fn read_predictions_from_reader<R: Read>(
    reader: R,
    source: &Path,
) -> Result<Vec<PredictionRow>, ParseError> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(reader);
    let headers = reader
        .headers()
        .map_err(|e| ParseError::HeaderReadError {
            path: source.to_path_buf(),
            source: e,
        })?
        .clone();

    let mut indices = [0usize; 3];
    for (slot, name) in indices
        .iter_mut()
        .zip([STATION_COLUMN, DATETIME_COLUMN, PREDICTION_COLUMN])
    {
        *slot = headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| ParseError::MissingColumn {
                path: source.to_path_buf(),
                column: name.to_string(),
            })?;
    }
    let [station_idx, datetime_idx, value_idx] = indices;

    let mut rows = Vec::new();
    for (record_idx, result) in reader.records().enumerate() {
        let row = record_idx + 2;
        let record = result.map_err(|e| ParseError::RecordReadError {
            path: source.to_path_buf(),
            row,
            source: e,
        })?;
        let Some(station_id) = normalize_station_id(record.get(station_idx).unwrap_or("")) else {
            continue;
        };
        let raw_ts = record.get(datetime_idx).unwrap_or("");
        let timestamp = parse_timestamp(raw_ts).map_err(|message| ParseError::TimestampParseError {
            path: source.to_path_buf(),
            row,
            value: raw_ts.to_string(),
            message,
        })?;
        let raw_value = record.get(value_idx).unwrap_or("").trim();
        let predicted_ride_count = raw_value
            .parse::<f64>()
            .map_err(|_| ParseError::ValueParseError {
                path: source.to_path_buf(),
                row,
                value: raw_value.to_string(),
            })?;
        rows.push(PredictionRow {
            station_id,
            timestamp,
            predicted_ride_count,
        });
    }
    Ok(rows)
}
