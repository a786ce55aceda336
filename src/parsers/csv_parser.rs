use crate::data_models::{FeatureRow, FeatureTable, DATETIME_COLUMN, STATION_COLUMN};
use crate::errors::ParseError;
use crate::utils::{normalize_station_id, parse_feature_value, parse_timestamp};
use csv::ReaderBuilder;
use log::{debug, info, warn};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Load the feature table at `file_path`, sorted ascending by timestamp.
///
/// The file must carry a header row with at least `start_station_id` and
/// `datetime`. Any timestamp that fails to parse aborts the whole load.
pub fn read_feature_table(file_path: &Path) -> Result<FeatureTable, ParseError> {
    debug!("Opening feature table {}", file_path.display());
    let file = File::open(file_path).map_err(|e| ParseError::IoError {
        path: file_path.to_path_buf(),
        source: e,
    })?;
    let table = read_feature_table_from_reader(file, file_path)?;
    info!(
        "Loaded {} feature rows across {} stations from {}",
        table.len(),
        table.station_count(),
        file_path.display()
    );
    Ok(table)
}

/// Same as [`read_feature_table`] over any reader. `source` is only used in
/// error messages.
pub fn read_feature_table_from_reader<R: Read>(
    reader: R,
    source: &Path,
) -> Result<FeatureTable, ParseError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| ParseError::HeaderReadError {
            path: source.to_path_buf(),
            source: e,
        })?
        .clone();

    let find = |name: &str| -> Result<usize, ParseError> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ParseError::MissingColumn {
                path: source.to_path_buf(),
                column: name.to_string(),
            })
    };
    let station_idx = find(STATION_COLUMN)?;
    let datetime_idx = find(DATETIME_COLUMN)?;

    // (column name, source index) for every value column
    let value_columns: Vec<(String, usize)> = headers
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != station_idx && *idx != datetime_idx)
        .map(|(idx, name)| (name.to_string(), idx))
        .collect();

    let mut table = FeatureTable::new(value_columns.iter().map(|(n, _)| n.clone()).collect());
    let mut skipped = 0usize;

    for (record_idx, result) in reader.records().enumerate() {
        // header is line 1
        let row_number = record_idx + 2;
        let record = result.map_err(|e| ParseError::RecordReadError {
            path: source.to_path_buf(),
            row: row_number,
            source: e,
        })?;

        let raw_ts = record.get(datetime_idx).unwrap_or("");
        let timestamp = parse_timestamp(raw_ts).map_err(|message| ParseError::TimestampParseError {
            path: source.to_path_buf(),
            row: row_number,
            value: raw_ts.to_string(),
            message,
        })?;

        let station_id = match normalize_station_id(record.get(station_idx).unwrap_or("")) {
            Some(id) => id,
            None => {
                debug!("Row {} has no station id, skipping", row_number);
                skipped += 1;
                continue;
            }
        };
        let values = value_columns
            .iter()
            .map(|(_, idx)| record.get(*idx).and_then(parse_feature_value))
            .collect();

        table.rows.push(FeatureRow {
            station_id,
            timestamp,
            values,
        });
    }

    if skipped > 0 {
        warn!(
            "Skipped {} rows without a station id in {}",
            skipped,
            source.display()
        );
    }
    table.sort_by_timestamp();
    Ok(table)
}
