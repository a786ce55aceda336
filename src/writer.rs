use crate::data_models::{PredictionRow, DATETIME_COLUMN, PREDICTION_COLUMN, STATION_COLUMN};
use crate::errors::PipelineError;
use csv::WriterBuilder;
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "predictions.csv".to_string());
    path.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()))
}

/// Replace the file at `path` with `rows`.
///
/// Missing parent directories are created. Rows go to a sibling temp file that
/// is then renamed over `path`, so readers see either the previous file or the
/// complete new one. Nothing from a previous run is kept.
pub fn write_predictions(path: &Path, rows: &[PredictionRow]) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| PipelineError::Output {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let tmp_path = temp_path_for(path);
    let result = write_csv(&tmp_path, rows).and_then(|_| {
        fs::rename(&tmp_path, path).map_err(|e| PipelineError::Output {
            path: path.to_path_buf(),
            source: e,
        })
    });
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result?;

    info!("Wrote {} predictions to {}", rows.len(), path.display());
    Ok(())
}

fn write_csv(path: &Path, rows: &[PredictionRow]) -> Result<(), PipelineError> {
    let output_err = |e| PipelineError::Output {
        path: path.to_path_buf(),
        source: e,
    };
    let encode_err = |e| PipelineError::OutputEncode {
        path: path.to_path_buf(),
        source: e,
    };

    let file = fs::File::create(path).map_err(output_err)?;
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(file);
    for row in rows {
        writer.serialize(row).map_err(encode_err)?;
    }
    if rows.is_empty() {
        // serialize() emits the header with the first row
        writer
            .write_record([STATION_COLUMN, DATETIME_COLUMN, PREDICTION_COLUMN])
            .map_err(encode_err)?;
    }
    let file = writer
        .into_inner()
        .map_err(|e| output_err(e.into_error()))?;
    file.sync_all().map_err(output_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::predictions::{read_predictions, PredictionsStatus};
    use chrono::NaiveDate;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "citibike_forecast_writer_{}_{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn row(station: &str, hour: u32, value: f64) -> PredictionRow {
        PredictionRow {
            station_id: station.to_string(),
            timestamp: NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
            predicted_ride_count: value,
        }
    }

    #[test]
    fn test_creates_directories_and_header() {
        let dir = scratch_dir("header");
        let path = dir.join("nested/predictions/predictions.csv");
        write_predictions(&path, &[row("5329", 7, 12.5)]).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "start_station_id,datetime,predicted_ride_count\n5329,2024-05-01 07:00:00,12.5\n"
        );
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_second_write_replaces_first() {
        let dir = scratch_dir("overwrite");
        let path = dir.join("predictions.csv");
        write_predictions(&path, &[row("A", 1, 1.0), row("B", 1, 2.0)]).unwrap();
        write_predictions(&path, &[row("C", 2, 3.0)]).unwrap();

        match read_predictions(&path).unwrap() {
            PredictionsStatus::Available(rows) => assert_eq!(rows, vec![row("C", 2, 3.0)]),
            PredictionsStatus::NotRunYet => panic!("file should exist"),
        }
        let leftovers: Vec<_> = fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_empty_output_still_has_header() {
        let dir = scratch_dir("empty");
        let path = dir.join("predictions.csv");
        write_predictions(&path, &[]).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "start_station_id,datetime,predicted_ride_count\n"
        );
        fs::remove_dir_all(&dir).unwrap();
    }
}
