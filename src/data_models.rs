use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Column holding the station identifier in both input and output files.
pub const STATION_COLUMN: &str = "start_station_id";
/// Column holding the hourly timestamp in both input and output files.
pub const DATETIME_COLUMN: &str = "datetime";
/// Column holding the model output in the predictions file.
pub const PREDICTION_COLUMN: &str = "predicted_ride_count";

/// Format used when writing timestamps back out.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One observation for one station at one timestamp.
///
/// `values` is aligned with [`FeatureTable::columns`]; a `None` marks an empty
/// or non-numeric cell.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub station_id: String,
    pub timestamp: NaiveDateTime,
    pub values: Vec<Option<f64>>,
}

/// In-memory feature table. Every column except the station id and the
/// timestamp is held as an optional float.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    pub columns: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Stable ascending sort on the timestamp. Rows sharing a timestamp keep
    /// their file order.
    pub fn sort_by_timestamp(&mut self) {
        self.rows.sort_by_key(|row| row.timestamp);
    }

    /// Number of distinct stations present.
    pub fn station_count(&self) -> usize {
        let mut seen: Vec<&str> = self.rows.iter().map(|r| r.station_id.as_str()).collect();
        seen.sort_unstable();
        seen.dedup();
        seen.len()
    }
}

/// One output row of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    #[serde(rename = "start_station_id")]
    pub station_id: String,
    #[serde(rename = "datetime", with = "datetime_format")]
    pub timestamp: NaiveDateTime,
    #[serde(rename = "predicted_ride_count")]
    pub predicted_ride_count: f64,
}

mod datetime_format {
    use super::DATETIME_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(DATETIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        crate::utils::parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}
