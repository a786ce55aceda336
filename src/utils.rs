use chrono::{DateTime, NaiveDate, NaiveDateTime};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const NULL_MARKERS: &[&str] = &["", "NA", "N/A", "NaN", "nan", "null", "NULL", "None"];

/// Parse a timestamp as written by the feature job. Offsets are normalised to
/// UTC and dropped; a bare date means midnight.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, String> {
    let value = raw.trim();
    for format in NAIVE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(ts);
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.naive_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(ts) = date.and_hms_opt(0, 0, 0) {
            return Ok(ts);
        }
    }
    Err(format!("'{}' does not match any supported datetime format", value))
}

/// Parse a feature cell. Null markers and non-numeric text become `None`.
pub fn parse_feature_value(raw: &str) -> Option<f64> {
    let value = raw.trim();
    if NULL_MARKERS.contains(&value) {
        return None;
    }
    value.parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Integer-valued floats are written without a fractional part, matching how
/// station ids read from a float column look in the source data. Empty cells
/// and null markers have no station.
pub fn normalize_station_id(raw: &str) -> Option<String> {
    let value = raw.trim();
    if NULL_MARKERS.contains(&value) {
        return None;
    }
    let id = match value.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 && v.abs() < 1e15 && value.contains('.') => {
            format!("{}", v as i64)
        }
        _ => value.to_string(),
    };
    Some(id)
}
