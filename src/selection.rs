use crate::data_models::FeatureTable;
use log::debug;
use std::collections::HashMap;

/// Rows per station fed to the model.
pub const RECENCY_WINDOW: usize = 48;

/// Keep the last `window` rows of each station from a timestamp-sorted table.
///
/// Output holds one contiguous block per station, stations ordered by their
/// first row in `table`, rows ascending by timestamp within a block. Stations
/// with fewer than `window` rows keep all of them.
pub fn select_recent(table: &FeatureTable, window: usize) -> FeatureTable {
    let mut order: Vec<&str> = Vec::new();
    let mut partitions: HashMap<&str, Vec<usize>> = HashMap::new();

    for (idx, row) in table.rows.iter().enumerate() {
        partitions
            .entry(row.station_id.as_str())
            .or_insert_with(|| {
                order.push(row.station_id.as_str());
                Vec::new()
            })
            .push(idx);
    }

    let mut selected = FeatureTable::new(table.columns.clone());
    for station in order {
        let indices = &partitions[station];
        let start = indices.len().saturating_sub(window);
        debug!(
            "Station {}: keeping {} of {} rows",
            station,
            indices.len() - start,
            indices.len()
        );
        selected
            .rows
            .extend(indices[start..].iter().map(|&i| table.rows[i].clone()));
    }
    selected
}
