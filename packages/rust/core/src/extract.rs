//! Station extraction from train schedules.
//!
//! A pure projection: no persistent state, no I/O. The same dataset always
//! yields the same set of codes. Iteration order of the result is an
//! implementation detail — downstream writes are idempotent per code and
//! must not depend on it.

use std::collections::BTreeMap;

use stationgeo_shared::Train;

/// Split the composite `"CODE - Name"` stop field.
///
/// The split happens on the FIRST `" - "` occurrence; everything after it is
/// the name. A field without the separator collapses to `(text, text)`.
/// Empty or whitespace-only fields yield `None`.
pub fn split_station_field(text: &str) -> Option<(String, String)> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    match trimmed.split_once(" - ") {
        Some((code, name)) => Some((code.trim().to_string(), name.trim().to_string())),
        None => Some((trimmed.to_string(), trimmed.to_string())),
    }
}

/// Collect the deduplicated station set from an iterable of trains.
///
/// Duplicate codes across schedules collapse to one entry; the last name
/// seen wins, the code is stable.
pub fn collect_stations<'a, I>(trains: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = &'a Train>,
{
    let mut stations = BTreeMap::new();
    for train in trains {
        for stop in &train.schedule {
            if let Some((code, name)) = split_station_field(&stop.station) {
                stations.insert(code, name);
            }
        }
    }
    stations
}
