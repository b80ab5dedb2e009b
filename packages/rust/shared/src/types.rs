//! Core domain types for the stationgeo pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for pipeline run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Stations and coordinates
// ---------------------------------------------------------------------------

/// A deduplicated station extracted from train schedules.
///
/// `code` is the sole identity key; the display name is carried along for
/// geocoding queries and is not significant for identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationRecord {
    /// Short unique station token (e.g. `NDLS`).
    pub code: String,
    /// Display name (e.g. `New Delhi`).
    pub name: String,
}

/// A resolved coordinate pair plus the query pattern that produced it.
///
/// `source` is kept for auditability: ambiguous geocodes can be traced back
/// to the exact free-text query that matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateResult {
    pub lat: f64,
    pub lon: f64,
    /// The expanded query pattern text that returned this match.
    pub source: String,
}

/// A row of the `station_coordinates` table.
///
/// `coordinates` is `None` for records written without a successful
/// resolution; such records are retried on a subsequent run. Once set,
/// coordinates are never overwritten by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCoordinate {
    pub station_code: String,
    pub station_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<CoordinateResult>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// RunSummary
// ---------------------------------------------------------------------------

/// End-of-run aggregate record, written once to the summary artifact.
///
/// Invariant: `successful_updates + failed_updates == total_stations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Stations processed this run (skipped-as-resolved included).
    pub total_stations: usize,
    /// Stations skipped as already resolved or freshly updated.
    pub successful_updates: usize,
    /// Stations with no geocode match or a failed store write.
    pub failed_updates: usize,
    /// When the summary was produced.
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Train dataset
// ---------------------------------------------------------------------------

/// A train document from the source dataset.
///
/// Only `schedule[].station` feeds the coordinate pipeline; the remaining
/// fields round-trip through storage for the `import` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Train {
    pub train_number: i64,
    pub name: String,
    #[serde(rename = "type", default)]
    pub train_type: String,
    #[serde(default)]
    pub from_station: String,
    #[serde(default)]
    pub to_station: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub schedule: Vec<TrainStop>,
    #[serde(default)]
    pub classes: Vec<String>,
}

/// A single stop in a train's schedule.
///
/// `station` is the composite `"CODE - Name"` text field; it may be empty
/// or missing in dirty source data, in which case the stop contributes no
/// station record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainStop {
    #[serde(default)]
    pub station: String,
    #[serde(default)]
    pub arrival: String,
    #[serde(default)]
    pub departure: String,
    #[serde(default)]
    pub day: u32,
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub halt: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::new();
        let s = id.to_string();
        let parsed: RunId = s.parse().expect("parse RunId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn summary_serialization() {
        let summary = RunSummary {
            total_stations: 42,
            successful_updates: 40,
            failed_updates: 2,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_string_pretty(&summary).expect("serialize");
        let parsed: RunSummary = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.total_stations, 42);
        assert_eq!(
            parsed.successful_updates + parsed.failed_updates,
            parsed.total_stations
        );
    }

    #[test]
    fn stored_coordinate_without_coordinates_omits_field() {
        let stored = StoredCoordinate {
            station_code: "NDLS".into(),
            station_name: "New Delhi".into(),
            coordinates: None,
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string(&stored).expect("serialize");
        assert!(!json.contains("coordinates"));
    }

    #[test]
    fn train_document_deserializes() {
        let doc = r#"{
            "train_number": 12951,
            "name": "Mumbai Rajdhani",
            "type": "Rajdhani",
            "from_station": "BCT - Mumbai Central",
            "to_station": "NDLS - New Delhi",
            "duration": "15h 32m",
            "schedule": [
                {"station": "BCT - Mumbai Central", "departure": "17:00", "day": 1},
                {"station": "NDLS - New Delhi", "arrival": "08:32", "day": 2}
            ],
            "classes": ["1A", "2A", "3A"]
        }"#;

        let train: Train = serde_json::from_str(doc).expect("deserialize train");
        assert_eq!(train.train_number, 12951);
        assert_eq!(train.schedule.len(), 2);
        assert_eq!(train.schedule[0].station, "BCT - Mumbai Central");
        assert_eq!(train.classes, vec!["1A", "2A", "3A"]);
    }

    #[test]
    fn train_tolerates_missing_stop_fields() {
        let doc = r#"{"train_number": 1, "name": "Test", "schedule": [{}]}"#;
        let train: Train = serde_json::from_str(doc).expect("deserialize sparse train");
        assert_eq!(train.schedule[0].station, "");
    }

    #[test]
    fn summary_fixture_validates() {
        let fixture = std::fs::read_to_string("../../../fixtures/json/run_summary.fixture.json")
            .expect("read fixture");
        let parsed: RunSummary =
            serde_json::from_str(&fixture).expect("deserialize fixture summary");
        assert_eq!(parsed.total_stations, 120);
        assert_eq!(
            parsed.successful_updates + parsed.failed_updates,
            parsed.total_stations
        );
    }
}
