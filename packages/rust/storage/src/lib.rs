//! libSQL storage layer for the train dataset and resolved coordinates.
//!
//! The [`Storage`] struct wraps a libSQL database holding train documents,
//! the `station_coordinates` result store, and pipeline run history.
//!
//! **Access rules:**
//! - The update pipeline and `import`: read-write (sole writer) via [`Storage::open`]
//! - Lookup commands (`show`): read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use uuid::Uuid;

use stationgeo_shared::{
    CoordinateResult, Result, RunId, StationGeoError, StoredCoordinate, Train,
};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StationGeoError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StationGeoError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| StationGeoError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StationGeoError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| StationGeoError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    StationGeoError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(StationGeoError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Train dataset operations
    // -----------------------------------------------------------------------

    /// Insert a train document. Fails if the train number already exists.
    pub async fn insert_train(&self, train: &Train) -> Result<()> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let schedule_json = serde_json::to_string(&train.schedule)
            .map_err(|e| StationGeoError::validation(format!("schedule: {e}")))?;
        let classes_json = serde_json::to_string(&train.classes)
            .map_err(|e| StationGeoError::validation(format!("classes: {e}")))?;

        self.conn
            .execute(
                "INSERT INTO trains (id, train_number, name, train_type, from_station, to_station, duration, schedule_json, classes_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id.as_str(),
                    train.train_number,
                    train.name.as_str(),
                    train.train_type.as_str(),
                    train.from_station.as_str(),
                    train.to_station.as_str(),
                    train.duration.as_str(),
                    schedule_json.as_str(),
                    classes_json.as_str(),
                ],
            )
            .await
            .map_err(|e| StationGeoError::Storage(e.to_string()))?;
        Ok(())
    }

    /// List all train documents, schedules included.
    pub async fn list_trains(&self) -> Result<Vec<Train>> {
        let mut rows = self
            .conn
            .query(
                "SELECT train_number, name, train_type, from_station, to_station, duration, schedule_json, classes_json
                 FROM trains ORDER BY train_number",
                params![],
            )
            .await
            .map_err(|e| StationGeoError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_train(&row)?);
        }
        Ok(results)
    }

    /// Number of train documents in the dataset.
    pub async fn count_trains(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM trains").await
    }

    // -----------------------------------------------------------------------
    // Coordinate store operations
    // -----------------------------------------------------------------------

    /// Create the unique index on `station_code` if it does not exist.
    ///
    /// Must run before the first [`Storage::upsert_coordinate`] call; the
    /// upsert's conflict target is this index. Safe to call repeatedly.
    pub async fn ensure_coordinate_index(&self) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_station_coordinates_code
                 ON station_coordinates(station_code)",
                params![],
            )
            .await
            .map_err(|e| StationGeoError::Storage(e.to_string()))?;
        Ok(())
    }

    /// True only if a record exists for `code` AND its coordinates are
    /// populated. A coordinate-less record does not count as resolved and
    /// will be retried on a subsequent run.
    pub async fn has_resolved(&self, code: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT lat, lon FROM station_coordinates WHERE station_code = ?1",
                params![code],
            )
            .await
            .map_err(|e| StationGeoError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let lat: Option<f64> = row.get(0).ok();
                let lon: Option<f64> = row.get(1).ok();
                Ok(lat.is_some() && lon.is_some())
            }
            Ok(None) => Ok(false),
            Err(e) => Err(StationGeoError::Storage(e.to_string())),
        }
    }

    /// Insert or update the coordinate record for `code`.
    ///
    /// On conflict the name, coordinates, source, and `updated_at` are
    /// replaced. Repeating the call with identical coordinates changes
    /// nothing but the timestamp.
    pub async fn upsert_coordinate(
        &self,
        code: &str,
        name: &str,
        coords: &CoordinateResult,
    ) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO station_coordinates (station_code, station_name, lat, lon, source, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(station_code) DO UPDATE SET
                   station_name = excluded.station_name,
                   lat = excluded.lat,
                   lon = excluded.lon,
                   source = excluded.source,
                   updated_at = excluded.updated_at",
                params![
                    code,
                    name,
                    coords.lat,
                    coords.lon,
                    coords.source.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(|e| StationGeoError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Get the stored coordinate record for a station code.
    pub async fn get_coordinate(&self, code: &str) -> Result<Option<StoredCoordinate>> {
        let mut rows = self
            .conn
            .query(
                "SELECT station_code, station_name, lat, lon, source, updated_at
                 FROM station_coordinates WHERE station_code = ?1",
                params![code],
            )
            .await
            .map_err(|e| StationGeoError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_stored_coordinate(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StationGeoError::Storage(e.to_string())),
        }
    }

    /// Number of rows in the coordinate store (resolved or not).
    pub async fn count_coordinates(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM station_coordinates").await
    }

    // -----------------------------------------------------------------------
    // Run history operations
    // -----------------------------------------------------------------------

    /// Record the start of a pipeline run.
    pub async fn insert_run(&self, run_id: &RunId) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO runs (id, started_at) VALUES (?1, ?2)",
                params![run_id.to_string(), now.as_str()],
            )
            .await
            .map_err(|e| StationGeoError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Record run completion with its summary.
    pub async fn finish_run(&self, run_id: &RunId, summary_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE runs SET finished_at = ?1, summary_json = ?2 WHERE id = ?3",
                params![now.as_str(), summary_json, run_id.to_string()],
            )
            .await
            .map_err(|e| StationGeoError::Storage(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn count(&self, sql: &str) -> Result<usize> {
        let mut rows = self
            .conn
            .query(sql, params![])
            .await
            .map_err(|e| StationGeoError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let n: i64 = row
                    .get(0)
                    .map_err(|e| StationGeoError::Storage(e.to_string()))?;
                Ok(n as usize)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(StationGeoError::Storage(e.to_string())),
        }
    }
}

/// Convert a database row to a [`Train`].
fn row_to_train(row: &libsql::Row) -> Result<Train> {
    let schedule_json: String = row
        .get(6)
        .map_err(|e| StationGeoError::Storage(e.to_string()))?;
    let classes_json: String = row
        .get(7)
        .map_err(|e| StationGeoError::Storage(e.to_string()))?;

    Ok(Train {
        train_number: row
            .get::<i64>(0)
            .map_err(|e| StationGeoError::Storage(e.to_string()))?,
        name: row
            .get::<String>(1)
            .map_err(|e| StationGeoError::Storage(e.to_string()))?,
        train_type: row.get::<String>(2).unwrap_or_default(),
        from_station: row.get::<String>(3).unwrap_or_default(),
        to_station: row.get::<String>(4).unwrap_or_default(),
        duration: row.get::<String>(5).unwrap_or_default(),
        schedule: serde_json::from_str(&schedule_json)
            .map_err(|e| StationGeoError::validation(format!("schedule_json: {e}")))?,
        classes: serde_json::from_str(&classes_json)
            .map_err(|e| StationGeoError::validation(format!("classes_json: {e}")))?,
    })
}

/// Convert a database row to a [`StoredCoordinate`].
fn row_to_stored_coordinate(row: &libsql::Row) -> Result<StoredCoordinate> {
    let lat: Option<f64> = row.get(2).ok();
    let lon: Option<f64> = row.get(3).ok();
    let source: Option<String> = row.get(4).ok();

    let coordinates = match (lat, lon) {
        (Some(lat), Some(lon)) => Some(CoordinateResult {
            lat,
            lon,
            source: source.unwrap_or_default(),
        }),
        _ => None,
    };

    Ok(StoredCoordinate {
        station_code: row
            .get::<String>(0)
            .map_err(|e| StationGeoError::Storage(e.to_string()))?,
        station_name: row
            .get::<String>(1)
            .map_err(|e| StationGeoError::Storage(e.to_string()))?,
        coordinates,
        updated_at: {
            let s: String = row
                .get(5)
                .map_err(|e| StationGeoError::Storage(e.to_string()))?;
            chrono::DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .map_err(|e| StationGeoError::Storage(format!("invalid date: {e}")))?
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stationgeo_shared::TrainStop;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> (Storage, std::path::PathBuf) {
        let tmp = std::env::temp_dir().join(format!("sg_test_{}.db", Uuid::now_v7()));
        let storage = Storage::open(&tmp).await.expect("open test db");
        (storage, tmp)
    }

    fn sample_train(number: i64, stops: &[&str]) -> Train {
        Train {
            train_number: number,
            name: format!("Train {number}"),
            train_type: "Express".into(),
            from_station: stops.first().unwrap_or(&"").to_string(),
            to_station: stops.last().unwrap_or(&"").to_string(),
            duration: "5h 00m".into(),
            schedule: stops
                .iter()
                .map(|s| TrainStop {
                    station: s.to_string(),
                    ..Default::default()
                })
                .collect(),
            classes: vec!["SL".into(), "3A".into()],
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let (storage, _tmp) = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("sg_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn train_roundtrip() {
        let (storage, _tmp) = test_storage().await;
        let train = sample_train(12951, &["BCT - Mumbai Central", "NDLS - New Delhi"]);
        storage.insert_train(&train).await.expect("insert train");

        let trains = storage.list_trains().await.expect("list trains");
        assert_eq!(trains.len(), 1);
        assert_eq!(trains[0].train_number, 12951);
        assert_eq!(trains[0].schedule.len(), 2);
        assert_eq!(trains[0].schedule[1].station, "NDLS - New Delhi");
        assert_eq!(trains[0].classes, vec!["SL", "3A"]);

        assert_eq!(storage.count_trains().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_train_number_rejected() {
        let (storage, _tmp) = test_storage().await;
        storage
            .insert_train(&sample_train(1, &["A - Alpha"]))
            .await
            .unwrap();
        let result = storage.insert_train(&sample_train(1, &["B - Beta"])).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn coordinate_index_is_idempotent() {
        let (storage, _tmp) = test_storage().await;
        storage.ensure_coordinate_index().await.expect("first");
        storage.ensure_coordinate_index().await.expect("second");
    }

    #[tokio::test]
    async fn upsert_and_lookup() {
        let (storage, _tmp) = test_storage().await;
        storage.ensure_coordinate_index().await.unwrap();

        assert!(!storage.has_resolved("NDLS").await.unwrap());

        let coords = CoordinateResult {
            lat: 28.6438,
            lon: 77.2193,
            source: "New Delhi Railway Station, India".into(),
        };
        storage
            .upsert_coordinate("NDLS", "New Delhi", &coords)
            .await
            .expect("upsert");

        assert!(storage.has_resolved("NDLS").await.unwrap());

        let stored = storage
            .get_coordinate("NDLS")
            .await
            .expect("get")
            .expect("present");
        assert_eq!(stored.station_name, "New Delhi");
        let got = stored.coordinates.expect("coordinates set");
        assert_eq!(got.lat, 28.6438);
        assert_eq!(got.source, "New Delhi Railway Station, India");
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let (storage, _tmp) = test_storage().await;
        storage.ensure_coordinate_index().await.unwrap();

        let coords = CoordinateResult {
            lat: 18.9696,
            lon: 72.8193,
            source: "Mumbai Central Railway Station, India".into(),
        };
        storage
            .upsert_coordinate("BCT", "Mumbai Central", &coords)
            .await
            .unwrap();
        storage
            .upsert_coordinate("BCT", "Mumbai Central", &coords)
            .await
            .unwrap();

        // Still a single row, coordinates unchanged
        assert_eq!(storage.count_coordinates().await.unwrap(), 1);
        let stored = storage.get_coordinate("BCT").await.unwrap().unwrap();
        assert_eq!(stored.coordinates.unwrap(), coords);
    }

    #[tokio::test]
    async fn coordinate_less_row_is_not_resolved() {
        let (storage, tmp) = test_storage().await;
        storage.ensure_coordinate_index().await.unwrap();

        // Simulate a placeholder row from a prior failed attempt
        let db = libsql::Builder::new_local(&tmp).build().await.unwrap();
        let conn = db.connect().unwrap();
        conn.execute(
            "INSERT INTO station_coordinates (station_code, station_name, updated_at)
             VALUES ('GZB', 'Ghaziabad', '2024-01-01T00:00:00+00:00')",
            params![],
        )
        .await
        .unwrap();

        assert!(!storage.has_resolved("GZB").await.unwrap());
        let stored = storage.get_coordinate("GZB").await.unwrap().unwrap();
        assert!(stored.coordinates.is_none());
    }

    #[tokio::test]
    async fn run_lifecycle() {
        let (storage, _tmp) = test_storage().await;
        let run_id = RunId::new();
        storage.insert_run(&run_id).await.expect("insert run");
        storage
            .finish_run(&run_id, r#"{"total_stations": 3}"#)
            .await
            .expect("finish run");
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("sg_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.insert_train(&sample_train(1, &["A - Alpha"]))
            .await
            .unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.count_trains().await.unwrap(), 1);
        let result = ro.insert_train(&sample_train(2, &["B - Beta"])).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }
}
