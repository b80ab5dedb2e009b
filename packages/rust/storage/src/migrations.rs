//! SQL migration definitions for the stationgeo database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed within a transaction.
//!
//! Note: the unique index on `station_coordinates.station_code` is NOT part
//! of the schema migration. It is created by an explicit setup step
//! (`Storage::ensure_coordinate_index`) that the pipeline runs before its
//! first write, mirroring the resolve-phase contract.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: trains, station_coordinates, runs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Train documents from the source dataset
CREATE TABLE IF NOT EXISTS trains (
    id            TEXT PRIMARY KEY,
    train_number  INTEGER NOT NULL UNIQUE,
    name          TEXT NOT NULL,
    train_type    TEXT,
    from_station  TEXT,
    to_station    TEXT,
    duration      TEXT,
    schedule_json TEXT NOT NULL,
    classes_json  TEXT NOT NULL
);

-- Resolved station coordinates, keyed by station_code
-- (unique index added separately, see module docs)
CREATE TABLE IF NOT EXISTS station_coordinates (
    station_code TEXT NOT NULL,
    station_name TEXT NOT NULL,
    lat          REAL,
    lon          REAL,
    source       TEXT,
    updated_at   TEXT NOT NULL
);

-- Pipeline run history
CREATE TABLE IF NOT EXISTS runs (
    id           TEXT PRIMARY KEY,
    started_at   TEXT NOT NULL,
    finished_at  TEXT,
    summary_json TEXT
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
