//! Shared types, error model, and configuration for stationgeo.
//!
//! This crate is the foundation depended on by all other stationgeo crates.
//! It provides:
//! - [`StationGeoError`] — the unified error type
//! - Domain types ([`StationRecord`], [`CoordinateResult`], [`StoredCoordinate`], [`RunSummary`], [`Train`])
//! - Configuration ([`AppConfig`], [`GeocoderConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, GeocoderConfig, GeocoderSection, PipelineConfig, PipelineSection,
    config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{Result, StationGeoError};
pub use types::{
    CoordinateResult, RunId, RunSummary, StationRecord, StoredCoordinate, Train, TrainStop,
};
