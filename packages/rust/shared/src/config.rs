//! Application configuration for stationgeo.
//!
//! User config lives at `~/.stationgeo/stationgeo.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StationGeoError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "stationgeo.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".stationgeo";

// ---------------------------------------------------------------------------
// Config structs (matching stationgeo.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Geocoding service settings.
    #[serde(default)]
    pub geocoder: GeocoderSection,

    /// Pipeline pacing and reporting.
    #[serde(default)]
    pub pipeline: PipelineSection,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path to the train database file.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Where the run summary artifact is written.
    #[serde(default = "default_summary_path")]
    pub summary_path: String,

    /// Directory receiving pre-run database snapshots.
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            summary_path: default_summary_path(),
            backup_dir: default_backup_dir(),
        }
    }
}

fn default_db_path() -> String {
    "train_database.db".into()
}
fn default_summary_path() -> String {
    "coordinate_update_summary.json".into()
}
fn default_backup_dir() -> String {
    "database_backups".into()
}

/// `[geocoder]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocoderSection {
    /// Base URL of the Nominatim-style search endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// User-Agent sent with every request (required by Nominatim's usage policy).
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Attempts per query pattern before the pattern is abandoned.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Fixed pause before retrying a transient failure. Not exponential.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Courtesy pause after every geocode attempt.
    #[serde(default = "default_request_pause")]
    pub request_pause_ms: u64,

    /// Query pattern templates, tried in order. `{name}` and `{code}` are
    /// replaced with the station's display name and code.
    #[serde(default = "default_query_patterns")]
    pub query_patterns: Vec<String>,
}

impl Default for GeocoderSection {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            user_agent: default_user_agent(),
            request_timeout_ms: default_request_timeout(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff(),
            request_pause_ms: default_request_pause(),
            query_patterns: default_query_patterns(),
        }
    }
}

fn default_endpoint() -> String {
    "https://nominatim.openstreetmap.org".into()
}
fn default_user_agent() -> String {
    "stationgeo (+https://github.com/stationgeo/stationgeo)".into()
}
fn default_request_timeout() -> u64 {
    10_000
}
fn default_retry_count() -> u32 {
    3
}
fn default_retry_backoff() -> u64 {
    2_000
}
fn default_request_pause() -> u64 {
    1_000
}
fn default_query_patterns() -> Vec<String> {
    vec![
        "{name} Railway Station, India".into(),
        "{code} Railway Station, India".into(),
        "{name} Junction, India".into(),
        "{name}, India".into(),
    ]
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Pause after each station, independent of geocoder-internal pacing.
    #[serde(default = "default_station_pause")]
    pub station_pause_ms: u64,

    /// Emit a progress checkpoint every N stations.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            station_pause_ms: default_station_pause(),
            progress_interval: default_progress_interval(),
        }
    }
}

fn default_station_pause() -> u64 {
    1_000
}
fn default_progress_interval() -> usize {
    10
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config file + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime geocoder configuration handed to the resolver.
#[derive(Debug, Clone)]
pub struct GeocoderConfig {
    pub endpoint: String,
    pub user_agent: String,
    pub request_timeout_ms: u64,
    pub retry_count: u32,
    pub retry_backoff_ms: u64,
    pub request_pause_ms: u64,
    pub query_patterns: Vec<String>,
}

impl From<&AppConfig> for GeocoderConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            endpoint: config.geocoder.endpoint.clone(),
            user_agent: config.geocoder.user_agent.clone(),
            request_timeout_ms: config.geocoder.request_timeout_ms,
            retry_count: config.geocoder.retry_count,
            retry_backoff_ms: config.geocoder.retry_backoff_ms,
            request_pause_ms: config.geocoder.request_pause_ms,
            query_patterns: config.geocoder.query_patterns.clone(),
        }
    }
}

/// Runtime pipeline configuration handed to the runner.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub summary_path: PathBuf,
    pub station_pause_ms: u64,
    pub progress_interval: usize,
    /// Process at most this many stations. `None` runs the full set.
    pub limit: Option<usize>,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            summary_path: PathBuf::from(&config.defaults.summary_path),
            station_pause_ms: config.pipeline.station_pause_ms,
            progress_interval: config.pipeline.progress_interval,
            limit: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.stationgeo/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| StationGeoError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.stationgeo/stationgeo.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| StationGeoError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| StationGeoError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| StationGeoError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| StationGeoError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| StationGeoError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("db_path"));
        assert!(toml_str.contains("nominatim.openstreetmap.org"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.geocoder.retry_count, 3);
        assert_eq!(parsed.geocoder.retry_backoff_ms, 2_000);
        assert_eq!(parsed.pipeline.station_pause_ms, 1_000);
    }

    #[test]
    fn default_patterns_in_priority_order() {
        let config = AppConfig::default();
        let patterns = &config.geocoder.query_patterns;
        assert_eq!(patterns.len(), 4);
        assert_eq!(patterns[0], "{name} Railway Station, India");
        assert_eq!(patterns[1], "{code} Railway Station, India");
        assert_eq!(patterns[2], "{name} Junction, India");
        assert_eq!(patterns[3], "{name}, India");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
db_path = "/var/lib/stationgeo/trains.db"

[geocoder]
retry_count = 5
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.db_path, "/var/lib/stationgeo/trains.db");
        assert_eq!(config.defaults.backup_dir, "database_backups");
        assert_eq!(config.geocoder.retry_count, 5);
        assert_eq!(config.geocoder.request_pause_ms, 1_000);
    }

    #[test]
    fn runtime_configs_from_app_config() {
        let app = AppConfig::default();
        let geocoder = GeocoderConfig::from(&app);
        assert_eq!(geocoder.retry_count, 3);
        assert_eq!(geocoder.query_patterns.len(), 4);

        let pipeline = PipelineConfig::from(&app);
        assert_eq!(pipeline.progress_interval, 10);
        assert_eq!(pipeline.limit, None);
        assert_eq!(
            pipeline.summary_path,
            PathBuf::from("coordinate_update_summary.json")
        );
    }
}
