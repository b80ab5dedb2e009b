//! End-to-end coordinate update run: backup → extract → resolve → summary.
//!
//! Strictly sequential by policy: the geocoding service rate-limits and
//! penalizes bursty traffic, so stations are processed one at a time with a
//! pause between each. Every station is its own atomic unit of work
//! (check → resolve → upsert); a crash or cancellation between stations
//! never invalidates prior writes.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{error, info, instrument, warn};

use stationgeo_geocoder::Resolver;
use stationgeo_shared::{
    PipelineConfig, Result, RunId, RunSummary, StationGeoError, StationRecord,
};
use stationgeo_storage::Storage;

use crate::backup::SnapshotGuard;
use crate::extract::collect_stations;

// ---------------------------------------------------------------------------
// Outcomes and progress reporting
// ---------------------------------------------------------------------------

/// Per-station outcome of the check → resolve → upsert unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationOutcome {
    /// The store already holds coordinates; the geocoder was not invoked.
    AlreadyResolved,
    /// Fresh coordinates were resolved and written.
    Updated,
    /// Every query pattern came up empty.
    NotFound,
    /// The store lookup or write failed.
    StoreFailed,
}

impl StationOutcome {
    fn is_success(self) -> bool {
        matches!(self, Self::AlreadyResolved | Self::Updated)
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each station's unit of work completes.
    fn station_processed(
        &self,
        station: &StationRecord,
        outcome: StationOutcome,
        current: usize,
        total: usize,
    );
    /// Called at each periodic progress checkpoint.
    fn checkpoint(&self, processed: usize, success: usize, failed: usize);
    /// Called when the run completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn station_processed(
        &self,
        _station: &StationRecord,
        _outcome: StationOutcome,
        _current: usize,
        _total: usize,
    ) {
    }
    fn checkpoint(&self, _processed: usize, _success: usize, _failed: usize) {}
    fn done(&self, _summary: &RunSummary) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Run the full coordinate update pipeline.
///
/// 1. Backup gate: a failed snapshot aborts before anything else happens
/// 2. Extract the deduplicated station set from the train dataset
/// 3. Resolve and upsert each unresolved station, one at a time
/// 4. Write the run summary artifact
///
/// `cancel` is polled before each station; a cancelled run stops cleanly
/// between stations and still produces a summary for the work done so far.
/// `config.limit` caps the run at that many stations the same way.
/// Only fatal errors (backup, dataset enumeration, store setup) escape;
/// per-station failures become counters and log entries.
#[instrument(skip_all)]
pub async fn run_update(
    config: &PipelineConfig,
    storage: &Storage,
    resolver: &Resolver,
    snapshot: &dyn SnapshotGuard,
    progress: &dyn ProgressReporter,
    cancel: &AtomicBool,
) -> Result<RunSummary> {
    // --- Backup gate ---
    progress.phase("Backing up database");
    let backup_path = snapshot.snapshot()?;
    info!(backup = %backup_path.display(), "backup complete");

    // --- Extract ---
    progress.phase("Extracting stations");
    let trains = storage
        .list_trains()
        .await
        .map_err(|e| StationGeoError::Dataset(e.to_string()))?;
    let stations = collect_stations(&trains);
    info!(
        trains = trains.len(),
        stations = stations.len(),
        "station set extracted"
    );

    // --- Resolve ---
    progress.phase("Resolving coordinates");
    storage.ensure_coordinate_index().await?;

    let run_id = RunId::new();
    storage.insert_run(&run_id).await?;

    let total = stations.len();
    let mut processed = 0usize;
    let mut success = 0usize;
    let mut failed = 0usize;

    for (code, name) in &stations {
        if cancel.load(Ordering::Relaxed) {
            warn!(
                processed,
                total, "cancellation requested, stopping between stations"
            );
            break;
        }
        if config.limit.is_some_and(|limit| processed >= limit) {
            info!(processed, total, "station limit reached");
            break;
        }

        processed += 1;
        let station = StationRecord {
            code: code.clone(),
            name: name.clone(),
        };

        let outcome = process_station(storage, resolver, &station).await;
        if outcome.is_success() {
            success += 1;
        } else {
            failed += 1;
        }
        progress.station_processed(&station, outcome, processed, total);

        if config.progress_interval > 0 && processed % config.progress_interval == 0 {
            info!(processed, total, success, failed, "progress checkpoint");
            progress.checkpoint(processed, success, failed);
        }

        if config.station_pause_ms > 0 {
            tokio::time::sleep(Duration::from_millis(config.station_pause_ms)).await;
        }
    }

    // --- Summarize ---
    progress.phase("Writing run summary");
    let summary = RunSummary {
        total_stations: success + failed,
        successful_updates: success,
        failed_updates: failed,
        timestamp: chrono::Utc::now(),
    };

    write_summary(&config.summary_path, &summary)?;
    let summary_json = serde_json::to_string(&summary)
        .map_err(|e| StationGeoError::validation(format!("summary: {e}")))?;
    storage.finish_run(&run_id, &summary_json).await?;

    info!(
        total = summary.total_stations,
        success, failed, "coordinate update complete"
    );
    progress.done(&summary);

    Ok(summary)
}

/// One station's atomic unit of work. Never fails the run: every error is
/// converted into an outcome for the counters.
async fn process_station(
    storage: &Storage,
    resolver: &Resolver,
    station: &StationRecord,
) -> StationOutcome {
    match storage.has_resolved(&station.code).await {
        Ok(true) => return StationOutcome::AlreadyResolved,
        Ok(false) => {}
        Err(e) => {
            error!(code = %station.code, error = %e, "store lookup failed");
            return StationOutcome::StoreFailed;
        }
    }

    let Some(coords) = resolver.resolve(&station.code, &station.name).await else {
        warn!(code = %station.code, name = %station.name, "could not find coordinates");
        return StationOutcome::NotFound;
    };

    match storage
        .upsert_coordinate(&station.code, &station.name, &coords)
        .await
    {
        Ok(()) => {
            info!(
                code = %station.code,
                lat = coords.lat,
                lon = coords.lon,
                source = %coords.source,
                "coordinates updated"
            );
            StationOutcome::Updated
        }
        Err(e) => {
            error!(code = %station.code, error = %e, "failed to update store");
            StationOutcome::StoreFailed
        }
    }
}

/// Write the summary artifact, overwriting any previous run's file.
fn write_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| StationGeoError::io(parent, e))?;
        }
    }

    let mut json = serde_json::to_string_pretty(summary)
        .map_err(|e| StationGeoError::validation(format!("summary: {e}")))?;
    json.push('\n');
    std::fs::write(path, json).map_err(|e| StationGeoError::io(path, e))
}
