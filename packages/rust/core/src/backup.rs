//! Pre-run database snapshots.
//!
//! Every mutating run is gated on a successful full backup. The pipeline
//! only talks to the [`SnapshotGuard`] trait; the file-copy implementation
//! below is the default collaborator.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::info;

use stationgeo_shared::{Result, StationGeoError};

/// Gate for mutating runs: produce a full backup or stop the pipeline.
pub trait SnapshotGuard: Send + Sync {
    /// Take a snapshot, returning the location of the backup artifact.
    fn snapshot(&self) -> Result<PathBuf>;
}

/// Copies the database file into a timestamped backup under `backup_dir`.
pub struct FileSnapshot {
    db_path: PathBuf,
    backup_dir: PathBuf,
}

impl FileSnapshot {
    pub fn new(db_path: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            backup_dir: backup_dir.into(),
        }
    }
}

impl SnapshotGuard for FileSnapshot {
    fn snapshot(&self) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.backup_dir)
            .map_err(|e| StationGeoError::Backup(format!("{}: {e}", self.backup_dir.display())))?;

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let dest = self
            .backup_dir
            .join(format!("train_database_backup_{timestamp}.db"));

        copy_file(&self.db_path, &dest)?;
        info!(backup = %dest.display(), "database backup created");
        Ok(dest)
    }
}

fn copy_file(src: &Path, dest: &Path) -> Result<()> {
    std::fs::copy(src, dest)
        .map_err(|e| StationGeoError::Backup(format!("{}: {e}", src.display())))?;
    Ok(())
}
