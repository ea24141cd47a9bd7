//! Database backup and rotation.
//!
//! `VACUUM INTO` produces an atomic, consistent snapshot of the live
//! database; rotation keeps the N most recent snapshot files.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::db::Database;
use crate::error::{Result, RetrievalError};

/// Prefix for backup filenames.
const BACKUP_PREFIX: &str = "hindsight-backup-";

/// Extension for backup files.
const BACKUP_EXT: &str = ".db";

/// Snapshot the live database into `backup_dir`.
///
/// The file is named `hindsight-backup-{YYYYMMDD-HHMMSS}.db` (UTC, to avoid
/// DST ambiguity). The directory is created if missing.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or `VACUUM INTO`
/// fails.
pub fn backup_database(db: &Database, backup_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(backup_dir).map_err(|e| RetrievalError::Io(e.to_string()))?;

    let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    let backup_path = backup_dir.join(format!("{BACKUP_PREFIX}{stamp}{BACKUP_EXT}"));

    // VACUUM INTO does not support parameter binding; the path is generated
    // internally, so escaping single quotes is sufficient.
    let escaped = backup_path.display().to_string().replace('\'', "''");
    let conn = db.conn()?;
    conn.execute_batch(&format!("VACUUM INTO '{escaped}'"))?;

    Ok(backup_path)
}

/// Keep the `keep_count` newest backups in `backup_dir`, delete the rest.
///
/// Filenames are timestamped, so a descending name sort is a recency sort.
/// Returns the number of deleted files; individual deletion failures are
/// logged and skipped.
///
/// # Errors
///
/// Returns an error only if the directory cannot be read.
pub fn rotate_backups(backup_dir: &Path, keep_count: usize) -> Result<usize> {
    if !backup_dir.exists() {
        return Ok(0);
    }

    let entries =
        std::fs::read_dir(backup_dir).map_err(|e| RetrievalError::Io(e.to_string()))?;
    let mut backups: Vec<PathBuf> = entries
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let name = entry.file_name().to_string_lossy().to_string();
            (name.starts_with(BACKUP_PREFIX) && name.ends_with(BACKUP_EXT))
                .then(|| entry.path())
        })
        .collect();
    backups.sort_by(|a, b| b.cmp(a));

    let mut deleted = 0;
    for old in backups.iter().skip(keep_count) {
        match std::fs::remove_file(old) {
            Ok(()) => deleted += 1,
            Err(e) => {
                warn!(path = %old.display(), error = %e, "failed to delete old backup");
            }
        }
    }

    Ok(deleted)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
