// src/backup.rs

//! Online backup and restore
//!
//! Backups are full copies of the store file taken with SQLite's
//! native backup API, so they are consistent even while other
//! connections are writing. Restore replaces the store file after
//! taking an automatic safety copy of whatever is there.

use crate::error::{Error, Result};
use crate::paths;
use chrono::Utc;
use rusqlite::backup::Backup;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Timestamped default backup filename.
fn backup_filename() -> String {
    format!("templedb-{}.sqlite", Utc::now().format("%Y%m%d-%H%M%S"))
}

/// Copy the open store to `dest` (default: a timestamped file under the
/// backups directory). Returns the written path.
pub fn backup(conn: &Connection, dest: Option<&Path>) -> Result<PathBuf> {
    let dest = match dest {
        Some(path) => path.to_path_buf(),
        None => paths::backups_dir().join(backup_filename()),
    };

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut target = Connection::open(&dest)?;
    {
        let backup = Backup::new(conn, &mut target)?;
        backup.run_to_completion(100, Duration::from_millis(10), None)?;
    }

    info!("Backed up store to {}", dest.display());
    Ok(dest)
}

/// Replace the store file with `src`, keeping a safety copy of the
/// current file next to it.
pub fn restore(src: &Path) -> Result<PathBuf> {
    if !src.exists() {
        return Err(Error::NotFound(format!("backup '{}'", src.display())));
    }

    let db_path = paths::database_path();
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }

    if db_path.exists() {
        let safety = db_path.with_extension("sqlite.pre-restore");
        fs::copy(&db_path, &safety)?;
        info!("Safety copy written to {}", safety.display());
    }

    // Stale WAL/SHM sidecars must not outlive the replaced store file.
    for suffix in ["-wal", "-shm"] {
        let sidecar = PathBuf::from(format!("{}{}", db_path.display(), suffix));
        if sidecar.exists() {
            fs::remove_file(&sidecar)?;
        }
    }

    fs::copy(src, &db_path)?;
    info!("Restored store from {}", src.display());
    Ok(db_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_backup_produces_openable_copy() {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = crate::db::init(temp_file.path()).unwrap();
        conn.execute(
            "INSERT INTO projects (slug, name) VALUES ('p', 'P')",
            [],
        )
        .unwrap();

        let dest_dir = TempDir::new().unwrap();
        let dest = dest_dir.path().join("copy.sqlite");
        let written = backup(&conn, Some(&dest)).unwrap();
        assert_eq!(written, dest);

        let copy = Connection::open(&dest).unwrap();
        let count: i64 = copy
            .query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_restore_missing_source_fails() {
        let result = restore(Path::new("/nonexistent/backup.sqlite"));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
