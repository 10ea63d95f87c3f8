// src/paths.rs

//! Data directory resolution
//!
//! All templedb state lives under a single per-user data directory:
//! the store file, online backups, and the default checkout area.
//! `TEMPLEDB_DATA_DIR` overrides the OS-appropriate base.

use std::env;
use std::path::PathBuf;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "TEMPLEDB_DATA_DIR";

/// Base data directory: `$TEMPLEDB_DATA_DIR` or `<os data dir>/templedb`.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("templedb")
}

/// Path of the store file.
pub fn database_path() -> PathBuf {
    data_dir().join("templedb.sqlite")
}

/// Directory holding timestamped online backups.
pub fn backups_dir() -> PathBuf {
    data_dir().join("backups")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_path_is_under_data_dir() {
        let db = database_path();
        assert!(db.starts_with(data_dir()));
        assert_eq!(db.file_name().unwrap(), "templedb.sqlite");
    }

    #[test]
    fn test_backups_dir_is_under_data_dir() {
        assert!(backups_dir().starts_with(data_dir()));
    }
}
