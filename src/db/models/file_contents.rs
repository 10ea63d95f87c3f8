// src/db/models/file_contents.rs

use crate::error::{Error, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// One version of a file's content. For each file exactly one row has
/// `is_current = 1` (enforced by a partial unique index); versions are
/// monotonic and increase by exactly one on each replacement.
#[derive(Debug, Clone)]
pub struct FileContents {
    pub id: Option<i64>,
    pub file_id: i64,
    pub content_hash: String,
    pub version: i64,
    pub is_current: bool,
    pub created_at: Option<String>,
}

impl FileContents {
    /// Current version row for a file, if it has any content yet.
    pub fn current_for_file(conn: &Connection, file_id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, file_id, content_hash, version, is_current, created_at
             FROM file_contents WHERE file_id = ?1 AND is_current = 1",
        )?;

        let current = stmt.query_row([file_id], Self::from_row).optional()?;

        Ok(current)
    }

    /// Full version history for a file, oldest first.
    pub fn history_for_file(conn: &Connection, file_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, file_id, content_hash, version, is_current, created_at
             FROM file_contents WHERE file_id = ?1 ORDER BY version",
        )?;

        let history = stmt
            .query_map([file_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(history)
    }

    /// Atomically make `(hash, version)` the file's current content.
    ///
    /// The previous current row (if any) is flipped to historical in the
    /// same transaction. `version` must be exactly one past the previous
    /// current version, otherwise `VersionConflict` is returned and the
    /// store is untouched. Also bumps the file's `updated_at`.
    pub fn set_current(conn: &Connection, file_id: i64, hash: &str, version: i64) -> Result<()> {
        crate::db::transaction(conn, |tx| {
            let current = Self::current_for_file(tx, file_id)?;
            let expected = current.as_ref().map(|c| c.version + 1).unwrap_or(1);

            if version != expected {
                return Err(Error::VersionConflict {
                    file_id,
                    expected,
                    actual: version,
                });
            }

            // Flip the old pointer first so the partial unique index
            // never sees two current rows.
            tx.execute(
                "UPDATE file_contents SET is_current = 0
                 WHERE file_id = ?1 AND is_current = 1",
                [file_id],
            )?;

            tx.execute(
                "INSERT INTO file_contents (file_id, content_hash, version, is_current)
                 VALUES (?1, ?2, ?3, 1)",
                params![file_id, hash, version],
            )?;

            tx.execute(
                "UPDATE project_files SET updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
                [file_id],
            )?;

            Ok(())
        })
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            file_id: row.get(1)?,
            content_hash: row.get(2)?,
            version: row.get(3)?,
            is_current: row.get::<_, i64>(4)? != 0,
            created_at: row.get(5)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Project, ProjectFile};
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, Connection, i64) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = crate::db::init(temp_file.path()).unwrap();
        let project_id = Project::new("p".to_string(), "P".to_string())
            .insert(&conn)
            .unwrap();
        (temp_file, conn, project_id)
    }

    fn put_blob(conn: &Connection, hash: &str) {
        conn.execute(
            "INSERT OR IGNORE INTO content_blobs (hash, content_type, text_content, size_bytes, line_count)
             VALUES (?1, 'text', 'x', 1, 1)",
            [hash],
        )
        .unwrap();
    }

    #[test]
    fn test_set_current_creates_version_one() {
        let (_temp, conn, project_id) = create_test_db();
        let file = ProjectFile::get_or_create(&conn, project_id, "a.txt", None).unwrap();
        let file_id = file.id.unwrap();
        put_blob(&conn, "h1");

        FileContents::set_current(&conn, file_id, "h1", 1).unwrap();

        let current = FileContents::current_for_file(&conn, file_id)
            .unwrap()
            .unwrap();
        assert_eq!(current.version, 1);
        assert_eq!(current.content_hash, "h1");
        assert!(current.is_current);
    }

    #[test]
    fn test_set_current_flips_previous_row() {
        let (_temp, conn, project_id) = create_test_db();
        let file = ProjectFile::get_or_create(&conn, project_id, "a.txt", None).unwrap();
        let file_id = file.id.unwrap();
        put_blob(&conn, "h1");
        put_blob(&conn, "h2");

        FileContents::set_current(&conn, file_id, "h1", 1).unwrap();
        FileContents::set_current(&conn, file_id, "h2", 2).unwrap();

        let history = FileContents::history_for_file(&conn, file_id).unwrap();
        assert_eq!(history.len(), 2);
        assert!(!history[0].is_current);
        assert!(history[1].is_current);
        assert_eq!(history[1].version, 2);
    }

    #[test]
    fn test_wrong_version_is_conflict_and_leaves_store_unchanged() {
        let (_temp, conn, project_id) = create_test_db();
        let file = ProjectFile::get_or_create(&conn, project_id, "a.txt", None).unwrap();
        let file_id = file.id.unwrap();
        put_blob(&conn, "h1");
        put_blob(&conn, "h2");

        FileContents::set_current(&conn, file_id, "h1", 1).unwrap();

        // Skipping a version is rejected.
        let result = FileContents::set_current(&conn, file_id, "h2", 3);
        assert!(matches!(
            result,
            Err(Error::VersionConflict {
                expected: 2,
                actual: 3,
                ..
            })
        ));

        // Replaying the same version is rejected too.
        let result = FileContents::set_current(&conn, file_id, "h2", 1);
        assert!(matches!(result, Err(Error::VersionConflict { .. })));

        let current = FileContents::current_for_file(&conn, file_id)
            .unwrap()
            .unwrap();
        assert_eq!(current.version, 1);
        assert_eq!(current.content_hash, "h1");
    }
}
