// src/db/models/project_file.rs

use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// A ProjectFile is the stable identity of one (project, path) pair.
/// Its content history lives in `file_contents`; the row itself carries
/// the last-known classification and statistics.
#[derive(Debug, Clone)]
pub struct ProjectFile {
    pub id: Option<i64>,
    pub project_id: i64,
    pub path: String,
    pub file_type_id: Option<i64>,
    pub line_count: i64,
    pub owner: Option<String>,
    pub component_name: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl ProjectFile {
    /// Upsert on (project_id, path): returns the existing row if
    /// present, refreshing its classification; inserts otherwise.
    pub fn get_or_create(
        conn: &Connection,
        project_id: i64,
        path: &str,
        file_type_id: Option<i64>,
    ) -> Result<Self> {
        if let Some(existing) = Self::find_by_path(conn, project_id, path)? {
            if file_type_id.is_some() && existing.file_type_id != file_type_id {
                conn.execute(
                    "UPDATE project_files
                     SET file_type_id = ?1, updated_at = CURRENT_TIMESTAMP
                     WHERE id = ?2",
                    params![file_type_id, existing.id],
                )?;
            }
            return Ok(Self {
                file_type_id: file_type_id.or(existing.file_type_id),
                ..existing
            });
        }

        conn.execute(
            "INSERT INTO project_files (project_id, path, file_type_id) VALUES (?1, ?2, ?3)",
            params![project_id, path, file_type_id],
        )?;
        let id = conn.last_insert_rowid();

        Ok(Self {
            id: Some(id),
            project_id,
            path: path.to_string(),
            file_type_id,
            line_count: 0,
            owner: None,
            component_name: None,
            created_at: None,
            updated_at: None,
        })
    }

    /// Find a file within a project by path. Lookups are always
    /// project-scoped; paths are not unique globally.
    pub fn find_by_path(conn: &Connection, project_id: i64, path: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, project_id, path, file_type_id, line_count, owner, component_name,
                    created_at, updated_at
             FROM project_files WHERE project_id = ?1 AND path = ?2",
        )?;

        let file = stmt
            .query_row(params![project_id, path], Self::from_row)
            .optional()?;

        Ok(file)
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, project_id, path, file_type_id, line_count, owner, component_name,
                    created_at, updated_at
             FROM project_files WHERE id = ?1",
        )?;

        let file = stmt.query_row([id], Self::from_row).optional()?;

        Ok(file)
    }

    /// All files of a project ordered by path
    pub fn list_by_project(conn: &Connection, project_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, project_id, path, file_type_id, line_count, owner, component_name,
                    created_at, updated_at
             FROM project_files WHERE project_id = ?1 ORDER BY path",
        )?;

        let files = stmt
            .query_map([project_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(files)
    }

    /// Refresh scan-derived statistics for a file
    pub fn update_stats(
        conn: &Connection,
        file_id: i64,
        line_count: i64,
        component_name: Option<&str>,
    ) -> Result<()> {
        conn.execute(
            "UPDATE project_files
             SET line_count = ?1, component_name = ?2, updated_at = CURRENT_TIMESTAMP
             WHERE id = ?3",
            params![line_count, component_name, file_id],
        )?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            project_id: row.get(1)?,
            path: row.get(2)?,
            file_type_id: row.get(3)?,
            line_count: row.get(4)?,
            owner: row.get(5)?,
            component_name: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Project;
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, Connection, i64) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = crate::db::init(temp_file.path()).unwrap();
        let project_id = Project::new("p".to_string(), "P".to_string())
            .insert(&conn)
            .unwrap();
        (temp_file, conn, project_id)
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let (_temp, conn, project_id) = create_test_db();

        let first = ProjectFile::get_or_create(&conn, project_id, "src/lib.rs", None).unwrap();
        let second = ProjectFile::get_or_create(&conn, project_id, "src/lib.rs", None).unwrap();
        assert_eq!(first.id, second.id);

        let all = ProjectFile::list_by_project(&conn, project_id).unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn test_path_unique_per_project_not_globally() {
        let (_temp, conn, project_id) = create_test_db();
        let other_project = Project::new("q".to_string(), "Q".to_string())
            .insert(&conn)
            .unwrap();

        let a = ProjectFile::get_or_create(&conn, project_id, "README.md", None).unwrap();
        let b = ProjectFile::get_or_create(&conn, other_project, "README.md", None).unwrap();
        assert_ne!(a.id, b.id);

        let found = ProjectFile::find_by_path(&conn, project_id, "README.md")
            .unwrap()
            .unwrap();
        assert_eq!(found.id, a.id);
    }

    #[test]
    fn test_update_stats() {
        let (_temp, conn, project_id) = create_test_db();

        let file = ProjectFile::get_or_create(&conn, project_id, "main.py", None).unwrap();
        ProjectFile::update_stats(&conn, file.id.unwrap(), 120, Some("main")).unwrap();

        let reloaded = ProjectFile::find_by_id(&conn, file.id.unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.line_count, 120);
        assert_eq!(reloaded.component_name, Some("main".to_string()));
    }
}
