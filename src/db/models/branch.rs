// src/db/models/branch.rs

use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// A Branch is a named mutable pointer to a head commit within one
/// project. The first branch created for a project becomes the default.
#[derive(Debug, Clone)]
pub struct Branch {
    pub id: Option<i64>,
    pub project_id: i64,
    pub name: String,
    pub head_commit_id: Option<i64>,
    pub parent_branch_id: Option<i64>,
    pub is_default: bool,
    pub is_protected: bool,
    pub created_at: Option<String>,
}

impl Branch {
    /// Find or create a branch by name within a project.
    ///
    /// The first branch a project gets is marked `is_default`.
    pub fn get_or_create(
        conn: &Connection,
        project_id: i64,
        name: &str,
        parent_branch_id: Option<i64>,
    ) -> Result<Self> {
        if let Some(existing) = Self::find_by_name(conn, project_id, name)? {
            return Ok(existing);
        }

        let branch_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM branches WHERE project_id = ?1",
            [project_id],
            |row| row.get(0),
        )?;
        let is_default = branch_count == 0;

        conn.execute(
            "INSERT INTO branches (project_id, name, parent_branch_id, is_default)
             VALUES (?1, ?2, ?3, ?4)",
            params![project_id, name, parent_branch_id, is_default as i64],
        )?;
        let id = conn.last_insert_rowid();

        Ok(Self {
            id: Some(id),
            project_id,
            name: name.to_string(),
            head_commit_id: None,
            parent_branch_id,
            is_default,
            is_protected: false,
            created_at: None,
        })
    }

    pub fn find_by_name(conn: &Connection, project_id: i64, name: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, project_id, name, head_commit_id, parent_branch_id, is_default,
                    is_protected, created_at
             FROM branches WHERE project_id = ?1 AND name = ?2",
        )?;

        let branch = stmt
            .query_row(params![project_id, name], Self::from_row)
            .optional()?;

        Ok(branch)
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, project_id, name, head_commit_id, parent_branch_id, is_default,
                    is_protected, created_at
             FROM branches WHERE id = ?1",
        )?;

        let branch = stmt.query_row([id], Self::from_row).optional()?;

        Ok(branch)
    }

    /// The project's default branch, if any branch exists at all.
    pub fn default_for_project(conn: &Connection, project_id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, project_id, name, head_commit_id, parent_branch_id, is_default,
                    is_protected, created_at
             FROM branches WHERE project_id = ?1 AND is_default = 1",
        )?;

        let branch = stmt.query_row([project_id], Self::from_row).optional()?;

        Ok(branch)
    }

    pub fn list_by_project(conn: &Connection, project_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, project_id, name, head_commit_id, parent_branch_id, is_default,
                    is_protected, created_at
             FROM branches WHERE project_id = ?1 ORDER BY is_default DESC, name",
        )?;

        let branches = stmt
            .query_map([project_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(branches)
    }

    /// Move the branch head. Called by the version engine inside the
    /// commit transaction; a schema trigger rejects heads from another
    /// project.
    pub fn set_head(conn: &Connection, branch_id: i64, commit_id: i64) -> Result<()> {
        conn.execute(
            "UPDATE branches SET head_commit_id = ?1 WHERE id = ?2",
            params![commit_id, branch_id],
        )?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            project_id: row.get(1)?,
            name: row.get(2)?,
            head_commit_id: row.get(3)?,
            parent_branch_id: row.get(4)?,
            is_default: row.get::<_, i64>(5)? != 0,
            is_protected: row.get::<_, i64>(6)? != 0,
            created_at: row.get(7)?,
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
    fn test_first_branch_is_default() {
        let (_temp, conn, project_id) = create_test_db();

        let main = Branch::get_or_create(&conn, project_id, "main", None).unwrap();
        assert!(main.is_default);

        let feature = Branch::get_or_create(&conn, project_id, "feature", main.id).unwrap();
        assert!(!feature.is_default);

        let default = Branch::default_for_project(&conn, project_id)
            .unwrap()
            .unwrap();
        assert_eq!(default.name, "main");
    }

    #[test]
    fn test_get_or_create_returns_existing() {
        let (_temp, conn, project_id) = create_test_db();

        let a = Branch::get_or_create(&conn, project_id, "main", None).unwrap();
        let b = Branch::get_or_create(&conn, project_id, "main", None).unwrap();
        assert_eq!(a.id, b.id);

        assert_eq!(Branch::list_by_project(&conn, project_id).unwrap().len(), 1);
    }

    #[test]
    fn test_branch_names_scoped_per_project() {
        let (_temp, conn, project_id) = create_test_db();
        let other = Project::new("q".to_string(), "Q".to_string())
            .insert(&conn)
            .unwrap();

        let a = Branch::get_or_create(&conn, project_id, "main", None).unwrap();
        let b = Branch::get_or_create(&conn, other, "main", None).unwrap();
        assert_ne!(a.id, b.id);
        assert!(b.is_default, "first branch of the second project");
    }
}
