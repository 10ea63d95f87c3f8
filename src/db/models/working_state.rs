// src/db/models/working_state.rs

use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::str::FromStr;

/// Editing status of a file on a branch
///
/// Transitions: `unmodified` on edit becomes `modified`, a new file is
/// `added`, a removed one `deleted`; any of those can be staged. A
/// commit resets touched files to `unmodified`. A staged file whose
/// store-side version moved underneath it becomes `conflict`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkingFileState {
    Unmodified,
    Modified,
    Added,
    Deleted,
    Conflict,
}

impl WorkingFileState {
    pub fn as_str(&self) -> &str {
        match self {
            WorkingFileState::Unmodified => "unmodified",
            WorkingFileState::Modified => "modified",
            WorkingFileState::Added => "added",
            WorkingFileState::Deleted => "deleted",
            WorkingFileState::Conflict => "conflict",
        }
    }
}

impl FromStr for WorkingFileState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "unmodified" => Ok(WorkingFileState::Unmodified),
            "modified" => Ok(WorkingFileState::Modified),
            "added" => Ok(WorkingFileState::Added),
            "deleted" => Ok(WorkingFileState::Deleted),
            "conflict" => Ok(WorkingFileState::Conflict),
            _ => Err(format!("Invalid working state: {}", s)),
        }
    }
}

/// Per-(project, branch, file) mutable editing status. Rows with
/// `staged = 1` form the staging area for the next commit.
#[derive(Debug, Clone)]
pub struct WorkingState {
    pub id: Option<i64>,
    pub project_id: i64,
    pub branch_id: i64,
    pub file_id: i64,
    pub content_hash: Option<String>,
    pub state: WorkingFileState,
    pub staged: bool,
    pub updated_at: Option<String>,
}

impl WorkingState {
    /// Insert or replace the row for this (project, branch, file).
    pub fn upsert(
        conn: &Connection,
        project_id: i64,
        branch_id: i64,
        file_id: i64,
        content_hash: Option<&str>,
        state: WorkingFileState,
        staged: bool,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO working_states
                 (project_id, branch_id, file_id, content_hash, state, staged)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(project_id, branch_id, file_id) DO UPDATE SET
                 content_hash = excluded.content_hash,
                 state = excluded.state,
                 staged = excluded.staged,
                 updated_at = CURRENT_TIMESTAMP",
            params![
                project_id,
                branch_id,
                file_id,
                content_hash,
                state.as_str(),
                staged as i64
            ],
        )?;
        Ok(())
    }

    pub fn get(
        conn: &Connection,
        project_id: i64,
        branch_id: i64,
        file_id: i64,
    ) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, project_id, branch_id, file_id, content_hash, state, staged, updated_at
             FROM working_states
             WHERE project_id = ?1 AND branch_id = ?2 AND file_id = ?3",
        )?;

        let state = stmt
            .query_row(params![project_id, branch_id, file_id], Self::from_row)
            .optional()?;

        Ok(state)
    }

    pub fn list_for_branch(
        conn: &Connection,
        project_id: i64,
        branch_id: i64,
    ) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, project_id, branch_id, file_id, content_hash, state, staged, updated_at
             FROM working_states
             WHERE project_id = ?1 AND branch_id = ?2",
        )?;

        let states = stmt
            .query_map(params![project_id, branch_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(states)
    }

    /// The staging area: rows earmarked for the next commit.
    pub fn list_staged(conn: &Connection, project_id: i64, branch_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, project_id, branch_id, file_id, content_hash, state, staged, updated_at
             FROM working_states
             WHERE project_id = ?1 AND branch_id = ?2 AND staged = 1",
        )?;

        let states = stmt
            .query_map(params![project_id, branch_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(states)
    }

    /// Stage or unstage a file. Unstaging preserves the state itself.
    pub fn set_staged(
        conn: &Connection,
        project_id: i64,
        branch_id: i64,
        file_id: i64,
        staged: bool,
    ) -> Result<()> {
        conn.execute(
            "UPDATE working_states SET staged = ?1, updated_at = CURRENT_TIMESTAMP
             WHERE project_id = ?2 AND branch_id = ?3 AND file_id = ?4",
            params![staged as i64, project_id, branch_id, file_id],
        )?;
        Ok(())
    }

    /// After a commit: touched files return to unmodified, unstaged.
    pub fn reset_to_unmodified(
        conn: &Connection,
        project_id: i64,
        branch_id: i64,
        file_id: i64,
        content_hash: Option<&str>,
    ) -> Result<()> {
        Self::upsert(
            conn,
            project_id,
            branch_id,
            file_id,
            content_hash,
            WorkingFileState::Unmodified,
            false,
        )
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let state_str: String = row.get(5)?;
        let state = state_str.parse::<WorkingFileState>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                5,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            )
        })?;

        Ok(Self {
            id: Some(row.get(0)?),
            project_id: row.get(1)?,
            branch_id: row.get(2)?,
            file_id: row.get(3)?,
            content_hash: row.get(4)?,
            state,
            staged: row.get::<_, i64>(6)? != 0,
            updated_at: row.get(7)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Branch, Project, ProjectFile};
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, Connection, i64, i64, i64) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = crate::db::init(temp_file.path()).unwrap();
        let project_id = Project::new("p".to_string(), "P".to_string())
            .insert(&conn)
            .unwrap();
        let branch_id = Branch::get_or_create(&conn, project_id, "main", None)
            .unwrap()
            .id
            .unwrap();
        let file_id = ProjectFile::get_or_create(&conn, project_id, "a.txt", None)
            .unwrap()
            .id
            .unwrap();
        (temp_file, conn, project_id, branch_id, file_id)
    }

    #[test]
    fn test_upsert_then_stage_then_unstage() {
        let (_temp, conn, project_id, branch_id, file_id) = create_test_db();

        WorkingState::upsert(
            &conn,
            project_id,
            branch_id,
            file_id,
            Some("h1"),
            WorkingFileState::Modified,
            false,
        )
        .unwrap();

        WorkingState::set_staged(&conn, project_id, branch_id, file_id, true).unwrap();
        let staged = WorkingState::list_staged(&conn, project_id, branch_id).unwrap();
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].state, WorkingFileState::Modified);

        // Unstage preserves the state.
        WorkingState::set_staged(&conn, project_id, branch_id, file_id, false).unwrap();
        let ws = WorkingState::get(&conn, project_id, branch_id, file_id)
            .unwrap()
            .unwrap();
        assert_eq!(ws.state, WorkingFileState::Modified);
        assert!(!ws.staged);
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let (_temp, conn, project_id, branch_id, file_id) = create_test_db();

        WorkingState::upsert(
            &conn,
            project_id,
            branch_id,
            file_id,
            Some("h1"),
            WorkingFileState::Added,
            true,
        )
        .unwrap();
        WorkingState::reset_to_unmodified(&conn, project_id, branch_id, file_id, Some("h1"))
            .unwrap();

        let all = WorkingState::list_for_branch(&conn, project_id, branch_id).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].state, WorkingFileState::Unmodified);
        assert!(!all[0].staged);
    }
}
