// src/db/models/conflict.rs

use crate::error::Result;
use rusqlite::{params, Connection, Row};
use std::str::FromStr;

/// Why a workspace commit diverged from the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictType {
    /// Snapshot version fell behind the store's current version
    VersionMismatch,
    /// Same version number but different bytes (a prior force overwrite)
    ContentDiverged,
}

impl ConflictType {
    pub fn as_str(&self) -> &str {
        match self {
            ConflictType::VersionMismatch => "version_mismatch",
            ConflictType::ContentDiverged => "content_diverged",
        }
    }
}

impl FromStr for ConflictType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "version_mismatch" => Ok(ConflictType::VersionMismatch),
            "content_diverged" => Ok(ConflictType::ContentDiverged),
            _ => Err(format!("Invalid conflict type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictStatus {
    Open,
    Resolved,
}

impl ConflictStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ConflictStatus::Open => "open",
            ConflictStatus::Resolved => "resolved",
        }
    }
}

impl FromStr for ConflictStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "open" => Ok(ConflictStatus::Open),
            "resolved" => Ok(ConflictStatus::Resolved),
            _ => Err(format!("Invalid conflict status: {}", s)),
        }
    }
}

/// A detected divergence between a checkout's basis and the store's
/// current state for one file. Lifecycle: open → resolved.
#[derive(Debug, Clone)]
pub struct Conflict {
    pub id: Option<i64>,
    pub project_id: i64,
    pub file_id: i64,
    pub checkout_id: Option<i64>,
    pub base_version: i64,
    pub base_hash: String,
    pub current_version: i64,
    pub current_hash: String,
    pub conflict_type: ConflictType,
    pub status: ConflictStatus,
    pub resolution_strategy: Option<String>,
    pub resolved_by: Option<String>,
    pub created_at: Option<String>,
    pub resolved_at: Option<String>,
}

impl Conflict {
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO conflicts (project_id, file_id, checkout_id, base_version, base_hash,
                 current_version, current_hash, conflict_type, status, resolution_strategy,
                 resolved_by, resolved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                self.project_id,
                self.file_id,
                self.checkout_id,
                self.base_version,
                &self.base_hash,
                self.current_version,
                &self.current_hash,
                self.conflict_type.as_str(),
                self.status.as_str(),
                &self.resolution_strategy,
                &self.resolved_by,
                &self.resolved_at,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Open conflicts touching any of the given files.
    pub fn open_for_files(conn: &Connection, file_ids: &[i64]) -> Result<Vec<Self>> {
        let mut found = Vec::new();
        let mut stmt = conn.prepare(
            "SELECT id, project_id, file_id, checkout_id, base_version, base_hash,
                    current_version, current_hash, conflict_type, status,
                    resolution_strategy, resolved_by, created_at, resolved_at
             FROM conflicts WHERE file_id = ?1 AND status = 'open'",
        )?;

        for file_id in file_ids {
            let rows = stmt
                .query_map([file_id], Self::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            found.extend(rows);
        }

        Ok(found)
    }

    pub fn list_open_for_project(conn: &Connection, project_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, project_id, file_id, checkout_id, base_version, base_hash,
                    current_version, current_hash, conflict_type, status,
                    resolution_strategy, resolved_by, created_at, resolved_at
             FROM conflicts WHERE project_id = ?1 AND status = 'open'
             ORDER BY created_at",
        )?;

        let conflicts = stmt
            .query_map([project_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(conflicts)
    }

    /// Close a conflict, recording how and by whom.
    pub fn resolve(conn: &Connection, id: i64, strategy: &str, resolved_by: &str) -> Result<()> {
        conn.execute(
            "UPDATE conflicts
             SET status = 'resolved', resolution_strategy = ?1, resolved_by = ?2,
                 resolved_at = CURRENT_TIMESTAMP
             WHERE id = ?3",
            params![strategy, resolved_by, id],
        )?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let type_str: String = row.get(8)?;
        let conflict_type = type_str.parse::<ConflictType>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                8,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            )
        })?;

        let status_str: String = row.get(9)?;
        let status = status_str.parse::<ConflictStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                9,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            )
        })?;

        Ok(Self {
            id: Some(row.get(0)?),
            project_id: row.get(1)?,
            file_id: row.get(2)?,
            checkout_id: row.get(3)?,
            base_version: row.get(4)?,
            base_hash: row.get(5)?,
            current_version: row.get(6)?,
            current_hash: row.get(7)?,
            conflict_type,
            status,
            resolution_strategy: row.get(10)?,
            resolved_by: row.get(11)?,
            created_at: row.get(12)?,
            resolved_at: row.get(13)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Project, ProjectFile};
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, Connection, i64, i64) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = crate::db::init(temp_file.path()).unwrap();
        let project_id = Project::new("p".to_string(), "P".to_string())
            .insert(&conn)
            .unwrap();
        let file_id = ProjectFile::get_or_create(&conn, project_id, "a.txt", None)
            .unwrap()
            .id
            .unwrap();
        (temp_file, conn, project_id, file_id)
    }

    fn open_conflict(project_id: i64, file_id: i64) -> Conflict {
        Conflict {
            id: None,
            project_id,
            file_id,
            checkout_id: None,
            base_version: 1,
            base_hash: "h1".to_string(),
            current_version: 2,
            current_hash: "h2".to_string(),
            conflict_type: ConflictType::VersionMismatch,
            status: ConflictStatus::Open,
            resolution_strategy: None,
            resolved_by: None,
            created_at: None,
            resolved_at: None,
        }
    }

    #[test]
    fn test_open_then_resolve() {
        let (_temp, conn, project_id, file_id) = create_test_db();

        let id = open_conflict(project_id, file_id).insert(&conn).unwrap();

        let open = Conflict::open_for_files(&conn, &[file_id]).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].conflict_type, ConflictType::VersionMismatch);

        Conflict::resolve(&conn, id, "force", "agent-b").unwrap();

        assert!(Conflict::open_for_files(&conn, &[file_id])
            .unwrap()
            .is_empty());
        assert!(Conflict::list_open_for_project(&conn, project_id)
            .unwrap()
            .is_empty());
    }
}
