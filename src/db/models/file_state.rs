// src/db/models/file_state.rs

use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::str::FromStr;

/// How a file changed in a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl ChangeType {
    pub fn as_str(&self) -> &str {
        match self {
            ChangeType::Added => "added",
            ChangeType::Modified => "modified",
            ChangeType::Deleted => "deleted",
            ChangeType::Renamed => "renamed",
        }
    }
}

impl FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "added" => Ok(ChangeType::Added),
            "modified" => Ok(ChangeType::Modified),
            "deleted" => Ok(ChangeType::Deleted),
            "renamed" => Ok(ChangeType::Renamed),
            _ => Err(format!("Invalid change type: {}", s)),
        }
    }
}

/// A FileState captures one file's content within one commit. Deleted
/// files carry no content hash.
#[derive(Debug, Clone)]
pub struct FileState {
    pub id: Option<i64>,
    pub commit_id: i64,
    pub file_id: i64,
    pub content_hash: Option<String>,
    pub change_type: ChangeType,
    pub previous_path: Option<String>,
}

impl FileState {
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO file_states (commit_id, file_id, content_hash, change_type, previous_path)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                self.commit_id,
                self.file_id,
                &self.content_hash,
                self.change_type.as_str(),
                &self.previous_path,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    pub fn find(conn: &Connection, commit_id: i64, file_id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, commit_id, file_id, content_hash, change_type, previous_path
             FROM file_states WHERE commit_id = ?1 AND file_id = ?2",
        )?;

        let state = stmt
            .query_row(params![commit_id, file_id], Self::from_row)
            .optional()?;

        Ok(state)
    }

    pub fn list_by_commit(conn: &Connection, commit_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, commit_id, file_id, content_hash, change_type, previous_path
             FROM file_states WHERE commit_id = ?1",
        )?;

        let states = stmt
            .query_map([commit_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(states)
    }

    /// Commits that touched a file, newest first, with their change type.
    pub fn history_for_file(conn: &Connection, file_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT fs.id, fs.commit_id, fs.file_id, fs.content_hash, fs.change_type,
                    fs.previous_path
             FROM file_states fs
             JOIN commits c ON c.id = fs.commit_id
             WHERE fs.file_id = ?1
             ORDER BY c.committed_at DESC, c.commit_hash",
        )?;

        let states = stmt
            .query_map([file_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(states)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let change_str: String = row.get(4)?;
        let change_type = change_str.parse::<ChangeType>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            )
        })?;

        Ok(Self {
            id: Some(row.get(0)?),
            commit_id: row.get(1)?,
            file_id: row.get(2)?,
            content_hash: row.get(3)?,
            change_type,
            previous_path: row.get(5)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_type_round_trip() {
        for ct in [
            ChangeType::Added,
            ChangeType::Modified,
            ChangeType::Deleted,
            ChangeType::Renamed,
        ] {
            assert_eq!(ct.as_str().parse::<ChangeType>().unwrap(), ct);
        }
        assert!("teleported".parse::<ChangeType>().is_err());
    }
}
