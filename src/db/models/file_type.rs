// src/db/models/file_type.rs

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, Row};

/// A FileType is one entry in the global type dictionary. Seeded by
/// migration; the scanner assigns types, nothing edits them at runtime.
#[derive(Debug, Clone)]
pub struct FileType {
    pub id: Option<i64>,
    pub name: String,
    pub category: String,
}

impl FileType {
    pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Self>> {
        let mut stmt =
            conn.prepare("SELECT id, name, category FROM file_types WHERE name = ?1")?;

        let file_type = stmt.query_row([name], Self::from_row).optional()?;

        Ok(file_type)
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare("SELECT id, name, category FROM file_types WHERE id = ?1")?;

        let file_type = stmt.query_row([id], Self::from_row).optional()?;

        Ok(file_type)
    }

    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare("SELECT id, name, category FROM file_types ORDER BY name")?;

        let types = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(types)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            category: row.get(2)?,
        })
    }
}

/// One ordered classifier pattern. The scanner walks patterns by
/// ascending priority and takes the first regex match.
#[derive(Debug, Clone)]
pub struct FileTypePattern {
    pub id: Option<i64>,
    pub priority: i64,
    pub pattern: String,
    pub file_type_id: i64,
}

impl FileTypePattern {
    /// All patterns in match order (ascending priority).
    pub fn list_ordered(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, priority, pattern, file_type_id
             FROM file_type_patterns ORDER BY priority",
        )?;

        let patterns = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(patterns)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            priority: row.get(1)?,
            pattern: row.get(2)?,
            file_type_id: row.get(3)?,
        })
    }
}
