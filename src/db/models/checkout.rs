// src/db/models/checkout.rs

use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// A Checkout records where on the filesystem a project tree has been
/// materialized for editing. The directory belongs to the agent that
/// created it.
#[derive(Debug, Clone)]
pub struct Checkout {
    pub id: Option<i64>,
    pub project_id: i64,
    pub branch_id: i64,
    pub checkout_path: String,
    pub created_at: Option<String>,
    pub last_sync_at: Option<String>,
}

impl Checkout {
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO checkouts (project_id, branch_id, checkout_path) VALUES (?1, ?2, ?3)",
            params![self.project_id, self.branch_id, &self.checkout_path],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    pub fn find_by_path(
        conn: &Connection,
        project_id: i64,
        checkout_path: &str,
    ) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, project_id, branch_id, checkout_path, created_at, last_sync_at
             FROM checkouts WHERE project_id = ?1 AND checkout_path = ?2",
        )?;

        let checkout = stmt
            .query_row(params![project_id, checkout_path], Self::from_row)
            .optional()?;

        Ok(checkout)
    }

    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, project_id, branch_id, checkout_path, created_at, last_sync_at
             FROM checkouts ORDER BY project_id, checkout_path",
        )?;

        let checkouts = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(checkouts)
    }

    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM checkouts WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Stamp a successful workspace commit.
    pub fn touch_sync(conn: &Connection, id: i64) -> Result<()> {
        conn.execute(
            "UPDATE checkouts SET last_sync_at = CURRENT_TIMESTAMP WHERE id = ?1",
            [id],
        )?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            project_id: row.get(1)?,
            branch_id: row.get(2)?,
            checkout_path: row.get(3)?,
            created_at: row.get(4)?,
            last_sync_at: row.get(5)?,
        })
    }
}

/// The (content_hash, version) a file had when it was materialized.
/// This pair is the optimistic-locking basis for conflict detection.
#[derive(Debug, Clone)]
pub struct CheckoutFile {
    pub id: Option<i64>,
    pub checkout_id: i64,
    pub file_id: i64,
    pub content_hash: String,
    pub version: i64,
}

impl CheckoutFile {
    /// Insert or refresh the snapshot row for (checkout, file).
    pub fn upsert(
        conn: &Connection,
        checkout_id: i64,
        file_id: i64,
        content_hash: &str,
        version: i64,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO checkout_files (checkout_id, file_id, content_hash, version)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(checkout_id, file_id) DO UPDATE SET
                 content_hash = excluded.content_hash,
                 version = excluded.version",
            params![checkout_id, file_id, content_hash, version],
        )?;
        Ok(())
    }

    pub fn find(conn: &Connection, checkout_id: i64, file_id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, checkout_id, file_id, content_hash, version
             FROM checkout_files WHERE checkout_id = ?1 AND file_id = ?2",
        )?;

        let snapshot = stmt
            .query_row(params![checkout_id, file_id], Self::from_row)
            .optional()?;

        Ok(snapshot)
    }

    pub fn list_by_checkout(conn: &Connection, checkout_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, checkout_id, file_id, content_hash, version
             FROM checkout_files WHERE checkout_id = ?1",
        )?;

        let snapshots = stmt
            .query_map([checkout_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(snapshots)
    }

    pub fn delete(conn: &Connection, checkout_id: i64, file_id: i64) -> Result<()> {
        conn.execute(
            "DELETE FROM checkout_files WHERE checkout_id = ?1 AND file_id = ?2",
            params![checkout_id, file_id],
        )?;
        Ok(())
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            checkout_id: row.get(1)?,
            file_id: row.get(2)?,
            content_hash: row.get(3)?,
            version: row.get(4)?,
        })
    }
}
