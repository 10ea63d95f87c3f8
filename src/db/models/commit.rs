// src/db/models/commit.rs

use crate::error::{Error, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// A Commit is an immutable labeled snapshot of a project's file set,
/// content-addressed by the SHA-256 of its canonical encoding.
#[derive(Debug, Clone)]
pub struct Commit {
    pub id: Option<i64>,
    pub project_id: i64,
    pub branch_id: i64,
    pub commit_hash: String,
    pub parent_commit_id: Option<i64>,
    pub merge_parent_commit_id: Option<i64>,
    pub author: String,
    pub author_email: String,
    pub message: String,
    pub committed_at: String,
    pub files_changed: i64,
    pub lines_added: i64,
    pub lines_removed: i64,
}

const COMMIT_COLUMNS: &str = "id, project_id, branch_id, commit_hash, parent_commit_id,
    merge_parent_commit_id, author, author_email, message, committed_at,
    files_changed, lines_added, lines_removed";

impl Commit {
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO commits (project_id, branch_id, commit_hash, parent_commit_id,
                 merge_parent_commit_id, author, author_email, message, committed_at,
                 files_changed, lines_added, lines_removed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                self.project_id,
                self.branch_id,
                &self.commit_hash,
                self.parent_commit_id,
                self.merge_parent_commit_id,
                &self.author,
                &self.author_email,
                &self.message,
                &self.committed_at,
                self.files_changed,
                self.lines_added,
                self.lines_removed,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COMMIT_COLUMNS} FROM commits WHERE id = ?1"
        ))?;

        let commit = stmt.query_row([id], Self::from_row).optional()?;

        Ok(commit)
    }

    /// Exact hash lookup within a project
    pub fn find_by_hash(conn: &Connection, project_id: i64, hash: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COMMIT_COLUMNS} FROM commits WHERE project_id = ?1 AND commit_hash = ?2"
        ))?;

        let commit = stmt
            .query_row(params![project_id, hash], Self::from_row)
            .optional()?;

        Ok(commit)
    }

    /// Prefix lookup per the wire format: anything shorter than a full
    /// hash is a prefix and must match exactly one commit in the
    /// project, otherwise `AmbiguousHash`.
    pub fn find_by_hash_prefix(conn: &Connection, project_id: i64, prefix: &str) -> Result<Self> {
        if prefix.len() >= 64 {
            return Self::find_by_hash(conn, project_id, prefix)?
                .ok_or_else(|| Error::NotFound(format!("commit '{}'", prefix)));
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT {COMMIT_COLUMNS} FROM commits
             WHERE project_id = ?1 AND commit_hash LIKE ?2 || '%'
             LIMIT 2"
        ))?;

        let matches = stmt
            .query_map(params![project_id, prefix], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        match matches.len() {
            0 => Err(Error::NotFound(format!("commit '{}'", prefix))),
            1 => Ok(matches.into_iter().next().unwrap()),
            _ => Err(Error::AmbiguousHash(prefix.to_string())),
        }
    }

    /// Commits of a project, newest first; timestamp ties are broken by
    /// hash so the order is reproducible.
    pub fn list_by_project(
        conn: &Connection,
        project_id: i64,
        limit: Option<i64>,
    ) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COMMIT_COLUMNS} FROM commits WHERE project_id = ?1
             ORDER BY committed_at DESC, commit_hash LIMIT ?2"
        ))?;

        let commits = stmt
            .query_map(params![project_id, limit.unwrap_or(-1)], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(commits)
    }

    pub fn list_by_branch(
        conn: &Connection,
        branch_id: i64,
        limit: Option<i64>,
    ) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COMMIT_COLUMNS} FROM commits WHERE branch_id = ?1
             ORDER BY committed_at DESC, commit_hash LIMIT ?2"
        ))?;

        let commits = stmt
            .query_map(params![branch_id, limit.unwrap_or(-1)], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(commits)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            project_id: row.get(1)?,
            branch_id: row.get(2)?,
            commit_hash: row.get(3)?,
            parent_commit_id: row.get(4)?,
            merge_parent_commit_id: row.get(5)?,
            author: row.get(6)?,
            author_email: row.get(7)?,
            message: row.get(8)?,
            committed_at: row.get(9)?,
            files_changed: row.get(10)?,
            lines_added: row.get(11)?,
            lines_removed: row.get(12)?,
        })
    }
}
