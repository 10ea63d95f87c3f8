// src/db/models/project.rs

use crate::error::{Error, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// A Project is the top-level namespace: it owns files, branches, and
/// commits. Identified by a globally unique slug and a stable id.
#[derive(Debug, Clone)]
pub struct Project {
    pub id: Option<i64>,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl Project {
    /// Create a new Project
    pub fn new(slug: String, name: String) -> Self {
        Self {
            id: None,
            slug,
            name,
            description: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Insert this project into the database
    ///
    /// A duplicate slug is reported as `AlreadyExists`.
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        let result = conn.execute(
            "INSERT INTO projects (slug, name, description) VALUES (?1, ?2, ?3)",
            params![&self.slug, &self.name, &self.description],
        );

        match result {
            Ok(_) => {
                let id = conn.last_insert_rowid();
                self.id = Some(id);
                Ok(id)
            }
            Err(e) => match Error::from(e) {
                Error::IntegrityViolation(msg) if msg.contains("projects.slug") => {
                    Err(Error::AlreadyExists(format!("project '{}'", self.slug)))
                }
                other => Err(other),
            },
        }
    }

    /// Find a project by slug
    pub fn find_by_slug(conn: &Connection, slug: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, slug, name, description, created_at, updated_at
             FROM projects WHERE slug = ?1",
        )?;

        let project = stmt.query_row([slug], Self::from_row).optional()?;

        Ok(project)
    }

    /// Find a project by ID
    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, slug, name, description, created_at, updated_at
             FROM projects WHERE id = ?1",
        )?;

        let project = stmt.query_row([id], Self::from_row).optional()?;

        Ok(project)
    }

    /// Look up a project by slug, failing with `NotFound` when missing
    pub fn get_by_slug(conn: &Connection, slug: &str) -> Result<Self> {
        Self::find_by_slug(conn, slug)?
            .ok_or_else(|| Error::NotFound(format!("project '{}'", slug)))
    }

    /// List all projects ordered by slug
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, slug, name, description, created_at, updated_at
             FROM projects ORDER BY slug",
        )?;

        let projects = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(projects)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            slug: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}
