// src/query.rs

//! Read-only query facade
//!
//! Typed views over the store for the CLI and other front ends. Every
//! operation that touches files takes a project scope; results are
//! explicit record shapes, never raw rows.

use crate::db::models::{
    Branch, Commit, Conflict, FileContents, FileState, FileType, Project, ProjectFile,
    WorkingFileState, WorkingState,
};
use crate::error::{Error, Result};
use crate::vcs;
use rusqlite::Connection;
use serde::Serialize;

/// A project with its headline numbers.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    pub slug: String,
    pub name: String,
    pub file_count: i64,
    pub commit_count: i64,
    pub branch_count: i64,
    pub updated_at: Option<String>,
}

pub fn list_projects(conn: &Connection) -> Result<Vec<ProjectSummary>> {
    let projects = Project::list_all(conn)?;
    let mut summaries = Vec::with_capacity(projects.len());

    for project in projects {
        let id = project.id.unwrap();
        let file_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM project_files WHERE project_id = ?1",
            [id],
            |row| row.get(0),
        )?;
        let commit_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM commits WHERE project_id = ?1",
            [id],
            |row| row.get(0),
        )?;
        let branch_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM branches WHERE project_id = ?1",
            [id],
            |row| row.get(0),
        )?;

        summaries.push(ProjectSummary {
            slug: project.slug,
            name: project.name,
            file_count,
            commit_count,
            branch_count,
            updated_at: project.updated_at,
        });
    }

    Ok(summaries)
}

/// A project's detail view: its row plus branches.
#[derive(Debug)]
pub struct ProjectDetail {
    pub project: Project,
    pub branches: Vec<Branch>,
}

pub fn show_project(conn: &Connection, slug: &str) -> Result<ProjectDetail> {
    let project = Project::get_by_slug(conn, slug)?;
    let branches = Branch::list_by_project(conn, project.id.unwrap())?;
    Ok(ProjectDetail { project, branches })
}

pub fn list_branches(conn: &Connection, slug: &str) -> Result<Vec<Branch>> {
    let project = Project::get_by_slug(conn, slug)?;
    Branch::list_by_project(conn, project.id.unwrap())
}

pub fn log(
    conn: &Connection,
    slug: &str,
    branch: Option<&str>,
    limit: Option<i64>,
) -> Result<Vec<Commit>> {
    let project = Project::get_by_slug(conn, slug)?;
    vcs::log(conn, project.id.unwrap(), branch, limit)
}

/// One line of `status`: a tagged union over the working-state kinds.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusEntry {
    Modified { path: String, staged: bool },
    Added { path: String, staged: bool },
    Deleted { path: String, staged: bool },
    Conflicted { path: String, conflict_type: String },
}

impl StatusEntry {
    pub fn path(&self) -> &str {
        match self {
            StatusEntry::Modified { path, .. } => path,
            StatusEntry::Added { path, .. } => path,
            StatusEntry::Deleted { path, .. } => path,
            StatusEntry::Conflicted { path, .. } => path,
        }
    }
}

/// Working-state status for a branch (default branch when not named).
/// Unmodified files are omitted; open conflicts are always listed.
pub fn status(conn: &Connection, slug: &str, branch: Option<&str>) -> Result<Vec<StatusEntry>> {
    let project = Project::get_by_slug(conn, slug)?;
    let project_id = project.id.unwrap();

    let branch = match branch {
        Some(name) => Branch::find_by_name(conn, project_id, name)?
            .ok_or_else(|| Error::NotFound(format!("branch '{}'", name)))?,
        None => Branch::default_for_project(conn, project_id)?
            .ok_or_else(|| Error::NotFound(format!("default branch of '{}'", slug)))?,
    };

    let mut entries = Vec::new();

    // Open conflicts name their cause; a working-state row in conflict
    // without one falls back to a generic tag.
    let mut open_by_file: std::collections::HashMap<i64, String> = std::collections::HashMap::new();
    for conflict in Conflict::list_open_for_project(conn, project_id)? {
        open_by_file
            .entry(conflict.file_id)
            .or_insert_with(|| conflict.conflict_type.as_str().to_string());
    }

    for state in WorkingState::list_for_branch(conn, project_id, branch.id.unwrap())? {
        let path = ProjectFile::find_by_id(conn, state.file_id)?
            .map(|f| f.path)
            .unwrap_or_else(|| format!("file#{}", state.file_id));

        match state.state {
            WorkingFileState::Unmodified => {}
            WorkingFileState::Modified => entries.push(StatusEntry::Modified {
                path,
                staged: state.staged,
            }),
            WorkingFileState::Added => entries.push(StatusEntry::Added {
                path,
                staged: state.staged,
            }),
            WorkingFileState::Deleted => entries.push(StatusEntry::Deleted {
                path,
                staged: state.staged,
            }),
            WorkingFileState::Conflict => {
                let conflict_type = open_by_file
                    .remove(&state.file_id)
                    .unwrap_or_else(|| "unresolved".to_string());
                entries.push(StatusEntry::Conflicted {
                    path,
                    conflict_type,
                });
            }
        }
    }

    // Open conflicts on files with no working-state row still surface.
    for (file_id, conflict_type) in open_by_file {
        let path = ProjectFile::find_by_id(conn, file_id)?
            .map(|f| f.path)
            .unwrap_or_else(|| format!("file#{}", file_id));
        entries.push(StatusEntry::Conflicted {
            path,
            conflict_type,
        });
    }

    entries.sort_by(|a, b| a.path().cmp(b.path()));
    Ok(entries)
}

/// One step of a file's history.
#[derive(Debug, Clone, Serialize)]
pub struct FileHistoryEntry {
    pub commit_hash: String,
    pub committed_at: String,
    pub author: String,
    pub message: String,
    pub change_type: String,
    pub content_hash: Option<String>,
}

pub fn file_history(conn: &Connection, slug: &str, path: &str) -> Result<Vec<FileHistoryEntry>> {
    let project = Project::get_by_slug(conn, slug)?;
    let file = ProjectFile::find_by_path(conn, project.id.unwrap(), path)?
        .ok_or_else(|| Error::NotFound(format!("file '{}'", path)))?;

    let states = FileState::history_for_file(conn, file.id.unwrap())?;
    let mut history = Vec::with_capacity(states.len());

    for state in states {
        let commit = Commit::find_by_id(conn, state.commit_id)?
            .ok_or_else(|| Error::NotFound(format!("commit id {}", state.commit_id)))?;
        history.push(FileHistoryEntry {
            commit_hash: commit.commit_hash,
            committed_at: commit.committed_at,
            author: commit.author,
            message: commit.message,
            change_type: state.change_type.as_str().to_string(),
            content_hash: state.content_hash,
        });
    }

    Ok(history)
}

/// Diff a file between two commits (hash prefixes). With `b` omitted
/// the right side is the file's current content; with both omitted the
/// diff is previous-version vs current.
pub fn diff(
    conn: &Connection,
    slug: &str,
    path: &str,
    a: Option<&str>,
    b: Option<&str>,
) -> Result<vcs::diff::BlobDelta> {
    let project = Project::get_by_slug(conn, slug)?;
    let project_id = project.id.unwrap();
    let file = ProjectFile::find_by_path(conn, project_id, path)?
        .ok_or_else(|| Error::NotFound(format!("file '{}'", path)))?;
    let file_id = file.id.unwrap();

    let hash_at_commit = |prefix: &str| -> Result<Option<String>> {
        let commit = Commit::find_by_hash_prefix(conn, project_id, prefix)?;
        let tree = vcs::tree_for_commit(conn, commit.id)?;
        Ok(tree.get(path).map(|entry| entry.content_hash.clone()))
    };

    let (old_hash, new_hash) = match (a, b) {
        (Some(a), Some(b)) => (hash_at_commit(a)?, hash_at_commit(b)?),
        (Some(a), None) => {
            let current = FileContents::current_for_file(conn, file_id)?;
            (hash_at_commit(a)?, current.map(|c| c.content_hash))
        }
        (None, _) => {
            let history = FileContents::history_for_file(conn, file_id)?;
            let current = history.iter().rfind(|c| c.is_current);
            let previous = current.and_then(|cur| {
                history
                    .iter()
                    .rev()
                    .find(|c| c.version < cur.version)
            });
            (
                previous.map(|c| c.content_hash.clone()),
                current.map(|c| c.content_hash.clone()),
            )
        }
    };

    vcs::diff::diff_blobs(conn, old_hash.as_deref(), new_hash.as_deref())
}

/// A path match from `search_by_path`.
#[derive(Debug, Clone, Serialize)]
pub struct PathMatch {
    pub project_slug: String,
    pub path: String,
    pub file_type: Option<String>,
    pub line_count: i64,
}

/// Substring search over file paths, optionally narrowed to a project.
pub fn search_by_path(
    conn: &Connection,
    pattern: &str,
    project: Option<&str>,
) -> Result<Vec<PathMatch>> {
    let like = format!("%{}%", pattern);

    let project_id = match project {
        Some(slug) => Some(Project::get_by_slug(conn, slug)?.id.unwrap()),
        None => None,
    };

    let mut stmt = conn.prepare(
        "SELECT p.slug, pf.path, pf.file_type_id, pf.line_count
         FROM project_files pf
         JOIN projects p ON p.id = pf.project_id
         WHERE pf.path LIKE ?1 AND (?2 IS NULL OR pf.project_id = ?2)
         ORDER BY p.slug, pf.path",
    )?;

    let rows = stmt
        .query_map(rusqlite::params![like, project_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<i64>>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut matches = Vec::with_capacity(rows.len());
    for (project_slug, path, file_type_id, line_count) in rows {
        let file_type = match file_type_id {
            Some(id) => FileType::find_by_id(conn, id)?.map(|t| t.name),
            None => None,
        };
        matches.push(PathMatch {
            project_slug,
            path,
            file_type,
            line_count,
        });
    }

    Ok(matches)
}

/// A commit with the file states it recorded.
#[derive(Debug)]
pub struct CommitDetail {
    pub commit: Commit,
    pub files: Vec<(String, FileState)>,
}

pub fn show_commit(conn: &Connection, slug: &str, hash_prefix: &str) -> Result<CommitDetail> {
    let project = Project::get_by_slug(conn, slug)?;
    let commit = Commit::find_by_hash_prefix(conn, project.id.unwrap(), hash_prefix)?;

    let states = FileState::list_by_commit(conn, commit.id.unwrap())?;
    let mut files = Vec::with_capacity(states.len());
    for state in states {
        let path = ProjectFile::find_by_id(conn, state.file_id)?
            .map(|f| f.path)
            .unwrap_or_else(|| format!("file#{}", state.file_id));
        files.push((path, state));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(CommitDetail { commit, files })
}
