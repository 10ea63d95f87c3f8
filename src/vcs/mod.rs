// src/vcs/mod.rs

//! Version engine: commits, branches, staging, and the working-state
//! machine
//!
//! A commit's identity is the SHA-256 of its canonical encoding:
//!
//! ```text
//! tree\n
//! <path>\t<content_hash>\n        (sorted by path)
//! parent <hash>\n                 (omitted if none)
//! merge <hash>\n                  (omitted if none)
//! author <name> <<email>> <iso8601-utc>\n
//! message\n<message>\n
//! ```
//!
//! Any two implementations must produce the same hex for the same
//! logical commit, so the encoding never changes.

pub mod diff;

use crate::db::models::{
    Branch, ChangeType, Commit, Conflict, FileContents, FileState, ProjectFile, WorkingState,
};
use crate::error::{ConflictingPath, Error, Result};
use chrono::Utc;
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::env;
use tracing::{debug, info};

/// Environment variable naming the current agent, used as commit author
/// when no git author is present.
pub const AGENT_ENV: &str = "TEMPLEDB_AGENT";

/// One entry of a commit tree: a file's identity and its content hash.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub file_id: i64,
    pub content_hash: String,
}

/// A staged change feeding into `create_commit`.
#[derive(Debug, Clone)]
pub struct StagedChange {
    pub file_id: i64,
    pub path: String,
    /// New content hash; `None` for deletions.
    pub content_hash: Option<String>,
    pub change_type: ChangeType,
    pub previous_path: Option<String>,
}

/// Inputs to the commit operation.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub project_id: i64,
    pub branch_name: String,
    pub changes: Vec<StagedChange>,
    pub author: String,
    pub author_email: String,
    pub message: String,
    pub merge_parent_id: Option<i64>,
    /// Explicit commit time for reproducible hashing; defaults to now.
    pub committed_at: Option<String>,
}

/// Current UTC time in the canonical seconds-resolution ISO-8601 form.
pub fn current_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Resolve the commit author: git author env vars win, then the agent
/// identifier, then a fixed fallback.
pub fn resolve_author() -> (String, String) {
    if let (Ok(name), Ok(email)) = (env::var("GIT_AUTHOR_NAME"), env::var("GIT_AUTHOR_EMAIL")) {
        return (name, email);
    }
    if let Ok(agent) = env::var(AGENT_ENV) {
        let email = format!("{}@agents.local", agent);
        return (agent, email);
    }
    ("templedb".to_string(), "templedb@localhost".to_string())
}

/// Canonical byte encoding of a commit (see module docs).
///
/// Author and email have surrounding whitespace collapsed; the message
/// is raw bytes.
pub fn canonical_encoding(
    tree: &BTreeMap<String, String>,
    parent_hash: Option<&str>,
    merge_hash: Option<&str>,
    author: &str,
    author_email: &str,
    timestamp: &str,
    message: &str,
) -> Vec<u8> {
    let mut buf = Vec::new();

    buf.extend_from_slice(b"tree\n");
    for (path, hash) in tree {
        buf.extend_from_slice(path.as_bytes());
        buf.push(b'\t');
        buf.extend_from_slice(hash.as_bytes());
        buf.push(b'\n');
    }

    if let Some(parent) = parent_hash {
        buf.extend_from_slice(format!("parent {}\n", parent).as_bytes());
    }
    if let Some(merge) = merge_hash {
        buf.extend_from_slice(format!("merge {}\n", merge).as_bytes());
    }

    buf.extend_from_slice(
        format!(
            "author {} <{}> {}\n",
            author.trim(),
            author_email.trim(),
            timestamp
        )
        .as_bytes(),
    );

    buf.extend_from_slice(b"message\n");
    buf.extend_from_slice(message.as_bytes());
    buf.push(b'\n');

    buf
}

/// SHA-256 of the canonical encoding, lowercase hex.
pub fn commit_hash(
    tree: &BTreeMap<String, String>,
    parent_hash: Option<&str>,
    merge_hash: Option<&str>,
    author: &str,
    author_email: &str,
    timestamp: &str,
    message: &str,
) -> String {
    let encoding = canonical_encoding(
        tree,
        parent_hash,
        merge_hash,
        author,
        author_email,
        timestamp,
        message,
    );
    let mut hasher = Sha256::new();
    hasher.update(&encoding);
    format!("{:x}", hasher.finalize())
}

/// Reconstruct the full tree at a commit by replaying file states from
/// the root of the parent chain. `None` yields the empty tree.
pub fn tree_for_commit(
    conn: &Connection,
    commit_id: Option<i64>,
) -> Result<BTreeMap<String, TreeEntry>> {
    let mut chain = Vec::new();
    let mut cursor = commit_id;
    while let Some(id) = cursor {
        let commit = Commit::find_by_id(conn, id)?
            .ok_or_else(|| Error::NotFound(format!("commit id {}", id)))?;
        cursor = commit.parent_commit_id;
        chain.push(id);
    }

    let mut tree: BTreeMap<String, TreeEntry> = BTreeMap::new();
    let mut stmt = conn.prepare(
        "SELECT fs.file_id, fs.content_hash, fs.change_type, fs.previous_path, pf.path
         FROM file_states fs
         JOIN project_files pf ON pf.id = fs.file_id
         WHERE fs.commit_id = ?1",
    )?;

    // Oldest first, so later commits overwrite earlier entries.
    for id in chain.iter().rev() {
        let states = stmt
            .query_map([id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for (file_id, content_hash, change_type, previous_path, path) in states {
            match change_type.as_str() {
                "deleted" => {
                    tree.remove(&path);
                }
                "renamed" => {
                    if let Some(old) = previous_path {
                        tree.remove(&old);
                    }
                    if let Some(hash) = content_hash {
                        tree.insert(path, TreeEntry { file_id, content_hash: hash });
                    }
                }
                _ => {
                    if let Some(hash) = content_hash {
                        tree.insert(path, TreeEntry { file_id, content_hash: hash });
                    }
                }
            }
        }
    }

    Ok(tree)
}

fn hash_view(tree: &BTreeMap<String, TreeEntry>) -> BTreeMap<String, String> {
    tree.iter()
        .map(|(path, entry)| (path.clone(), entry.content_hash.clone()))
        .collect()
}

/// Per-change line statistics against the file's previous content.
fn change_stats(conn: &Connection, change: &StagedChange) -> Result<(i64, i64)> {
    let previous = FileContents::current_for_file(conn, change.file_id)?;

    let old_hash = previous.as_ref().map(|c| c.content_hash.as_str());
    let new_hash = change.content_hash.as_deref();

    match diff::diff_blobs(conn, old_hash, new_hash)? {
        diff::BlobDelta::Added { lines } => Ok((lines, 0)),
        diff::BlobDelta::Removed { lines } => Ok((0, lines)),
        diff::BlobDelta::Text { lines_added, lines_removed, .. } => {
            Ok((lines_added, lines_removed))
        }
        diff::BlobDelta::Binary | diff::BlobDelta::Identical => Ok((0, 0)),
    }
}

/// Create a commit from staged changes. Atomic: the commit row, file
/// states, current-version pointers, branch head, and working-state
/// resets all land in one transaction or not at all.
///
/// Re-submitting a commit whose canonical hash already exists in the
/// project is an idempotent replay and returns the existing commit.
pub fn create_commit(conn: &Connection, request: &CommitRequest) -> Result<Commit> {
    crate::db::transaction(conn, |tx| {
        let branch = Branch::find_by_name(tx, request.project_id, &request.branch_name)?
            .ok_or_else(|| Error::NotFound(format!("branch '{}'", request.branch_name)))?;
        let branch_id = branch.id.expect("fetched branch has id");

        if request.changes.is_empty() {
            return Err(Error::UsageError("no staged changes to commit".to_string()));
        }

        // Precondition: none of the involved files may carry an open conflict.
        let file_ids: Vec<i64> = request.changes.iter().map(|c| c.file_id).collect();
        let open = Conflict::open_for_files(tx, &file_ids)?;
        if !open.is_empty() {
            let mut paths = Vec::new();
            for conflict in &open {
                let path = ProjectFile::find_by_id(tx, conflict.file_id)?
                    .map(|f| f.path)
                    .unwrap_or_else(|| format!("file#{}", conflict.file_id));
                paths.push(ConflictingPath {
                    path,
                    conflict_type: conflict.conflict_type.as_str().to_string(),
                    base_version: conflict.base_version,
                    current_version: conflict.current_version,
                });
            }
            return Err(Error::CommitConflict(paths));
        }

        let parent_id = branch.head_commit_id;
        let parent_hash = match parent_id {
            Some(id) => Some(
                Commit::find_by_id(tx, id)?
                    .ok_or_else(|| Error::NotFound(format!("commit id {}", id)))?
                    .commit_hash,
            ),
            None => None,
        };
        let merge_hash = match request.merge_parent_id {
            Some(id) => Some(
                Commit::find_by_id(tx, id)?
                    .ok_or_else(|| Error::NotFound(format!("commit id {}", id)))?
                    .commit_hash,
            ),
            None => None,
        };

        // Tree = parent tree with the staged changes applied.
        let mut tree = tree_for_commit(tx, parent_id)?;
        for change in &request.changes {
            match change.change_type {
                ChangeType::Deleted => {
                    tree.remove(&change.path);
                }
                ChangeType::Renamed => {
                    if let Some(old) = &change.previous_path {
                        tree.remove(old);
                    }
                    if let Some(hash) = &change.content_hash {
                        tree.insert(
                            change.path.clone(),
                            TreeEntry {
                                file_id: change.file_id,
                                content_hash: hash.clone(),
                            },
                        );
                    }
                }
                _ => {
                    if let Some(hash) = &change.content_hash {
                        tree.insert(
                            change.path.clone(),
                            TreeEntry {
                                file_id: change.file_id,
                                content_hash: hash.clone(),
                            },
                        );
                    }
                }
            }
        }

        let author = request.author.trim().to_string();
        let author_email = request.author_email.trim().to_string();
        let committed_at = request
            .committed_at
            .clone()
            .unwrap_or_else(current_timestamp);
        let hash = commit_hash(
            &hash_view(&tree),
            parent_hash.as_deref(),
            merge_hash.as_deref(),
            &author,
            &author_email,
            &committed_at,
            &request.message,
        );

        if let Some(existing) = Commit::find_by_hash(tx, request.project_id, &hash)? {
            debug!("Idempotent replay of commit {}", hash);
            return Ok(existing);
        }

        let mut lines_added = 0;
        let mut lines_removed = 0;
        for change in &request.changes {
            let (added, removed) = change_stats(tx, change)?;
            lines_added += added;
            lines_removed += removed;
        }

        let mut commit = Commit {
            id: None,
            project_id: request.project_id,
            branch_id,
            commit_hash: hash.clone(),
            parent_commit_id: parent_id,
            merge_parent_commit_id: request.merge_parent_id,
            author,
            author_email,
            message: request.message.clone(),
            committed_at,
            files_changed: request.changes.len() as i64,
            lines_added,
            lines_removed,
        };
        let commit_id = commit.insert(tx)?;

        for change in &request.changes {
            FileState {
                id: None,
                commit_id,
                file_id: change.file_id,
                content_hash: change.content_hash.clone(),
                change_type: change.change_type,
                previous_path: change.previous_path.clone(),
            }
            .insert(tx)?;

            match change.change_type {
                ChangeType::Deleted => {
                    // The identity row survives for history; the working
                    // set no longer tracks the file.
                    tx.execute(
                        "DELETE FROM working_states
                         WHERE project_id = ?1 AND branch_id = ?2 AND file_id = ?3",
                        rusqlite::params![request.project_id, branch_id, change.file_id],
                    )?;
                }
                _ => {
                    let hash = change
                        .content_hash
                        .as_deref()
                        .expect("non-delete change carries content");
                    let current = FileContents::current_for_file(tx, change.file_id)?;
                    let same = current
                        .as_ref()
                        .map(|c| c.content_hash == hash)
                        .unwrap_or(false);
                    if !same {
                        let next = current.map(|c| c.version + 1).unwrap_or(1);
                        FileContents::set_current(tx, change.file_id, hash, next)?;
                    }
                    WorkingState::reset_to_unmodified(
                        tx,
                        request.project_id,
                        branch_id,
                        change.file_id,
                        Some(hash),
                    )?;
                }
            }
        }

        // Break the commit/branch cycle explicitly: the commit is in,
        // now move the head in the same transaction.
        Branch::set_head(tx, branch_id, commit_id)?;

        tx.execute(
            "UPDATE projects SET updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
            [request.project_id],
        )?;

        info!(
            "Created commit {} on branch '{}' ({} files)",
            &hash[..12.min(hash.len())],
            request.branch_name,
            request.changes.len()
        );
        Ok(commit)
    })
}

/// Commit history, newest first. With a branch, walks the parent chain
/// from the branch head; otherwise lists the whole project.
pub fn log(
    conn: &Connection,
    project_id: i64,
    branch_name: Option<&str>,
    limit: Option<i64>,
) -> Result<Vec<Commit>> {
    match branch_name {
        Some(name) => {
            let branch = Branch::find_by_name(conn, project_id, name)?
                .ok_or_else(|| Error::NotFound(format!("branch '{}'", name)))?;

            let mut commits = Vec::new();
            let mut cursor = branch.head_commit_id;
            let cap = limit.unwrap_or(i64::MAX);
            while let Some(id) = cursor {
                if commits.len() as i64 >= cap {
                    break;
                }
                let commit = Commit::find_by_id(conn, id)?
                    .ok_or_else(|| Error::NotFound(format!("commit id {}", id)))?;
                cursor = commit.parent_commit_id;
                commits.push(commit);
            }
            Ok(commits)
        }
        None => Commit::list_by_project(conn, project_id, limit),
    }
}

/// Stage or unstage a file by path. Unstaging preserves the recorded
/// working state.
pub fn set_staged(
    conn: &Connection,
    project_id: i64,
    branch_id: i64,
    path: &str,
    staged: bool,
) -> Result<()> {
    let file = ProjectFile::find_by_path(conn, project_id, path)?
        .ok_or_else(|| Error::NotFound(format!("file '{}'", path)))?;
    WorkingState::set_staged(conn, project_id, branch_id, file.id.unwrap(), staged)
}
