// src/workspace/mod.rs

//! Checkout / commit engine
//!
//! The editing loop: materialize a branch head into a directory,
//! remember the (hash, version) basis of every file, let the agent
//! edit, then rescan and reconcile the directory back into the store.
//! Conflict detection is per-file optimistic locking against that
//! basis; the store's write serialization makes the check-and-commit
//! atomic.

use crate::blob;
use crate::cancel::CancelToken;
use crate::db;
use crate::db::models::{
    Branch, ChangeType, Checkout, CheckoutFile, Commit, Conflict, ConflictStatus, ConflictType,
    FileContents, FileType, Project, ProjectFile, WorkingFileState, WorkingState,
};
use crate::error::{ConflictingPath, Error, Result};
use crate::scanner::{self, names, ScanOptions, ScannedFile, TypeClassifier};
use crate::vcs::{self, CommitRequest, StagedChange};
use rusqlite::Connection;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// What to do when the optimistic-lock check finds divergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStrategy {
    /// Record the conflicts, fail the commit, leave everything as-is.
    Abort,
    /// Overwrite, recording the conflicts as resolved by force.
    Force,
}

impl FromStr for CommitStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "abort" => Ok(CommitStrategy::Abort),
            "force" => Ok(CommitStrategy::Force),
            _ => Err(format!("Invalid commit strategy: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutSummary {
    pub checkout_id: i64,
    pub branch: String,
    pub files: usize,
    pub commit_hash: Option<String>,
}

/// Result of reconciling a workspace.
#[derive(Debug)]
pub enum CommitOutcome {
    Committed(Commit),
    NothingToCommit,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub project_id: i64,
    pub slug: String,
    pub files: usize,
    pub commit_hash: Option<String>,
}

/// Materialize the project's default-branch head into `dir`.
///
/// Records a Checkout row plus one snapshot row per file carrying the
/// `(content_hash, version)` the agent saw; that pair is the basis for
/// conflict detection at commit time.
pub fn checkout<P: AsRef<Path>>(
    conn: &Connection,
    slug: &str,
    dir: P,
    force: bool,
    cancel: &CancelToken,
) -> Result<CheckoutSummary> {
    let project = Project::get_by_slug(conn, slug)?;
    let project_id = project.id.expect("fetched project has id");
    let dir = dir.as_ref();

    if dir.exists() {
        if !force {
            return Err(Error::PathExists(dir.display().to_string()));
        }
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;
    let canonical = fs::canonicalize(dir)?;
    let path_str = canonical.to_string_lossy().to_string();

    // Retry here rather than in the caller: the target directory
    // already exists by now, so re-running the whole operation would
    // trip the PathExists check. Materialization is idempotent.
    db::with_retry(|| db::transaction(conn, |tx| {
        let branch = Branch::default_for_project(tx, project_id)?
            .ok_or_else(|| Error::NotFound(format!("default branch of '{}'", slug)))?;
        let branch_id = branch.id.expect("fetched branch has id");

        let tree = vcs::tree_for_commit(tx, branch.head_commit_id)?;

        // Re-checking out over a recorded workspace replaces its row.
        if let Some(existing) = Checkout::find_by_path(tx, project_id, &path_str)? {
            Checkout::delete(tx, existing.id.unwrap())?;
        }

        let mut checkout = Checkout {
            id: None,
            project_id,
            branch_id,
            checkout_path: path_str.clone(),
            created_at: None,
            last_sync_at: None,
        };
        let checkout_id = checkout.insert(tx)?;

        let mut materialized = 0;
        for (rel_path, entry) in &tree {
            cancel.check()?;

            let bytes = blob::get(tx, &entry.content_hash)?;
            let target = canonical.join(rel_path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, &bytes)?;

            let current = FileContents::current_for_file(tx, entry.file_id)?.ok_or_else(|| {
                Error::IntegrityViolation(format!(
                    "file {} is in the tree but has no current content",
                    entry.file_id
                ))
            })?;
            CheckoutFile::upsert(
                tx,
                checkout_id,
                entry.file_id,
                &current.content_hash,
                current.version,
            )?;
            materialized += 1;
        }

        let commit_hash = match branch.head_commit_id {
            Some(id) => Commit::find_by_id(tx, id)?.map(|c| c.commit_hash),
            None => None,
        };

        info!(
            "Checked out '{}' ({} files) to {}",
            slug,
            materialized,
            canonical.display()
        );
        Ok(CheckoutSummary {
            checkout_id,
            branch: branch.name,
            files: materialized,
            commit_hash,
        })
    }))
}

/// One entry of the diff-set computed by rescanning a workspace.
#[derive(Debug)]
struct PendingChange {
    path: String,
    kind: ChangeType,
    previous_path: Option<String>,
    /// File identity in the store, if it exists yet.
    file_id: Option<i64>,
    /// Stale file identity vacated by a rename.
    old_file_id: Option<i64>,
    /// Index into the scanned file list; `None` for deletions.
    scanned: Option<usize>,
}

struct DetectedConflict {
    file_id: i64,
    path: String,
    base_version: i64,
    base_hash: String,
    current_version: i64,
    current_hash: String,
    conflict_type: ConflictType,
}

/// Reconcile an edited workspace back into the store.
///
/// Rescans `dir`, classifies every file against the checkout snapshot
/// ({added, modified, deleted, unchanged, renamed}), runs the per-file
/// optimistic-lock check, then either aborts with the conflict list or
/// commits the changes through the version engine.
pub fn commit<P: AsRef<Path>>(
    conn: &Connection,
    slug: &str,
    dir: P,
    message: &str,
    strategy: CommitStrategy,
    filter: Option<&[String]>,
    cancel: &CancelToken,
) -> Result<CommitOutcome> {
    let project = Project::get_by_slug(conn, slug)?;
    let project_id = project.id.expect("fetched project has id");

    let canonical = fs::canonicalize(dir.as_ref())?;
    let path_str = canonical.to_string_lossy().to_string();
    let checkout = Checkout::find_by_path(conn, project_id, &path_str)?
        .ok_or_else(|| Error::NotFound(format!("checkout of '{}' at {}", slug, path_str)))?;
    let checkout_id = checkout.id.expect("fetched checkout has id");
    let branch = Branch::find_by_id(conn, checkout.branch_id)?
        .ok_or_else(|| Error::NotFound(format!("branch id {}", checkout.branch_id)))?;
    let branch_id = branch.id.expect("fetched branch has id");

    let in_filter = |path: &str| -> bool {
        filter
            .map(|paths| paths.iter().any(|p| p == path))
            .unwrap_or(true)
    };

    // 1. Rescan the workspace and compute the diff-set.
    let scanned = scanner::scan_directory(&canonical, &ScanOptions::default(), cancel)?;

    let files = ProjectFile::list_by_project(conn, project_id)?;
    let file_by_path: HashMap<&str, &ProjectFile> =
        files.iter().map(|f| (f.path.as_str(), f)).collect();
    let path_by_file_id: HashMap<i64, &str> = files
        .iter()
        .map(|f| (f.id.unwrap(), f.path.as_str()))
        .collect();

    let snapshots = CheckoutFile::list_by_checkout(conn, checkout_id)?;
    let snapshot_by_file: HashMap<i64, &CheckoutFile> =
        snapshots.iter().map(|s| (s.file_id, s)).collect();

    let mut pending: Vec<PendingChange> = Vec::new();

    for (idx, file) in scanned.iter().enumerate() {
        cancel.check()?;
        if !in_filter(&file.relative_path) {
            continue;
        }

        let existing = file_by_path.get(file.relative_path.as_str());
        let snapshot = existing.and_then(|f| snapshot_by_file.get(&f.id.unwrap()));

        match snapshot {
            Some(snap) if snap.content_hash == file.hash => {} // unchanged
            Some(_) => pending.push(PendingChange {
                path: file.relative_path.clone(),
                kind: ChangeType::Modified,
                previous_path: None,
                file_id: existing.map(|f| f.id.unwrap()),
                old_file_id: None,
                scanned: Some(idx),
            }),
            None => pending.push(PendingChange {
                path: file.relative_path.clone(),
                kind: ChangeType::Added,
                previous_path: None,
                file_id: existing.map(|f| f.id.unwrap()),
                old_file_id: None,
                scanned: Some(idx),
            }),
        }
    }

    let on_disk: HashMap<&str, &ScannedFile> = scanned
        .iter()
        .map(|f| (f.relative_path.as_str(), f))
        .collect();
    for snap in &snapshots {
        let Some(path) = path_by_file_id.get(&snap.file_id) else {
            continue;
        };
        if !in_filter(path) {
            continue;
        }
        if !on_disk.contains_key(path) {
            pending.push(PendingChange {
                path: path.to_string(),
                kind: ChangeType::Deleted,
                previous_path: None,
                file_id: Some(snap.file_id),
                old_file_id: None,
                scanned: None,
            });
        }
    }

    // Rename heuristic: exactly one deletion and one addition sharing a
    // content hash become a rename; anything ambiguous stays delete+add.
    detect_renames(&mut pending, &scanned, &snapshot_by_file);

    if pending.is_empty() {
        debug!("Workspace at {} matches its snapshot", canonical.display());
        return Ok(CommitOutcome::NothingToCommit);
    }

    // 2. Optimistic-lock check against the store's current state.
    let mut conflicts: Vec<DetectedConflict> = Vec::new();
    for change in &pending {
        let check_id = match change.kind {
            ChangeType::Modified | ChangeType::Deleted => change.file_id,
            ChangeType::Renamed => change.old_file_id,
            // A concurrent add: the path exists in the store with
            // content we never saw.
            ChangeType::Added => change.file_id,
        };
        let Some(file_id) = check_id else { continue };

        let Some(current) = FileContents::current_for_file(conn, file_id)? else {
            continue;
        };
        let snapshot = snapshot_by_file.get(&file_id);

        let (base_version, base_hash) = match snapshot {
            Some(snap) => (snap.version, snap.content_hash.clone()),
            None => (0, String::new()),
        };

        if base_version == current.version && base_hash == current.content_hash {
            continue;
        }

        let conflict_type = if base_version == current.version {
            ConflictType::ContentDiverged
        } else if base_hash == current.content_hash {
            // Someone committed identical bytes; same content is not a
            // conflict, the staged change just rebases onto the newer
            // version.
            continue;
        } else {
            ConflictType::VersionMismatch
        };

        conflicts.push(DetectedConflict {
            file_id,
            path: change.path.clone(),
            base_version,
            base_hash,
            current_version: current.version,
            current_hash: current.content_hash,
            conflict_type,
        });
    }

    let (author, author_email) = vcs::resolve_author();

    if !conflicts.is_empty() && strategy == CommitStrategy::Abort {
        // Record the conflicts and flip the files' working state, then
        // reject. The workspace on disk and everything else in the
        // store stay untouched.
        db::transaction(conn, |tx| {
            for c in &conflicts {
                record_conflict(tx, project_id, checkout_id, c, None, None)?;
                WorkingState::upsert(
                    tx,
                    project_id,
                    branch_id,
                    c.file_id,
                    None,
                    WorkingFileState::Conflict,
                    false,
                )?;
            }
            Ok(())
        })?;

        let listing = conflicts
            .iter()
            .map(|c| ConflictingPath {
                path: c.path.clone(),
                conflict_type: c.conflict_type.as_str().to_string(),
                base_version: c.base_version,
                current_version: c.current_version,
            })
            .collect();
        return Err(Error::CommitConflict(listing));
    }

    // 3. Apply: blobs in, staging updated, version-engine commit, and
    // snapshot refresh, all in one transaction.
    let classifier = TypeClassifier::load(conn)?;
    let type_names: HashMap<i64, String> = FileType::list_all(conn)?
        .into_iter()
        .map(|t| (t.id.unwrap(), t.name))
        .collect();

    db::transaction(conn, |tx| {
        if !conflicts.is_empty() {
            // Forced: close anything open on these files, then record
            // this round's divergences as resolved by force.
            for c in &conflicts {
                let open = Conflict::open_for_files(tx, &[c.file_id])?;
                for row in open {
                    Conflict::resolve(tx, row.id.unwrap(), "force", &author)?;
                }
                record_conflict(
                    tx,
                    project_id,
                    checkout_id,
                    c,
                    Some("force"),
                    Some(&author),
                )?;
            }
        }

        let mut changes: Vec<StagedChange> = Vec::new();
        for change in &pending {
            cancel.check()?;
            match change.kind {
                ChangeType::Deleted => {
                    let file_id = change.file_id.expect("deletion targets a known file");
                    WorkingState::upsert(
                        tx,
                        project_id,
                        branch_id,
                        file_id,
                        None,
                        WorkingFileState::Deleted,
                        true,
                    )?;
                    changes.push(StagedChange {
                        file_id,
                        path: change.path.clone(),
                        content_hash: None,
                        change_type: ChangeType::Deleted,
                        previous_path: None,
                    });
                }
                _ => {
                    let scanned_file = &scanned[change.scanned.expect("non-delete has content")];
                    let hash = blob::put(tx, &scanned_file.content)?;

                    let type_id = classifier.classify(&change.path);
                    let file = ProjectFile::get_or_create(tx, project_id, &change.path, type_id)?;
                    let file_id = file.id.expect("upserted file has id");

                    let component = type_id
                        .and_then(|id| type_names.get(&id))
                        .filter(|_| !scanned_file.is_binary)
                        .and_then(|name| {
                            names::extract_component_name(
                                name,
                                &String::from_utf8_lossy(&scanned_file.content),
                            )
                        });
                    ProjectFile::update_stats(
                        tx,
                        file_id,
                        scanned_file.line_count,
                        component.as_deref(),
                    )?;

                    let state = match change.kind {
                        ChangeType::Added => WorkingFileState::Added,
                        _ => WorkingFileState::Modified,
                    };
                    WorkingState::upsert(
                        tx,
                        project_id,
                        branch_id,
                        file_id,
                        Some(&hash),
                        state,
                        true,
                    )?;

                    changes.push(StagedChange {
                        file_id,
                        path: change.path.clone(),
                        content_hash: Some(hash),
                        change_type: change.kind,
                        previous_path: change.previous_path.clone(),
                    });
                }
            }
        }

        let commit = vcs::create_commit(
            tx,
            &CommitRequest {
                project_id,
                branch_name: branch.name.clone(),
                changes: changes.clone(),
                author: author.clone(),
                author_email: author_email.clone(),
                message: message.to_string(),
                merge_parent_id: None,
                committed_at: None,
            },
        )?;

        // 4. Advance the snapshot basis to what was just committed.
        for change in &changes {
            match change.change_type {
                ChangeType::Deleted => {
                    CheckoutFile::delete(tx, checkout_id, change.file_id)?;
                }
                _ => {
                    let current = FileContents::current_for_file(tx, change.file_id)?
                        .expect("committed file has current content");
                    CheckoutFile::upsert(
                        tx,
                        checkout_id,
                        change.file_id,
                        &current.content_hash,
                        current.version,
                    )?;
                }
            }
        }
        for change in &pending {
            if let Some(old_id) = change.old_file_id {
                CheckoutFile::delete(tx, checkout_id, old_id)?;
                tx.execute(
                    "DELETE FROM working_states
                     WHERE project_id = ?1 AND branch_id = ?2 AND file_id = ?3",
                    rusqlite::params![project_id, branch_id, old_id],
                )?;
            }
        }
        Checkout::touch_sync(tx, checkout_id)?;

        Ok(CommitOutcome::Committed(commit))
    })
}

fn record_conflict(
    conn: &Connection,
    project_id: i64,
    checkout_id: i64,
    detected: &DetectedConflict,
    resolution_strategy: Option<&str>,
    resolved_by: Option<&str>,
) -> Result<()> {
    let resolved = resolution_strategy.is_some();
    Conflict {
        id: None,
        project_id,
        file_id: detected.file_id,
        checkout_id: Some(checkout_id),
        base_version: detected.base_version,
        base_hash: detected.base_hash.clone(),
        current_version: detected.current_version,
        current_hash: detected.current_hash.clone(),
        conflict_type: detected.conflict_type,
        status: if resolved {
            ConflictStatus::Resolved
        } else {
            ConflictStatus::Open
        },
        resolution_strategy: resolution_strategy.map(String::from),
        resolved_by: resolved_by.map(String::from),
        created_at: None,
        resolved_at: if resolved {
            Some(vcs::current_timestamp())
        } else {
            None
        },
    }
    .insert(conn)?;
    Ok(())
}

/// Fold unambiguous delete+add pairs with identical content into a
/// single rename. Multiple candidates on either side stay delete+add.
fn detect_renames(
    pending: &mut Vec<PendingChange>,
    scanned: &[ScannedFile],
    snapshot_by_file: &HashMap<i64, &CheckoutFile>,
) {
    let mut added_by_hash: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut deleted_by_hash: HashMap<&str, Vec<usize>> = HashMap::new();

    for (i, change) in pending.iter().enumerate() {
        match change.kind {
            ChangeType::Added if change.file_id.is_none() => {
                let hash = scanned[change.scanned.unwrap()].hash.as_str();
                added_by_hash.entry(hash).or_default().push(i);
            }
            ChangeType::Deleted => {
                if let Some(snap) = change.file_id.and_then(|id| snapshot_by_file.get(&id)) {
                    deleted_by_hash
                        .entry(snap.content_hash.as_str())
                        .or_default()
                        .push(i);
                }
            }
            _ => {}
        }
    }

    let mut renames: Vec<(usize, usize)> = Vec::new();
    for (hash, added) in &added_by_hash {
        if let Some(deleted) = deleted_by_hash.get(hash) {
            if added.len() == 1 && deleted.len() == 1 {
                renames.push((added[0], deleted[0]));
            }
        }
    }

    let mut remove: Vec<usize> = Vec::new();
    for (add_idx, del_idx) in renames {
        let old_path = pending[del_idx].path.clone();
        let old_file_id = pending[del_idx].file_id;
        let change = &mut pending[add_idx];
        change.kind = ChangeType::Renamed;
        change.previous_path = Some(old_path);
        change.old_file_id = old_file_id;
        remove.push(del_idx);
    }

    remove.sort_unstable_by(|a, b| b.cmp(a));
    for idx in remove {
        pending.remove(idx);
    }
}

/// Scan a directory and normalize it into the store as a new project
/// with an initial commit on its default branch.
pub fn import<P: AsRef<Path>>(
    conn: &Connection,
    dir: P,
    slug: Option<&str>,
    cancel: &CancelToken,
) -> Result<ImportSummary> {
    let canonical = fs::canonicalize(dir.as_ref())?;
    let slug = match slug {
        Some(s) => s.to_string(),
        None => slug_from_path(&canonical),
    };

    let scanned = scanner::scan_directory(&canonical, &ScanOptions::default(), cancel)?;
    let classifier = TypeClassifier::load(conn)?;
    let type_names: HashMap<i64, String> = FileType::list_all(conn)?
        .into_iter()
        .map(|t| (t.id.unwrap(), t.name))
        .collect();

    let (author, author_email) = vcs::resolve_author();

    db::transaction(conn, |tx| {
        let mut project = Project::new(slug.clone(), slug.clone());
        let project_id = project.insert(tx)?;
        Branch::get_or_create(tx, project_id, "main", None)?;

        let mut changes: Vec<StagedChange> = Vec::new();
        for file in &scanned {
            cancel.check()?;

            let hash = blob::put(tx, &file.content)?;
            let type_id = classifier.classify(&file.relative_path);
            let record = ProjectFile::get_or_create(tx, project_id, &file.relative_path, type_id)?;
            let file_id = record.id.expect("upserted file has id");

            let component = type_id
                .and_then(|id| type_names.get(&id))
                .filter(|_| !file.is_binary)
                .and_then(|name| {
                    names::extract_component_name(name, &String::from_utf8_lossy(&file.content))
                });
            ProjectFile::update_stats(tx, file_id, file.line_count, component.as_deref())?;

            changes.push(StagedChange {
                file_id,
                path: file.relative_path.clone(),
                content_hash: Some(hash),
                change_type: ChangeType::Added,
                previous_path: None,
            });
        }

        let commit_hash = if changes.is_empty() {
            warn!("Importing '{}' found no files", slug);
            None
        } else {
            let commit = vcs::create_commit(
                tx,
                &CommitRequest {
                    project_id,
                    branch_name: "main".to_string(),
                    changes,
                    author: author.clone(),
                    author_email: author_email.clone(),
                    message: format!("Import {}", slug),
                    merge_parent_id: None,
                    committed_at: None,
                },
            )?;
            Some(commit.commit_hash)
        };

        info!("Imported '{}' ({} files)", slug, scanned.len());
        Ok(ImportSummary {
            project_id,
            slug: slug.clone(),
            files: scanned.len(),
            commit_hash,
        })
    })
}

fn slug_from_path(path: &Path) -> String {
    let raw = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "project".to_string());

    let slug: String = raw
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    slug.trim_matches('-').to_string()
}

/// Checkout rows whose directory no longer exists. With `force`, the
/// rows (and their snapshots) are removed.
pub fn cleanup_stale(conn: &Connection, force: bool) -> Result<Vec<Checkout>> {
    let stale: Vec<Checkout> = Checkout::list_all(conn)?
        .into_iter()
        .filter(|c| !Path::new(&c.checkout_path).exists())
        .collect();

    if force {
        db::transaction(conn, |tx| {
            for checkout in &stale {
                Checkout::delete(tx, checkout.id.unwrap())?;
            }
            Ok(())
        })?;
        info!("Removed {} stale checkout(s)", stale.len());
    }

    Ok(stale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};

    fn create_test_db() -> (NamedTempFile, Connection) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = crate::db::init(temp_file.path()).unwrap();
        (temp_file, conn)
    }

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn import_fixture(conn: &Connection) -> (TempDir, ImportSummary) {
        let src = TempDir::new().unwrap();
        write(src.path(), "README.md", b"hello\n");
        write(src.path(), "src/main.rs", b"fn main() {}\n");
        let summary = import(conn, src.path(), Some("p1"), &CancelToken::new()).unwrap();
        (src, summary)
    }

    #[test]
    fn test_import_creates_project_commit_and_versions() {
        let (_temp, conn) = create_test_db();
        let (_src, summary) = import_fixture(&conn);

        assert_eq!(summary.files, 2);
        assert!(summary.commit_hash.is_some());

        let project = Project::get_by_slug(&conn, "p1").unwrap();
        let files = ProjectFile::list_by_project(&conn, project.id.unwrap()).unwrap();
        assert_eq!(files.len(), 2);

        for file in &files {
            let current = FileContents::current_for_file(&conn, file.id.unwrap())
                .unwrap()
                .unwrap();
            assert_eq!(current.version, 1);
        }

        let branch = Branch::default_for_project(&conn, project.id.unwrap())
            .unwrap()
            .unwrap();
        assert!(branch.head_commit_id.is_some());
        assert_eq!(branch.name, "main");
    }

    #[test]
    fn test_checkout_materializes_and_snapshots() {
        let (_temp, conn) = create_test_db();
        let (_src, _summary) = import_fixture(&conn);

        let work = TempDir::new().unwrap();
        let dir = work.path().join("w");
        let summary = checkout(&conn, "p1", &dir, false, &CancelToken::new()).unwrap();

        assert_eq!(summary.files, 2);
        assert_eq!(fs::read(dir.join("README.md")).unwrap(), b"hello\n");
        assert_eq!(fs::read(dir.join("src/main.rs")).unwrap(), b"fn main() {}\n");

        let snaps = CheckoutFile::list_by_checkout(&conn, summary.checkout_id).unwrap();
        assert_eq!(snaps.len(), 2);
        assert!(snaps.iter().all(|s| s.version == 1));
    }

    #[test]
    fn test_checkout_existing_path_requires_force() {
        let (_temp, conn) = create_test_db();
        let (_src, _summary) = import_fixture(&conn);

        let work = TempDir::new().unwrap();
        let dir = work.path().join("w");
        checkout(&conn, "p1", &dir, false, &CancelToken::new()).unwrap();

        let result = checkout(&conn, "p1", &dir, false, &CancelToken::new());
        assert!(matches!(result, Err(Error::PathExists(_))));

        // Force replaces the tree and the checkout row.
        checkout(&conn, "p1", &dir, true, &CancelToken::new()).unwrap();
    }

    #[test]
    fn test_checkout_unknown_project() {
        let (_temp, conn) = create_test_db();
        let work = TempDir::new().unwrap();
        let result = checkout(&conn, "ghost", work.path().join("w"), false, &CancelToken::new());
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_edit_and_commit_round_trip() {
        let (_temp, conn) = create_test_db();
        let (_src, _summary) = import_fixture(&conn);

        let work = TempDir::new().unwrap();
        let dir = work.path().join("w");
        let co = checkout(&conn, "p1", &dir, false, &CancelToken::new()).unwrap();

        write(&dir, "README.md", b"hi\n");

        let outcome = commit(
            &conn,
            "p1",
            &dir,
            "tweak readme",
            CommitStrategy::Abort,
            None,
            &CancelToken::new(),
        )
        .unwrap();

        let commit_row = match outcome {
            CommitOutcome::Committed(c) => c,
            other => panic!("expected a commit, got {:?}", other),
        };
        assert_eq!(commit_row.files_changed, 1);
        assert_eq!(commit_row.message, "tweak readme");

        let project = Project::get_by_slug(&conn, "p1").unwrap();
        let file = ProjectFile::find_by_path(&conn, project.id.unwrap(), "README.md")
            .unwrap()
            .unwrap();
        let current = FileContents::current_for_file(&conn, file.id.unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(current.version, 2);
        assert_eq!(current.content_hash, blob::compute_hash(b"hi\n"));

        // Snapshot basis moved with the commit.
        let snap = CheckoutFile::find(&conn, co.checkout_id, file.id.unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(snap.version, 2);

        // Working state returned to unmodified.
        let branch = Branch::default_for_project(&conn, project.id.unwrap())
            .unwrap()
            .unwrap();
        let ws = WorkingState::get(
            &conn,
            project.id.unwrap(),
            branch.id.unwrap(),
            file.id.unwrap(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(ws.state, WorkingFileState::Unmodified);
        assert!(!ws.staged);
    }

    #[test]
    fn test_commit_nothing_to_commit() {
        let (_temp, conn) = create_test_db();
        let (_src, _summary) = import_fixture(&conn);

        let work = TempDir::new().unwrap();
        let dir = work.path().join("w");
        checkout(&conn, "p1", &dir, false, &CancelToken::new()).unwrap();

        let outcome = commit(
            &conn,
            "p1",
            &dir,
            "noop",
            CommitStrategy::Abort,
            None,
            &CancelToken::new(),
        )
        .unwrap();
        assert!(matches!(outcome, CommitOutcome::NothingToCommit));
    }

    #[test]
    fn test_stale_checkout_commit_aborts_with_conflict() {
        let (_temp, conn) = create_test_db();
        let (_src, _summary) = import_fixture(&conn);

        // Agent A and agent B both check out.
        let work_a = TempDir::new().unwrap();
        let dir_a = work_a.path().join("a");
        checkout(&conn, "p1", &dir_a, false, &CancelToken::new()).unwrap();

        let work_b = TempDir::new().unwrap();
        let dir_b = work_b.path().join("b");
        checkout(&conn, "p1", &dir_b, false, &CancelToken::new()).unwrap();

        // A commits first.
        write(&dir_a, "README.md", b"a\n");
        commit(
            &conn,
            "p1",
            &dir_a,
            "a wins",
            CommitStrategy::Abort,
            None,
            &CancelToken::new(),
        )
        .unwrap();

        // B edits the same file from the stale snapshot and aborts.
        write(&dir_b, "README.md", b"b\n");
        let result = commit(
            &conn,
            "p1",
            &dir_b,
            "b loses",
            CommitStrategy::Abort,
            None,
            &CancelToken::new(),
        );

        match result {
            Err(Error::CommitConflict(paths)) => {
                assert_eq!(paths.len(), 1);
                assert_eq!(paths[0].path, "README.md");
                assert_eq!(paths[0].conflict_type, "version_mismatch");
            }
            other => panic!("expected CommitConflict, got {:?}", other),
        }

        // Store still holds A's content at version 2.
        let project = Project::get_by_slug(&conn, "p1").unwrap();
        let file = ProjectFile::find_by_path(&conn, project.id.unwrap(), "README.md")
            .unwrap()
            .unwrap();
        let current = FileContents::current_for_file(&conn, file.id.unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(current.version, 2);
        assert_eq!(current.content_hash, blob::compute_hash(b"a\n"));

        // B's workspace is untouched.
        assert_eq!(fs::read(dir_b.join("README.md")).unwrap(), b"b\n");

        // An open conflict row was recorded.
        let open = Conflict::list_open_for_project(&conn, project.id.unwrap()).unwrap();
        assert_eq!(open.len(), 1);
    }

    #[test]
    fn test_force_commit_overwrites_and_records_resolution() {
        let (_temp, conn) = create_test_db();
        let (_src, _summary) = import_fixture(&conn);

        let work_a = TempDir::new().unwrap();
        let dir_a = work_a.path().join("a");
        checkout(&conn, "p1", &dir_a, false, &CancelToken::new()).unwrap();
        let work_b = TempDir::new().unwrap();
        let dir_b = work_b.path().join("b");
        checkout(&conn, "p1", &dir_b, false, &CancelToken::new()).unwrap();

        write(&dir_a, "README.md", b"a\n");
        commit(
            &conn,
            "p1",
            &dir_a,
            "a",
            CommitStrategy::Abort,
            None,
            &CancelToken::new(),
        )
        .unwrap();

        write(&dir_b, "README.md", b"b\n");
        let outcome = commit(
            &conn,
            "p1",
            &dir_b,
            "b forces",
            CommitStrategy::Force,
            None,
            &CancelToken::new(),
        )
        .unwrap();
        assert!(matches!(outcome, CommitOutcome::Committed(_)));

        let project = Project::get_by_slug(&conn, "p1").unwrap();
        let file = ProjectFile::find_by_path(&conn, project.id.unwrap(), "README.md")
            .unwrap()
            .unwrap();
        let current = FileContents::current_for_file(&conn, file.id.unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(current.version, 3);
        assert_eq!(current.content_hash, blob::compute_hash(b"b\n"));

        // No open conflicts; the force resolution is on record.
        assert!(Conflict::list_open_for_project(&conn, project.id.unwrap())
            .unwrap()
            .is_empty());
        let resolved: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM conflicts
                 WHERE status = 'resolved' AND resolution_strategy = 'force'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(resolved >= 1);
    }

    #[test]
    fn test_delete_and_add_and_rename() {
        let (_temp, conn) = create_test_db();
        let (_src, _summary) = import_fixture(&conn);

        let work = TempDir::new().unwrap();
        let dir = work.path().join("w");
        checkout(&conn, "p1", &dir, false, &CancelToken::new()).unwrap();

        // Rename README.md -> NOTES.md, add a new file.
        fs::rename(dir.join("README.md"), dir.join("NOTES.md")).unwrap();
        write(&dir, "extra.txt", b"extra\n");

        let outcome = commit(
            &conn,
            "p1",
            &dir,
            "rearrange",
            CommitStrategy::Abort,
            None,
            &CancelToken::new(),
        )
        .unwrap();
        let commit_row = match outcome {
            CommitOutcome::Committed(c) => c,
            other => panic!("expected a commit, got {:?}", other),
        };

        let project = Project::get_by_slug(&conn, "p1").unwrap();
        let states =
            crate::db::models::FileState::list_by_commit(&conn, commit_row.id.unwrap()).unwrap();
        assert_eq!(states.len(), 2);

        let renamed = states
            .iter()
            .find(|s| s.change_type == ChangeType::Renamed)
            .expect("one rename");
        assert_eq!(renamed.previous_path, Some("README.md".to_string()));

        // The tree reflects the rename.
        let tree = vcs::tree_for_commit(&conn, commit_row.id).unwrap();
        assert!(tree.contains_key("NOTES.md"));
        assert!(tree.contains_key("extra.txt"));
        assert!(!tree.contains_key("README.md"));

        // Old identity is still known to the project, new one exists.
        assert!(
            ProjectFile::find_by_path(&conn, project.id.unwrap(), "NOTES.md")
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn test_cleanup_stale_checkouts() {
        let (_temp, conn) = create_test_db();
        let (_src, _summary) = import_fixture(&conn);

        let dir = {
            let work = TempDir::new().unwrap();
            let dir = work.path().join("w");
            checkout(&conn, "p1", &dir, false, &CancelToken::new()).unwrap();
            dir
            // TempDir dropped: directory vanishes, the row goes stale.
        };
        assert!(!dir.exists());

        let stale = cleanup_stale(&conn, false).unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(Checkout::list_all(&conn).unwrap().len(), 1, "dry run keeps rows");

        cleanup_stale(&conn, true).unwrap();
        assert!(Checkout::list_all(&conn).unwrap().is_empty());
    }
}
