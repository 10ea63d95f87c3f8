// src/scanner/mod.rs

//! Filesystem scanner and type classifier
//!
//! Walks a directory tree, skipping version-control metadata and the
//! usual build/dependency/editor caches, reads each file up to a size
//! cap, classifies text vs binary, and hashes contents in parallel.
//! File types are assigned from the ordered pattern list seeded in the
//! store (first match wins), so the classifier is data, not code.

pub mod names;

use crate::cancel::CancelToken;
use crate::db::models::FileTypePattern;
use crate::error::Result;
use rayon::prelude::*;
use regex::Regex;
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Directories never scanned.
pub const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".jj",
    "node_modules",
    "target",
    "build",
    "dist",
    "__pycache__",
    ".venv",
    "venv",
    ".tox",
    ".idea",
    ".vscode",
    ".cache",
    ".mypy_cache",
    ".pytest_cache",
];

/// Files skipped by name regardless of directory.
const EXCLUDED_FILES: &[&str] = &[".DS_Store"];

/// Default per-file read cap.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 8 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Files larger than this are skipped with a warning.
    pub max_file_size: u64,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// One file found by a scan, with its content and classification.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    /// Path relative to the scan root, `/`-separated.
    pub relative_path: String,
    pub content: Vec<u8>,
    pub hash: String,
    pub is_binary: bool,
    pub line_count: i64,
}

fn is_excluded(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    if entry.file_type().is_dir() {
        EXCLUDED_DIRS.contains(&name.as_ref())
    } else {
        EXCLUDED_FILES.contains(&name.as_ref())
    }
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Walk `root` and return its files sorted by relative path.
///
/// Hashing and classification run in parallel; the cancellation token
/// is checked at per-file boundaries during the walk.
pub fn scan_directory<P: AsRef<Path>>(
    root: P,
    options: &ScanOptions,
    cancel: &CancelToken,
) -> Result<Vec<ScannedFile>> {
    let root = root.as_ref();
    let mut paths = Vec::new();

    for entry in WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_excluded(e))
    {
        cancel.check()?;
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let size = entry.metadata().map_err(std::io::Error::from)?.len();
        if size > options.max_file_size {
            warn!(
                "Skipping {} ({} bytes exceeds the {} byte cap)",
                entry.path().display(),
                size,
                options.max_file_size
            );
            continue;
        }

        paths.push(entry.into_path());
    }

    let mut files = paths
        .par_iter()
        .map(|path| -> Result<ScannedFile> {
            let content = fs::read(path)?;
            let hash = crate::blob::compute_hash(&content);
            let is_binary = crate::blob::classify(&content) == crate::blob::ContentKind::Binary;
            let line_count = if is_binary {
                0
            } else {
                crate::blob::count_lines(&String::from_utf8_lossy(&content))
            };

            Ok(ScannedFile {
                relative_path: relative_path(root, path),
                content,
                hash,
                is_binary,
                line_count,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    debug!("Scanned {} file(s) under {}", files.len(), root.display());
    Ok(files)
}

/// Compiled classifier over the store's ordered pattern list.
pub struct TypeClassifier {
    patterns: Vec<(Regex, i64)>,
}

impl TypeClassifier {
    /// Load and compile the pattern list. A malformed pattern row is
    /// skipped with a warning rather than failing the scan.
    pub fn load(conn: &Connection) -> Result<Self> {
        let rows = FileTypePattern::list_ordered(conn)?;
        let mut patterns = Vec::with_capacity(rows.len());

        for row in rows {
            match Regex::new(&row.pattern) {
                Ok(regex) => patterns.push((regex, row.file_type_id)),
                Err(e) => warn!("Ignoring malformed pattern '{}': {}", row.pattern, e),
            }
        }

        Ok(Self { patterns })
    }

    /// First matching pattern wins; the seeded catch-all means a result
    /// is always found in practice.
    pub fn classify(&self, relative_path: &str) -> Option<i64> {
        self.patterns
            .iter()
            .find(|(regex, _)| regex.is_match(relative_path))
            .map(|(_, type_id)| *type_id)
    }
}
