// src/vcs/diff.rs

//! On-demand diffs between stored blobs
//!
//! Text pairs get a line-level diff (additions, removals, and a unified
//! patch with context hunks); binary pairs only report that they
//! differ. Nothing here is persisted.

use crate::blob;
use crate::error::Result;
use diffy::{create_patch, Line};
use rusqlite::Connection;

/// Outcome of diffing two (possibly absent) blobs.
#[derive(Debug, Clone)]
pub enum BlobDelta {
    /// Same hash or same bytes on both sides
    Identical,
    /// At least one side is binary and the hashes differ
    Binary,
    /// File appeared; `lines` counts its content
    Added { lines: i64 },
    /// File disappeared; `lines` counts what was removed
    Removed { lines: i64 },
    /// Line-level text difference
    Text {
        lines_added: i64,
        lines_removed: i64,
        patch: String,
    },
}

impl BlobDelta {
    pub fn is_identical(&self) -> bool {
        matches!(self, BlobDelta::Identical)
    }
}

/// Line-diff two text payloads: (added, removed, unified patch).
pub fn diff_text(old: &str, new: &str) -> (i64, i64, String) {
    let patch = create_patch(old, new);

    let mut added = 0;
    let mut removed = 0;
    for hunk in patch.hunks() {
        for line in hunk.lines() {
            match line {
                Line::Insert(_) => added += 1,
                Line::Delete(_) => removed += 1,
                Line::Context(_) => {}
            }
        }
    }

    (added, removed, patch.to_string())
}

/// Diff two blobs by hash. `None` on one side means the file did not
/// exist there (addition or removal).
pub fn diff_blobs(
    conn: &Connection,
    old_hash: Option<&str>,
    new_hash: Option<&str>,
) -> Result<BlobDelta> {
    match (old_hash, new_hash) {
        (None, None) => Ok(BlobDelta::Identical),
        (Some(a), Some(b)) if a == b => Ok(BlobDelta::Identical),
        (None, Some(new)) => {
            let info = blob::info(conn, new)?;
            Ok(BlobDelta::Added {
                lines: info.line_count.unwrap_or(0),
            })
        }
        (Some(old), None) => {
            let info = blob::info(conn, old)?;
            Ok(BlobDelta::Removed {
                lines: info.line_count.unwrap_or(0),
            })
        }
        (Some(old), Some(new)) => {
            let old_info = blob::info(conn, old)?;
            let new_info = blob::info(conn, new)?;

            if old_info.content_type != "text" || new_info.content_type != "text" {
                return Ok(BlobDelta::Binary);
            }

            let old_bytes = blob::get(conn, old)?;
            let new_bytes = blob::get(conn, new)?;
            let old_text = String::from_utf8_lossy(&old_bytes);
            let new_text = String::from_utf8_lossy(&new_bytes);

            let (lines_added, lines_removed, patch) = diff_text(&old_text, &new_text);
            Ok(BlobDelta::Text {
                lines_added,
                lines_removed,
                patch,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, Connection) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = crate::db::init(temp_file.path()).unwrap();
        (temp_file, conn)
    }

    #[test]
    fn test_diff_text_counts() {
        let (added, removed, patch) = diff_text("a\nb\nc\n", "a\nx\nc\nd\n");
        assert_eq!(added, 2);
        assert_eq!(removed, 1);
        assert!(patch.contains("-b"));
        assert!(patch.contains("+x"));
        assert!(patch.contains("+d"));
    }

    #[test]
    fn test_same_hash_is_identical() {
        let (_temp, conn) = create_test_db();
        let hash = crate::blob::put(&conn, b"same\n").unwrap();
        let delta = diff_blobs(&conn, Some(&hash), Some(&hash)).unwrap();
        assert!(delta.is_identical());
    }

    #[test]
    fn test_added_and_removed() {
        let (_temp, conn) = create_test_db();
        let hash = crate::blob::put(&conn, b"one\ntwo\n").unwrap();

        match diff_blobs(&conn, None, Some(&hash)).unwrap() {
            BlobDelta::Added { lines } => assert_eq!(lines, 2),
            other => panic!("expected Added, got {:?}", other),
        }

        match diff_blobs(&conn, Some(&hash), None).unwrap() {
            BlobDelta::Removed { lines } => assert_eq!(lines, 2),
            other => panic!("expected Removed, got {:?}", other),
        }
    }

    #[test]
    fn test_binary_differs() {
        let (_temp, conn) = create_test_db();
        let a = crate::blob::put(&conn, &[0u8, 1, 2]).unwrap();
        let b = crate::blob::put(&conn, &[0u8, 1, 3]).unwrap();

        let delta = diff_blobs(&conn, Some(&a), Some(&b)).unwrap();
        assert!(matches!(delta, BlobDelta::Binary));
    }

    #[test]
    fn test_text_diff_between_blobs() {
        let (_temp, conn) = create_test_db();
        let a = crate::blob::put(&conn, b"hello\n").unwrap();
        let b = crate::blob::put(&conn, b"hi\n").unwrap();

        match diff_blobs(&conn, Some(&a), Some(&b)).unwrap() {
            BlobDelta::Text {
                lines_added,
                lines_removed,
                patch,
            } => {
                assert_eq!(lines_added, 1);
                assert_eq!(lines_removed, 1);
                assert!(patch.contains("-hello"));
                assert!(patch.contains("+hi"));
            }
            other => panic!("expected Text, got {:?}", other),
        }
    }
}
