// src/blob.rs

//! Content-addressed blob storage
//!
//! Byte payloads are stored in the `content_blobs` table keyed by their
//! SHA-256 hash, deduplicating identical bytes across files, projects,
//! and history. Blobs are immutable and append-only; deletion happens
//! only through the explicit garbage-collection routine once nothing
//! references a hash.

use crate::error::{Error, Result};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use tracing::debug;

/// How much of the head of a payload is inspected when deciding
/// text vs binary.
const CLASSIFY_PREFIX: usize = 8 * 1024;

/// Compute the lowercase SHA-256 hex of a payload.
pub fn compute_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Classification outcome for a payload at put-time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Text,
    Binary,
}

impl ContentKind {
    pub fn as_str(&self) -> &str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Binary => "binary",
        }
    }
}

/// Classify a payload: a NUL byte or invalid UTF-8 in the first 8 KiB
/// makes it binary. Payloads that pass the prefix check must still be
/// valid UTF-8 end to end to be stored as text.
pub fn classify(content: &[u8]) -> ContentKind {
    let prefix = &content[..content.len().min(CLASSIFY_PREFIX)];

    if prefix.contains(&0) {
        return ContentKind::Binary;
    }

    match std::str::from_utf8(prefix) {
        Ok(_) => {}
        // A multi-byte char cut off at the prefix boundary is fine;
        // anything invalid before that point is not.
        Err(e) if e.valid_up_to() + 4 >= prefix.len() && prefix.len() == CLASSIFY_PREFIX => {}
        Err(_) => return ContentKind::Binary,
    }

    if std::str::from_utf8(content).is_ok() {
        ContentKind::Text
    } else {
        ContentKind::Binary
    }
}

/// Number of lines in a text payload ("hello\n" is one line).
pub fn count_lines(text: &str) -> i64 {
    text.lines().count() as i64
}

/// Store a payload if absent and return its hash. Idempotent: putting
/// the same bytes any number of times leaves exactly one row.
pub fn put(conn: &Connection, content: &[u8]) -> Result<String> {
    let hash = compute_hash(content);

    if exists(conn, &hash)? {
        debug!("Blob already stored: {}", hash);
        return Ok(hash);
    }

    match classify(content) {
        ContentKind::Text => {
            let text = std::str::from_utf8(content).expect("classified text is valid UTF-8");
            conn.execute(
                "INSERT OR IGNORE INTO content_blobs
                     (hash, content_type, text_content, size_bytes, line_count)
                 VALUES (?1, 'text', ?2, ?3, ?4)",
                params![&hash, text, content.len() as i64, count_lines(text)],
            )?;
        }
        ContentKind::Binary => {
            conn.execute(
                "INSERT OR IGNORE INTO content_blobs
                     (hash, content_type, binary_content, size_bytes)
                 VALUES (?1, 'binary', ?2, ?3)",
                params![&hash, content, content.len() as i64],
            )?;
        }
    }

    debug!("Stored blob {} ({} bytes)", hash, content.len());
    Ok(hash)
}

/// Retrieve a payload by hash.
pub fn get(conn: &Connection, hash: &str) -> Result<Vec<u8>> {
    let row: Option<(String, Option<String>, Option<Vec<u8>>)> = conn
        .query_row(
            "SELECT content_type, text_content, binary_content
             FROM content_blobs WHERE hash = ?1",
            [hash],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    match row {
        Some((content_type, text, binary)) => match content_type.as_str() {
            "text" => Ok(text.unwrap_or_default().into_bytes()),
            _ => Ok(binary.unwrap_or_default()),
        },
        None => Err(Error::NotFound(format!("blob '{}'", hash))),
    }
}

pub fn exists(conn: &Connection, hash: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM content_blobs WHERE hash = ?1",
            [hash],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Metadata for a stored blob without its payload.
#[derive(Debug, Clone)]
pub struct BlobInfo {
    pub hash: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub line_count: Option<i64>,
}

pub fn info(conn: &Connection, hash: &str) -> Result<BlobInfo> {
    conn.query_row(
        "SELECT hash, content_type, size_bytes, line_count
         FROM content_blobs WHERE hash = ?1",
        [hash],
        |row| {
            Ok(BlobInfo {
                hash: row.get(0)?,
                content_type: row.get(1)?,
                size_bytes: row.get(2)?,
                line_count: row.get(3)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| Error::NotFound(format!("blob '{}'", hash)))
}

/// Delete blobs no longer referenced by any file version or commit
/// state. Never runs automatically; returns the number of rows removed.
pub fn collect_garbage(conn: &Connection) -> Result<usize> {
    let removed = crate::db::transaction(conn, |tx| {
        let removed = tx.execute(
            "DELETE FROM content_blobs WHERE hash NOT IN (
                 SELECT content_hash FROM file_contents
                 UNION
                 SELECT content_hash FROM file_states WHERE content_hash IS NOT NULL
             )",
            [],
        )?;
        Ok(removed)
    })?;

    debug!("Garbage collection removed {} blob(s)", removed);
    Ok(removed)
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
    fn test_compute_hash_known_value() {
        assert_eq!(
            compute_hash(b"hello\n"),
            "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03"
        );
    }

    #[test]
    fn test_put_get_round_trip() {
        let (_temp, conn) = create_test_db();

        let hash = put(&conn, b"hello\n").unwrap();
        assert_eq!(get(&conn, &hash).unwrap(), b"hello\n");

        let info = info(&conn, &hash).unwrap();
        assert_eq!(info.content_type, "text");
        assert_eq!(info.size_bytes, 6);
        assert_eq!(info.line_count, Some(1));
    }

    #[test]
    fn test_put_is_idempotent() {
        let (_temp, conn) = create_test_db();

        let h1 = put(&conn, b"same bytes").unwrap();
        let h2 = put(&conn, b"same bytes").unwrap();
        assert_eq!(h1, h2);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM content_blobs", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_binary_classification() {
        let (_temp, conn) = create_test_db();

        let payload = [0x7fu8, b'E', b'L', b'F', 0x00, 0x01, 0x02];
        let hash = put(&conn, &payload).unwrap();

        let info = info(&conn, &hash).unwrap();
        assert_eq!(info.content_type, "binary");
        assert_eq!(info.line_count, None);

        assert_eq!(get(&conn, &hash).unwrap(), payload);
    }

    #[test]
    fn test_classify_edge_cases() {
        assert_eq!(classify(b"plain text\n"), ContentKind::Text);
        assert_eq!(classify(b""), ContentKind::Text);
        assert_eq!(classify(b"nul\0byte"), ContentKind::Binary);
        assert_eq!(classify(&[0xff, 0xfe, 0x00]), ContentKind::Binary);
        // Valid multi-byte UTF-8
        assert_eq!(classify("héllo wörld".as_bytes()), ContentKind::Text);
    }

    #[test]
    fn test_get_missing_blob() {
        let (_temp, conn) = create_test_db();
        let result = get(&conn, "feedface");
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_gc_removes_only_unreferenced() {
        let (_temp, conn) = create_test_db();

        let orphan = put(&conn, b"orphan").unwrap();
        let kept = put(&conn, b"kept").unwrap();

        // Reference one blob from a file version.
        conn.execute(
            "INSERT INTO projects (slug, name) VALUES ('p', 'P')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO project_files (project_id, path) VALUES (1, 'a.txt')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO file_contents (file_id, content_hash, version, is_current)
             VALUES (1, ?1, 1, 1)",
            [&kept],
        )
        .unwrap();

        let removed = collect_garbage(&conn).unwrap();
        assert_eq!(removed, 1);
        assert!(!exists(&conn, &orphan).unwrap());
        assert!(exists(&conn, &kept).unwrap());
    }
}
