// src/error.rs

use serde::Serialize;
use thiserror::Error;

/// A single conflicting path, as reported by a rejected workspace commit.
///
/// Serialized to stderr as the machine-readable part of a `CommitConflict`.
#[derive(Debug, Clone, Serialize)]
pub struct ConflictingPath {
    pub path: String,
    pub conflict_type: String,
    pub base_version: i64,
    pub current_version: i64,
}

/// Core error types for templedb
#[derive(Error, Debug)]
pub enum Error {
    /// Entity lookup failed (project, file, branch, commit, blob)
    #[error("not found: {0}")]
    NotFound(String),

    /// Unique constraint hit on an explicit create (e.g. duplicate project slug)
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A store constraint was violated; the constraint text is preserved
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    /// Optimistic version check failed when replacing a file's current content
    #[error("version conflict for file {file_id}: expected version {expected}, got {actual}")]
    VersionConflict {
        file_id: i64,
        expected: i64,
        actual: i64,
    },

    /// Workspace commit rejected; carries the list of conflicting paths
    #[error("commit conflicts on {} file(s)", .0.len())]
    CommitConflict(Vec<ConflictingPath>),

    /// A commit-hash prefix matched more than one commit in the project
    #[error("ambiguous hash prefix: {0}")]
    AmbiguousHash(String),

    /// Checkout target already exists and force was not given
    #[error("path already exists: {0}")]
    PathExists(String),

    /// The store is locked by another writer; callers retry with backoff
    #[error("database is locked")]
    DatabaseLocked,

    /// Database file is missing
    #[error("database not found at path: {0}")]
    DatabaseNotFound(String),

    /// Database initialization error
    #[error("failed to initialize database: {0}")]
    InitError(String),

    /// The store file is damaged; fatal, never retried
    #[error("database corruption: {0}")]
    Corruption(String),

    /// A long operation was cancelled at a per-file boundary
    #[error("operation cancelled")]
    Cancelled,

    /// Invalid arguments or command usage
    #[error("usage error: {0}")]
    UsageError(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other database error
    #[error("database error: {0}")]
    Database(rusqlite::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match &err {
            rusqlite::Error::SqliteFailure(e, msg) => match e.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => Error::DatabaseLocked,
                ErrorCode::ConstraintViolation => {
                    Error::IntegrityViolation(msg.clone().unwrap_or_else(|| err.to_string()))
                }
                ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase => {
                    Error::Corruption(err.to_string())
                }
                _ => Error::Database(err),
            },
            _ => Error::Database(err),
        }
    }
}

/// Result type alias using templedb's Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Process exit code for this error, per the CLI contract.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::UsageError(_) => 2,
            Error::CommitConflict(_) => 6,
            Error::AmbiguousHash(_) => 8,
            Error::NotFound(_) => 9,
            _ => 1,
        }
    }
}
