// src/lib.rs

//! templedb
//!
//! Database-native source control and workspace engine: many projects'
//! files, histories, branches, and working states live in one embedded
//! SQLite store, and editing flows through a checkout / commit loop
//! that briefly materializes files on disk and re-ingests them
//! atomically.
//!
//! # Architecture
//!
//! - Database-first: all state in SQLite, no loose metadata files
//! - Content-addressed blobs: SHA-256 keyed, deduplicated across
//!   files, projects, and history
//! - Commits and branches: canonical commit hashing, explicit branch
//!   head updates, parent-chain logs
//! - Checkout / commit: optimistic per-file locking via the snapshot
//!   each agent took at checkout time
//! - Scanner: classifier patterns are data in the store, not code

pub mod backup;
pub mod blob;
pub mod cancel;
pub mod db;
mod error;
pub mod paths;
pub mod query;
pub mod scanner;
pub mod vcs;
pub mod workspace;

pub use error::{ConflictingPath, Error, Result};
