// src/db/mod.rs

//! Database layer for templedb
//!
//! This module handles all SQLite operations including:
//! - Database initialization and schema migration
//! - Connection management and pragmas
//! - Scoped transactions with savepoint nesting
//! - Retry-with-backoff on lock contention
//! - Store health checks

use crate::error::{Error, Result};
use rusqlite::Connection;
use std::cell::Cell;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub mod models;
pub mod schema;

/// Initialize the templedb store at the specified path
///
/// Creates the database file (and parent directories), applies the
/// connection pragmas, and runs all pending schema migrations.
/// Idempotent - calling it on an existing store is safe.
pub fn init<P: AsRef<Path>>(db_path: P) -> Result<Connection> {
    let db_path = db_path.as_ref();
    debug!("Initializing store at: {}", db_path.display());

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::InitError(format!("Failed to create data directory: {}", e)))?;
    }

    let conn = Connection::open(db_path)?;
    apply_pragmas(&conn)?;
    schema::migrate(&conn)?;

    info!("Store initialized at {}", db_path.display());
    Ok(conn)
}

/// Open an existing templedb store
pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Connection> {
    let db_path = db_path.as_ref();
    if !db_path.exists() {
        return Err(Error::DatabaseNotFound(db_path.display().to_string()));
    }

    let conn = Connection::open(db_path)?;
    apply_pragmas(&conn)?;

    Ok(conn)
}

/// Open (creating if needed) the store at the default data directory.
pub fn open_default() -> Result<Connection> {
    init(crate::paths::database_path())
}

/// Connection pragmas: WAL journaling with relaxed sync, a large page
/// cache, and memory-mapped reads. Writers serialize through the WAL;
/// readers stay concurrent.
fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        PRAGMA cache_size = -65536;
        PRAGMA mmap_size = 268435456;
        ",
    )?;
    Ok(())
}

thread_local! {
    static TXN_DEPTH: Cell<u32> = const { Cell::new(0) };
}

struct DepthGuard {
    depth: u32,
}

impl DepthGuard {
    fn enter() -> Self {
        let depth = TXN_DEPTH.with(|d| {
            let depth = d.get();
            d.set(depth + 1);
            depth
        });
        Self { depth }
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        TXN_DEPTH.with(|d| d.set(self.depth));
    }
}

/// Run `f` inside a write transaction.
///
/// The outermost call opens `BEGIN IMMEDIATE`; nested calls on the same
/// thread become savepoints keyed by depth, so an inner failure unwinds
/// only its own work while the outer transaction decides what to do.
/// On error every level rolls back; the store is left unchanged.
pub fn transaction<T, F>(conn: &Connection, f: F) -> Result<T>
where
    F: FnOnce(&Connection) -> Result<T>,
{
    let guard = DepthGuard::enter();
    let depth = guard.depth;

    if depth == 0 {
        conn.execute_batch("BEGIN IMMEDIATE")?;
    } else {
        conn.execute_batch(&format!("SAVEPOINT templedb_sp_{}", depth))?;
    }

    match f(conn) {
        Ok(value) => {
            if depth == 0 {
                conn.execute_batch("COMMIT")?;
            } else {
                conn.execute_batch(&format!("RELEASE templedb_sp_{}", depth))?;
            }
            Ok(value)
        }
        Err(e) => {
            let rollback = if depth == 0 {
                conn.execute_batch("ROLLBACK")
            } else {
                conn.execute_batch(&format!(
                    "ROLLBACK TO templedb_sp_{depth}; RELEASE templedb_sp_{depth}"
                ))
            };
            if let Err(rb) = rollback {
                warn!("Rollback failed after error: {}", rb);
            }
            Err(e)
        }
    }
}

/// Retry budget for lock contention: 10 ms initial delay, doubling to a
/// 500 ms cap, 5 s total before the error is surfaced.
const RETRY_INITIAL: Duration = Duration::from_millis(10);
const RETRY_CAP: Duration = Duration::from_millis(500);
const RETRY_BUDGET: Duration = Duration::from_secs(5);

/// Run `f`, retrying with exponential backoff while it reports
/// `DatabaseLocked`. Any other outcome is returned immediately.
pub fn with_retry<T, F>(mut f: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let deadline = Instant::now() + RETRY_BUDGET;
    let mut delay = RETRY_INITIAL;

    loop {
        match f() {
            Err(Error::DatabaseLocked) if Instant::now() + delay < deadline => {
                debug!("Store locked, retrying in {:?}", delay);
                thread::sleep(delay);
                delay = (delay * 2).min(RETRY_CAP);
            }
            other => return other,
        }
    }
}

/// Built-in health check: the store must answer a trivial query and pass
/// `PRAGMA integrity_check`.
pub fn health_check(conn: &Connection) -> Result<()> {
    let one: i32 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
    if one != 1 {
        return Err(Error::Corruption("SELECT 1 returned garbage".to_string()));
    }

    let verdict: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
    if verdict != "ok" {
        return Err(Error::Corruption(verdict));
    }

    Ok(())
}
