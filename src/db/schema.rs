// src/db/schema.rs

//! Schema migrations for templedb
//!
//! Migrations are an ordered, append-only ledger. Each migration is a
//! pure SQL script (plus an optional data-rewrite step run in the same
//! transaction), applied exactly once in ascending id order. The ledger
//! is the `schema_migrations` table; ids must be contiguous and are
//! never re-applied or downgraded.

use crate::error::{Error, Result};
use rusqlite::{params, Connection};
use tracing::{debug, info};

/// One schema migration: a numbered SQL script plus an optional
/// post-SQL rewrite executed inside the same transaction.
pub struct Migration {
    pub id: i64,
    pub filename: &'static str,
    pub sql: &'static str,
    pub post: Option<fn(&Connection) -> Result<()>>,
}

/// All migrations, in application order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        id: 1,
        filename: "001_initial_schema.sql",
        sql: INITIAL_SCHEMA,
        post: None,
    },
    Migration {
        id: 2,
        filename: "002_seed_file_types.sql",
        sql: SEED_FILE_TYPES,
        post: None,
    },
];

/// Initial schema - the complete end-state shape
///
/// Creates all core tables:
/// - projects: project registry keyed by slug
/// - file_types / file_type_patterns: classifier dictionary (data, not code)
/// - project_files: per-(project, path) identity
/// - content_blobs: content-addressed payloads keyed by SHA-256
/// - file_contents: per-file version history with a single current row
/// - branches / commits / file_states: the commit graph
/// - working_states: per-(project, branch, file) editing status + staging
/// - checkouts / checkout_files: materialized workspaces and their
///   optimistic-locking snapshots
/// - conflicts: detected divergences, open until resolved
const INITIAL_SCHEMA: &str = "
    -- Projects: top-level namespace, soft lifecycle
    CREATE TABLE projects (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        slug TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        description TEXT,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    -- File types: global dictionary, seeded by migration, not user-edited
    CREATE TABLE file_types (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        category TEXT NOT NULL
    );

    -- Ordered classifier patterns; lowest priority number wins first
    CREATE TABLE file_type_patterns (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        priority INTEGER NOT NULL UNIQUE,
        pattern TEXT NOT NULL,
        file_type_id INTEGER NOT NULL,
        FOREIGN KEY (file_type_id) REFERENCES file_types(id)
    );

    -- Project files: path is unique within a project, never globally
    CREATE TABLE project_files (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL,
        path TEXT NOT NULL,
        file_type_id INTEGER,
        line_count INTEGER NOT NULL DEFAULT 0,
        owner TEXT,
        component_name TEXT,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        UNIQUE(project_id, path),
        FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
        FOREIGN KEY (file_type_id) REFERENCES file_types(id)
    );

    CREATE INDEX idx_project_files_project ON project_files(project_id);
    CREATE INDEX idx_project_files_path ON project_files(path);

    -- Content blobs: immutable, content-addressed by SHA-256, shared
    -- across files, projects, and history
    CREATE TABLE content_blobs (
        hash TEXT PRIMARY KEY,
        content_type TEXT NOT NULL CHECK(content_type IN ('text', 'binary')),
        text_content TEXT,
        binary_content BLOB,
        size_bytes INTEGER NOT NULL,
        line_count INTEGER,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        CHECK (content_type != 'text' OR text_content IS NOT NULL),
        CHECK (content_type != 'binary' OR binary_content IS NOT NULL)
    );

    -- File contents: version history; exactly one current row per file
    CREATE TABLE file_contents (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_id INTEGER NOT NULL,
        content_hash TEXT NOT NULL,
        version INTEGER NOT NULL CHECK(version >= 1),
        is_current INTEGER NOT NULL DEFAULT 0 CHECK(is_current IN (0, 1)),
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        UNIQUE(file_id, version),
        FOREIGN KEY (file_id) REFERENCES project_files(id) ON DELETE CASCADE,
        FOREIGN KEY (content_hash) REFERENCES content_blobs(hash)
    );

    CREATE UNIQUE INDEX idx_file_contents_current
        ON file_contents(file_id) WHERE is_current = 1;
    CREATE INDEX idx_file_contents_hash ON file_contents(content_hash);

    -- Branches: named mutable pointers to commits, per project
    CREATE TABLE branches (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        head_commit_id INTEGER,
        parent_branch_id INTEGER,
        is_default INTEGER NOT NULL DEFAULT 0,
        is_protected INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        UNIQUE(project_id, name),
        FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
        FOREIGN KEY (head_commit_id) REFERENCES commits(id),
        FOREIGN KEY (parent_branch_id) REFERENCES branches(id)
    );

    CREATE INDEX idx_branches_project ON branches(project_id);

    -- Commits: content-addressed snapshots with provenance
    CREATE TABLE commits (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL,
        branch_id INTEGER NOT NULL,
        commit_hash TEXT NOT NULL UNIQUE,
        parent_commit_id INTEGER,
        merge_parent_commit_id INTEGER,
        author TEXT NOT NULL,
        author_email TEXT NOT NULL,
        message TEXT NOT NULL,
        committed_at TEXT NOT NULL,
        files_changed INTEGER NOT NULL DEFAULT 0,
        lines_added INTEGER NOT NULL DEFAULT 0,
        lines_removed INTEGER NOT NULL DEFAULT 0,
        FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
        FOREIGN KEY (branch_id) REFERENCES branches(id),
        FOREIGN KEY (parent_commit_id) REFERENCES commits(id),
        FOREIGN KEY (merge_parent_commit_id) REFERENCES commits(id)
    );

    CREATE INDEX idx_commits_project ON commits(project_id);
    CREATE INDEX idx_commits_branch ON commits(branch_id);
    CREATE INDEX idx_commits_committed_at ON commits(committed_at);

    -- File states: one row per file touched by a commit
    CREATE TABLE file_states (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        commit_id INTEGER NOT NULL,
        file_id INTEGER NOT NULL,
        content_hash TEXT,
        change_type TEXT NOT NULL
            CHECK(change_type IN ('added', 'modified', 'deleted', 'renamed')),
        previous_path TEXT,
        UNIQUE(commit_id, file_id),
        FOREIGN KEY (commit_id) REFERENCES commits(id) ON DELETE CASCADE,
        FOREIGN KEY (file_id) REFERENCES project_files(id) ON DELETE CASCADE,
        FOREIGN KEY (content_hash) REFERENCES content_blobs(hash)
    );

    CREATE INDEX idx_file_states_commit ON file_states(commit_id);
    CREATE INDEX idx_file_states_file ON file_states(file_id);

    -- Working states: mutable editing status per (project, branch, file)
    CREATE TABLE working_states (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL,
        branch_id INTEGER NOT NULL,
        file_id INTEGER NOT NULL,
        content_hash TEXT,
        state TEXT NOT NULL
            CHECK(state IN ('unmodified', 'modified', 'added', 'deleted', 'conflict')),
        staged INTEGER NOT NULL DEFAULT 0 CHECK(staged IN (0, 1)),
        updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        UNIQUE(project_id, branch_id, file_id),
        FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
        FOREIGN KEY (branch_id) REFERENCES branches(id) ON DELETE CASCADE,
        FOREIGN KEY (file_id) REFERENCES project_files(id) ON DELETE CASCADE
    );

    CREATE INDEX idx_working_states_scope ON working_states(project_id, branch_id);

    -- Checkouts: where a project tree has been materialized
    CREATE TABLE checkouts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL,
        branch_id INTEGER NOT NULL,
        checkout_path TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        last_sync_at TEXT,
        UNIQUE(project_id, checkout_path),
        FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
        FOREIGN KEY (branch_id) REFERENCES branches(id)
    );

    -- Checkout snapshots: the (hash, version) each file had at checkout
    -- time; the optimistic-locking basis for conflict detection
    CREATE TABLE checkout_files (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        checkout_id INTEGER NOT NULL,
        file_id INTEGER NOT NULL,
        content_hash TEXT NOT NULL,
        version INTEGER NOT NULL,
        UNIQUE(checkout_id, file_id),
        FOREIGN KEY (checkout_id) REFERENCES checkouts(id) ON DELETE CASCADE,
        FOREIGN KEY (file_id) REFERENCES project_files(id) ON DELETE CASCADE
    );

    CREATE INDEX idx_checkout_files_checkout ON checkout_files(checkout_id);

    -- Conflicts: detected divergence between a checkout basis and the
    -- store's current state. checkout_id is informational only so
    -- conflict history survives checkout deletion.
    CREATE TABLE conflicts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL,
        file_id INTEGER NOT NULL,
        checkout_id INTEGER,
        base_version INTEGER NOT NULL,
        base_hash TEXT NOT NULL,
        current_version INTEGER NOT NULL,
        current_hash TEXT NOT NULL,
        conflict_type TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'open' CHECK(status IN ('open', 'resolved')),
        resolution_strategy TEXT,
        resolved_by TEXT,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        resolved_at TEXT,
        FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
        FOREIGN KEY (file_id) REFERENCES project_files(id) ON DELETE CASCADE
    );

    CREATE INDEX idx_conflicts_file_status ON conflicts(file_id, status);

    -- Invariant checks only; state transitions are performed explicitly
    -- by the version engine, never by triggers.
    CREATE TRIGGER trg_branch_head_same_project
    BEFORE UPDATE OF head_commit_id ON branches
    FOR EACH ROW WHEN NEW.head_commit_id IS NOT NULL
    BEGIN
        SELECT RAISE(ABORT, 'branch head must belong to the branch project')
        WHERE (SELECT project_id FROM commits WHERE id = NEW.head_commit_id)
              != NEW.project_id;
    END;

    CREATE TRIGGER trg_commit_parent_same_project
    BEFORE INSERT ON commits
    FOR EACH ROW WHEN NEW.parent_commit_id IS NOT NULL
    BEGIN
        SELECT RAISE(ABORT, 'commit parent must belong to the same project')
        WHERE (SELECT project_id FROM commits WHERE id = NEW.parent_commit_id)
              != NEW.project_id;
    END;
";

/// Seed the file-type dictionary and the ordered classifier patterns.
///
/// Patterns run most-specific filenames first, then extensions, then the
/// catch-all; the scanner takes the first match. Being plain rows, the
/// list is editable with SQL and needs no recompile.
const SEED_FILE_TYPES: &str = "
    INSERT INTO file_types (name, category) VALUES
        ('rust', 'source'),
        ('python', 'source'),
        ('javascript', 'source'),
        ('typescript', 'source'),
        ('go', 'source'),
        ('c', 'source'),
        ('cpp', 'source'),
        ('header', 'source'),
        ('java', 'source'),
        ('ruby', 'source'),
        ('shell', 'source'),
        ('sql', 'source'),
        ('html', 'markup'),
        ('css', 'markup'),
        ('markdown', 'docs'),
        ('text', 'docs'),
        ('json', 'config'),
        ('yaml', 'config'),
        ('toml', 'config'),
        ('config', 'config'),
        ('dockerfile', 'build'),
        ('makefile', 'build'),
        ('cmake', 'build'),
        ('lockfile', 'build'),
        ('image', 'asset'),
        ('data', 'data'),
        ('other', 'other');

    INSERT INTO file_type_patterns (priority, pattern, file_type_id) VALUES
        (10,  '(^|/)Dockerfile$',              (SELECT id FROM file_types WHERE name = 'dockerfile')),
        (20,  '(^|/)Makefile$',                (SELECT id FROM file_types WHERE name = 'makefile')),
        (30,  '(^|/)CMakeLists\\.txt$',         (SELECT id FROM file_types WHERE name = 'cmake')),
        (40,  '(^|/)(Cargo|poetry)\\.lock$',    (SELECT id FROM file_types WHERE name = 'lockfile')),
        (50,  '(^|/)(package-lock\\.json|yarn\\.lock)$', (SELECT id FROM file_types WHERE name = 'lockfile')),
        (100, '\\.rs$',                         (SELECT id FROM file_types WHERE name = 'rust')),
        (110, '\\.py$',                         (SELECT id FROM file_types WHERE name = 'python')),
        (120, '\\.tsx?$',                       (SELECT id FROM file_types WHERE name = 'typescript')),
        (130, '\\.jsx?$',                       (SELECT id FROM file_types WHERE name = 'javascript')),
        (140, '\\.go$',                         (SELECT id FROM file_types WHERE name = 'go')),
        (150, '\\.c$',                          (SELECT id FROM file_types WHERE name = 'c')),
        (160, '\\.(cc|cpp|cxx)$',               (SELECT id FROM file_types WHERE name = 'cpp')),
        (170, '\\.(h|hpp)$',                    (SELECT id FROM file_types WHERE name = 'header')),
        (180, '\\.java$',                       (SELECT id FROM file_types WHERE name = 'java')),
        (190, '\\.rb$',                         (SELECT id FROM file_types WHERE name = 'ruby')),
        (200, '\\.(sh|bash)$',                  (SELECT id FROM file_types WHERE name = 'shell')),
        (210, '\\.sql$',                        (SELECT id FROM file_types WHERE name = 'sql')),
        (220, '\\.html?$',                      (SELECT id FROM file_types WHERE name = 'html')),
        (230, '\\.css$',                        (SELECT id FROM file_types WHERE name = 'css')),
        (240, '\\.(md|markdown)$',              (SELECT id FROM file_types WHERE name = 'markdown')),
        (250, '\\.json$',                       (SELECT id FROM file_types WHERE name = 'json')),
        (260, '\\.(yml|yaml)$',                 (SELECT id FROM file_types WHERE name = 'yaml')),
        (270, '\\.toml$',                       (SELECT id FROM file_types WHERE name = 'toml')),
        (280, '\\.(ini|cfg|conf)$',             (SELECT id FROM file_types WHERE name = 'config')),
        (290, '\\.(png|jpe?g|gif|svg|ico)$',    (SELECT id FROM file_types WHERE name = 'image')),
        (300, '\\.(csv|tsv)$',                  (SELECT id FROM file_types WHERE name = 'data')),
        (310, '\\.txt$',                        (SELECT id FROM file_types WHERE name = 'text')),
        (999, '.*',                             (SELECT id FROM file_types WHERE name = 'other'));
";

/// Create the migration ledger table if missing.
fn init_ledger(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            id INTEGER PRIMARY KEY,
            filename TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Highest migration id recorded in the ledger (0 on a fresh store).
pub fn applied_version(conn: &Connection) -> Result<i64> {
    init_ledger(conn)?;

    let version = conn
        .query_row(
            "SELECT COALESCE(MAX(id), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    Ok(version)
}

/// Apply every migration whose id exceeds the ledger maximum, each in
/// its own transaction, in ascending order. Gaps in the ledger or a
/// store newer than this binary fail loudly.
pub fn migrate(conn: &Connection) -> Result<()> {
    init_ledger(conn)?;

    // Compiled-in list must itself be contiguous from 1.
    for (i, m) in MIGRATIONS.iter().enumerate() {
        if m.id != (i as i64) + 1 {
            return Err(Error::InitError(format!(
                "non-contiguous migration id {} at position {}",
                m.id, i
            )));
        }
    }

    let applied = applied_version(conn)?;
    let latest = MIGRATIONS.last().map(|m| m.id).unwrap_or(0);

    if applied > latest {
        return Err(Error::InitError(format!(
            "store schema version {} is newer than this binary supports ({})",
            applied, latest
        )));
    }

    if applied == latest {
        debug!("Schema is up to date at version {}", applied);
        return Ok(());
    }

    for migration in &MIGRATIONS[applied as usize..] {
        info!("Applying migration {}", migration.filename);
        crate::db::transaction(conn, |tx| {
            tx.execute_batch(migration.sql)?;
            if let Some(post) = migration.post {
                post(tx)?;
            }
            tx.execute(
                "INSERT INTO schema_migrations (id, filename) VALUES (?1, ?2)",
                params![migration.id, migration.filename],
            )?;
            Ok(())
        })?;
    }

    info!("Schema migration complete. Now at version {}", latest);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, Connection) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = Connection::open(temp_file.path()).unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        (temp_file, conn)
    }

    #[test]
    fn test_migrate_creates_all_tables() {
        let (_temp, conn) = create_test_db();

        migrate(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for expected in [
            "projects",
            "file_types",
            "file_type_patterns",
            "project_files",
            "content_blobs",
            "file_contents",
            "branches",
            "commits",
            "file_states",
            "working_states",
            "checkouts",
            "checkout_files",
            "conflicts",
            "schema_migrations",
        ] {
            assert!(
                tables.contains(&expected.to_string()),
                "missing table {}",
                expected
            );
        }
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let (_temp, conn) = create_test_db();

        migrate(&conn).unwrap();
        let first = applied_version(&conn).unwrap();
        let rows_first: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();

        migrate(&conn).unwrap();
        let second = applied_version(&conn).unwrap();
        let rows_second: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(rows_first, rows_second, "second run must add zero rows");
        assert_eq!(first, MIGRATIONS.last().unwrap().id);
    }

    #[test]
    fn test_ledger_records_filenames() {
        let (_temp, conn) = create_test_db();
        migrate(&conn).unwrap();

        let filenames: Vec<String> = conn
            .prepare("SELECT filename FROM schema_migrations ORDER BY id")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert_eq!(filenames[0], "001_initial_schema.sql");
        assert_eq!(filenames[1], "002_seed_file_types.sql");
    }

    #[test]
    fn test_newer_store_is_rejected() {
        let (_temp, conn) = create_test_db();
        migrate(&conn).unwrap();

        conn.execute(
            "INSERT INTO schema_migrations (id, filename) VALUES (99, '099_future.sql')",
            [],
        )
        .unwrap();

        assert!(matches!(migrate(&conn), Err(Error::InitError(_))));
    }

    #[test]
    fn test_file_type_patterns_are_seeded_in_order() {
        let (_temp, conn) = create_test_db();
        migrate(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM file_type_patterns", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert!(count > 10);

        // Catch-all must sort last.
        let last_pattern: String = conn
            .query_row(
                "SELECT pattern FROM file_type_patterns ORDER BY priority DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(last_pattern, ".*");
    }

    #[test]
    fn test_current_pointer_uniqueness_is_enforced() {
        let (_temp, conn) = create_test_db();
        migrate(&conn).unwrap();

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
            "INSERT INTO content_blobs (hash, content_type, text_content, size_bytes, line_count)
             VALUES ('h1', 'text', 'x', 1, 1)",
            [],
        )
        .unwrap();

        conn.execute(
            "INSERT INTO file_contents (file_id, content_hash, version, is_current)
             VALUES (1, 'h1', 1, 1)",
            [],
        )
        .unwrap();

        // A second current row for the same file violates the partial index.
        let result = conn.execute(
            "INSERT INTO file_contents (file_id, content_hash, version, is_current)
             VALUES (1, 'h1', 2, 1)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_branch_head_project_trigger() {
        let (_temp, conn) = create_test_db();
        migrate(&conn).unwrap();

        conn.execute_batch(
            "
            INSERT INTO projects (slug, name) VALUES ('a', 'A');
            INSERT INTO projects (slug, name) VALUES ('b', 'B');
            INSERT INTO branches (project_id, name, is_default) VALUES (1, 'main', 1);
            INSERT INTO branches (project_id, name, is_default) VALUES (2, 'main', 1);
            INSERT INTO commits (project_id, branch_id, commit_hash, author, author_email,
                                 message, committed_at)
                VALUES (1, 1, 'deadbeef', 'a', 'a@x', 'm', '2026-01-01T00:00:00Z');
            ",
        )
        .unwrap();

        // Pointing project B's branch at project A's commit must abort.
        let result = conn.execute(
            "UPDATE branches SET head_commit_id = 1 WHERE id = 2",
            [],
        );
        assert!(result.is_err());

        // Same-project head update is fine.
        conn.execute("UPDATE branches SET head_commit_id = 1 WHERE id = 1", [])
            .unwrap();
    }
}
