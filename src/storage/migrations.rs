//! Database migrations
//!
//! Schema migrations are plain SQL strings applied in order and tracked in
//! a `schema_version` table. `apply_migrations` is idempotent: re-running
//! it against an already-migrated database applies nothing. Migrations
//! never drop or narrow a column — only `ADD COLUMN` and `CREATE TABLE IF
//! NOT EXISTS` are used past v1.

/// A single migration step.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

/// All migrations, in order. The database's current version is the
/// highest version present in `schema_version`.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: sessions, events, blobs, memory objects",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Outcome records and conflict queue",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "FTS5 index over memory object content and scope path",
        up: MIGRATION_V3_UP,
    },
];

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    working_dir TEXT,
    working_file TEXT,
    working_task TEXT,
    event_count INTEGER NOT NULL DEFAULT 0,
    objects_created INTEGER NOT NULL DEFAULT 0,
    objects_accessed INTEGER NOT NULL DEFAULT 0,
    last_checkpoint_at TEXT,
    events_since_checkpoint INTEGER NOT NULL DEFAULT 0,
    injected_memory_ids TEXT NOT NULL DEFAULT '[]',
    last_disclosure_at TEXT,
    error_burst_count INTEGER NOT NULL DEFAULT 0,
    current_disclosure_level TEXT NOT NULL DEFAULT 'minimal',
    last_topic TEXT
);

CREATE TABLE IF NOT EXISTS blobs (
    id TEXT PRIMARY KEY,
    content BLOB NOT NULL,
    byte_length INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS events (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES sessions(id),
    timestamp TEXT NOT NULL,
    event_type TEXT NOT NULL,
    content TEXT,
    blob_id TEXT REFERENCES blobs(id),
    tool_name TEXT,
    file_path TEXT,
    exit_code INTEGER,
    content_hash TEXT NOT NULL,
    token_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_events_session_ts ON events(session_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type);
CREATE INDEX IF NOT EXISTS idx_events_hash ON events(session_id, content_hash);

CREATE TABLE IF NOT EXISTS memory_objects (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    object_type TEXT NOT NULL,
    scope_type TEXT NOT NULL DEFAULT 'global',
    scope_path TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    superseded_by TEXT REFERENCES memory_objects(id),
    confidence TEXT NOT NULL DEFAULT 'medium',
    confidence_tier TEXT NOT NULL DEFAULT 'hypothesis',
    evidence_event_ids TEXT NOT NULL DEFAULT '[]',
    evidence_excerpt TEXT,
    review_status TEXT NOT NULL DEFAULT 'pending',
    reviewed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed TEXT,
    code_refs TEXT NOT NULL DEFAULT '[]',
    last_verified_at TEXT,
    supersedes TEXT NOT NULL DEFAULT '[]',
    structured TEXT,
    strength REAL NOT NULL DEFAULT 1.0,
    last_reinforced_at TEXT,
    outcome_score REAL NOT NULL DEFAULT 0.5
);

CREATE INDEX IF NOT EXISTS idx_memory_status ON memory_objects(status);
CREATE INDEX IF NOT EXISTS idx_memory_type ON memory_objects(object_type);
CREATE INDEX IF NOT EXISTS idx_memory_review ON memory_objects(review_status);
CREATE INDEX IF NOT EXISTS idx_memory_tier ON memory_objects(confidence_tier);
CREATE INDEX IF NOT EXISTS idx_memory_created ON memory_objects(created_at);

CREATE TABLE IF NOT EXISTS memory_embeddings (
    memory_id TEXT PRIMARY KEY REFERENCES memory_objects(id) ON DELETE CASCADE,
    embedding BLOB NOT NULL,
    dimensions INTEGER NOT NULL DEFAULT 384,
    model TEXT NOT NULL DEFAULT 'local',
    created_at TEXT NOT NULL
);

UPDATE schema_version SET version = 1 WHERE version >= 1;
INSERT INTO schema_version (version) SELECT 1 WHERE NOT EXISTS (SELECT 1 FROM schema_version);
"#;

const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS outcomes (
    id TEXT PRIMARY KEY,
    memory_id TEXT NOT NULL REFERENCES memory_objects(id) ON DELETE CASCADE,
    session_id TEXT NOT NULL REFERENCES sessions(id),
    timestamp TEXT NOT NULL,
    outcome TEXT NOT NULL,
    context TEXT
);

CREATE INDEX IF NOT EXISTS idx_outcomes_memory ON outcomes(memory_id);

CREATE TABLE IF NOT EXISTS conflicts (
    id TEXT PRIMARY KEY,
    conflict_type TEXT NOT NULL,
    severity TEXT NOT NULL,
    new_candidate TEXT NOT NULL,
    existing_memories TEXT NOT NULL DEFAULT '[]',
    suggested_resolution TEXT NOT NULL,
    description TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    resolved_resolution TEXT,
    resolved_by TEXT,
    resolved_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_conflicts_status ON conflicts(status);

INSERT INTO schema_version (version) VALUES (2);
"#;

const MIGRATION_V3_UP: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS memory_fts USING fts5(
    id UNINDEXED,
    content,
    scope_path,
    tokenize = 'porter unicode61'
);

CREATE TRIGGER IF NOT EXISTS memory_fts_ai AFTER INSERT ON memory_objects BEGIN
    INSERT INTO memory_fts(id, content, scope_path) VALUES (new.id, new.content, coalesce(new.scope_path, ''));
END;

CREATE TRIGGER IF NOT EXISTS memory_fts_ad AFTER DELETE ON memory_objects BEGIN
    DELETE FROM memory_fts WHERE id = old.id;
END;

CREATE TRIGGER IF NOT EXISTS memory_fts_au AFTER UPDATE ON memory_objects BEGIN
    DELETE FROM memory_fts WHERE id = old.id;
    INSERT INTO memory_fts(id, content, scope_path) VALUES (new.id, new.content, coalesce(new.scope_path, ''));
END;

INSERT INTO schema_version (version) VALUES (3);
"#;

/// Current schema version recorded in the database (0 if unmigrated).
pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Highest version compiled into this binary.
pub fn max_known_version() -> u32 {
    MIGRATIONS.iter().map(|m| m.version).max().unwrap_or(0)
}

/// Apply every migration newer than the database's current version.
///
/// Fails with a table-missing error only if `schema_version` cannot even be
/// queried after V1 runs, which would indicate a corrupt database; the
/// "database has unknown future columns" check (`schema_incompatible`) is
/// performed by the caller via [`max_known_version`] before opening for use.
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    // schema_version doesn't exist until V1 runs, so special-case the first read.
    let current_version = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
            row.get(0)
        })
        .unwrap_or(0u32);

    let mut applied = 0;
    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                description = migration.description,
                "applying migration"
            );
            conn.execute_batch(migration.up)?;
            applied += 1;
        }
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn apply_migrations_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        let first = apply_migrations(&conn).unwrap();
        assert_eq!(first, MIGRATIONS.len() as u32);
        let second = apply_migrations(&conn).unwrap();
        assert_eq!(second, 0);
        assert_eq!(get_current_version(&conn).unwrap(), max_known_version());
    }

    #[test]
    fn migrations_create_expected_tables() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        for table in ["sessions", "events", "blobs", "memory_objects", "outcomes", "conflicts"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }
}
