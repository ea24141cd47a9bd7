//! SQLite DDL definitions for the hindsight database.
//!
//! All `CREATE TABLE` / `CREATE INDEX` / `CREATE TRIGGER` statements live
//! here so they are reviewable and testable in isolation.

use rusqlite::Connection;

pub(crate) const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Core DDL: graph tables, episodic log, FTS shadow, version stamp.
///
/// Uses `IF NOT EXISTS` throughout so `apply_schema` is idempotent.
const SCHEMA_SQL: &str = r#"
-- Enable WAL mode for concurrent reads during writes.
PRAGMA journal_mode = WAL;

PRAGMA foreign_keys = ON;

-- Schema version tracking.
CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Knowledge graph: typed nodes with JSON properties.
CREATE TABLE IF NOT EXISTS graph_nodes (
    id         TEXT PRIMARY KEY,
    node_type  TEXT NOT NULL,
    label      TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT '{}'   -- JSON object
);

CREATE INDEX IF NOT EXISTS idx_nodes_type ON graph_nodes(node_type);

-- Directed weighted edges; (source, target, relationship) is the identity,
-- so re-adding an edge overwrites its weight instead of duplicating it.
CREATE TABLE IF NOT EXISTS graph_edges (
    source       TEXT NOT NULL,
    target       TEXT NOT NULL,
    relationship TEXT NOT NULL,
    weight       REAL NOT NULL DEFAULT 1.0,
    PRIMARY KEY (source, target, relationship)
);

CREATE INDEX IF NOT EXISTS idx_edges_source ON graph_edges(source);
CREATE INDEX IF NOT EXISTS idx_edges_target ON graph_edges(target);

-- Episodic log: append-only action/outcome journal.
CREATE TABLE IF NOT EXISTS episodes (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    sprint_phase TEXT NOT NULL,
    timestamp    TEXT NOT NULL,              -- RFC 3339 UTC
    action       TEXT NOT NULL,
    outcome      TEXT NOT NULL,
    lesson       TEXT,
    tags         TEXT NOT NULL DEFAULT '[]'  -- JSON array of strings
);

CREATE INDEX IF NOT EXISTS idx_episodes_phase     ON episodes(sprint_phase);
CREATE INDEX IF NOT EXISTS idx_episodes_timestamp ON episodes(timestamp);

-- Lexical shadow of the episodic log. External-content FTS5 keyed by the
-- episode rowid; the triggers below keep it consistent with inserts and
-- deletes, so recall never needs a separate re-index step. Episodes are
-- never updated in place, so no UPDATE trigger is required.
CREATE VIRTUAL TABLE IF NOT EXISTS episodes_fts USING fts5(
    action, outcome, lesson,
    content='episodes', content_rowid='id'
);

CREATE TRIGGER IF NOT EXISTS episodes_fts_insert AFTER INSERT ON episodes BEGIN
    INSERT INTO episodes_fts(rowid, action, outcome, lesson)
    VALUES (new.id, new.action, new.outcome, coalesce(new.lesson, ''));
END;

CREATE TRIGGER IF NOT EXISTS episodes_fts_delete AFTER DELETE ON episodes BEGIN
    INSERT INTO episodes_fts(episodes_fts, rowid, action, outcome, lesson)
    VALUES ('delete', old.id, old.action, old.outcome, coalesce(old.lesson, ''));
END;
"#;

/// DDL for the vector tables (requires sqlite-vec loaded).
///
/// `vec0` virtual tables are addressed by integer rowid only, so string
/// entry ids go through `vec_entries`: `AUTOINCREMENT` hands out monotonic
/// handles that never get reused, and the embedding row lives at that
/// handle's rowid in `vec_knowledge`.
const VEC_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS vec_entries (
    handle   INTEGER PRIMARY KEY AUTOINCREMENT,
    entry_id TEXT NOT NULL UNIQUE
);

CREATE VIRTUAL TABLE IF NOT EXISTS vec_knowledge USING vec0(
    embedding FLOAT[768]
);
"#;

/// Apply the core schema to an open connection.
///
/// Safe to call multiple times. Seeds the schema version into `schema_meta`
/// if this is a fresh database.
pub(crate) fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    let version_str = CURRENT_SCHEMA_VERSION.to_string();
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        rusqlite::params![version_str],
    )?;

    Ok(())
}

/// Create the vector tables.
///
/// Must be called **after** the sqlite-vec extension has been registered on
/// the connection. Safe to call multiple times (`IF NOT EXISTS`).
pub(crate) fn apply_vec_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(VEC_SCHEMA_SQL)
}

/// Read the current schema version from the database.
///
/// Returns `None` if the `schema_meta` table is empty or the key is missing.
pub(crate) fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<u32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_meta WHERE key = 'schema_version'")?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().ok())
        }
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
