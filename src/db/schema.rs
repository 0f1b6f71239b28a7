//! SQL DDL for all glimpse tables.
//!
//! Defines the `captures`, `tasks`, `activity_links`, `captures_vec` (vec0),
//! `captures_vec_meta`, and `schema_meta` tables. All DDL uses
//! `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

/// All schema DDL statements for glimpse's core tables.
const SCHEMA_SQL: &str = r#"
-- Captured frames; image bytes live on disk, only the path is stored
CREATE TABLE IF NOT EXISTS captures (
    id TEXT PRIMARY KEY,
    path TEXT NOT NULL,
    created_at TEXT NOT NULL,
    image_hash TEXT,
    hash_prefix TEXT,
    file_size INTEGER NOT NULL DEFAULT 0,
    description TEXT,
    tags TEXT,
    analyzed INTEGER NOT NULL DEFAULT 0,
    embedded INTEGER NOT NULL DEFAULT 0,
    embedding_model TEXT,
    task_id TEXT
);

CREATE INDEX IF NOT EXISTS idx_captures_created ON captures(created_at);
CREATE INDEX IF NOT EXISTS idx_captures_hash ON captures(image_hash);
CREATE INDEX IF NOT EXISTS idx_captures_hash_prefix ON captures(hash_prefix);
CREATE INDEX IF NOT EXISTS idx_captures_embedded ON captures(embedded);

-- Tasks are owned by external task management; read-mostly here
CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT,
    status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active','done','archived')),
    embedding BLOB,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);

-- Capture→task associations produced by the activity matcher
CREATE TABLE IF NOT EXISTS activity_links (
    id TEXT PRIMARY KEY,
    capture_id TEXT NOT NULL REFERENCES captures(id) ON DELETE CASCADE,
    task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    confidence REAL NOT NULL CHECK(confidence >= 0.0 AND confidence <= 1.0),
    method TEXT NOT NULL CHECK(method IN ('semantic','manual','keyword')),
    duration_minutes INTEGER NOT NULL,
    activity_type TEXT NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_links_capture ON activity_links(capture_id);
CREATE INDEX IF NOT EXISTS idx_links_task ON activity_links(task_id);

-- Denormalized metadata for vector index entries (vec0 holds only the vector)
CREATE TABLE IF NOT EXISTS captures_vec_meta (
    id TEXT PRIMARY KEY,
    description TEXT NOT NULL DEFAULT '',
    tags TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// vec0 virtual table must be created separately (sqlite-vec syntax).
const VEC_TABLE_SQL: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS captures_vec USING vec0(
    id TEXT PRIMARY KEY,
    embedding FLOAT[384]
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute_batch(VEC_TABLE_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        // Verify all tables exist
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"captures".to_string()));
        assert!(tables.contains(&"tasks".to_string()));
        assert!(tables.contains(&"activity_links".to_string()));
        assert!(tables.contains(&"captures_vec_meta".to_string()));
        assert!(tables.contains(&"schema_meta".to_string()));

        // Verify the vec extension is live
        let version: String = conn
            .query_row("SELECT vec_version()", [], |r| r.get(0))
            .unwrap();
        assert!(!version.is_empty());
    }

    #[test]
    fn schema_is_idempotent() {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap(); // second call should not error
    }
}
