//! Schema definition for the persistence adapter (C3).
//!
//! The schema is small and stable enough that a forward-only pair of
//! `CREATE TABLE IF NOT EXISTS` statements plus a `user_version` pragma is
//! proportionate; a full versioned migration ladder would be solving a
//! problem this crate doesn't have yet.

pub const SCHEMA_VERSION: i64 = 1;

pub const CREATE_NODES_TABLE: &str = "
CREATE TABLE IF NOT EXISTS graph_nodes (
    concept       TEXT PRIMARY KEY,
    memory_items  TEXT NOT NULL,
    created_time  REAL,
    last_modified REAL,
    hash          INTEGER NOT NULL
)";

pub const CREATE_EDGES_TABLE: &str = "
CREATE TABLE IF NOT EXISTS graph_edges (
    source        TEXT NOT NULL,
    target        TEXT NOT NULL,
    strength      INTEGER NOT NULL,
    created_time  REAL,
    last_modified REAL,
    hash          INTEGER NOT NULL,
    PRIMARY KEY (source, target)
)";

pub const CREATE_EDGES_SOURCE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_graph_edges_source ON graph_edges(source)";

pub const CREATE_EDGES_TARGET_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_graph_edges_target ON graph_edges(target)";

/// Applies the schema to a freshly opened connection. Idempotent.
pub fn apply(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        &[
            CREATE_NODES_TABLE,
            CREATE_EDGES_TABLE,
            CREATE_EDGES_SOURCE_INDEX,
            CREATE_EDGES_TARGET_INDEX,
        ]
        .join(";\n"),
    )?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}
