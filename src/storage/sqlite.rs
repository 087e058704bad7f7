//! SQLite-backed persistence adapter (C3).
//!
//! `Storage` wraps a single [`rusqlite::Connection`] behind a [`Mutex`] so
//! the type is `Send + Sync` without requiring a connection pool; memory
//! graphs are small enough, and mutation frequency low enough (one build,
//! forget, or consolidate cycle at a time), that a single serialized
//! connection is not a bottleneck.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, params};
use tracing::warn;

use crate::error::Result;
use crate::graph::{MemoryGraph, edge_hash, node_hash};

use super::migrations;

/// Counts of rows changed by a sync operation, returned instead of
/// propagating per-row failures: a sync that persists 998 of 1000 changed
/// rows is a partial success, not a crate-level error (§7).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub nodes_inserted: usize,
    pub nodes_updated: usize,
    pub nodes_deleted: usize,
    pub edges_inserted: usize,
    pub edges_updated: usize,
    pub edges_deleted: usize,
}

impl SyncReport {
    fn merge(&mut self, other: SyncReport) {
        self.nodes_inserted += other.nodes_inserted;
        self.nodes_updated += other.nodes_updated;
        self.nodes_deleted += other.nodes_deleted;
        self.edges_inserted += other.edges_inserted;
        self.edges_updated += other.edges_updated;
        self.edges_deleted += other.edges_deleted;
    }
}

/// Batch size used by the incremental sync path; matches the "a few hundred
/// rows per transaction" scale this kind of change set runs at.
const SYNC_BATCH_SIZE: usize = 100;
/// Batch size used by the full resync path (bulk insert, no diffing).
const RESYNC_BATCH_SIZE: usize = 500;

/// The SQLite persistence adapter.
pub struct Storage {
    conn: Mutex<Connection>,
}

struct DbNodeRow {
    hash: i64,
}

struct DbEdgeRow {
    strength: i64,
    hash: i64,
}

impl Storage {
    /// Opens (creating if absent) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Opens a private in-memory database. Used by tests and by callers that
    /// want an ephemeral, non-persisted graph.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        Self::configure(&conn)?;
        migrations::apply(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn configure(conn: &Connection) -> rusqlite::Result<()> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(())
    }

    /// Loads the persisted graph into a fresh [`MemoryGraph`]. Backfills
    /// `created_time`/`last_modified` with the current time (and persists
    /// the backfill) for any row written before those columns existed;
    /// edges whose endpoint node is missing or unparsable are dropped.
    pub fn load_on_start(&self) -> Result<MemoryGraph> {
        let mut conn = self.conn.lock().expect("storage mutex poisoned");
        let mut graph = MemoryGraph::new();
        let now = crate::graph::now_secs();
        let mut backfill: Vec<(String, f64, f64)> = Vec::new();

        {
            let mut stmt = conn.prepare(
                "SELECT concept, memory_items, created_time, last_modified FROM graph_nodes",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                    row.get::<_, Option<f64>>(3)?,
                ))
            })?;
            for row in rows {
                let (concept, items_json, created, modified) = row?;
                let items: Vec<String> = match serde_json::from_str(&items_json) {
                    Ok(items) => items,
                    Err(err) => {
                        warn!(%concept, %err, "dropping node with unparsable memory_items");
                        continue;
                    }
                };
                if items.is_empty() {
                    continue;
                }
                let needs_backfill = created.is_none() || modified.is_none();
                let created = created.unwrap_or(now);
                let modified = modified.unwrap_or(now);
                if needs_backfill {
                    backfill.push((concept.clone(), created, modified));
                }
                graph.insert_node_raw(concept, items, created, modified);
            }
        }

        let mut edge_rows: Vec<(String, String, i64)> = Vec::new();
        {
            let mut stmt = conn.prepare("SELECT source, target, strength FROM graph_edges")?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?;
            for row in rows {
                edge_rows.push(row?);
            }
        }
        for (source, target, strength) in edge_rows {
            if !graph.has_node(&source) || !graph.has_node(&target) {
                warn!(%source, %target, "dropping edge with missing endpoint");
                continue;
            }
            graph.insert_edge_raw(&source, &target, strength, now, now);
        }

        if !backfill.is_empty() {
            let tx = conn.transaction()?;
            for (concept, created, modified) in &backfill {
                tx.execute(
                    "UPDATE graph_nodes SET created_time = ?1, last_modified = ?2 WHERE concept = ?3",
                    params![created, modified, concept],
                )?;
            }
            tx.commit()?;
        }

        Ok(graph)
    }

    fn existing_node_hashes(conn: &Connection) -> rusqlite::Result<HashMap<String, DbNodeRow>> {
        let mut stmt = conn.prepare("SELECT concept, hash FROM graph_nodes")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, DbNodeRow { hash: row.get(1)? }))
        })?;
        rows.collect()
    }

    fn existing_edge_hashes(conn: &Connection) -> rusqlite::Result<HashMap<(String, String), DbEdgeRow>> {
        let mut stmt = conn.prepare("SELECT source, target, strength, hash FROM graph_edges")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                (row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                DbEdgeRow {
                    strength: row.get(2)?,
                    hash: row.get(3)?,
                },
            ))
        })?;
        rows.collect()
    }

    /// Computes what changed in `graph` since the last sync and writes only
    /// that delta, in batches of [`SYNC_BATCH_SIZE`] rows per transaction.
    /// Change detection is by comparing the cheap 64-bit [`node_hash`] /
    /// [`edge_hash`] against what's stored, not by diffing full rows. A
    /// batch whose transaction fails is logged and skipped; the rest of the
    /// sync still runs (§5 best-effort).
    pub fn sync_incremental(&self, graph: &MemoryGraph) -> Result<SyncReport> {
        let mut conn = self.conn.lock().expect("storage mutex poisoned");
        let mut report = SyncReport::default();

        let mut db_nodes = Self::existing_node_hashes(&conn)?;
        let live_nodes = graph.snapshot_nodes();
        let mut live_concepts = std::collections::HashSet::with_capacity(live_nodes.len());

        let mut node_upserts = Vec::new();
        for node in &live_nodes {
            live_concepts.insert(node.concept.clone());
            let hash = node_hash(&node.concept, &node.memory_items);
            match db_nodes.remove(&node.concept) {
                Some(existing) if existing.hash == hash => {}
                Some(_) => {
                    node_upserts.push((node, hash, true));
                }
                None => {
                    node_upserts.push((node, hash, false));
                }
            }
        }
        let node_deletes: Vec<String> = db_nodes.into_keys().collect();

        for chunk in node_upserts.chunks(SYNC_BATCH_SIZE) {
            match Self::apply_node_upsert_batch(&mut conn, chunk) {
                Ok((inserted, updated)) => {
                    report.nodes_inserted += inserted;
                    report.nodes_updated += updated;
                }
                Err(err) => warn!(%err, "node upsert batch failed, skipping to next batch"),
            }
        }
        for chunk in node_deletes.chunks(SYNC_BATCH_SIZE) {
            match Self::apply_node_delete_batch(&mut conn, chunk) {
                Ok(deleted) => report.nodes_deleted += deleted,
                Err(err) => warn!(%err, "node delete batch failed, skipping to next batch"),
            }
        }

        let mut db_edges = Self::existing_edge_hashes(&conn)?;
        let live_edges = graph.snapshot_edges();
        let mut edge_upserts = Vec::new();
        for edge in &live_edges {
            let hash = edge_hash(&edge.source, &edge.target);
            let key = Self::edge_key(&edge.source, &edge.target);
            match db_edges.remove(&key) {
                Some(existing) if existing.hash == hash && existing.strength == edge.strength => {}
                Some(_) => edge_upserts.push((edge, hash, true)),
                None => edge_upserts.push((edge, hash, false)),
            }
        }
        let edge_deletes: Vec<(String, String)> = db_edges.into_keys().collect();

        for chunk in edge_upserts.chunks(SYNC_BATCH_SIZE) {
            match Self::apply_edge_upsert_batch(&mut conn, chunk) {
                Ok((inserted, updated)) => {
                    report.edges_inserted += inserted;
                    report.edges_updated += updated;
                }
                Err(err) => warn!(%err, "edge upsert batch failed, skipping to next batch"),
            }
        }
        for chunk in edge_deletes.chunks(SYNC_BATCH_SIZE) {
            match Self::apply_edge_delete_batch(&mut conn, chunk) {
                Ok(deleted) => report.edges_deleted += deleted,
                Err(err) => warn!(%err, "edge delete batch failed, skipping to next batch"),
            }
        }

        Ok(report)
    }

    /// Applies one batch of node inserts/updates in a single transaction.
    /// Returns `(inserted, updated)` counts on success; the whole batch is
    /// rolled back (transaction dropped without committing) on failure.
    fn apply_node_upsert_batch(
        conn: &mut Connection,
        chunk: &[(&crate::graph::NodeSnapshot, i64, bool)],
    ) -> Result<(usize, usize)> {
        let tx = conn.transaction()?;
        let mut inserted = 0;
        let mut updated = 0;
        for (node, hash, is_update) in chunk {
            let items_json = serde_json::to_string(&node.memory_items)?;
            tx.execute(
                "INSERT INTO graph_nodes (concept, memory_items, created_time, last_modified, hash)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(concept) DO UPDATE SET
                    memory_items = excluded.memory_items,
                    created_time = excluded.created_time,
                    last_modified = excluded.last_modified,
                    hash = excluded.hash",
                params![node.concept, items_json, node.created_time, node.last_modified, hash],
            )?;
            if *is_update {
                updated += 1;
            } else {
                inserted += 1;
            }
        }
        tx.commit()?;
        Ok((inserted, updated))
    }

    fn apply_node_delete_batch(conn: &mut Connection, chunk: &[String]) -> Result<usize> {
        let tx = conn.transaction()?;
        let mut deleted = 0;
        for concept in chunk {
            tx.execute("DELETE FROM graph_nodes WHERE concept = ?1", params![concept])?;
            tx.execute(
                "DELETE FROM graph_edges WHERE source = ?1 OR target = ?1",
                params![concept],
            )?;
            deleted += 1;
        }
        tx.commit()?;
        Ok(deleted)
    }

    fn apply_edge_upsert_batch(
        conn: &mut Connection,
        chunk: &[(&crate::graph::EdgeSnapshot, i64, bool)],
    ) -> Result<(usize, usize)> {
        let tx = conn.transaction()?;
        let mut inserted = 0;
        let mut updated = 0;
        for (edge, hash, is_update) in chunk {
            tx.execute(
                "INSERT INTO graph_edges (source, target, strength, created_time, last_modified, hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(source, target) DO UPDATE SET
                    strength = excluded.strength,
                    created_time = excluded.created_time,
                    last_modified = excluded.last_modified,
                    hash = excluded.hash",
                params![edge.source, edge.target, edge.strength, edge.created_time, edge.last_modified, hash],
            )?;
            if *is_update {
                updated += 1;
            } else {
                inserted += 1;
            }
        }
        tx.commit()?;
        Ok((inserted, updated))
    }

    fn apply_edge_delete_batch(conn: &mut Connection, chunk: &[(String, String)]) -> Result<usize> {
        let tx = conn.transaction()?;
        let mut deleted = 0;
        for (source, target) in chunk {
            tx.execute(
                "DELETE FROM graph_edges WHERE source = ?1 AND target = ?2",
                params![source, target],
            )?;
            deleted += 1;
        }
        tx.commit()?;
        Ok(deleted)
    }

    fn edge_key(source: &str, target: &str) -> (String, String) {
        if source <= target {
            (source.to_string(), target.to_string())
        } else {
            (target.to_string(), source.to_string())
        }
    }

    /// Truncates both tables and bulk-inserts the full contents of `graph`,
    /// in batches of [`RESYNC_BATCH_SIZE`]. Used after a forget or
    /// consolidate cycle, where the change set typically touches most of
    /// the graph and diffing row-by-row buys nothing over a clean rewrite.
    /// A batch whose transaction fails is logged and skipped rather than
    /// aborting the whole resync (§5 best-effort); the truncation itself is
    /// not a batch and still propagates, since inserting on top of a failed
    /// truncation would silently duplicate rows.
    pub fn resync_full(&self, graph: &MemoryGraph) -> Result<()> {
        let mut conn = self.conn.lock().expect("storage mutex poisoned");
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM graph_edges", [])?;
        tx.execute("DELETE FROM graph_nodes", [])?;
        tx.commit()?;
        drop(conn);

        let nodes = graph.snapshot_nodes();
        for chunk in nodes.chunks(RESYNC_BATCH_SIZE) {
            let mut conn = self.conn.lock().expect("storage mutex poisoned");
            if let Err(err) = Self::insert_node_batch(&mut conn, chunk) {
                warn!(%err, "resync node batch failed, skipping to next batch");
            }
        }

        let edges = graph.snapshot_edges();
        for chunk in edges.chunks(RESYNC_BATCH_SIZE) {
            let mut conn = self.conn.lock().expect("storage mutex poisoned");
            if let Err(err) = Self::insert_edge_batch(&mut conn, chunk) {
                warn!(%err, "resync edge batch failed, skipping to next batch");
            }
        }

        Ok(())
    }

    fn insert_node_batch(conn: &mut Connection, chunk: &[crate::graph::NodeSnapshot]) -> Result<()> {
        let tx = conn.transaction()?;
        for node in chunk {
            let items_json = serde_json::to_string(&node.memory_items)?;
            let hash = node_hash(&node.concept, &node.memory_items);
            tx.execute(
                "INSERT INTO graph_nodes (concept, memory_items, created_time, last_modified, hash)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![node.concept, items_json, node.created_time, node.last_modified, hash],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn insert_edge_batch(conn: &mut Connection, chunk: &[crate::graph::EdgeSnapshot]) -> Result<()> {
        let tx = conn.transaction()?;
        for edge in chunk {
            let hash = edge_hash(&edge.source, &edge.target);
            tx.execute(
                "INSERT INTO graph_edges (source, target, strength, created_time, last_modified, hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![edge.source, edge.target, edge.strength, edge.created_time, edge.last_modified, hash],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}
