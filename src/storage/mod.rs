//! Persistence adapter (C3): SQLite-backed storage for the memory graph.

mod migrations;
mod sqlite;

pub use sqlite::{Storage, SyncReport};
