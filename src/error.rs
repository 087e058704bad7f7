//! Error types for the memory graph engine.

/// Errors produced by the memory graph engine.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Persistence adapter hit a SQLite error.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// `memory_items` failed to (de)serialise as a JSON array of strings.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying filesystem operation failed (e.g. opening the database file).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A node was rejected because its concept key was empty or its item list
    /// was empty; the node is dropped rather than persisted.
    #[error("invalid concept: {0}")]
    InvalidConcept(String),

    /// An edge referenced an endpoint that does not exist as a node; the edge
    /// is dropped rather than persisted.
    #[error("edge endpoint missing: {source} -> {target}")]
    MissingEdgeEndpoint { source: String, target: String },

    /// A public operation was invoked before the engine finished `initialize`.
    #[error("memory engine not initialized")]
    NotInitialized,
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MemoryError>;
