//! Associative memory graph engine for conversational agents.
//!
//! Models long-term memory as an undirected, weighted, labelled graph of
//! concepts, each holding one or more short textual memory items. Four
//! maintenance cycles operate on it:
//!
//! - **Build** ([`builder`]): samples recent conversation windows, compresses
//!   them into topics via a caller-supplied LLM, and writes new concepts and
//!   co-occurrence edges.
//! - **Forget** ([`forgetter`]): decays edge strength and prunes stale items
//!   on a random sample of the graph.
//! - **Consolidate** ([`consolidator`]): merges near-duplicate items within
//!   the same concept.
//! - **Retrieve** ([`retriever`]): activation-spreading recall from a query,
//!   plus a scalar activation score.
//!
//! The engine depends on the host application only through the
//! [`collaborators`] traits (`Llm`, `MessageStore`, `Formatter`) and a
//! [`config::MemoryConfig`] — nothing in this crate talks to a network or a
//! specific chat platform directly.
//!
//! ```no_run
//! use std::sync::Arc;
//! use mnemograph::prelude::*;
//! use rand::SeedableRng;
//!
//! # async fn run(llm: Arc<dyn Llm>, store: Arc<dyn MessageStore>, fmt: Arc<dyn Formatter>) -> mnemograph::Result<()> {
//! let engine = MemoryEngine::new(MemoryConfig::default());
//! let storage = Storage::open("memory.db")?;
//! engine.initialize(storage, llm, store, fmt).await?;
//!
//! let mut rng = rand::rngs::StdRng::from_os_rng();
//! let report = engine.build_once(&mut rng, &|| false).await?;
//! println!("build cycle: {report:?}");
//!
//! let memories = engine.recall("what does the user like?", 5, 3, 2, &mut rng).await;
//! # let _ = memories;
//! # Ok(())
//! # }
//! ```

mod builder;
mod collaborators;
mod compressor;
mod config;
mod consolidator;
mod engine;
mod error;
mod forgetter;
mod graph;
mod retriever;
mod scheduler;
mod storage;
mod text;

pub use collaborators::{Formatter, Llm, LlmResponse, Message, MessageStore, TimestampMode};
pub use config::{BuildDistribution, MemoryConfig};
pub use engine::{CycleReport, MemoryEngine};
pub use error::{MemoryError, Result};
pub use graph::{EdgeData, MemoryGraph};
pub use storage::{Storage, SyncReport};

/// Convenience re-export of the crate's most commonly used items.
pub mod prelude {
    pub use crate::collaborators::{Formatter, Llm, LlmResponse, Message, MessageStore, TimestampMode};
    pub use crate::config::{BuildDistribution, MemoryConfig};
    pub use crate::engine::{CycleReport, MemoryEngine};
    pub use crate::error::{MemoryError, Result};
    pub use crate::storage::Storage;
}
