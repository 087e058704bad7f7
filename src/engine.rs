//! Top-level engine: owns the graph and its collaborators behind a single
//! exclusive lock, and exposes the public build/forget/consolidate/recall
//! operations. Mirrors a process-wide manager initialised once through an
//! explicit call, with every public operation validating that
//! initialisation happened and failing fast (for mutators) or degrading
//! gracefully (for read-only retrieval) otherwise.

use std::sync::Arc;

use rand::Rng;
use tokio::sync::RwLock;
use tracing::warn;

use crate::collaborators::{Formatter, Llm, MessageStore};
use crate::config::MemoryConfig;
use crate::error::{MemoryError, Result};
use crate::graph::MemoryGraph;
use crate::storage::Storage;
use crate::{builder, consolidator, forgetter, retriever};

/// Outcome of one build, forget, or consolidate cycle: counts rather than a
/// per-unit error, since mutators absorb recoverable failures internally
/// and still need to report what happened (§7).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
}

struct Inner {
    graph: MemoryGraph,
    storage: Storage,
    llm: Arc<dyn Llm>,
    message_store: Arc<dyn MessageStore>,
    formatter: Arc<dyn Formatter>,
}

/// The memory graph engine. Construct with [`MemoryEngine::new`], then call
/// [`MemoryEngine::initialize`] once before any other operation.
pub struct MemoryEngine {
    config: MemoryConfig,
    inner: RwLock<Option<Inner>>,
}

impl MemoryEngine {
    /// Creates an uninitialised engine. No I/O happens until
    /// [`initialize`](Self::initialize) is called.
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Loads the graph from `storage` and wires the collaborators. Must be
    /// called exactly once before any other method; calling it again
    /// reloads the graph and replaces the collaborators.
    pub async fn initialize(
        &self,
        storage: Storage,
        llm: Arc<dyn Llm>,
        message_store: Arc<dyn MessageStore>,
        formatter: Arc<dyn Formatter>,
    ) -> Result<()> {
        let graph = storage.load_on_start()?;
        let mut guard = self.inner.write().await;
        *guard = Some(Inner {
            graph,
            storage,
            llm,
            message_store,
            formatter,
        });
        Ok(())
    }

    pub async fn is_initialized(&self) -> bool {
        self.inner.read().await.is_some()
    }

    /// Runs one build cycle (C6). Fails fast with [`MemoryError::NotInitialized`]
    /// if `initialize` hasn't run.
    pub async fn build_once(
        &self,
        rng: &mut impl Rng,
        cancel: &dyn Fn() -> bool,
    ) -> Result<CycleReport> {
        let mut guard = self.inner.write().await;
        let inner = guard.as_mut().ok_or(MemoryError::NotInitialized)?;
        builder::build_once(
            &mut inner.graph,
            &self.config,
            inner.llm.as_ref(),
            inner.formatter.as_ref(),
            inner.message_store.as_ref(),
            &inner.storage,
            rng,
            cancel,
        )
        .await
    }

    /// Runs one forgetting cycle (C8). Fails fast if uninitialised.
    pub async fn forget_once(
        &self,
        rng: &mut impl Rng,
        cancel: &dyn Fn() -> bool,
    ) -> Result<CycleReport> {
        let mut guard = self.inner.write().await;
        let inner = guard.as_mut().ok_or(MemoryError::NotInitialized)?;
        let report = forgetter::forget_once(&mut inner.graph, &self.config, rng, cancel);
        forgetter::persist_if_changed(&inner.graph, &report, &inner.storage)?;
        Ok(report)
    }

    /// Runs one consolidation cycle (C9). Fails fast if uninitialised.
    pub async fn consolidate_once(
        &self,
        rng: &mut impl Rng,
        cancel: &dyn Fn() -> bool,
    ) -> Result<CycleReport> {
        let mut guard = self.inner.write().await;
        let inner = guard.as_mut().ok_or(MemoryError::NotInitialized)?;
        let report = consolidator::consolidate_once(
            &mut inner.graph,
            self.config.consolidate_memory_percentage,
            self.config.consolidation_similarity_threshold,
            rng,
            cancel,
        );
        consolidator::persist_if_changed(&inner.graph, &report, &inner.storage)?;
        Ok(report)
    }

    /// Recalls memories for `query_text` (C7). Never fails outwardly: an
    /// uninitialised engine or any internal error yields an empty result,
    /// matching the read-only-retrieval failure policy (§7).
    pub async fn recall(
        &self,
        query_text: &str,
        max_memories: usize,
        max_items_per_topic: usize,
        max_depth: usize,
        rng: &mut impl Rng,
    ) -> Vec<(String, String)> {
        let guard = self.inner.read().await;
        let Some(inner) = guard.as_ref() else {
            return Vec::new();
        };
        match retriever::recall_from_text(
            query_text,
            max_memories,
            max_items_per_topic,
            max_depth,
            &inner.graph,
            inner.llm.as_ref(),
            rng,
        )
        .await
        {
            Ok(result) => result,
            Err(err) => {
                warn!(%err, "recall failed, returning empty result");
                Vec::new()
            }
        }
    }

    /// Scalar activation score for `query_text` (C7). Same failure policy
    /// as [`recall`](Self::recall): degrades to 0.0 rather than erroring.
    pub async fn activation(&self, query_text: &str, max_depth: usize, rng: &mut impl Rng) -> f64 {
        let guard = self.inner.read().await;
        let Some(inner) = guard.as_ref() else {
            return 0.0;
        };
        match retriever::activation(query_text, max_depth, &inner.graph, inner.llm.as_ref(), rng).await {
            Ok(score) => score,
            Err(err) => {
                warn!(%err, "activation failed, returning zero");
                0.0
            }
        }
    }

    /// Number of concepts currently in the graph, or 0 if uninitialised.
    pub async fn node_count(&self) -> usize {
        self.inner
            .read()
            .await
            .as_ref()
            .map(|inner| inner.graph.node_count())
            .unwrap_or(0)
    }

    /// Names of every concept currently in the graph.
    pub async fn node_names(&self) -> Vec<String> {
        self.inner
            .read()
            .await
            .as_ref()
            .map(|inner| inner.graph.node_names())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{LlmResponse, Message, TimestampMode};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    struct StubLlm;

    #[async_trait::async_trait]
    impl Llm for StubLlm {
        async fn chat(&self, _prompt: &str) -> Result<LlmResponse> {
            Ok(LlmResponse {
                content: "<none>".to_string(),
                reasoning: None,
            })
        }
    }

    struct EmptyMessageStore;

    #[async_trait::async_trait]
    impl MessageStore for EmptyMessageStore {
        async fn get_earliest(
            &self,
            _start: f64,
            _end: f64,
            _limit: usize,
            _chat_id: Option<&str>,
        ) -> Result<Vec<Message>> {
            Ok(Vec::new())
        }

        async fn increment_memorized_times(&self, _message_ids: &[String]) -> Result<()> {
            Ok(())
        }
    }

    struct PlainFormatter;

    impl Formatter for PlainFormatter {
        fn build_readable(
            &self,
            messages: &[Message],
            _merge_consecutive: bool,
            _timestamp_mode: TimestampMode,
            _replace_bot_name: bool,
        ) -> String {
            messages.iter().map(|m| m.text.clone()).collect::<Vec<_>>().join("\n")
        }
    }

    #[tokio::test]
    async fn mutators_fail_fast_before_initialize() {
        let engine = MemoryEngine::new(MemoryConfig::default());
        let mut rng = StdRng::seed_from_u64(1);
        let result = engine.build_once(&mut rng, &|| false).await;
        assert!(matches!(result, Err(MemoryError::NotInitialized)));
    }

    #[tokio::test]
    async fn retrieval_degrades_gracefully_before_initialize() {
        let engine = MemoryEngine::new(MemoryConfig::default());
        let mut rng = StdRng::seed_from_u64(1);
        assert!(engine.recall("hello", 3, 2, 2, &mut rng).await.is_empty());
        assert_eq!(engine.activation("hello", 2, &mut rng).await, 0.0);
    }

    #[tokio::test]
    async fn initialize_then_forget_empty_graph_is_a_noop() {
        let engine = MemoryEngine::new(MemoryConfig::default());
        let storage = Storage::open_in_memory().unwrap();
        engine
            .initialize(storage, Arc::new(StubLlm), Arc::new(EmptyMessageStore), Arc::new(PlainFormatter))
            .await
            .unwrap();
        assert!(engine.is_initialized().await);
        let mut rng = StdRng::seed_from_u64(1);
        let report = engine.forget_once(&mut rng, &|| false).await.unwrap();
        assert_eq!(report.updated, 0);
        assert_eq!(report.deleted, 0);
    }
}
