//! End-to-end coverage of the concrete seed-suite scenarios, exercised
//! through the public `MemoryEngine`/`Storage`/`MemoryGraph` surface rather
//! than the per-module unit tests.

use std::sync::{Arc, Mutex};

use mnemograph::prelude::*;
use mnemograph::{EdgeData, MemoryGraph};
use rand::SeedableRng;
use rand::rngs::StdRng;

struct StubLlm {
    response: String,
}

#[async_trait::async_trait]
impl Llm for StubLlm {
    async fn chat(&self, _prompt: &str) -> mnemograph::Result<LlmResponse> {
        Ok(LlmResponse {
            content: self.response.clone(),
            reasoning: None,
        })
    }
}

/// Returns `<X,Y,Z>` for a topic-extraction prompt and a fixed sentence for
/// a summary prompt, distinguishing them the same way a real model would
/// see two structurally different instructions.
struct TopicThenSummaryLlm;

#[async_trait::async_trait]
impl Llm for TopicThenSummaryLlm {
    async fn chat(&self, prompt: &str) -> mnemograph::Result<LlmResponse> {
        let content = if prompt.contains("distinct topics") {
            "<X,Y,Z>".to_string()
        } else {
            "a concise summary sentence".to_string()
        };
        Ok(LlmResponse {
            content,
            reasoning: None,
        })
    }
}

struct FixedMessageStore {
    messages: Mutex<Vec<Message>>,
}

#[async_trait::async_trait]
impl MessageStore for FixedMessageStore {
    async fn get_earliest(
        &self,
        _start: f64,
        _end: f64,
        _limit: usize,
        _chat_id: Option<&str>,
    ) -> mnemograph::Result<Vec<Message>> {
        Ok(self.messages.lock().unwrap().clone())
    }

    async fn increment_memorized_times(&self, message_ids: &[String]) -> mnemograph::Result<()> {
        let mut messages = self.messages.lock().unwrap();
        for message in messages.iter_mut() {
            if message_ids.iter().any(|id| id == &message.id) {
                message.memorized_times += 1;
            }
        }
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

fn sample_messages() -> Vec<Message> {
    vec![
        Message {
            id: "m1".to_string(),
            chat_id: "c1".to_string(),
            sender: "alice".to_string(),
            text: "talking about X, Y and Z".to_string(),
            timestamp: 1_000.0,
            memorized_times: 0,
        },
        Message {
            id: "m2".to_string(),
            chat_id: "c1".to_string(),
            sender: "bob".to_string(),
            text: "more about X, Y and Z".to_string(),
            timestamp: 1_005.0,
            memorized_times: 0,
        },
    ]
}

fn empty_message_store() -> Arc<FixedMessageStore> {
    Arc::new(FixedMessageStore {
        messages: Mutex::new(Vec::new()),
    })
}

/// Scenario 1: graph `{A—B strength 2, B—C strength 1}`, a query that
/// resolves to keyword `A`, depth 2 ⇒ recall returns items of A then B, not C.
#[tokio::test]
async fn scenario_1_recall_finds_a_then_b_but_not_c() {
    let mut graph = MemoryGraph::new();
    graph.add_item("A", "fact about A");
    graph.add_item("B", "fact about B");
    graph.add_item("C", "fact about C");
    graph.connect("A", "B");
    graph.connect("A", "B"); // strength 2
    graph.connect("B", "C"); // strength 1

    let storage = Storage::open_in_memory().unwrap();
    storage.resync_full(&graph).unwrap();

    let engine = MemoryEngine::new(MemoryConfig::default());
    engine
        .initialize(
            storage,
            Arc::new(StubLlm {
                response: "<A>".to_string(),
            }),
            empty_message_store(),
            Arc::new(PlainFormatter),
        )
        .await
        .unwrap();

    let mut rng = StdRng::seed_from_u64(7);
    let result = engine
        .recall("please recall everything about A", 3, 2, 2, &mut rng)
        .await;

    assert_eq!(result[0].0, "A");
    assert!(result.iter().any(|(node, _)| node == "B"));
    assert!(!result.iter().any(|(node, _)| node == "C"));
}

/// Scenario 2: two insertions of the same `(dog, "likes bones")` item, then
/// `forget_random_item` removes one occurrence but the node survives.
#[test]
fn scenario_2_forget_random_item_leaves_one_occurrence() {
    let mut graph = MemoryGraph::new();
    graph.add_item("dog", "likes bones");
    graph.add_item("dog", "likes bones");
    assert_eq!(graph.node_items("dog").unwrap().len(), 2);

    let mut rng = StdRng::seed_from_u64(3);
    let removed = graph.forget_random_item("dog", &mut rng);

    assert_eq!(removed.as_deref(), Some("likes bones"));
    assert_eq!(graph.node_items("dog").unwrap(), &["likes bones".to_string()]);
    assert!(graph.has_node("dog"));
}

/// Scenario 3: consolidation with the default threshold (0.8) merges
/// `"cats purr softly"` and `"cats purr softly."`, keeping the higher-entropy
/// item.
#[tokio::test]
async fn scenario_3_consolidate_merges_near_duplicate_items() {
    let mut graph = MemoryGraph::new();
    graph.add_item("cats", "cats purr softly");
    graph.add_item("cats", "cats purr softly.");

    let storage = Storage::open_in_memory().unwrap();
    storage.resync_full(&graph).unwrap();

    let engine = MemoryEngine::new(MemoryConfig::default());
    engine
        .initialize(
            storage,
            Arc::new(StubLlm {
                response: "<none>".to_string(),
            }),
            empty_message_store(),
            Arc::new(PlainFormatter),
        )
        .await
        .unwrap();

    let mut rng = StdRng::seed_from_u64(5);
    let report = engine.consolidate_once(&mut rng, &|| false).await.unwrap();

    assert_eq!(report.updated, 1);
    assert_eq!(engine.node_count().await, 1);
    assert_eq!(engine.node_names().await, vec!["cats".to_string()]);
}

/// Scenario 4: a build cycle that yields topics `{X, Y, Z}` wires all three
/// pairwise edges at strength 1; repeating the same snippet raises each to 2.
#[tokio::test]
async fn scenario_4_build_cycle_creates_and_reinforces_pairwise_edges() {
    let db_file = tempfile::NamedTempFile::new().unwrap();
    let db_path = db_file.path().to_path_buf();

    let config = MemoryConfig {
        memory_build_sample_num: 1,
        ..MemoryConfig::default()
    };
    let engine = MemoryEngine::new(config);
    let store = Arc::new(FixedMessageStore {
        messages: Mutex::new(sample_messages()),
    });

    engine
        .initialize(
            Storage::open(&db_path).unwrap(),
            Arc::new(TopicThenSummaryLlm),
            store,
            Arc::new(PlainFormatter),
        )
        .await
        .unwrap();

    let mut rng = StdRng::seed_from_u64(11);
    let first = engine.build_once(&mut rng, &|| false).await.unwrap();
    assert_eq!(first.inserted, 3);
    let mut names = engine.node_names().await;
    names.sort();
    assert_eq!(names, vec!["X".to_string(), "Y".to_string(), "Z".to_string()]);

    let second = engine.build_once(&mut rng, &|| false).await.unwrap();
    assert_eq!(second.updated, 3);

    // Reopen independently to inspect edge strengths directly.
    let reloaded = Storage::open(&db_path).unwrap().load_on_start().unwrap();
    for (a, b) in [("X", "Y"), ("X", "Z"), ("Y", "Z")] {
        let edge: EdgeData = reloaded.edge_data(a, b).expect("pairwise edge must exist");
        assert_eq!(edge.strength, 2, "edge {a}-{b} should have been reinforced to strength 2");
    }
}

/// Scenario 5: `sync_incremental` after removing a node deletes its row and
/// every edge whose endpoint was that node.
#[test]
fn scenario_5_sync_incremental_deletes_removed_node_and_its_edges() {
    let storage = Storage::open_in_memory().unwrap();
    let mut graph = MemoryGraph::new();
    graph.add_item("A", "a1");
    graph.add_item("B", "b1");
    graph.connect("A", "B");
    storage.sync_incremental(&graph).unwrap();

    graph.remove_node("A");
    let report = storage.sync_incremental(&graph).unwrap();
    assert_eq!(report.nodes_deleted, 1);
    assert_eq!(report.edges_deleted, 1);

    let reloaded = storage.load_on_start().unwrap();
    assert!(!reloaded.has_node("A"));
    assert!(reloaded.has_node("B"));
    assert!(reloaded.edge_pairs().is_empty());
}

/// Boundary: an uninitialised engine degrades read-only operations to empty
/// results rather than erroring, while mutators fail fast.
#[tokio::test]
async fn uninitialised_engine_degrades_reads_and_fails_fast_on_writes() {
    let engine = MemoryEngine::new(MemoryConfig::default());
    let mut rng = StdRng::seed_from_u64(1);

    assert!(engine.recall("anything", 3, 2, 2, &mut rng).await.is_empty());
    assert_eq!(engine.activation("anything", 2, &mut rng).await, 0.0);
    assert!(engine.build_once(&mut rng, &|| false).await.is_err());
}
