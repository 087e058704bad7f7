//! Activation-spreading retrieval (C7): given a query, find the concepts in
//! the graph most associatively related to it and return their items, the
//! way spreading activation models recall in associative memory.

use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;
use rand::Rng;

use crate::collaborators::Llm;
use crate::compressor::parse_topics;
use crate::error::Result;
use crate::graph::MemoryGraph;
use crate::text::{cosine_set, tokenize};

/// Seed activation used by [`recall_from_text`]/[`recall_from_keywords`].
const RECALL_SEED: f64 = 1.0;
/// Seed activation used by [`activation`]. Larger than the recall seed so
/// the scalar score stays informative even along single-hop paths; kept
/// distinct from `RECALL_SEED` rather than unified, since the two consumers
/// read the result differently (ranked list vs. a single magnitude).
const ACTIVATION_SEED: f64 = 1.5;

fn tokenize_ordered(s: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut words = Vec::new();
    let mut current = String::new();
    let mut flush = |current: &mut String, words: &mut Vec<String>, seen: &mut HashSet<String>| {
        if !current.is_empty() {
            let word = std::mem::take(current);
            if seen.insert(word.clone()) {
                words.push(word);
            }
        }
    };
    for ch in s.chars() {
        if ch.is_alphanumeric() {
            current.push(ch.to_lowercase().next().unwrap_or(ch));
        } else {
            flush(&mut current, &mut words, &mut seen);
        }
    }
    flush(&mut current, &mut words, &mut seen);
    words
}

/// `(min, max)` topic count to ask the LLM for, bracketed by query length.
fn keyword_bracket(char_len: usize) -> (usize, usize) {
    match char_len {
        0..=10 => (1, 3),
        11..=20 => (2, 4),
        21..=30 => (3, 5),
        31..=50 => (4, 5),
        _ => (5, 5),
    }
}

fn build_keyword_prompt(query: &str, min: usize, max: usize) -> String {
    let count = if min == max {
        format!("{min}")
    } else {
        format!("{min}-{max}")
    };
    format!(
        "Extract {count} concise topics from the following text, formatted as \
         <topic1>,<topic2>,… or <none> if there are none.\n\n{query}"
    )
}

/// Extracts candidate keywords from `query_text`: a short query is tokenized
/// directly; a longer one goes through the LLM, the same way the Compressor
/// derives topics from a snippet. The length-bracketed `[min, max]` range is
/// rendered straight into the prompt and the model picks a count within it,
/// rather than this function pre-rolling one.
async fn extract_keywords(query_text: &str, llm: &dyn Llm, _rng: &mut impl Rng) -> Result<Vec<String>> {
    let char_len = query_text.chars().count();
    if char_len <= 5 {
        let words: Vec<String> = tokenize_ordered(query_text)
            .into_iter()
            .filter(|w| w.chars().count() > 1)
            .take(3)
            .collect();
        return Ok(words);
    }
    let (min, max) = keyword_bracket(char_len);
    let response = llm.chat(&build_keyword_prompt(query_text, min, max)).await?;
    Ok(parse_topics(&response.content))
}

fn spread_one(seed_keyword: &str, seed: f64, max_depth: usize, graph: &MemoryGraph) -> IndexMap<String, f64> {
    let mut activation = IndexMap::new();
    let mut visited = HashSet::new();
    visited.insert(seed_keyword.to_string());
    activation.insert(seed_keyword.to_string(), seed);

    let mut queue = VecDeque::new();
    queue.push_back((seed_keyword.to_string(), seed, 0usize));
    while let Some((node, a, depth)) = queue.pop_front() {
        if a <= 0.0 || depth >= max_depth {
            continue;
        }
        let mut neighbors = graph.neighbors(&node);
        neighbors.sort(); // deterministic expansion order (§8)
        for neighbor in neighbors {
            if visited.contains(&neighbor) {
                continue;
            }
            let strength = graph
                .edge_data(&node, &neighbor)
                .map(|e| e.strength)
                .unwrap_or(1)
                .max(1) as f64;
            let a_prime = a - 1.0 / strength;
            if a_prime > 0.0 {
                visited.insert(neighbor.clone());
                activation.insert(neighbor.clone(), a_prime);
                queue.push_back((neighbor, a_prime, depth + 1));
            }
        }
    }
    activation
}

/// Runs bounded BFS activation spreading from each valid keyword
/// independently and merges the per-keyword maps additively, preserving
/// first-seen order for stable downstream tie-breaks.
fn spread_all(valid_keywords: &[String], seed: f64, max_depth: usize, graph: &MemoryGraph) -> IndexMap<String, f64> {
    let mut global = IndexMap::new();
    for keyword in valid_keywords {
        for (node, a) in spread_one(keyword, seed, max_depth, graph) {
            *global.entry(node).or_insert(0.0) += a;
        }
    }
    global
}

fn valid_keywords(keywords: &[String], graph: &MemoryGraph) -> Vec<String> {
    keywords
        .iter()
        .filter(|k| graph.has_node(k))
        .cloned()
        .collect()
}

/// Selects the top `max_memories` nodes by normalized squared activation,
/// then the top `max_items_per_topic` items per node by similarity to
/// `ranking_query`, then drops later exact-string duplicates across the
/// whole result.
fn rank_and_select(
    activations: &IndexMap<String, f64>,
    ranking_query: &str,
    max_memories: usize,
    max_items_per_topic: usize,
    graph: &MemoryGraph,
) -> Vec<(String, String)> {
    let sum_sq: f64 = activations.values().map(|a| a * a).sum();
    if sum_sq == 0.0 {
        return Vec::new();
    }

    let mut nodes: Vec<(String, f64)> = activations
        .iter()
        .map(|(node, a)| (node.clone(), (a * a) / sum_sq))
        .collect();
    nodes.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    nodes.truncate(max_memories);

    let query_tokens = tokenize(ranking_query);
    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for (node, _) in nodes {
        let Some(items) = graph.node_items(&node) else {
            continue;
        };
        let mut ranked: Vec<(usize, f64)> = items
            .iter()
            .enumerate()
            .map(|(i, item)| (i, cosine_set(&tokenize(item), &query_tokens)))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(max_items_per_topic);
        for (idx, _) in ranked {
            let item = &items[idx];
            if seen.insert(item.clone()) {
                result.push((node.clone(), item.clone()));
            }
        }
    }
    result
}

/// Recalls memories relevant to `query_text`: extracts keywords, spreads
/// activation from whichever of them exist in the graph, and ranks items
/// from the most-activated nodes. Returns `[]` on an empty/unmatched query.
pub async fn recall_from_text(
    query_text: &str,
    max_memories: usize,
    max_items_per_topic: usize,
    max_depth: usize,
    graph: &MemoryGraph,
    llm: &dyn Llm,
    rng: &mut impl Rng,
) -> Result<Vec<(String, String)>> {
    if query_text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let keywords = extract_keywords(query_text, llm, rng).await?;
    Ok(recall_from_keywords(
        &keywords,
        query_text,
        max_memories,
        max_items_per_topic,
        max_depth,
        graph,
    ))
}

/// Like [`recall_from_text`], but starting from an already-known keyword
/// list rather than extracting one — the entry point used when the caller
/// already has topics in hand (e.g. re-querying after a build cycle).
pub fn recall_from_keywords(
    keywords: &[String],
    ranking_query: &str,
    max_memories: usize,
    max_items_per_topic: usize,
    max_depth: usize,
    graph: &MemoryGraph,
) -> Vec<(String, String)> {
    let valid = valid_keywords(keywords, graph);
    if valid.is_empty() {
        return Vec::new();
    }
    let activations = spread_all(&valid, RECALL_SEED, max_depth, graph);
    rank_and_select(&activations, ranking_query, max_memories, max_items_per_topic, graph)
}

/// Scalar activation score for `query_text`: `60 * sum(A) / |V|`, using the
/// higher activation seed. Zero if there are no valid keywords or the graph
/// is empty.
pub async fn activation(
    query_text: &str,
    max_depth: usize,
    graph: &MemoryGraph,
    llm: &dyn Llm,
    rng: &mut impl Rng,
) -> Result<f64> {
    if query_text.trim().is_empty() || graph.node_count() == 0 {
        return Ok(0.0);
    }
    let keywords = extract_keywords(query_text, llm, rng).await?;
    let valid = valid_keywords(&keywords, graph);
    if valid.is_empty() {
        return Ok(0.0);
    }
    let activations = spread_all(&valid, ACTIVATION_SEED, max_depth, graph);
    let total: f64 = activations.values().sum();
    Ok(60.0 * total / graph.node_count() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::LlmResponse;

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

    fn sample_graph() -> MemoryGraph {
        let mut g = MemoryGraph::new();
        g.add_item("a", "a item one");
        g.add_item("b", "b item one");
        g.add_item("c", "c item one");
        g.connect("a", "b");
        g.connect("a", "b"); // strength 2
        g.connect("b", "c"); // strength 1
        g
    }

    #[test]
    fn scenario_activations_match_spec_example() {
        let g = sample_graph();
        let activations = spread_all(&["a".to_string()], 1.0, 2, &g);
        assert_eq!(activations.get("a"), Some(&1.0));
        assert_eq!(activations.get("b"), Some(&0.5));
        assert_eq!(activations.get("c"), None);
    }

    #[test]
    fn recall_from_keywords_empty_when_no_valid_keywords() {
        let g = sample_graph();
        let result = recall_from_keywords(&["nonexistent".to_string()], "query", 3, 2, 2, &g);
        assert!(result.is_empty());
    }

    #[test]
    fn recall_from_keywords_returns_items_from_a_then_b() {
        let g = sample_graph();
        let result = recall_from_keywords(&["a".to_string()], "item", 3, 2, 2, &g);
        assert_eq!(result[0].0, "a");
        assert!(result.iter().any(|(node, _)| node == "b"));
    }

    #[test]
    fn max_depth_zero_disables_spreading() {
        let g = sample_graph();
        let activations = spread_all(&["a".to_string()], 1.0, 0, &g);
        assert_eq!(activations.len(), 1);
        assert_eq!(activations.get("a"), Some(&1.0));
    }

    #[test]
    fn strength_one_edges_exhaust_after_one_hop() {
        let mut g = MemoryGraph::new();
        g.add_item("x", "x1");
        g.add_item("y", "y1");
        g.connect("x", "y");
        let activations = spread_all(&["x".to_string()], 1.0, 5, &g);
        assert_eq!(activations.get("x"), Some(&1.0));
        // 1.0 - 1/1 = 0, which is not > 0, so y is never inserted.
        assert!(!activations.contains_key("y"));
    }

    #[tokio::test]
    async fn recall_from_text_empty_query_returns_empty() {
        use rand::SeedableRng;
        let g = sample_graph();
        let llm = StubLlm;
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let result = recall_from_text("", 3, 2, 2, &g, &llm, &mut rng).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn activation_is_zero_on_empty_graph() {
        use rand::SeedableRng;
        let g = MemoryGraph::new();
        let llm = StubLlm;
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let score = activation("anything", 2, &g, &llm, &mut rng).await.unwrap();
        assert_eq!(score, 0.0);
    }
}
