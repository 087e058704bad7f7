//! Memory Graph (C2): an undirected, weighted, labelled multigraph whose
//! nodes are concepts carrying one or more textual memory items and whose
//! edges carry an integer co-occurrence `strength`. Pure data structure;
//! enforces the invariants of §3 after every mutator.
//!
//! Represented as two adjacency maps (concept -> node, unordered pair ->
//! edge) rather than a generic graph-algorithms crate: the operations needed
//! here (neighbor iteration, single-edge lookup, node/edge counts) don't
//! justify the extra dependency weight, and each [`NodeRecord`] keeps its own
//! neighbor set for O(1) `neighbors` iteration.

use std::collections::{HashMap, HashSet};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in fractional seconds since the epoch.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Normalises an unordered pair of concepts so `(a, b)` and `(b, a)` hash
/// identically, making invariant 2 ("at most one edge between any pair")
/// structural rather than enforced by a separate check.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct UnorderedPair(String, String);

impl UnorderedPair {
    fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self(a.to_string(), b.to_string())
        } else {
            Self(b.to_string(), a.to_string())
        }
    }
}

#[derive(Debug, Clone)]
struct NodeRecord {
    memory_items: Vec<String>,
    created_time: f64,
    last_modified: f64,
    neighbors: HashSet<String>,
}

/// Snapshot of an edge's weight and timestamps, returned by value since the
/// underlying storage is keyed by a normalised pair the caller never sees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeData {
    pub strength: i64,
    pub created_time: f64,
    pub last_modified: f64,
}

#[derive(Debug, Clone)]
struct EdgeRecord {
    strength: i64,
    created_time: f64,
    last_modified: f64,
}

/// A concept node as exposed to callers that need the full record (the
/// persistence adapter, mainly).
#[derive(Debug, Clone)]
pub struct NodeSnapshot {
    pub concept: String,
    pub memory_items: Vec<String>,
    pub created_time: f64,
    pub last_modified: f64,
}

/// An association edge as exposed to callers that need the full record.
#[derive(Debug, Clone)]
pub struct EdgeSnapshot {
    pub source: String,
    pub target: String,
    pub strength: i64,
    pub created_time: f64,
    pub last_modified: f64,
}

/// The in-memory associative memory graph (C2).
#[derive(Debug, Default)]
pub struct MemoryGraph {
    nodes: HashMap<String, NodeRecord>,
    edges: HashMap<UnorderedPair, EdgeRecord>,
}

impl MemoryGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `summary` to `concept`'s memory items, creating the node if
    /// absent. No-ops (rather than erroring) on an empty concept or empty
    /// summary — both are data-shape problems per §7, silently dropped.
    pub fn add_item(&mut self, concept: &str, summary: impl Into<String>) {
        let summary = summary.into();
        if concept.is_empty() || summary.is_empty() {
            return;
        }
        let now = now_secs();
        match self.nodes.get_mut(concept) {
            Some(node) => {
                node.memory_items.push(summary);
                node.last_modified = now;
            }
            None => {
                self.nodes.insert(
                    concept.to_string(),
                    NodeRecord {
                        memory_items: vec![summary],
                        created_time: now,
                        last_modified: now,
                        neighbors: HashSet::new(),
                    },
                );
            }
        }
    }

    /// Reinforces (or creates, at strength 1) the edge between two distinct,
    /// existing concepts. No-op if `c1 == c2` or either concept is absent —
    /// inventing a node from a bare edge would violate invariant 3.
    pub fn connect(&mut self, c1: &str, c2: &str) {
        if c1 == c2 || !self.nodes.contains_key(c1) || !self.nodes.contains_key(c2) {
            return;
        }
        let now = now_secs();
        let key = UnorderedPair::new(c1, c2);
        match self.edges.get_mut(&key) {
            Some(edge) => {
                edge.strength += 1;
                edge.last_modified = now;
            }
            None => {
                self.edges.insert(
                    key,
                    EdgeRecord {
                        strength: 1,
                        created_time: now,
                        last_modified: now,
                    },
                );
                self.link_neighbors(c1, c2);
            }
        }
    }

    /// Like [`connect`](Self::connect), but sets `strength` explicitly rather
    /// than incrementing — used for similarity-weighted links. `strength`
    /// must be >= 1 (invariant 5); callers that computed a sub-1 strength
    /// should skip the call entirely rather than clamp.
    pub fn force_connect(&mut self, c1: &str, c2: &str, strength: i64) {
        if c1 == c2 || strength < 1 || !self.nodes.contains_key(c1) || !self.nodes.contains_key(c2)
        {
            return;
        }
        let now = now_secs();
        let key = UnorderedPair::new(c1, c2);
        let is_new = !self.edges.contains_key(&key);
        self.edges.insert(
            key,
            EdgeRecord {
                strength,
                created_time: now,
                last_modified: now,
            },
        );
        if is_new {
            self.link_neighbors(c1, c2);
        }
    }

    fn link_neighbors(&mut self, c1: &str, c2: &str) {
        if let Some(node) = self.nodes.get_mut(c1) {
            node.neighbors.insert(c2.to_string());
        }
        if let Some(node) = self.nodes.get_mut(c2) {
            node.neighbors.insert(c1.to_string());
        }
    }

    fn unlink_neighbors(&mut self, c1: &str, c2: &str) {
        if let Some(node) = self.nodes.get_mut(c1) {
            node.neighbors.remove(c2);
        }
        if let Some(node) = self.nodes.get_mut(c2) {
            node.neighbors.remove(c1);
        }
    }

    /// Removes the edge between `c1` and `c2`, if present.
    pub fn remove_edge(&mut self, c1: &str, c2: &str) {
        let key = UnorderedPair::new(c1, c2);
        if self.edges.remove(&key).is_some() {
            self.unlink_neighbors(c1, c2);
        }
    }

    /// Sets the edge's strength directly and touches `last_modified`,
    /// removing it if the new strength is <= 0 (invariant 5). Used by the
    /// Forgetter's decay step.
    pub fn set_edge_strength(&mut self, c1: &str, c2: &str, strength: i64) {
        if strength <= 0 {
            self.remove_edge(c1, c2);
            return;
        }
        let key = UnorderedPair::new(c1, c2);
        if let Some(edge) = self.edges.get_mut(&key) {
            edge.strength = strength;
            edge.last_modified = now_secs();
        }
    }

    /// Removes `concept` and every edge incident to it.
    pub fn remove_node(&mut self, concept: &str) {
        let Some(node) = self.nodes.remove(concept) else {
            return;
        };
        for neighbor in node.neighbors {
            self.edges.remove(&UnorderedPair::new(concept, &neighbor));
            if let Some(n) = self.nodes.get_mut(&neighbor) {
                n.neighbors.remove(concept);
            }
        }
    }

    /// Removes one uniformly-random memory item from `concept`, deleting the
    /// node (and its incident edges) if that empties it. Returns the removed
    /// item, or `None` if the concept doesn't exist.
    pub fn forget_random_item(&mut self, concept: &str, rng: &mut impl rand::Rng) -> Option<String> {
        let idx = {
            let node = self.nodes.get(concept)?;
            if node.memory_items.is_empty() {
                return None;
            }
            rng.random_range(0..node.memory_items.len())
        };
        let node = self.nodes.get_mut(concept).expect("checked above");
        let removed = node.memory_items.remove(idx);
        if node.memory_items.is_empty() {
            self.remove_node(concept);
        } else {
            node.last_modified = now_secs();
        }
        Some(removed)
    }

    /// Removes a specific item by exact string match (used by the
    /// Consolidator), deleting the node if it becomes empty.
    pub fn remove_item(&mut self, concept: &str, item: &str) -> bool {
        let Some(node) = self.nodes.get_mut(concept) else {
            return false;
        };
        let Some(pos) = node.memory_items.iter().position(|i| i == item) else {
            return false;
        };
        node.memory_items.remove(pos);
        if node.memory_items.is_empty() {
            self.remove_node(concept);
        } else {
            node.last_modified = now_secs();
        }
        true
    }

    /// Updates `last_modified` to now without otherwise changing the node.
    pub fn touch_node(&mut self, concept: &str) {
        if let Some(node) = self.nodes.get_mut(concept) {
            node.last_modified = now_secs();
        }
    }

    pub fn has_node(&self, concept: &str) -> bool {
        self.nodes.contains_key(concept)
    }

    pub fn node_items(&self, concept: &str) -> Option<&[String]> {
        self.nodes.get(concept).map(|n| n.memory_items.as_slice())
    }

    pub fn node_timestamps(&self, concept: &str) -> Option<(f64, f64)> {
        self.nodes
            .get(concept)
            .map(|n| (n.created_time, n.last_modified))
    }

    pub fn neighbors(&self, concept: &str) -> Vec<String> {
        self.nodes
            .get(concept)
            .map(|n| n.neighbors.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn edge_data(&self, c1: &str, c2: &str) -> Option<EdgeData> {
        self.edges.get(&UnorderedPair::new(c1, c2)).map(|e| EdgeData {
            strength: e.strength,
            created_time: e.created_time,
            last_modified: e.last_modified,
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// All concept names currently in the graph, in arbitrary (hash) order.
    pub fn node_names(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    /// All unordered edge endpoint pairs currently in the graph.
    pub fn edge_pairs(&self) -> Vec<(String, String)> {
        self.edges.keys().map(|p| (p.0.clone(), p.1.clone())).collect()
    }

    /// Snapshot every node for persistence / maintenance passes. Taking a
    /// snapshot up front means callers can delete nodes while iterating
    /// without invalidating an in-progress borrow (§5: "iteration ... must
    /// not be invalidated by in-place deletions").
    pub fn snapshot_nodes(&self) -> Vec<NodeSnapshot> {
        self.nodes
            .iter()
            .map(|(concept, node)| NodeSnapshot {
                concept: concept.clone(),
                memory_items: node.memory_items.clone(),
                created_time: node.created_time,
                last_modified: node.last_modified,
            })
            .collect()
    }

    /// Snapshot every edge for persistence / maintenance passes.
    pub fn snapshot_edges(&self) -> Vec<EdgeSnapshot> {
        self.edges
            .iter()
            .map(|(pair, edge)| EdgeSnapshot {
                source: pair.0.clone(),
                target: pair.1.clone(),
                strength: edge.strength,
                created_time: edge.created_time,
                last_modified: edge.last_modified,
            })
            .collect()
    }

    /// Inserts a node exactly as given, bypassing the normal `add_item`
    /// append semantics. Used by the persistence adapter's `load_on_start`
    /// and by tests that need to seed an exact timestamp.
    pub fn insert_node_raw(
        &mut self,
        concept: impl Into<String>,
        memory_items: Vec<String>,
        created_time: f64,
        last_modified: f64,
    ) {
        if memory_items.is_empty() {
            return;
        }
        self.nodes.insert(
            concept.into(),
            NodeRecord {
                memory_items,
                created_time,
                last_modified,
                neighbors: HashSet::new(),
            },
        );
    }

    /// Inserts an edge exactly as given, bypassing reinforcement semantics.
    /// No-ops if either endpoint is missing (invariant 4). Used by
    /// `load_on_start`.
    pub fn insert_edge_raw(
        &mut self,
        c1: &str,
        c2: &str,
        strength: i64,
        created_time: f64,
        last_modified: f64,
    ) {
        if c1 == c2 || strength < 1 || !self.nodes.contains_key(c1) || !self.nodes.contains_key(c2)
        {
            return;
        }
        let key = UnorderedPair::new(c1, c2);
        let is_new = !self.edges.contains_key(&key);
        self.edges.insert(
            key,
            EdgeRecord {
                strength,
                created_time,
                last_modified,
            },
        );
        if is_new {
            self.link_neighbors(c1, c2);
        }
    }

    /// Removes every node and edge.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
    }
}

/// Stable 64-bit hash of a concept's name together with the order-independent,
/// duplicate-collapsed set of its items. Used only for persistence
/// change-detection; the exact function is not observable externally.
pub fn node_hash(concept: &str, memory_items: &[String]) -> i64 {
    let unique: std::collections::BTreeSet<&str> =
        memory_items.iter().map(|s| s.as_str()).collect();
    let mut hasher = DefaultHasher::new();
    concept.hash(&mut hasher);
    for item in unique {
        item.hash(&mut hasher);
    }
    hasher.finish() as i64
}

/// Stable 64-bit hash of an edge's unordered endpoint pair.
pub fn edge_hash(c1: &str, c2: &str) -> i64 {
    let mut hasher = DefaultHasher::new();
    let pair = UnorderedPair::new(c1, c2);
    pair.0.hash(&mut hasher);
    pair.1.hash(&mut hasher);
    hasher.finish() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn add_item_creates_node() {
        let mut g = MemoryGraph::new();
        g.add_item("dog", "likes bones");
        assert!(g.has_node("dog"));
        assert_eq!(g.node_items("dog").unwrap(), &["likes bones".to_string()]);
    }

    #[test]
    fn add_item_appends_on_existing_node() {
        let mut g = MemoryGraph::new();
        g.add_item("dog", "likes bones");
        g.add_item("dog", "likes bones");
        assert_eq!(g.node_items("dog").unwrap().len(), 2);
    }

    #[test]
    fn add_item_empty_concept_is_noop() {
        let mut g = MemoryGraph::new();
        g.add_item("", "summary");
        assert_eq!(g.node_count(), 0);
    }

    #[test]
    fn connect_increases_strength_by_exactly_two() {
        let mut g = MemoryGraph::new();
        g.add_item("a", "x");
        g.add_item("b", "y");
        g.connect("a", "b");
        g.connect("a", "b");
        assert_eq!(g.edge_data("a", "b").unwrap().strength, 2);
    }

    #[test]
    fn connect_is_undirected() {
        let mut g = MemoryGraph::new();
        g.add_item("a", "x");
        g.add_item("b", "y");
        g.connect("a", "b");
        assert_eq!(g.edge_data("a", "b"), g.edge_data("b", "a"));
    }

    #[test]
    fn connect_no_self_edge() {
        let mut g = MemoryGraph::new();
        g.add_item("a", "x");
        g.connect("a", "a");
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn connect_requires_both_nodes_to_exist() {
        let mut g = MemoryGraph::new();
        g.add_item("a", "x");
        g.connect("a", "ghost");
        assert_eq!(g.edge_count(), 0);
        assert!(!g.has_node("ghost"));
    }

    #[test]
    fn force_connect_sets_strength_and_skips_sub_one() {
        let mut g = MemoryGraph::new();
        g.add_item("a", "x");
        g.add_item("b", "y");
        g.force_connect("a", "b", 0);
        assert_eq!(g.edge_count(), 0);
        g.force_connect("a", "b", 7);
        assert_eq!(g.edge_data("a", "b").unwrap().strength, 7);
    }

    #[test]
    fn forget_random_item_empties_node_then_removes_it() {
        let mut g = MemoryGraph::new();
        g.add_item("dog", "likes bones");
        let mut rng = StdRng::seed_from_u64(1);
        let removed = g.forget_random_item("dog", &mut rng);
        assert_eq!(removed, Some("likes bones".to_string()));
        assert!(!g.has_node("dog"));
    }

    #[test]
    fn forget_random_item_on_missing_node_is_none() {
        let mut g = MemoryGraph::new();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(g.forget_random_item("nope", &mut rng), None);
    }

    #[test]
    fn remove_node_drops_incident_edges() {
        let mut g = MemoryGraph::new();
        g.add_item("a", "x");
        g.add_item("b", "y");
        g.add_item("c", "z");
        g.connect("a", "b");
        g.connect("b", "c");
        g.remove_node("b");
        assert_eq!(g.edge_count(), 0);
        assert!(g.neighbors("a").is_empty());
        assert!(g.neighbors("c").is_empty());
    }

    #[test]
    fn set_edge_strength_removes_at_zero() {
        let mut g = MemoryGraph::new();
        g.add_item("a", "x");
        g.add_item("b", "y");
        g.connect("a", "b");
        g.set_edge_strength("a", "b", 0);
        assert!(g.edge_data("a", "b").is_none());
    }

    #[test]
    fn node_hash_ignores_item_order_and_duplicates() {
        let h1 = node_hash("c", &["a".to_string(), "b".to_string()]);
        let h2 = node_hash("c", &["b".to_string(), "a".to_string(), "a".to_string()]);
        assert_eq!(h1, h2);
    }

    #[test]
    fn edge_hash_is_order_independent() {
        assert_eq!(edge_hash("a", "b"), edge_hash("b", "a"));
    }
}
