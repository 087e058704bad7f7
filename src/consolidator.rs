//! Consolidation cycle (C9): merges near-duplicate items within the same
//! node, the way overlapping recollections of the same fact collapse into
//! one over time.

use rand::Rng;
use rand::seq::SliceRandom;

use crate::engine::CycleReport;
use crate::error::Result;
use crate::graph::MemoryGraph;
use crate::storage::Storage;
use crate::text::{cosine_set, information_content, tokenize};

fn sample_count(total: usize, percentage: f64) -> usize {
    if total == 0 {
        return 0;
    }
    ((total as f64 * percentage).ceil() as usize).min(total)
}

/// Runs one consolidation cycle against `graph`. For each sampled eligible
/// node (>= 2 items), merges at most one near-duplicate pair: the first
/// unordered pair whose set-cosine similarity meets `consolidation_similarity_threshold`,
/// keeping the item with higher [`information_content`] (ties favor the
/// first item encountered).
pub fn consolidate_once(
    graph: &mut MemoryGraph,
    sample_percentage: f64,
    similarity_threshold: f64,
    rng: &mut impl Rng,
    cancel: &dyn Fn() -> bool,
) -> CycleReport {
    let mut report = CycleReport::default();

    let mut eligible: Vec<String> = graph
        .node_names()
        .into_iter()
        .filter(|c| graph.node_items(c).map(|items| items.len() >= 2).unwrap_or(false))
        .collect();
    eligible.shuffle(rng);
    let sample = sample_count(eligible.len(), sample_percentage);

    for concept in eligible.into_iter().take(sample) {
        if cancel() {
            break;
        }
        let Some(items) = graph.node_items(&concept) else {
            report.skipped += 1;
            continue;
        };
        let items = items.to_vec();
        let mut merged = false;
        'pairs: for i in 0..items.len() {
            for j in (i + 1)..items.len() {
                let sim = cosine_set(&tokenize(&items[i]), &tokenize(&items[j]));
                if sim >= similarity_threshold {
                    let drop = if information_content(&items[i]) >= information_content(&items[j]) {
                        &items[j]
                    } else {
                        &items[i]
                    };
                    graph.remove_item(&concept, drop);
                    report.updated += 1;
                    merged = true;
                    break 'pairs;
                }
            }
        }
        if !merged {
            report.skipped += 1;
        }
    }

    report
}

/// Persists the result of [`consolidate_once`] if any merge occurred.
pub fn persist_if_changed(graph: &MemoryGraph, report: &CycleReport, storage: &Storage) -> Result<()> {
    if report.updated > 0 {
        storage.resync_full(graph)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn no_cancel() -> bool {
        false
    }

    #[test]
    fn merges_near_duplicate_keeping_higher_entropy() {
        let mut g = MemoryGraph::new();
        g.add_item("cats", "cats purr softly");
        g.add_item("cats", "cats purr softly.");
        let mut rng = StdRng::seed_from_u64(1);
        let report = consolidate_once(&mut g, 1.0, 0.8, &mut rng, &no_cancel);
        assert_eq!(report.updated, 1);
        let items = g.node_items("cats").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0], "cats purr softly.");
    }

    #[test]
    fn leaves_dissimilar_items_alone() {
        let mut g = MemoryGraph::new();
        g.add_item("cats", "cats purr softly");
        g.add_item("cats", "dogs bark loudly");
        let mut rng = StdRng::seed_from_u64(1);
        let report = consolidate_once(&mut g, 1.0, 0.8, &mut rng, &no_cancel);
        assert_eq!(report.updated, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(g.node_items("cats").unwrap().len(), 2);
    }

    #[test]
    fn single_item_nodes_are_not_eligible() {
        let mut g = MemoryGraph::new();
        g.add_item("cats", "cats purr softly");
        let mut rng = StdRng::seed_from_u64(1);
        let report = consolidate_once(&mut g, 1.0, 0.8, &mut rng, &no_cancel);
        assert_eq!(report.updated, 0);
        assert_eq!(report.skipped, 0);
    }

    #[test]
    fn at_most_one_merge_per_node_per_pass() {
        let mut g = MemoryGraph::new();
        g.add_item("cats", "cats purr softly");
        g.add_item("cats", "cats purr softly.");
        g.add_item("cats", "cats purr softly!!");
        let mut rng = StdRng::seed_from_u64(1);
        let report = consolidate_once(&mut g, 1.0, 0.8, &mut rng, &no_cancel);
        assert_eq!(report.updated, 1);
        assert_eq!(g.node_items("cats").unwrap().len(), 2);
    }
}
