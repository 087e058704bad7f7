//! Forgetting cycle (C8): decays edge strength and prunes stale items, the
//! way unused associations weaken and unused memories fade rather than
//! persisting forever.

use rand::Rng;
use rand::seq::SliceRandom;

use crate::config::MemoryConfig;
use crate::engine::CycleReport;
use crate::error::Result;
use crate::graph::{MemoryGraph, now_secs};
use crate::storage::Storage;

const NODE_ITEM_FORGET_HOURS: f64 = 24.0;

fn sample_count(total: usize, percentage: f64) -> usize {
    if total == 0 {
        return 0;
    }
    ((total as f64 * percentage).ceil() as usize).min(total)
}

/// Runs one forgetting cycle against `graph`, using `rng` for the
/// without-replacement sampling of candidate nodes and edges, and persists
/// the result via [`Storage::resync_full`] if anything changed. `cancel` is
/// polled between sampled entities so a long cycle can be interrupted.
pub fn forget_once(
    graph: &mut MemoryGraph,
    config: &MemoryConfig,
    rng: &mut impl Rng,
    cancel: &dyn Fn() -> bool,
) -> CycleReport {
    let mut report = CycleReport::default();
    let now = now_secs();
    let forget_seconds = config.memory_forget_time * 3600.0;

    let mut edge_pairs = graph.edge_pairs();
    edge_pairs.shuffle(rng);
    let edge_sample = sample_count(edge_pairs.len(), config.memory_forget_percentage);

    for (source, target) in edge_pairs.into_iter().take(edge_sample) {
        if cancel() {
            return report;
        }
        let Some(edge) = graph.edge_data(&source, &target) else {
            report.skipped += 1;
            continue;
        };
        if now - edge.last_modified <= forget_seconds {
            report.skipped += 1;
            continue;
        }
        let new_strength = edge.strength - 1;
        if new_strength <= 0 {
            graph.remove_edge(&source, &target);
            report.deleted += 1;
        } else {
            graph.set_edge_strength(&source, &target, new_strength);
            report.updated += 1;
        }
    }

    let mut nodes = graph.node_names();
    nodes.shuffle(rng);
    let node_sample = sample_count(nodes.len(), config.memory_forget_percentage);

    for concept in nodes.into_iter().take(node_sample) {
        if cancel() {
            return report;
        }
        let Some(items) = graph.node_items(&concept) else {
            report.skipped += 1;
            continue;
        };
        if items.is_empty() {
            graph.remove_node(&concept);
            report.deleted += 1;
            continue;
        }
        let Some((_, last_modified)) = graph.node_timestamps(&concept) else {
            report.skipped += 1;
            continue;
        };
        if now - last_modified <= NODE_ITEM_FORGET_HOURS * 3600.0 {
            report.skipped += 1;
            continue;
        }
        if graph.forget_random_item(&concept, rng).is_some() {
            report.deleted += 1;
        }
    }

    report
}

/// Persists the result of [`forget_once`] if it reported any change.
/// Separate from `forget_once` itself so the mutator stays synchronous and
/// testable without a storage fixture.
pub fn persist_if_changed(graph: &MemoryGraph, report: &CycleReport, storage: &Storage) -> Result<()> {
    if report.updated > 0 || report.deleted > 0 {
        storage.resync_full(graph)?;
    }
    Ok(())
}
