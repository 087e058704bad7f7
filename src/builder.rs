//! Memory build cycle (C6): samples recent conversation windows, compresses
//! each into topics, and writes the result into the graph — the step that
//! actually grows the memory.

use rand::Rng;

use crate::collaborators::{Llm, Message, MessageStore, TimestampMode};
use crate::compressor::compress_snippet;
use crate::config::MemoryConfig;
use crate::engine::CycleReport;
use crate::error::Result;
use crate::graph::MemoryGraph;
use crate::scheduler::sample_timestamps_now;
use crate::storage::Storage;

/// Formats messages into the flat text a compression prompt embeds. Kept as
/// a trait here (rather than imported from `collaborators`) only because
/// this module needs just the one method; re-exported from there.
pub use crate::collaborators::Formatter;

const SAMPLE_RETRIES: u32 = 3;
const RETRY_BACKOFF_SECONDS: f64 = 120.0;
const MIN_WINDOW_SECONDS: u64 = 300;
const MAX_WINDOW_SECONDS: u64 = 1800;
/// A snippet is rejected if any of its messages has already been sampled
/// into this many prior build cycles.
const MAX_MEMORIZED_TIMES: u32 = 2;

/// Samples one window of messages around `target_timestamp`, retrying with
/// the target rolled back by [`RETRY_BACKOFF_SECONDS`] each time a window
/// comes up empty or every candidate message has already been sampled
/// `max_memorized_times` times. Returns `None` if all retries are exhausted.
async fn sample_snippet(
    target_timestamp: f64,
    chat_size: usize,
    max_memorized_times: u32,
    message_store: &dyn MessageStore,
    rng: &mut impl Rng,
) -> Result<Option<Vec<Message>>> {
    let mut target = target_timestamp;
    for _ in 0..SAMPLE_RETRIES {
        let window = rng.random_range(MIN_WINDOW_SECONDS..=MAX_WINDOW_SECONDS) as f64;
        let messages = message_store
            .get_earliest(target, target + window, chat_size, None)
            .await?;
        if messages.is_empty() {
            target -= RETRY_BACKOFF_SECONDS;
            continue;
        }
        if messages.iter().any(|m| m.memorized_times >= max_memorized_times) {
            target -= RETRY_BACKOFF_SECONDS;
            continue;
        }
        let ids: Vec<String> = messages.iter().map(|m| m.id.clone()).collect();
        message_store.increment_memorized_times(&ids).await?;
        return Ok(Some(messages));
    }
    Ok(None)
}

/// Runs one build cycle: samples `memory_build_sample_num` windows, turns
/// each into topics via the LLM, writes them into `graph`, and persists the
/// result. `cancel` is polled between snippets so a long cycle can be
/// interrupted without leaving the graph half-written.
#[allow(clippy::too_many_arguments)]
pub async fn build_once(
    graph: &mut MemoryGraph,
    config: &MemoryConfig,
    llm: &dyn Llm,
    formatter: &dyn Formatter,
    message_store: &dyn MessageStore,
    storage: &Storage,
    rng: &mut impl Rng,
    cancel: &dyn Fn() -> bool,
) -> Result<CycleReport> {
    let mut report = CycleReport::default();
    let timestamps = sample_timestamps_now(
        config.memory_build_sample_num,
        &config.memory_build_distribution,
        rng,
    );

    for timestamp in timestamps {
        if cancel() {
            break;
        }
        let snippet = sample_snippet(
            timestamp,
            config.memory_build_sample_length,
            MAX_MEMORIZED_TIMES,
            message_store,
            rng,
        )
        .await;

        let messages = match snippet {
            Ok(Some(messages)) => messages,
            Ok(None) => {
                report.skipped += 1;
                continue;
            }
            Err(err) => {
                tracing::warn!(%err, "message-store lookup failed for snippet, skipping");
                report.skipped += 1;
                continue;
            }
        };

        // replace_bot_name=false: real usernames survive into the
        // topic/summary prompts, there's no bot persona to anonymize here.
        let readable =
            formatter.build_readable(&messages, true, TimestampMode::Relative, false);
        // A failed topic-extraction call aborts only this snippet, not the
        // whole cycle (§7: transient external failures are per-unit).
        let compressed = match compress_snippet(&readable, config, llm, graph).await {
            Ok(compressed) => compressed,
            Err(err) => {
                tracing::warn!(%err, "topic extraction failed for snippet, skipping");
                report.skipped += 1;
                continue;
            }
        };
        if compressed.is_empty() {
            report.skipped += 1;
            continue;
        }

        let mut topics_this_snippet = Vec::with_capacity(compressed.len());
        for topic in compressed {
            let already_existed = graph.has_node(&topic.topic);
            graph.add_item(&topic.topic, topic.summary);
            if already_existed {
                report.updated += 1;
            } else {
                report.inserted += 1;
            }
            for (existing_concept, similarity) in &topic.similar_existing {
                let strength = (similarity * 10.0) as i64;
                if strength >= 1 {
                    graph.force_connect(&topic.topic, existing_concept, strength);
                }
            }
            topics_this_snippet.push(topic.topic);
        }
        for i in 0..topics_this_snippet.len() {
            for j in (i + 1)..topics_this_snippet.len() {
                graph.connect(&topics_this_snippet[i], &topics_this_snippet[j]);
            }
        }
    }

    storage.sync_incremental(graph)?;
    Ok(report)
}
