//! Memory compression (C5): turns a raw message snippet into a handful of
//! (topic, summary) pairs via an LLM, the way a human skimming a
//! conversation would jot down "what this was about" rather than keep the
//! transcript.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::collaborators::{Llm, TimestampMode};
use crate::config::MemoryConfig;
use crate::error::Result;
use crate::graph::MemoryGraph;
use crate::text::{cosine_set, information_content, tokenize};

/// One topic extracted from a snippet, its generated summary, and whatever
/// existing nodes it strongly resembles (for the Builder to wire similarity
/// edges against).
#[derive(Debug, Clone)]
pub struct CompressedTopic {
    pub topic: String,
    pub summary: String,
    /// Up to 3 existing concepts with cosine similarity >= 0.7, most similar
    /// first.
    pub similar_existing: Vec<(String, f64)>,
}

/// Number of topics to extract from a snippet: the average of a
/// length-based estimate and an information-density-based estimate.
///
/// `topic_by_length` grows with the number of message lines, scaled by the
/// compression rate; `topic_by_information_content` nudges that estimate up
/// or down based on how information-dense the text is, clamped to [1, 5] so
/// a single very long but repetitive snippet doesn't explode into dozens of
/// topics. A trivial or low-entropy snippet can legitimately come out to 0 —
/// callers treat that as nothing worth extracting, not an error.
pub fn topic_num(readable: &str, compress_rate: f64) -> usize {
    let line_count = readable.lines().filter(|l| !l.trim().is_empty()).count();
    let by_length = line_count as f64 * compress_rate;
    let entropy = information_content(readable);
    let by_information = (((entropy - 3.0) * 2.0) as i64).clamp(1, 5);
    (((by_length + by_information as f64) / 2.0) as i64).max(0) as usize
}

fn is_banned(topic: &str, ban_words: &[String]) -> bool {
    ban_words.iter().any(|w| !w.is_empty() && topic.contains(w.as_str()))
}

static TOPIC_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<([^<>]+)>").unwrap());
static TOPIC_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,，、\s]+").unwrap());

/// Extracts a deduplicated topic list from an LLM response that wraps its
/// answer in `<...>`, splitting on common list separators (ASCII/Chinese
/// commas, the Chinese enumeration comma, or whitespace).
pub(crate) fn parse_topics(response: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut topics = Vec::new();
    for capture in TOPIC_TAG.captures_iter(response) {
        let inner = &capture[1];
        for piece in TOPIC_SEPARATORS.split(inner) {
            let piece = piece.trim();
            if !piece.is_empty() && seen.insert(piece.to_string()) {
                topics.push(piece.to_string());
            }
        }
    }
    topics
}

fn build_topic_prompt(readable: &str, num_topics: usize) -> String {
    format!(
        "Read the following conversation snippet and identify {num_topics} distinct topics \
         it discusses. Respond with exactly one line containing all topics wrapped in a single \
         pair of angle brackets, separated by commas, e.g. <topic one,topic two>.\n\n{readable}"
    )
}

fn build_summary_prompt(readable: &str, topic: &str) -> String {
    format!(
        "Read the following conversation snippet and write a single concise sentence \
         summarizing what it reveals about the topic \"{topic}\". Respond with only that \
         sentence.\n\n{readable}"
    )
}

fn similar_existing_topics(topic: &str, graph: &MemoryGraph) -> Vec<(String, f64)> {
    let topic_words = tokenize(topic);
    let mut scored: Vec<(String, f64)> = graph
        .node_names()
        .into_iter()
        .map(|concept| {
            let words = tokenize(&concept);
            let score = cosine_set(&topic_words, &words);
            (concept, score)
        })
        .filter(|(_, score)| *score >= 0.7)
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(3);
    scored
}

/// Compresses one rendered snippet into topic/summary pairs. Per-topic
/// summary generation is isolated: an LLM failure on one topic is logged and
/// that topic dropped, rather than failing the whole snippet (§7).
pub async fn compress_snippet(
    readable: &str,
    config: &MemoryConfig,
    llm: &dyn Llm,
    graph: &MemoryGraph,
) -> Result<Vec<CompressedTopic>> {
    let num_topics = topic_num(readable, config.memory_compress_rate);
    let topic_prompt = build_topic_prompt(readable, num_topics);
    let topic_response = llm.chat(&topic_prompt).await?;
    let topics: Vec<String> = parse_topics(&topic_response.content)
        .into_iter()
        .filter(|t| !is_banned(t, &config.memory_ban_words))
        .collect();

    let mut compressed = Vec::with_capacity(topics.len());
    for topic in topics {
        let summary_prompt = build_summary_prompt(readable, &topic);
        match llm.chat(&summary_prompt).await {
            Ok(response) => {
                let summary = response.content.trim().to_string();
                if summary.is_empty() {
                    continue;
                }
                let similar_existing = similar_existing_topics(&topic, graph);
                compressed.push(CompressedTopic {
                    topic,
                    summary,
                    similar_existing,
                });
            }
            Err(err) => {
                warn!(%topic, %err, "summary generation failed for topic, skipping");
            }
        }
    }
    Ok(compressed)
}

/// Annotation helper kept for callers that need to render a snippet before
/// calling [`compress_snippet`]; thin wrapper so call sites don't have to
/// remember the conventional formatting flags.
pub fn default_timestamp_mode() -> TimestampMode {
    TimestampMode::Relative
}
