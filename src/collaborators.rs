//! Collaborator traits: the seams at which this crate hands work back to its
//! host application. The engine depends only on these traits, never on a
//! concrete LLM client, message database, or prompt-formatting convention —
//! callers implement them for whatever stack they already have.
//!
//! Mirrors the "framework provides the trait, the application provides the
//! implementation" split used for chat-model abstractions elsewhere in this
//! crate family: a small async trait per concern, no blanket provided methods
//! to second-guess.

use async_trait::async_trait;

use crate::error::Result;

/// A single stored conversation message, as the host application represents
/// it. Only the fields the memory engine actually reads are present.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender: String,
    pub text: String,
    /// Unix timestamp, fractional seconds.
    pub timestamp: f64,
    /// Number of prior build cycles that have already sampled this message.
    pub memorized_times: u32,
}

/// Controls how [`Formatter::build_readable`] renders message timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampMode {
    /// No timestamp annotation at all.
    None,
    /// A timestamp on every message.
    Absolute,
    /// A timestamp only when the gap since the previous message is large.
    Relative,
}

/// A response from the summarization/topic-extraction model.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    pub content: String,
    /// Separate chain-of-thought/reasoning channel, when the model exposes
    /// one; never parsed for topics or summaries.
    pub reasoning: Option<String>,
}

/// The language model used for topic extraction and memory compression (C5).
#[async_trait]
pub trait Llm: Send + Sync {
    /// Sends `prompt` and returns the model's reply. Errors propagate as
    /// `MemoryError` via the host's own error type through `?`/`From`; a
    /// failure aborts only the single topic/summary being produced, never
    /// the whole build cycle (§7).
    async fn chat(&self, prompt: &str) -> Result<LlmResponse>;
}

/// Read access to the host application's message history (C6).
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Returns up to `limit` messages with timestamp in `[start, end]`,
    /// ordered earliest-first, optionally restricted to one chat.
    async fn get_earliest(
        &self,
        start: f64,
        end: f64,
        limit: usize,
        chat_id: Option<&str>,
    ) -> Result<Vec<Message>>;

    /// Marks the given messages as sampled one more time (bumps
    /// `memorized_times`), so the build scheduler's retry logic can avoid
    /// resampling exhausted windows.
    async fn increment_memorized_times(&self, message_ids: &[String]) -> Result<()>;
}

/// Renders a message snippet into the flat text a topic-extraction or
/// summarization prompt embeds (C5/C6). Synchronous and pure: formatting
/// never itself does I/O or fails.
pub trait Formatter: Send + Sync {
    fn build_readable(
        &self,
        messages: &[Message],
        merge_consecutive: bool,
        timestamp_mode: TimestampMode,
        replace_bot_name: bool,
    ) -> String;
}
