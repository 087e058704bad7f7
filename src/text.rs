//! Text utilities (C1): tokenization, set-based cosine similarity, and
//! character-entropy ("information content"). All three are pure and total.

use std::collections::HashSet;

/// Splits `s` into a deduplicated set of lowercase word tokens.
///
/// Segmentation is whitespace/punctuation based rather than a full language
/// segmenter (§4.1 explicitly allows this as long as results are
/// deterministic). Any run of alphanumeric characters (Unicode-aware, so CJK
/// text falls back to per-character tokens since it has no ASCII word
/// boundaries) is one token.
pub fn tokenize(s: &str) -> HashSet<String> {
    let mut words = HashSet::new();
    let mut current = String::new();
    for ch in s.chars() {
        if ch.is_alphanumeric() {
            current.push(ch.to_lowercase().next().unwrap_or(ch));
        } else if !current.is_empty() {
            words.insert(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        words.insert(current);
    }
    words
}

/// Cosine similarity between two word sets, computed over indicator vectors
/// on `a ∪ b`. Returns 0 if either set is empty.
pub fn cosine_set(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let norm_a = (a.len() as f64).sqrt();
    let norm_b = (b.len() as f64).sqrt();
    intersection / (norm_a * norm_b)
}

/// Shannon entropy (base 2) over character frequencies. 0 for empty input.
pub fn information_content(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }
    let mut counts = std::collections::HashMap::new();
    let mut total = 0usize;
    for ch in s.chars() {
        *counts.entry(ch).or_insert(0usize) += 1;
        total += 1;
    }
    let total = total as f64;
    -counts
        .values()
        .map(|&count| {
            let p = count as f64 / total;
            p * p.log2()
        })
        .sum::<f64>()
}
