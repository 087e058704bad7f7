//! Configuration surface (§6). Parsing from env/file/CLI is the caller's job;
//! this crate only consumes the resulting struct.

use serde::{Deserialize, Serialize};

/// Parameters of the bimodal-Gaussian recall-window sampler (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BuildDistribution {
    /// Mean of the first component, in hours before now.
    pub mu1_hours: f64,
    /// Standard deviation of the first component, in hours.
    pub sigma1_hours: f64,
    /// Mixture weight of the first component.
    pub weight1: f64,
    /// Mean of the second component, in hours before now.
    pub mu2_hours: f64,
    /// Standard deviation of the second component, in hours.
    pub sigma2_hours: f64,
    /// Mixture weight of the second component.
    pub weight2: f64,
}

impl Default for BuildDistribution {
    fn default() -> Self {
        // Favors recent history lightly, with a long tail into older memory.
        Self {
            mu1_hours: 6.0,
            sigma1_hours: 3.0,
            weight1: 0.6,
            mu2_hours: 72.0,
            sigma2_hours: 24.0,
            weight2: 0.4,
        }
    }
}

/// Full configuration surface for the memory graph engine (§6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MemoryConfig {
    /// Seconds between build cycles.
    pub memory_build_interval: u64,
    /// `N`: timestamps sampled per build cycle.
    pub memory_build_sample_num: usize,
    /// `L`: max messages per snippet.
    pub memory_build_sample_length: usize,
    /// Bimodal-Gaussian timestamp distribution.
    pub memory_build_distribution: BuildDistribution,
    /// Compression rate `r` (topics per snippet length).
    pub memory_compress_rate: f64,
    /// Topic denylist: a topic containing any of these substrings is dropped.
    pub memory_ban_words: Vec<String>,
    /// Seconds between forget cycles.
    pub forget_memory_interval: u64,
    /// Sample fraction `p` used by the Forgetter.
    pub memory_forget_percentage: f64,
    /// Edge decay threshold, in hours since last modification.
    pub memory_forget_time: f64,
    /// Sample fraction used by the Consolidator.
    pub consolidate_memory_percentage: f64,
    /// Similarity threshold `τ` for merging near-duplicate items.
    pub consolidation_similarity_threshold: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            memory_build_interval: 1800,
            memory_build_sample_num: 20,
            memory_build_sample_length: 30,
            memory_build_distribution: BuildDistribution::default(),
            memory_compress_rate: 0.1,
            memory_ban_words: Vec::new(),
            forget_memory_interval: 3600,
            memory_forget_percentage: 0.005,
            memory_forget_time: 24.0,
            consolidate_memory_percentage: 0.05,
            consolidation_similarity_threshold: 0.8,
        }
    }
}
