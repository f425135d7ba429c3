//! Fuzzy string matching used by book search.
//!
//! The Postgres store delegates scoring to `pg_trgm`'s `similarity()`; the
//! in-memory store uses [`trigram_similarity`], which follows the same
//! algorithm: lower-case the input, split it into alphanumeric words, pad
//! each word with two leading blanks and one trailing blank, and compare the
//! resulting trigram sets with the Jaccard index.

use serde::Deserialize;
use std::collections::BTreeSet;

use crate::config::SearchConfig;

/// Which similarity function is ORed into the search predicate
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityBackend {
    /// Trigram similarity (`pg_trgm` in Postgres)
    Trigram,
    /// Substring matching only
    Disabled,
}

impl SimilarityBackend {
    /// Score two strings in `[0, 1]`, or `None` when fuzzy matching is off
    pub fn score(&self, a: &str, b: &str) -> Option<f32> {
        match self {
            SimilarityBackend::Trigram => Some(trigram_similarity(a, b)),
            SimilarityBackend::Disabled => None,
        }
    }
}

/// Match policy shared by every store's search implementation
#[derive(Debug, Clone, Copy)]
pub struct SearchPolicy {
    backend: SimilarityBackend,
    threshold: f32,
}

impl SearchPolicy {
    pub fn new(backend: SimilarityBackend, threshold: f32) -> Self {
        Self { backend, threshold }
    }

    /// Threshold to compare against when fuzzy matching is enabled
    pub fn fuzzy_threshold(&self) -> Option<f32> {
        match self.backend {
            SimilarityBackend::Trigram => Some(self.threshold),
            SimilarityBackend::Disabled => None,
        }
    }

    /// Whether `candidate` matches the already trimmed and lower-cased `needle`
    pub fn matches(&self, candidate: &str, needle: &str) -> bool {
        if candidate.to_lowercase().contains(needle) {
            return true;
        }
        self.backend
            .score(candidate, needle)
            .is_some_and(|score| score > self.threshold)
    }
}

impl Default for SearchPolicy {
    fn default() -> Self {
        Self::new(SimilarityBackend::Trigram, 0.3)
    }
}

impl From<&SearchConfig> for SearchPolicy {
    fn from(config: &SearchConfig) -> Self {
        Self::new(config.similarity, config.threshold)
    }
}

fn trigrams(input: &str) -> BTreeSet<String> {
    let lowered = input.to_lowercase();
    let mut set = BTreeSet::new();
    for word in lowered.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        let padded: Vec<char> = format!("  {} ", word).chars().collect();
        for window in padded.windows(3) {
            set.insert(window.iter().collect());
        }
    }
    set
}

/// Trigram similarity of two strings, in `[0, 1]`
pub fn trigram_similarity(a: &str, b: &str) -> f32 {
    let left = trigrams(a);
    let right = trigrams(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let shared = left.intersection(&right).count();
    let union = left.len() + right.len() - shared;
    shared as f32 / union as f32
}
