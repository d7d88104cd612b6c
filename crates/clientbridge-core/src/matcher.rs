//! Nearest-neighbor identity matching with a fixed acceptance threshold.
//!
//! A linear scan over the location's candidates is deliberate: per-store
//! customer counts are modest, and a full scan keeps the similarity metric
//! and threshold semantics exact. An ANN index would only be worth it at
//! catalog sizes this system does not target.

use crate::types::{CustomerRecord, Embedding, MatchDecision};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatcherError {
    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Matching parameters, injected rather than hard-coded so boundary
/// behavior can be probed precisely in tests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// A candidate must score strictly above this to count as returning.
    pub similarity_threshold: f32,
    /// Required length of every submitted embedding.
    pub embedding_dim: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: crate::types::DEFAULT_SIMILARITY_THRESHOLD,
            embedding_dim: crate::types::DEFAULT_EMBEDDING_DIM,
        }
    }
}

/// Pure query over a snapshot of a location's customers. Performs no writes;
/// the caller owns the subsequent visit-increment or enrollment.
pub struct IdentityMatcher {
    config: MatcherConfig,
}

impl IdentityMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Find the best-scoring candidate for `probe` and apply the threshold.
    ///
    /// The best score is tracked with strict greater-than, so equal scores
    /// keep the first-seen candidate; candidate order comes from the store
    /// and is arbitrary. Zero-norm or wrong-length stored vectors score
    /// `NEG_INFINITY` and can never be selected.
    pub fn best_match(
        &self,
        probe: &Embedding,
        candidates: &[CustomerRecord],
    ) -> Result<MatchDecision, MatcherError> {
        if probe.dim() != self.config.embedding_dim {
            return Err(MatcherError::DimensionMismatch {
                expected: self.config.embedding_dim,
                actual: probe.dim(),
            });
        }

        let mut best_sim = f32::NEG_INFINITY;
        let mut best: Option<&CustomerRecord> = None;

        for candidate in candidates {
            let sim = probe.similarity(&candidate.embedding);
            if sim > best_sim {
                best_sim = sim;
                best = Some(candidate);
            }
        }

        match best {
            Some(record) if best_sim > self.config.similarity_threshold => {
                tracing::debug!(
                    customer = %record.id,
                    similarity = best_sim,
                    threshold = self.config.similarity_threshold,
                    "returning visitor"
                );
                Ok(MatchDecision::Returning {
                    customer_id: record.id.clone(),
                    similarity: best_sim,
                })
            }
            _ => {
                tracing::debug!(
                    candidates = candidates.len(),
                    best_similarity = best_sim,
                    "no candidate above threshold"
                );
                Ok(MatchDecision::New)
            }
        }
    }
}
