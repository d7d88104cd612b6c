use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default embedding dimensionality (ArcFace-style models such as buffalo_s).
pub const DEFAULT_EMBEDDING_DIM: usize = 512;

/// Default cosine similarity acceptance threshold.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.45;

/// Opaque customer identifier (UUID v4, assigned at enrollment).
pub type CustomerId = String;

/// Identifies a physical store. The scope boundary for matching:
/// embeddings are never compared across locations.
pub type LocationId = i64;

/// Face embedding vector. Serialized on the wire as a bare JSON array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Cosine similarity between two embeddings: dot product divided by the
    /// product of the Euclidean norms, in [-1, 1].
    ///
    /// Returns `f32::NEG_INFINITY` when either vector has a zero (or
    /// effectively zero) norm, or when the lengths differ — such a pair has
    /// no defined similarity and must never win a nearest-neighbor search.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::NEG_INFINITY;
        }

        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            f32::NEG_INFINITY
        }
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self { values }
    }
}

/// Staff-assigned attention flag. Never set by the matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flag {
    Red,
    Yellow,
    Green,
    None,
}

impl Flag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Flag::Red => "red",
            Flag::Yellow => "yellow",
            Flag::Green => "green",
            Flag::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Flag> {
        match s {
            "red" => Some(Flag::Red),
            "yellow" => Some(Flag::Yellow),
            "green" => Some(Flag::Green),
            "none" => Some(Flag::None),
            _ => None,
        }
    }
}

impl Default for Flag {
    fn default() -> Self {
        Flag::None
    }
}

/// One known customer at one location.
///
/// The embedding is immutable after enrollment: repeated visits update
/// `visit_count` and `last_seen` only, never the stored vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub id: CustomerId,
    pub location_id: LocationId,
    /// Edge-device-local identifier; unique only within `(location_id, face_id)`.
    pub face_id: Option<String>,
    pub embedding: Embedding,
    pub visit_count: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub flag: Flag,
    pub name: Option<String>,
    pub photo_url: Option<String>,
}

/// Outcome of matching a submitted embedding against a location's customers.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchDecision {
    /// Best candidate scored strictly above the threshold.
    Returning {
        customer_id: CustomerId,
        similarity: f32,
    },
    /// No candidate scored above the threshold (including the empty set).
    New,
}
