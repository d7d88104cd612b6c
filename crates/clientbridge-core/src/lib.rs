//! clientbridge-core — Identity matching over face embeddings.
//!
//! Edge devices extract 512-dimensional ArcFace-style embeddings; this crate
//! decides whether a submitted embedding belongs to an already-known customer
//! at a location (nearest neighbor by cosine similarity, fixed acceptance
//! threshold) or represents a new visitor.

pub mod matcher;
pub mod types;

pub use matcher::{IdentityMatcher, MatcherConfig, MatcherError};
pub use types::{CustomerId, CustomerRecord, Embedding, Flag, LocationId, MatchDecision};
