//! clientbridged — HTTP ingress for edge visitor identification.
//!
//! Edge devices post 512-dimensional face embeddings; the daemon matches
//! them against the per-location customer table and records the outcome.

pub mod config;
pub mod http;
pub mod photos;
pub mod service;

pub use config::Config;
pub use http::{router, AppState};
pub use service::{IdentityService, VisitorMeta};
