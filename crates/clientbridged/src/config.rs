use std::net::SocketAddr;
use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Directory where captured visitor photos are written.
    pub photo_dir: PathBuf,
    /// Shared static key edge devices present in `X-API-Key`.
    pub edge_api_key: String,
    /// Cosine similarity threshold for a returning-visitor match (strict >).
    pub similarity_threshold: f32,
    /// Required embedding dimensionality.
    pub embedding_dim: usize,
}

impl Config {
    /// Load configuration from `CLIENTBRIDGE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("CLIENTBRIDGE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/var/lib/clientbridge"));

        let db_path = std::env::var("CLIENTBRIDGE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("customers.db"));

        let photo_dir = std::env::var("CLIENTBRIDGE_PHOTO_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("photos"));

        Self {
            bind_addr: std::env::var("CLIENTBRIDGE_BIND_ADDR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080))),
            db_path,
            photo_dir,
            edge_api_key: std::env::var("CLIENTBRIDGE_EDGE_API_KEY")
                .unwrap_or_else(|_| "dev-edge-api-key".to_string()),
            similarity_threshold: env_f32("CLIENTBRIDGE_SIMILARITY_THRESHOLD", 0.45),
            embedding_dim: env_usize("CLIENTBRIDGE_EMBEDDING_DIM", 512),
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
