use anyhow::Result;
use clientbridge_core::MatcherConfig;
use clientbridge_store::SqliteCustomerStore;
use clientbridged::photos::PhotoStore;
use clientbridged::{AppState, Config, IdentityService};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    tracing::info!(
        bind = %config.bind_addr,
        db = %config.db_path.display(),
        threshold = config.similarity_threshold,
        dim = config.embedding_dim,
        "clientbridged starting"
    );

    let store = SqliteCustomerStore::open(&config.db_path).await?;
    let service = Arc::new(
        IdentityService::new(
            Arc::new(store),
            MatcherConfig {
                similarity_threshold: config.similarity_threshold,
                embedding_dim: config.embedding_dim,
            },
        )
        .with_photo_store(Arc::new(PhotoStore::new(config.photo_dir.clone()))),
    );

    let state = AppState {
        service,
        api_key: config.edge_api_key.clone(),
    };

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("clientbridged ready");

    axum::serve(listener, clientbridged::router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("clientbridged shutting down");
        })
        .await?;

    Ok(())
}
