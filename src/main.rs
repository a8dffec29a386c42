use std::sync::Arc;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use scholar_search::api::create_app;
use scholar_search::search::{SearchEngine, SearchIndex};
use scholar_search::store::PgPaperStore;
use scholar_search::{AppConfig, PaperRepository};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("Invalid configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to create pool")?;

    let engine = Arc::new(
        SearchEngine::from_config(&config.search).context("Failed to build search engine")?,
    );

    // The API stays up without the index; reads fall back to PostgreSQL
    match engine.ensure_index_exists().await {
        Ok(true) => info!(
            backend = config.search.backend.as_str(),
            index = %config.search.index_name,
            "Search index ready"
        ),
        Ok(false) => warn!(
            backend = config.search.backend.as_str(),
            "Search backend disabled or unreachable. Using PostgreSQL fallback."
        ),
        Err(e) => warn!(error = %e, "Failed to prepare search index. Using PostgreSQL fallback."),
    }

    let repository = Arc::new(
        PaperRepository::new(Arc::new(PgPaperStore::new(pool)), engine.clone())
            .with_batch_size(config.search.reindex_batch_size),
    );
    let app = create_app(repository);

    info!(addr = %config.bind_addr, "Listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .context("Failed to bind")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Err(e) = engine.shutdown().await {
        warn!(error = %e, "Search engine shutdown failed");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutting down");
}
