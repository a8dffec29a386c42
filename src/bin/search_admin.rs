//! Search Index Administration
//!
//! Creates, drops, rebuilds and inspects the paper search index.
//!
//! Usage:
//!     search_admin ensure
//!     search_admin reindex --batch-size 500
//!     search_admin status

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use scholar_search::search::{SearchEngine, SearchIndex};
use scholar_search::store::PgPaperStore;
use scholar_search::{AppConfig, PaperRepository, SearchConfig};

/// CLI arguments
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Manage the paper search index",
    long_about = "Creates, drops, rebuilds and inspects the paper search index.\n\
                  The backend is chosen by SEARCH_BACKEND (meilisearch or tantivy)."
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the index if missing and (re)apply its settings
    Ensure,
    /// Drop the index
    Delete,
    /// Drop, recreate and repopulate the index from PostgreSQL
    Reindex {
        /// Papers fetched per batch
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Print the index status as JSON
    Status,
}

fn engine(config: &SearchConfig) -> Result<Arc<SearchEngine>> {
    let engine = SearchEngine::from_config(config).context("Failed to build search engine")?;
    Ok(Arc::new(engine))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let args = Args::parse();

    // Setup logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Ensure => {
            let config = SearchConfig::from_env()?;
            let engine = engine(&config)?;
            if !engine.ensure_index_exists().await? {
                bail!(
                    "search backend {} is disabled or unreachable",
                    config.backend.as_str()
                );
            }
            info!(index = %config.index_name, "Index ready");
            engine.shutdown().await?;
        }
        Command::Delete => {
            let config = SearchConfig::from_env()?;
            let engine = engine(&config)?;
            engine.delete_index().await?;
            info!(index = %config.index_name, "Index deleted");
            engine.shutdown().await?;
        }
        Command::Reindex { batch_size } => {
            let config = AppConfig::from_env()?;
            let batch_size = batch_size.unwrap_or(config.search.reindex_batch_size);

            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(Duration::from_secs(30))
                .connect(&config.database_url)
                .await
                .context("Failed to connect to database")?;
            info!("Connected to database");

            let engine = engine(&config.search)?;
            let repository = PaperRepository::new(
                Arc::new(PgPaperStore::new(pool)),
                engine.clone(),
            )
            .with_batch_size(batch_size);

            let report = repository
                .reindex_all()
                .await
                .context("Reindex failed")?;

            info!(
                "Reindex complete! {}/{} papers indexed in {} batches ({} failed)",
                report.indexed, report.total, report.batches, report.failed
            );
            engine.shutdown().await?;
        }
        Command::Status => {
            let config = SearchConfig::from_env()?;
            let engine = engine(&config)?;
            let status = engine.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}
