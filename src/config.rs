//! Environment-driven configuration.
//!
//! Values are read once at startup; nothing here is mutated afterwards.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Default Meilisearch URL.
const DEFAULT_MEILISEARCH_HOST: &str = "http://localhost:7700";

/// Default index name for papers.
const DEFAULT_INDEX_NAME: &str = "papers";

/// Default per-call timeout for the search backend.
const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Default number of papers replayed per reindex batch.
const DEFAULT_REINDEX_BATCH_SIZE: usize = 100;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Which full-text engine backs the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Meilisearch,
    Tantivy,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Meilisearch => "meilisearch",
            Self::Tantivy => "tantivy",
        }
    }
}

impl FromStr for BackendKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "meilisearch" | "meili" => Ok(Self::Meilisearch),
            "tantivy" => Ok(Self::Tantivy),
            _ => Err(()),
        }
    }
}

/// Search backend settings.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// When false every search call short-circuits and reads use the database.
    pub enabled: bool,
    pub backend: BackendKind,
    pub meilisearch_host: String,
    pub meilisearch_api_key: Option<String>,
    /// Directory for the embedded index. `None` keeps it in memory.
    pub tantivy_path: Option<PathBuf>,
    pub index_name: String,
    /// Upper bound for any single backend call.
    pub timeout: Duration,
    pub reindex_batch_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: BackendKind::Meilisearch,
            meilisearch_host: DEFAULT_MEILISEARCH_HOST.to_string(),
            meilisearch_api_key: None,
            tantivy_path: None,
            index_name: DEFAULT_INDEX_NAME.to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            reindex_batch_size: DEFAULT_REINDEX_BATCH_SIZE,
        }
    }
}

impl SearchConfig {
    /// An enabled, in-memory Tantivy configuration.
    pub fn in_memory() -> Self {
        Self {
            backend: BackendKind::Tantivy,
            ..Self::default()
        }
    }

    /// Same configuration with the backend switched off.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Load from the environment.
    ///
    /// # Environment Variables
    ///
    /// - `SEARCH_ENABLED`: `true`/`false` (default: true)
    /// - `SEARCH_BACKEND`: `meilisearch` or `tantivy` (default: meilisearch)
    /// - `MEILISEARCH_HOST`: server URL (default: http://localhost:7700)
    /// - `MEILISEARCH_API_KEY`: optional bearer key
    /// - `TANTIVY_INDEX_PATH`: index directory; unset keeps the index in memory
    /// - `SEARCH_INDEX_NAME`: index name (default: papers)
    /// - `SEARCH_TIMEOUT_MS`: per-call timeout (default: 5000)
    /// - `REINDEX_BATCH_SIZE`: replay batch size (default: 100)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let enabled = match optional("SEARCH_ENABLED") {
            Some(value) => parse_bool("SEARCH_ENABLED", &value)?,
            None => defaults.enabled,
        };

        let backend = match optional("SEARCH_BACKEND") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                key: "SEARCH_BACKEND",
                value,
            })?,
            None => defaults.backend,
        };

        let timeout = match optional("SEARCH_TIMEOUT_MS") {
            Some(value) => Duration::from_millis(parse_number("SEARCH_TIMEOUT_MS", &value)?),
            None => defaults.timeout,
        };

        let reindex_batch_size = match optional("REINDEX_BATCH_SIZE") {
            Some(value) => parse_number::<usize>("REINDEX_BATCH_SIZE", &value)?.max(1),
            None => defaults.reindex_batch_size,
        };

        Ok(Self {
            enabled,
            backend,
            meilisearch_host: optional("MEILISEARCH_HOST").unwrap_or(defaults.meilisearch_host),
            meilisearch_api_key: optional("MEILISEARCH_API_KEY"),
            tantivy_path: optional("TANTIVY_INDEX_PATH").map(PathBuf::from),
            index_name: optional("SEARCH_INDEX_NAME").unwrap_or(defaults.index_name),
            timeout,
            reindex_batch_size,
        })
    }
}

/// Process-wide settings for the API server.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub bind_addr: SocketAddr,
    pub search: SearchConfig,
}

impl AppConfig {
    /// Load from the environment. `POSTGRES_URI` wins over `DATABASE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = optional("POSTGRES_URI")
            .or_else(|| optional("DATABASE_URL"))
            .ok_or(ConfigError::Missing("POSTGRES_URI"))?;

        let max_connections = match optional("DATABASE_MAX_CONNECTIONS") {
            Some(value) => parse_number("DATABASE_MAX_CONNECTIONS", &value)?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let bind_addr = optional("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr
            .parse()
            .map_err(|_| ConfigError::Invalid {
                key: "BIND_ADDR",
                value: bind_addr.clone(),
            })?;

        Ok(Self {
            database_url,
            max_connections,
            bind_addr,
            search: SearchConfig::from_env()?,
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        }),
    }
}

fn parse_number<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}
