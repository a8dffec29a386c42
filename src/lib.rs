//! Paper search: a full-text index kept in step with Postgres, with a
//! relational fallback for every read.

use serde::{Deserialize, Serialize};

pub mod api;
pub mod config;
pub mod error;
pub mod repository;
pub mod search;
pub mod store;

pub use config::{AppConfig, BackendKind, SearchConfig};
pub use error::{RepositoryError, SearchError, StoreError};
pub use repository::{PaginatedResult, PaperRepository, ReindexReport, ResultSource};
pub use search::{PaperPatch, SearchIndex, SearchQuery, SearchableEntity, SortField, SortOrder};
pub use store::PaperStore;

// ============================================================================
// Database Models
// ============================================================================

#[derive(Serialize, Deserialize, sqlx::FromRow, Debug, Clone, PartialEq)]
pub struct Paper {
    pub id: uuid::Uuid,
    pub external_id: String,
    pub title: String,
    pub summary: String,
    pub translated_summary: Option<String>,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub hashtags: Vec<String>,
    pub doi: Option<String>,
    pub issued_at: Option<chrono::NaiveDate>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub like_count: i64,
    pub total_view_count: i64,
}

/// Payload for inserting a paper. The store assigns `id` and `created_at`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct NewPaper {
    pub external_id: String,
    pub title: String,
    pub summary: String,
    pub translated_summary: Option<String>,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub hashtags: Vec<String>,
    pub doi: Option<String>,
    pub issued_at: Option<chrono::NaiveDate>,
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub total_view_count: i64,
}
