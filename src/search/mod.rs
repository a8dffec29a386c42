//! Full-text search for papers.
//!
//! Layers, leaves first:
//! - [`backend::SearchBackend`]: one driver per engine ([`meilisearch`], [`embedded`])
//! - [`manager::IndexSchemaManager`]: keeps the index present and configured
//! - [`planner::QueryPlanner`]: compiles [`SearchQuery`] and runs it
//! - [`engine::SearchEngine`]: the [`SearchIndex`] capability set over a driver
//! - [`sync::IndexSynchronizer`]: best-effort writes on top of any [`SearchIndex`]

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::SearchError;

pub mod backend;
pub mod descriptor;
pub mod document;
pub mod embedded;
pub mod engine;
pub mod manager;
pub mod meilisearch;
pub mod planner;
pub mod query;
pub mod sync;

pub use backend::{IndexStats, SearchBackend};
pub use descriptor::{IndexDescriptor, RankingRule, TypoTolerance};
pub use document::{PaperPatch, SearchableEntity};
pub use embedded::TantivyBackend;
pub use engine::SearchEngine;
pub use manager::{IndexSchemaManager, IndexStatus};
pub use meilisearch::MeilisearchBackend;
pub use planner::QueryPlanner;
pub use query::{FilterClause, QueryPlan, Ranking, SearchHits, SearchQuery, SortField, SortOrder};
pub use sync::IndexSynchronizer;

/// The search capabilities the rest of the application depends on.
///
/// The repository only ever sees this trait, never a concrete engine.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Whether the backend is switched on by configuration.
    fn is_enabled(&self) -> bool;

    /// Make sure the index exists with the expected settings.
    ///
    /// * `Ok(false)` - If the backend is disabled or unreachable
    /// * `Err(SearchError)` - If the index could not be created
    async fn ensure_index_exists(&self) -> Result<bool, SearchError>;

    /// Drop the index.
    async fn delete_index(&self) -> Result<(), SearchError>;

    /// Insert or replace one document.
    ///
    /// Document writes are no-ops while the backend is disabled. An enabled
    /// backend that cannot be reached fails with [`SearchError::Unavailable`].
    async fn index_document(&self, entity: &SearchableEntity) -> Result<(), SearchError>;

    /// Insert or replace many documents, one outcome per entity in order.
    ///
    /// * `Err(SearchError)` - If the backend could not take any of them
    async fn index_batch(
        &self,
        entities: &[SearchableEntity],
    ) -> Result<Vec<Result<(), SearchError>>, SearchError> {
        let mut outcomes = Vec::with_capacity(entities.len());
        for entity in entities {
            outcomes.push(self.index_document(entity).await);
        }
        Ok(outcomes)
    }

    /// Merge a partial update into one document.
    ///
    /// * `Err(SearchError::DocumentNotFound)` - If the document is not indexed
    async fn update_document(&self, patch: &PaperPatch) -> Result<(), SearchError>;

    /// Remove one document. A missing document counts as removed.
    async fn delete_document(&self, id: &Uuid) -> Result<(), SearchError>;

    /// Ordered ids and a total estimate for one page of results.
    ///
    /// Fails when the backend is disabled or unreachable so the caller can fall back.
    async fn search(&self, query: &SearchQuery) -> Result<SearchHits, SearchError>;

    /// Operational snapshot of the index.
    async fn status(&self) -> Result<IndexStatus, SearchError>;

    /// Release backend resources before the process exits.
    async fn shutdown(&self) -> Result<(), SearchError> {
        Ok(())
    }
}

/// Run a backend call under a deadline, mapping expiry to [`SearchError::Timeout`].
pub(crate) async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T, SearchError>
where
    F: Future<Output = Result<T, SearchError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(SearchError::Timeout(timeout)),
    }
}
