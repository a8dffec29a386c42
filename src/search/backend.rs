//! Search backend driver trait.
//!
//! A driver speaks to exactly one engine. It knows nothing about best-effort
//! policies or fallbacks: every method reports failures as they happen and
//! the engine layer decides what to do with them.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::config::BackendKind;
use crate::error::SearchError;
use crate::search::descriptor::IndexDescriptor;
use crate::search::document::{PaperPatch, SearchableEntity};
use crate::search::query::{QueryPlan, SearchHits};

/// Document statistics for one index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexStats {
    pub document_count: u64,
    pub is_indexing: bool,
}

/// Abstract interface for a full-text engine.
///
/// Implementations can be swapped (Meilisearch, embedded Tantivy, test
/// doubles) without touching the layers above.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` to allow use across async tasks.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Which engine this driver talks to.
    fn kind(&self) -> BackendKind;

    /// Check if the engine is healthy and reachable.
    async fn health(&self) -> Result<bool, SearchError>;

    /// Check whether the index exists.
    async fn index_exists(&self, descriptor: &IndexDescriptor) -> Result<bool, SearchError>;

    /// Create the index with every setting applied.
    ///
    /// On failure the index must not be left behind half-configured.
    async fn create_index(&self, descriptor: &IndexDescriptor) -> Result<(), SearchError>;

    /// Re-apply the settings to an existing index. Idempotent.
    async fn apply_settings(&self, descriptor: &IndexDescriptor) -> Result<(), SearchError>;

    /// Whether the existing index still carries the descriptor's settings.
    ///
    /// Returns `false` when the index was recreated out of band and lost them.
    async fn settings_present(&self, descriptor: &IndexDescriptor) -> Result<bool, SearchError>;

    /// Current engine-side settings, for diagnostics.
    async fn current_settings(&self, descriptor: &IndexDescriptor) -> Result<Value, SearchError>;

    /// Drop the index. A missing index is not an error.
    async fn delete_index(&self, descriptor: &IndexDescriptor) -> Result<(), SearchError>;

    /// Insert or replace a document keyed by its id.
    async fn upsert_document(
        &self,
        descriptor: &IndexDescriptor,
        entity: &SearchableEntity,
    ) -> Result<(), SearchError>;

    /// Merge the present fields of a patch into an existing document.
    async fn patch_document(
        &self,
        descriptor: &IndexDescriptor,
        patch: &PaperPatch,
    ) -> Result<(), SearchError>;

    /// Remove a document.
    ///
    /// * `Err(SearchError::DocumentNotFound)` - If the document did not exist
    async fn delete_document(
        &self,
        descriptor: &IndexDescriptor,
        id: &Uuid,
    ) -> Result<(), SearchError>;

    /// Run a compiled query and return ids in engine order.
    async fn execute(
        &self,
        descriptor: &IndexDescriptor,
        plan: &QueryPlan,
    ) -> Result<SearchHits, SearchError>;

    /// Document statistics for the index.
    async fn stats(&self, descriptor: &IndexDescriptor) -> Result<IndexStats, SearchError>;

    /// Flush pending work and release engine resources.
    async fn shutdown(&self) -> Result<(), SearchError> {
        Ok(())
    }
}
