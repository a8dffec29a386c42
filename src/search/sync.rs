//! Best-effort index synchronization.
//!
//! Every method here swallows failures after logging them. Index health must
//! never decide whether a write to the database succeeds.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::search::document::{PaperPatch, SearchableEntity};
use crate::search::SearchIndex;

/// Mirrors committed writes into the search index.
#[derive(Clone)]
pub struct IndexSynchronizer {
    index: Arc<dyn SearchIndex>,
}

impl IndexSynchronizer {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self { index }
    }

    /// Upsert one document. Failures are logged, never returned.
    pub async fn index_document(&self, entity: &SearchableEntity) {
        if !self.index.is_enabled() {
            return;
        }
        match self.index.index_document(entity).await {
            Ok(()) => debug!(id = %entity.id, "Index synchronized"),
            Err(e) => warn!(id = %entity.id, error = %e, "Failed to index document"),
        }
    }

    /// Merge a partial update. Failures are logged, never returned.
    pub async fn update_document(&self, patch: &PaperPatch) {
        if !self.index.is_enabled() {
            return;
        }
        match self.index.update_document(patch).await {
            Ok(()) => debug!(id = %patch.id, "Index synchronized"),
            Err(e) => warn!(id = %patch.id, error = %e, "Failed to update indexed document"),
        }
    }

    /// Remove one document. Failures are logged, never returned.
    pub async fn delete_document(&self, id: &Uuid) {
        if !self.index.is_enabled() {
            return;
        }
        match self.index.delete_document(id).await {
            Ok(()) => debug!(id = %id, "Index synchronized"),
            Err(e) => warn!(id = %id, error = %e, "Failed to delete indexed document"),
        }
    }
}
