//! Index schema management.
//!
//! Keeps the index present and configured. Every call re-applies the full
//! settings instead of diffing them, so an index recreated behind our back
//! converges on the next call.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::error::SearchError;
use crate::search::backend::SearchBackend;
use crate::search::bounded;
use crate::search::descriptor::IndexDescriptor;

/// Operational view of the index.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub backend: &'static str,
    pub index_name: String,
    pub enabled: bool,
    pub reachable: bool,
    pub exists: bool,
    pub document_count: Option<u64>,
    pub is_indexing: bool,
    pub settings: Option<Value>,
}

/// Ensures the index exists with the descriptor's settings.
pub struct IndexSchemaManager {
    backend: Arc<dyn SearchBackend>,
    descriptor: IndexDescriptor,
    enabled: bool,
    timeout: Duration,
}

impl IndexSchemaManager {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        descriptor: IndexDescriptor,
        enabled: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            descriptor,
            enabled,
            timeout,
        }
    }

    pub fn backend(&self) -> &dyn SearchBackend {
        self.backend.as_ref()
    }

    pub fn descriptor(&self) -> &IndexDescriptor {
        &self.descriptor
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Health check under the call deadline. Never fails.
    pub async fn is_reachable(&self) -> bool {
        match bounded(self.timeout, self.backend.health()).await {
            Ok(true) => true,
            Ok(false) => {
                warn!(backend = self.backend.kind().as_str(), "Search backend reports unhealthy");
                false
            }
            Err(e) => {
                warn!(backend = self.backend.kind().as_str(), error = %e, "Search backend unreachable");
                false
            }
        }
    }

    /// Make sure the index exists with every setting applied.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The index exists and its settings were (re)applied
    /// * `Ok(false)` - The backend is disabled or unreachable
    /// * `Err(SearchError)` - Creating or configuring the index failed
    #[instrument(skip(self), fields(index = %self.descriptor.name))]
    pub async fn ensure_index_exists(&self) -> Result<bool, SearchError> {
        if !self.enabled {
            debug!("Search backend disabled, skipping index check");
            return Ok(false);
        }

        if !self.is_reachable().await {
            return Ok(false);
        }

        let exists = match bounded(self.timeout, self.backend.index_exists(&self.descriptor)).await
        {
            Ok(exists) => exists,
            Err(e) if e.is_unavailable() => {
                warn!(error = %e, "Index existence check failed");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        if !exists {
            self.create().await?;
            info!("Created search index");
            return Ok(true);
        }

        let present =
            bounded(self.timeout, self.backend.settings_present(&self.descriptor)).await?;
        if !present {
            warn!("Index settings missing, recreating index");
            bounded(self.timeout, self.backend.delete_index(&self.descriptor)).await?;
            self.create().await?;
            return Ok(true);
        }

        bounded(self.timeout, self.backend.apply_settings(&self.descriptor))
            .await
            .map_err(|e| SearchError::index_creation(format!("applying settings: {}", e)))?;
        debug!("Index settings re-applied");
        Ok(true)
    }

    async fn create(&self) -> Result<(), SearchError> {
        bounded(self.timeout, self.backend.create_index(&self.descriptor))
            .await
            .map_err(|e| match e {
                SearchError::IndexCreation(_) => e,
                other => SearchError::index_creation(other.to_string()),
            })
    }

    /// Drop the index. Errors propagate: this is an explicit admin action.
    #[instrument(skip(self), fields(index = %self.descriptor.name))]
    pub async fn delete_index(&self) -> Result<(), SearchError> {
        if !self.enabled {
            return Err(SearchError::Disabled);
        }
        bounded(self.timeout, self.backend.delete_index(&self.descriptor)).await?;
        info!("Deleted search index");
        Ok(())
    }

    /// Collect enabled flag, reachability, existence, counts and settings.
    pub async fn status(&self) -> Result<IndexStatus, SearchError> {
        let mut status = IndexStatus {
            backend: self.backend.kind().as_str(),
            index_name: self.descriptor.name.clone(),
            enabled: self.enabled,
            reachable: false,
            exists: false,
            document_count: None,
            is_indexing: false,
            settings: None,
        };

        if !self.enabled || !self.is_reachable().await {
            return Ok(status);
        }
        status.reachable = true;

        status.exists = bounded(self.timeout, self.backend.index_exists(&self.descriptor)).await?;
        if !status.exists {
            return Ok(status);
        }

        let stats = bounded(self.timeout, self.backend.stats(&self.descriptor)).await?;
        status.document_count = Some(stats.document_count);
        status.is_indexing = stats.is_indexing;
        status.settings =
            Some(bounded(self.timeout, self.backend.current_settings(&self.descriptor)).await?);

        Ok(status)
    }
}
