//! The [`SearchIndex`] capability set over a backend driver.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::{BackendKind, SearchConfig};
use crate::error::SearchError;
use crate::search::backend::SearchBackend;
use crate::search::bounded;
use crate::search::descriptor::IndexDescriptor;
use crate::search::document::{PaperPatch, SearchableEntity};
use crate::search::embedded::TantivyBackend;
use crate::search::manager::{IndexSchemaManager, IndexStatus};
use crate::search::meilisearch::MeilisearchBackend;
use crate::search::planner::QueryPlanner;
use crate::search::query::{SearchHits, SearchQuery};
use crate::search::SearchIndex;

/// Schema manager, document operations and planner over one driver.
pub struct SearchEngine {
    schema: Arc<IndexSchemaManager>,
    planner: QueryPlanner,
}

impl SearchEngine {
    /// Wrap a driver.
    pub fn new(backend: Arc<dyn SearchBackend>, config: &SearchConfig) -> Self {
        let descriptor = IndexDescriptor::papers(config.index_name.clone());
        let schema = Arc::new(IndexSchemaManager::new(
            backend,
            descriptor,
            config.enabled,
            config.timeout,
        ));
        let planner = QueryPlanner::new(schema.clone());
        Self { schema, planner }
    }

    /// Build the driver named by the configuration and wrap it.
    ///
    /// Nothing is contacted here; reachability is checked lazily.
    pub fn from_config(config: &SearchConfig) -> Result<Self, SearchError> {
        let backend: Arc<dyn SearchBackend> = match config.backend {
            BackendKind::Meilisearch => Arc::new(MeilisearchBackend::new(
                &config.meilisearch_host,
                config.meilisearch_api_key.clone(),
                config.timeout,
            )?),
            BackendKind::Tantivy => match &config.tantivy_path {
                Some(path) => Arc::new(TantivyBackend::on_disk(path)),
                None => Arc::new(TantivyBackend::in_memory()),
            },
        };

        info!(
            backend = config.backend.as_str(),
            enabled = config.enabled,
            index = %config.index_name,
            timeout_ms = config.timeout.as_millis() as u64,
            "Created search engine"
        );

        Ok(Self::new(backend, config))
    }

    pub fn schema(&self) -> &IndexSchemaManager {
        &self.schema
    }

    /// Whether document writes should reach the backend.
    ///
    /// * `Ok(false)` - If the backend is switched off
    /// * `Err(SearchError::Unavailable)` - If it is on but cannot be reached
    async fn writable(&self) -> Result<bool, SearchError> {
        if !self.schema.is_enabled() {
            return Ok(false);
        }
        if !self.schema.ensure_index_exists().await? {
            return Err(SearchError::unavailable("search backend unreachable"));
        }
        Ok(true)
    }

    async fn upsert(&self, entity: &SearchableEntity) -> Result<(), SearchError> {
        bounded(
            self.schema.timeout(),
            self.schema
                .backend()
                .upsert_document(self.schema.descriptor(), entity),
        )
        .await
    }
}

#[async_trait]
impl SearchIndex for SearchEngine {
    fn is_enabled(&self) -> bool {
        self.schema.is_enabled()
    }

    async fn ensure_index_exists(&self) -> Result<bool, SearchError> {
        self.schema.ensure_index_exists().await
    }

    async fn delete_index(&self) -> Result<(), SearchError> {
        self.schema.delete_index().await
    }

    #[instrument(skip(self, entity), fields(id = %entity.id))]
    async fn index_document(&self, entity: &SearchableEntity) -> Result<(), SearchError> {
        if !self.writable().await? {
            debug!("Search disabled, skipping upsert");
            return Ok(());
        }
        self.upsert(entity).await?;
        debug!("Document indexed");
        Ok(())
    }

    #[instrument(skip(self, entities), fields(count = entities.len()))]
    async fn index_batch(
        &self,
        entities: &[SearchableEntity],
    ) -> Result<Vec<Result<(), SearchError>>, SearchError> {
        if !self.writable().await? {
            debug!("Search disabled, skipping batch");
            return Ok(entities.iter().map(|_| Ok(())).collect());
        }
        let mut outcomes = Vec::with_capacity(entities.len());
        for entity in entities {
            outcomes.push(self.upsert(entity).await);
        }
        Ok(outcomes)
    }

    #[instrument(skip(self, patch), fields(id = %patch.id))]
    async fn update_document(&self, patch: &PaperPatch) -> Result<(), SearchError> {
        if !patch.has_updates() {
            return Ok(());
        }
        if !self.writable().await? {
            debug!("Search disabled, skipping partial update");
            return Ok(());
        }
        bounded(
            self.schema.timeout(),
            self.schema
                .backend()
                .patch_document(self.schema.descriptor(), patch),
        )
        .await?;
        debug!("Document updated");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_document(&self, id: &Uuid) -> Result<(), SearchError> {
        if !self.writable().await? {
            debug!("Search disabled, skipping delete");
            return Ok(());
        }
        let result = bounded(
            self.schema.timeout(),
            self.schema
                .backend()
                .delete_document(self.schema.descriptor(), id),
        )
        .await;

        match result {
            Ok(()) => {
                debug!("Document deleted");
                Ok(())
            }
            // Deleting something already gone is still a successful delete
            Err(SearchError::DocumentNotFound(_)) => {
                debug!("Document already absent");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchHits, SearchError> {
        self.planner.search(query).await
    }

    async fn status(&self) -> Result<IndexStatus, SearchError> {
        self.schema.status().await
    }

    async fn shutdown(&self) -> Result<(), SearchError> {
        bounded(self.schema.timeout(), self.schema.backend().shutdown()).await?;
        info!(backend = self.schema.backend().kind().as_str(), "Search engine shut down");
        Ok(())
    }
}
