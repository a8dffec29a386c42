//! The public read and write path for papers.
//!
//! Reads prefer the search index and hydrate from the store; any search
//! failure except a malformed query falls back to the store alone. Writes
//! commit to the store first and then mirror into the index best-effort.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{RepositoryError, SearchError};
use crate::search::{
    IndexStatus, IndexSynchronizer, PaperPatch, SearchHits, SearchIndex, SearchQuery,
    SearchableEntity,
};
use crate::store::{PaperFilter, PaperSort, PaperStore};
use crate::{NewPaper, Paper};

/// Papers replayed per batch during a full reindex.
pub const DEFAULT_REINDEX_BATCH_SIZE: usize = 100;

/// Which path produced a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    SearchEngine,
    Relational,
}

/// One page of results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    /// Exact on the relational path, an estimate on the search path.
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
    pub total_is_exact: bool,
    pub source: ResultSource,
}

impl<T> PaginatedResult<T> {
    pub fn new(items: Vec<T>, total: u64, page: u32, limit: u32, source: ResultSource) -> Self {
        let total_pages = if limit == 0 {
            0
        } else {
            total.div_ceil(u64::from(limit))
        };
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
            total_is_exact: source == ResultSource::Relational,
            source,
        }
    }
}

/// Outcome of a full reindex.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReindexReport {
    pub total: u64,
    pub indexed: u64,
    pub failed: u64,
    pub batches: u32,
}

/// Order fetched papers by the index's id order.
///
/// Ids with no record are stale index entries and are dropped.
pub fn hydrate(ids: &[Uuid], papers: Vec<Paper>) -> Vec<Paper> {
    let mut by_id: HashMap<Uuid, Paper> = papers.into_iter().map(|p| (p.id, p)).collect();
    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}

fn invalid_query(err: SearchError) -> RepositoryError {
    match err {
        SearchError::InvalidQuery(msg) => RepositoryError::InvalidQuery(msg),
        other => RepositoryError::Search(other),
    }
}

/// Papers backed by a relational store and mirrored into a search index.
pub struct PaperRepository {
    store: Arc<dyn PaperStore>,
    index: Arc<dyn SearchIndex>,
    sync: IndexSynchronizer,
    batch_size: usize,
}

impl PaperRepository {
    pub fn new(store: Arc<dyn PaperStore>, index: Arc<dyn SearchIndex>) -> Self {
        Self {
            sync: IndexSynchronizer::new(index.clone()),
            store,
            index,
            batch_size: DEFAULT_REINDEX_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn index(&self) -> &Arc<dyn SearchIndex> {
        &self.index
    }

    pub fn store(&self) -> &Arc<dyn PaperStore> {
        &self.store
    }

    /// List papers matching the query.
    ///
    /// # Returns
    ///
    /// * `Ok(PaginatedResult)` - From the index when it answers, else from the store
    /// * `Err(RepositoryError::InvalidQuery)` - Bad pagination, filter or sort; never retried
    /// * `Err(RepositoryError::Store)` - The store failed
    #[instrument(skip(self, query), fields(page = query.page, limit = query.limit))]
    pub async fn list(&self, query: &SearchQuery) -> Result<PaginatedResult<Paper>, RepositoryError> {
        query.validate().map_err(invalid_query)?;

        if self.index.is_enabled() {
            match self.index.search(query).await {
                Ok(hits) => return self.hydrate_page(query, hits).await,
                Err(e) if e.is_invalid_query() => return Err(invalid_query(e)),
                Err(e) => warn!(error = %e, "Search path failed, falling back to relational query"),
            }
        } else {
            debug!("Search disabled, using relational query");
        }

        self.list_relational(query).await
    }

    async fn hydrate_page(
        &self,
        query: &SearchQuery,
        hits: SearchHits,
    ) -> Result<PaginatedResult<Paper>, RepositoryError> {
        let papers = self.store.find_many_by_ids(&hits.ids).await?;
        let items = hydrate(&hits.ids, papers);

        if items.len() < hits.ids.len() {
            debug!(
                stale = hits.ids.len() - items.len(),
                "Dropped index entries with no record"
            );
        }

        // The estimate is kept as reported, stale entries included
        Ok(PaginatedResult::new(
            items,
            hits.total_estimate,
            query.page,
            query.limit,
            ResultSource::SearchEngine,
        ))
    }

    async fn list_relational(
        &self,
        query: &SearchQuery,
    ) -> Result<PaginatedResult<Paper>, RepositoryError> {
        let filter = PaperFilter::from(query);
        let sort = PaperSort::from(query);

        let (items, total) = tokio::try_join!(
            self.store
                .find_many(&filter, sort, query.offset(), u64::from(query.limit)),
            self.store.count(&filter),
        )?;

        Ok(PaginatedResult::new(
            items,
            total,
            query.page,
            query.limit,
            ResultSource::Relational,
        ))
    }

    /// Drop the index and replay every paper into it.
    ///
    /// Failures on single papers, or on a whole batch when the backend drops
    /// away, are logged and counted; the replay goes on.
    #[instrument(skip(self), fields(batch_size = self.batch_size))]
    pub async fn reindex_all(&self) -> Result<ReindexReport, RepositoryError> {
        self.index.delete_index().await?;
        if !self.index.ensure_index_exists().await? {
            return Err(SearchError::unavailable("search backend unreachable").into());
        }

        let mut report = ReindexReport::default();
        let mut skip = 0u64;

        loop {
            let batch = self.store.find_batch(skip, self.batch_size as u64).await?;
            if batch.is_empty() {
                break;
            }
            report.batches += 1;

            let entities: Vec<SearchableEntity> = batch.iter().map(SearchableEntity::from).collect();
            let mut indexed = 0u64;
            let mut failed = 0u64;
            match self.index.index_batch(&entities).await {
                Ok(outcomes) => {
                    for (entity, outcome) in entities.iter().zip(outcomes) {
                        match outcome {
                            Ok(()) => indexed += 1,
                            Err(e) => {
                                failed += 1;
                                warn!(id = %entity.id, error = %e, "Failed to index paper");
                            }
                        }
                    }
                }
                Err(e) => {
                    failed = entities.len() as u64;
                    warn!(error = %e, "Failed to index batch");
                }
            }

            report.total += batch.len() as u64;
            report.indexed += indexed;
            report.failed += failed;
            info!(
                batch = report.batches,
                indexed,
                failed,
                processed = report.total,
                "Reindexed batch"
            );

            if batch.len() < self.batch_size {
                break;
            }
            skip += batch.len() as u64;
        }

        info!(
            total = report.total,
            indexed = report.indexed,
            failed = report.failed,
            "Reindex complete"
        );
        Ok(report)
    }

    /// Create a paper, then index it. Index failures never fail the call.
    pub async fn create_paper(&self, paper: NewPaper) -> Result<Paper, RepositoryError> {
        let created = self.store.create(paper).await?;
        self.sync
            .index_document(&SearchableEntity::from(&created))
            .await;
        Ok(created)
    }

    /// Apply a partial update, then merge the same fields into the index.
    pub async fn update_paper(&self, patch: &PaperPatch) -> Result<Paper, RepositoryError> {
        let updated = self.store.update(patch).await?;
        self.sync.update_document(patch).await;
        Ok(updated)
    }

    /// Delete a paper, then remove it from the index.
    pub async fn delete_paper(&self, id: &Uuid) -> Result<(), RepositoryError> {
        self.store.delete(id).await?;
        self.sync.delete_document(id).await;
        Ok(())
    }

    pub async fn status(&self) -> Result<IndexStatus, RepositoryError> {
        Ok(self.index.status().await?)
    }
}
