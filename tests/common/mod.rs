#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::Value;
use uuid::Uuid;

use scholar_search::config::BackendKind;
use scholar_search::search::{
    IndexDescriptor, IndexStats, IndexStatus, QueryPlan, SearchBackend, SearchEngine, SearchHits,
    TantivyBackend,
};
use scholar_search::store::InMemoryPaperStore;
use scholar_search::{
    Paper, PaperPatch, PaperRepository, SearchConfig, SearchError, SearchIndex, SearchQuery,
    SearchableEntity,
};

/// A paper with a predictable id, creation time and like count.
pub fn paper(n: u128) -> Paper {
    Paper {
        id: Uuid::from_u128(n),
        external_id: format!("2401.{:05}", n),
        title: format!("Paper number {}", n),
        summary: "An empirical study".to_string(),
        translated_summary: None,
        authors: vec!["Ada Lovelace".to_string()],
        categories: vec![],
        hashtags: vec![],
        doi: None,
        issued_at: None,
        created_at: Utc
            .timestamp_opt(1_700_000_000 + (n as i64) * 60, 0)
            .single()
            .unwrap_or_else(Utc::now),
        like_count: 0,
        total_view_count: 0,
    }
}

pub fn with_categories(mut paper: Paper, categories: &[&str]) -> Paper {
    paper.categories = categories.iter().map(|c| c.to_string()).collect();
    paper
}

pub fn with_likes(mut paper: Paper, likes: i64) -> Paper {
    paper.like_count = likes;
    paper
}

pub fn issued(mut paper: Paper, year: i32, month: u32) -> Paper {
    paper.issued_at = NaiveDate::from_ymd_opt(year, month, 1);
    paper
}

pub fn ids(papers: &[Paper]) -> Vec<Uuid> {
    papers.iter().map(|p| p.id).collect()
}

pub fn tantivy_engine() -> Arc<SearchEngine> {
    let config = SearchConfig::in_memory();
    Arc::new(SearchEngine::from_config(&config).expect("in-memory engine"))
}

pub fn disabled_engine() -> Arc<SearchEngine> {
    let config = SearchConfig::in_memory().disabled();
    Arc::new(SearchEngine::from_config(&config).expect("disabled engine"))
}

/// Repository over an in-memory store and an in-memory Tantivy index,
/// with every paper already indexed.
pub async fn indexed_repository(
    papers: Vec<Paper>,
) -> (PaperRepository, Arc<InMemoryPaperStore>, Arc<SearchEngine>) {
    let store = Arc::new(InMemoryPaperStore::with_papers(papers));
    let engine = tantivy_engine();
    let repository = PaperRepository::new(store.clone(), engine.clone());
    repository.reindex_all().await.expect("reindex");
    (repository, store, engine)
}

/// An index that is switched on but fails every call.
pub struct FailingIndex;

#[async_trait]
impl SearchIndex for FailingIndex {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn ensure_index_exists(&self) -> Result<bool, SearchError> {
        Err(SearchError::unavailable("connection refused"))
    }

    async fn delete_index(&self) -> Result<(), SearchError> {
        Err(SearchError::unavailable("connection refused"))
    }

    async fn index_document(&self, _entity: &SearchableEntity) -> Result<(), SearchError> {
        Err(SearchError::unavailable("connection refused"))
    }

    async fn update_document(&self, _patch: &PaperPatch) -> Result<(), SearchError> {
        Err(SearchError::unavailable("connection refused"))
    }

    async fn delete_document(&self, _id: &Uuid) -> Result<(), SearchError> {
        Err(SearchError::unavailable("connection refused"))
    }

    async fn search(&self, _query: &SearchQuery) -> Result<SearchHits, SearchError> {
        Err(SearchError::unavailable("connection refused"))
    }

    async fn status(&self) -> Result<IndexStatus, SearchError> {
        Err(SearchError::unavailable("connection refused"))
    }
}

/// Delegates to a real index but refuses to index the listed ids.
pub struct FlakyIndex {
    inner: Arc<dyn SearchIndex>,
    rejected: HashSet<Uuid>,
}

impl FlakyIndex {
    pub fn new(inner: Arc<dyn SearchIndex>, rejected: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            inner,
            rejected: rejected.into_iter().collect(),
        }
    }
}

#[async_trait]
impl SearchIndex for FlakyIndex {
    fn is_enabled(&self) -> bool {
        self.inner.is_enabled()
    }

    async fn ensure_index_exists(&self) -> Result<bool, SearchError> {
        self.inner.ensure_index_exists().await
    }

    async fn delete_index(&self) -> Result<(), SearchError> {
        self.inner.delete_index().await
    }

    async fn index_document(&self, entity: &SearchableEntity) -> Result<(), SearchError> {
        if self.rejected.contains(&entity.id) {
            return Err(SearchError::request("document rejected"));
        }
        self.inner.index_document(entity).await
    }

    async fn update_document(&self, patch: &PaperPatch) -> Result<(), SearchError> {
        self.inner.update_document(patch).await
    }

    async fn delete_document(&self, id: &Uuid) -> Result<(), SearchError> {
        self.inner.delete_document(id).await
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchHits, SearchError> {
        self.inner.search(query).await
    }

    async fn status(&self) -> Result<IndexStatus, SearchError> {
        self.inner.status().await
    }
}

/// A driver whose every call hangs far past any sensible deadline.
pub struct HangingBackend;

impl HangingBackend {
    async fn hang<T>() -> Result<T, SearchError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Err(SearchError::unavailable("still hanging"))
    }
}

#[async_trait]
impl SearchBackend for HangingBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Meilisearch
    }

    async fn health(&self) -> Result<bool, SearchError> {
        Self::hang().await
    }

    async fn index_exists(&self, _d: &IndexDescriptor) -> Result<bool, SearchError> {
        Self::hang().await
    }

    async fn create_index(&self, _d: &IndexDescriptor) -> Result<(), SearchError> {
        Self::hang().await
    }

    async fn apply_settings(&self, _d: &IndexDescriptor) -> Result<(), SearchError> {
        Self::hang().await
    }

    async fn settings_present(&self, _d: &IndexDescriptor) -> Result<bool, SearchError> {
        Self::hang().await
    }

    async fn current_settings(&self, _d: &IndexDescriptor) -> Result<Value, SearchError> {
        Self::hang().await
    }

    async fn delete_index(&self, _d: &IndexDescriptor) -> Result<(), SearchError> {
        Self::hang().await
    }

    async fn upsert_document(
        &self,
        _d: &IndexDescriptor,
        _entity: &SearchableEntity,
    ) -> Result<(), SearchError> {
        Self::hang().await
    }

    async fn patch_document(
        &self,
        _d: &IndexDescriptor,
        _patch: &PaperPatch,
    ) -> Result<(), SearchError> {
        Self::hang().await
    }

    async fn delete_document(&self, _d: &IndexDescriptor, _id: &Uuid) -> Result<(), SearchError> {
        Self::hang().await
    }

    async fn execute(
        &self,
        _d: &IndexDescriptor,
        _plan: &QueryPlan,
    ) -> Result<SearchHits, SearchError> {
        Self::hang().await
    }

    async fn stats(&self, _d: &IndexDescriptor) -> Result<IndexStats, SearchError> {
        Self::hang().await
    }
}

/// An embedded driver that goes unhealthy once it has taken `budget` upserts.
pub struct FadingBackend {
    inner: TantivyBackend,
    budget: AtomicUsize,
}

impl FadingBackend {
    pub fn new(budget: usize) -> Self {
        Self {
            inner: TantivyBackend::in_memory(),
            budget: AtomicUsize::new(budget),
        }
    }
}

#[async_trait]
impl SearchBackend for FadingBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Tantivy
    }

    async fn health(&self) -> Result<bool, SearchError> {
        Ok(self.budget.load(Ordering::SeqCst) > 0)
    }

    async fn index_exists(&self, d: &IndexDescriptor) -> Result<bool, SearchError> {
        self.inner.index_exists(d).await
    }

    async fn create_index(&self, d: &IndexDescriptor) -> Result<(), SearchError> {
        self.inner.create_index(d).await
    }

    async fn apply_settings(&self, d: &IndexDescriptor) -> Result<(), SearchError> {
        self.inner.apply_settings(d).await
    }

    async fn settings_present(&self, d: &IndexDescriptor) -> Result<bool, SearchError> {
        self.inner.settings_present(d).await
    }

    async fn current_settings(&self, d: &IndexDescriptor) -> Result<Value, SearchError> {
        self.inner.current_settings(d).await
    }

    async fn delete_index(&self, d: &IndexDescriptor) -> Result<(), SearchError> {
        self.inner.delete_index(d).await
    }

    async fn upsert_document(
        &self,
        d: &IndexDescriptor,
        entity: &SearchableEntity,
    ) -> Result<(), SearchError> {
        let taken = self
            .budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        if taken.is_err() {
            return Err(SearchError::unavailable("connection refused"));
        }
        self.inner.upsert_document(d, entity).await
    }

    async fn patch_document(
        &self,
        d: &IndexDescriptor,
        patch: &PaperPatch,
    ) -> Result<(), SearchError> {
        self.inner.patch_document(d, patch).await
    }

    async fn delete_document(&self, d: &IndexDescriptor, id: &Uuid) -> Result<(), SearchError> {
        self.inner.delete_document(d, id).await
    }

    async fn execute(&self, d: &IndexDescriptor, plan: &QueryPlan) -> Result<SearchHits, SearchError> {
        self.inner.execute(d, plan).await
    }

    async fn stats(&self, d: &IndexDescriptor) -> Result<IndexStats, SearchError> {
        self.inner.stats(d).await
    }
}
