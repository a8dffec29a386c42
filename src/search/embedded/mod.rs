//! Embedded Tantivy backend.
//!
//! Runs in-process, either in RAM or under a root directory holding one
//! subdirectory per index. Every write commits and reloads the reader before
//! returning, so a document is searchable as soon as the call completes.
//!
//! Index work is synchronous and runs on the blocking pool, so the async
//! caller stays cancellable by its deadline.

mod query;
mod schema;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::json;
use tantivy::collector::{Count, DocSetCollector, TopDocs};
use tantivy::query::TermQuery;
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::tokenizer::TextAnalyzer;
use tantivy::{DateTime, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::BackendKind;
use crate::error::SearchError;
use crate::search::backend::{IndexStats, SearchBackend};
use crate::search::descriptor::{
    IndexDescriptor, AUTHORS, CATEGORIES, HASHTAGS, SUMMARY, TITLE, TRANSLATED_SUMMARY,
};
use crate::search::document::{PaperPatch, SearchableEntity};
use crate::search::query::{QueryPlan, Ranking, SearchHits};

use self::query::{compare, compile, date_value, is_sort_attribute};
use self::schema::{
    create_paper_schema, expected_fields, paper_analyzer, register_analyzer, PaperFields,
    PAPER_TOKENIZER,
};

/// Single indexing thread; Tantivy requires at least 15MB per thread.
const WRITER_HEAP_BYTES: usize = 50_000_000;

/// Run synchronous index work on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T, SearchError>
where
    F: FnOnce() -> Result<T, SearchError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| SearchError::engine(format!("blocking task failed: {}", e)))?
}

/// An index opened for reading and writing.
struct OpenIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    fields: PaperFields,
    analyzer: TextAnalyzer,
}

impl OpenIndex {
    fn new(index: Index, descriptor: &IndexDescriptor) -> Result<Self, SearchError> {
        register_analyzer(&index, descriptor)?;
        let fields = PaperFields::resolve(&index.schema(), descriptor)?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let writer = index.writer_with_num_threads(1, WRITER_HEAP_BYTES)?;

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            fields,
            analyzer: paper_analyzer(descriptor)?,
        })
    }

    fn id_term(&self, id: &Uuid) -> Term {
        Term::from_field_text(self.fields.id, &id.to_string())
    }

    /// Convert an entity to a Tantivy document.
    fn to_document(&self, entity: &SearchableEntity) -> Result<TantivyDocument, SearchError> {
        let mut doc = TantivyDocument::new();

        doc.add_text(self.fields.id, entity.id.to_string());
        doc.add_text(self.fields.source, serde_json::to_string(entity)?);

        for (name, field) in &self.fields.text {
            match name.as_str() {
                TITLE => doc.add_text(*field, &entity.title),
                SUMMARY => doc.add_text(*field, &entity.summary),
                TRANSLATED_SUMMARY => {
                    if let Some(ref translated) = entity.translated_summary {
                        doc.add_text(*field, translated);
                    }
                }
                HASHTAGS => entity.hashtags.iter().for_each(|v| doc.add_text(*field, v)),
                CATEGORIES => entity.categories.iter().for_each(|v| doc.add_text(*field, v)),
                AUTHORS => entity.authors.iter().for_each(|v| doc.add_text(*field, v)),
                _ => {}
            }
        }

        // Untokenized, lower-cased copies for exact filtering
        for value in &entity.categories {
            doc.add_text(self.fields.categories_raw, value.to_lowercase());
        }
        for value in &entity.authors {
            doc.add_text(self.fields.authors_raw, value.to_lowercase());
        }
        for value in &entity.hashtags {
            doc.add_text(self.fields.hashtags_raw, value.to_lowercase());
        }

        if let Some(date) = entity.issued_at {
            doc.add_date(self.fields.issued_at, date_value(date));
        }
        doc.add_date(
            self.fields.created_at,
            DateTime::from_timestamp_micros(entity.created_at.timestamp_micros()),
        );

        Ok(doc)
    }

    fn source_of(&self, doc: &TantivyDocument) -> Result<SearchableEntity, SearchError> {
        let raw = doc
            .get_first(self.fields.source)
            .and_then(|v| v.as_str())
            .ok_or_else(|| SearchError::engine("document has no stored source"))?;
        Ok(serde_json::from_str(raw)?)
    }

    fn id_of(&self, doc: &TantivyDocument) -> Option<Uuid> {
        let id = doc.get_first(self.fields.id)?.as_str()?;
        Uuid::parse_str(id).ok()
    }

    /// Fetch the stored entity for an id.
    fn load(&self, id: &Uuid) -> Result<Option<SearchableEntity>, SearchError> {
        let searcher = self.reader.searcher();
        let query = TermQuery::new(self.id_term(id), IndexRecordOption::Basic);
        let top_docs = searcher.search(&query, &TopDocs::with_limit(1))?;

        match top_docs.first() {
            Some((_, address)) => {
                let doc: TantivyDocument = searcher.doc(*address)?;
                Ok(Some(self.source_of(&doc)?))
            }
            None => Ok(None),
        }
    }

    /// Run writes under the writer lock, then commit and reload.
    ///
    /// Nothing is committed if `apply` fails.
    fn write<F>(&self, apply: F) -> Result<(), SearchError>
    where
        F: FnOnce(&mut IndexWriter) -> Result<(), SearchError>,
    {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| SearchError::engine("index writer lock poisoned"))?;

        if let Err(e) = apply(&mut *writer) {
            if let Err(rollback) = writer.rollback() {
                warn!(error = %rollback, "Rollback failed");
            }
            return Err(e);
        }

        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    fn replace(
        &self,
        writer: &mut IndexWriter,
        entity: &SearchableEntity,
    ) -> Result<(), SearchError> {
        let doc = self.to_document(entity)?;
        writer.delete_term(self.id_term(&entity.id));
        writer.add_document(doc)?;
        Ok(())
    }

    fn patch(&self, patch: &PaperPatch) -> Result<(), SearchError> {
        self.write(|writer| {
            // Loaded under the writer lock so concurrent patches don't lose fields
            let mut entity = self
                .load(&patch.id)?
                .ok_or_else(|| SearchError::document_not_found(&patch.id))?;
            patch.apply_to(&mut entity);
            self.replace(writer, &entity)
        })
    }

    fn delete(&self, id: &Uuid) -> Result<(), SearchError> {
        self.write(|writer| {
            if self.load(id)?.is_none() {
                return Err(SearchError::document_not_found(id));
            }
            writer.delete_term(self.id_term(id));
            Ok(())
        })
    }

    fn execute(
        &self,
        descriptor: &IndexDescriptor,
        plan: &QueryPlan,
    ) -> Result<SearchHits, SearchError> {
        let searcher = self.reader.searcher();
        let mut analyzer = self.analyzer.clone();

        match &plan.ranking {
            Ranking::Relevance { text } => {
                let query = compile(
                    &plan.filters,
                    Some(text),
                    &self.fields,
                    descriptor,
                    &mut analyzer,
                )?;

                // TopDocs sizes its heap by offset + limit, so pages past the
                // matches must never reach it
                let total = searcher.search(&query, &Count)?;
                if plan.offset >= total {
                    return Ok(SearchHits {
                        ids: vec![],
                        total_estimate: total as u64,
                    });
                }

                let collector = TopDocs::with_limit(plan.limit).and_offset(plan.offset);
                let top_docs = searcher.search(&query, &collector)?;

                let mut ids = Vec::with_capacity(top_docs.len());
                for (_, address) in top_docs {
                    let doc: TantivyDocument = searcher.doc(address)?;
                    match self.id_of(&doc) {
                        Some(id) => ids.push(id),
                        None => warn!("Skipping hit with malformed id"),
                    }
                }

                Ok(SearchHits {
                    ids,
                    total_estimate: total as u64,
                })
            }
            Ranking::Sorted { attribute, order } => {
                if !is_sort_attribute(attribute) {
                    return Err(SearchError::invalid_query(format!(
                        "attribute {} is not sortable",
                        attribute
                    )));
                }
                let query = compile(&plan.filters, None, &self.fields, descriptor, &mut analyzer)?;
                let addresses = searcher.search(&query, &DocSetCollector)?;

                let mut docs = Vec::with_capacity(addresses.len());
                for address in addresses {
                    let doc: TantivyDocument = searcher.doc(address)?;
                    docs.push(self.source_of(&doc)?);
                }
                docs.sort_by(|a, b| compare(a, b, attribute, *order));

                Ok(SearchHits {
                    total_estimate: docs.len() as u64,
                    ids: docs
                        .iter()
                        .skip(plan.offset)
                        .take(plan.limit)
                        .map(|d| d.id)
                        .collect(),
                })
            }
        }
    }
}

/// In-process search backend built on Tantivy.
///
/// # Example
///
/// ```ignore
/// let backend = TantivyBackend::in_memory();
/// let engine = SearchEngine::new(Arc::new(backend), &SearchConfig::in_memory());
/// ```
pub struct TantivyBackend {
    root: Option<PathBuf>,
    indexes: RwLock<HashMap<String, Arc<OpenIndex>>>,
    /// Serializes opening and creating, which both take the on-disk writer lock.
    opening: tokio::sync::Mutex<()>,
}

impl TantivyBackend {
    /// Indexes live in RAM and vanish with the process.
    pub fn in_memory() -> Self {
        Self {
            root: None,
            indexes: RwLock::new(HashMap::new()),
            opening: tokio::sync::Mutex::new(()),
        }
    }

    /// Indexes live under `root`, one directory each.
    pub fn on_disk(root: impl AsRef<Path>) -> Self {
        Self {
            root: Some(root.as_ref().to_path_buf()),
            indexes: RwLock::new(HashMap::new()),
            opening: tokio::sync::Mutex::new(()),
        }
    }

    fn index_dir(&self, name: &str) -> Option<PathBuf> {
        self.root.as_ref().map(|root| root.join(name))
    }

    /// Directory of an index already written to disk.
    fn existing_dir(&self, name: &str) -> Option<PathBuf> {
        self.index_dir(name)
            .filter(|dir| dir.join("meta.json").exists())
    }

    fn registry(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Arc<OpenIndex>>>, SearchError> {
        self.indexes
            .write()
            .map_err(|_| SearchError::engine("index registry lock poisoned"))
    }

    fn cached(&self, name: &str) -> Result<Option<Arc<OpenIndex>>, SearchError> {
        let registry = self
            .indexes
            .read()
            .map_err(|_| SearchError::engine("index registry lock poisoned"))?;
        Ok(registry.get(name).cloned())
    }

    /// The open index, opening it from disk on first use.
    async fn open(
        &self,
        descriptor: &IndexDescriptor,
    ) -> Result<Option<Arc<OpenIndex>>, SearchError> {
        if let Some(open) = self.cached(&descriptor.name)? {
            return Ok(Some(open));
        }

        let _opening = self.opening.lock().await;
        if let Some(open) = self.cached(&descriptor.name)? {
            return Ok(Some(open));
        }
        let Some(dir) = self.existing_dir(&descriptor.name) else {
            return Ok(None);
        };

        let owned = descriptor.clone();
        let path = dir.clone();
        let open = blocking(move || {
            let index = Index::open_in_dir(&path)?;
            Ok(Arc::new(OpenIndex::new(index, &owned)?))
        })
        .await?;

        info!(path = %dir.display(), "Opened search index");
        self.registry()?
            .insert(descriptor.name.clone(), open.clone());
        Ok(Some(open))
    }

    async fn require(&self, descriptor: &IndexDescriptor) -> Result<Arc<OpenIndex>, SearchError> {
        self.open(descriptor).await?.ok_or_else(|| {
            SearchError::request(format!("index {} does not exist", descriptor.name))
        })
    }
}

#[async_trait]
impl SearchBackend for TantivyBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Tantivy
    }

    async fn health(&self) -> Result<bool, SearchError> {
        match self.root {
            Some(ref root) => Ok(!root.exists() || root.is_dir()),
            None => Ok(true),
        }
    }

    async fn index_exists(&self, descriptor: &IndexDescriptor) -> Result<bool, SearchError> {
        if self.cached(&descriptor.name)?.is_some() {
            return Ok(true);
        }
        Ok(self.existing_dir(&descriptor.name).is_some())
    }

    #[instrument(skip(self, descriptor), fields(index = %descriptor.name))]
    async fn create_index(&self, descriptor: &IndexDescriptor) -> Result<(), SearchError> {
        let _opening = self.opening.lock().await;

        let dir = self.index_dir(&descriptor.name);
        let on_disk = dir.is_some();
        let owned = descriptor.clone();

        let open = blocking(move || {
            let schema = create_paper_schema(&owned);
            let index = match dir {
                Some(ref dir) => {
                    std::fs::create_dir_all(dir).map_err(|e| {
                        SearchError::index_creation(format!(
                            "failed to create index directory {}: {}",
                            dir.display(),
                            e
                        ))
                    })?;
                    Index::create_in_dir(dir, schema)
                }
                None => Ok(Index::create_in_ram(schema)),
            }
            .map_err(|e| SearchError::index_creation(e.to_string()))?;

            OpenIndex::new(index, &owned).map_err(|e| {
                if let Some(ref dir) = dir {
                    if let Err(cleanup) = std::fs::remove_dir_all(dir) {
                        warn!(error = %cleanup, "Failed to remove half-created index");
                    }
                }
                SearchError::index_creation(e.to_string())
            })
        })
        .await?;

        self.registry()?
            .insert(descriptor.name.clone(), Arc::new(open));
        debug!(on_disk, "Index created");
        Ok(())
    }

    async fn apply_settings(&self, descriptor: &IndexDescriptor) -> Result<(), SearchError> {
        // The schema is fixed at creation; only the analyzer lives at runtime
        let open = self.require(descriptor).await?;
        register_analyzer(&open.index, descriptor)
    }

    async fn settings_present(&self, descriptor: &IndexDescriptor) -> Result<bool, SearchError> {
        let schema = match self.cached(&descriptor.name)? {
            Some(open) => open.index.schema(),
            None => match self.existing_dir(&descriptor.name) {
                Some(dir) => blocking(move || Ok(Index::open_in_dir(&dir)?.schema())).await?,
                None => return Ok(false),
            },
        };

        Ok(expected_fields(descriptor)
            .iter()
            .all(|name| schema.get_field(name).is_ok()))
    }

    async fn current_settings(
        &self,
        descriptor: &IndexDescriptor,
    ) -> Result<serde_json::Value, SearchError> {
        let open = self.require(descriptor).await?;
        let schema = open.index.schema();
        let fields: Vec<&str> = schema
            .fields()
            .map(|(_, entry)| entry.name())
            .collect();

        Ok(json!({
            "storage": self.root.as_ref().map(|r| r.display().to_string()).unwrap_or_else(|| "memory".to_string()),
            "tokenizer": PAPER_TOKENIZER,
            "fields": fields,
            "descriptor": descriptor,
        }))
    }

    #[instrument(skip(self, descriptor), fields(index = %descriptor.name))]
    async fn delete_index(&self, descriptor: &IndexDescriptor) -> Result<(), SearchError> {
        let _opening = self.opening.lock().await;
        let removed = self.registry()?.remove(&descriptor.name);
        let dir = self.index_dir(&descriptor.name);

        blocking(move || {
            // Release the writer lock before the files go
            drop(removed);

            if let Some(dir) = dir {
                if dir.exists() {
                    std::fs::remove_dir_all(&dir).map_err(|e| {
                        SearchError::engine(format!(
                            "failed to remove index directory {}: {}",
                            dir.display(),
                            e
                        ))
                    })?;
                }
            }
            Ok(())
        })
        .await?;

        debug!("Index deleted");
        Ok(())
    }

    async fn upsert_document(
        &self,
        descriptor: &IndexDescriptor,
        entity: &SearchableEntity,
    ) -> Result<(), SearchError> {
        let open = self.require(descriptor).await?;
        let entity = entity.clone();
        blocking(move || open.write(|writer| open.replace(writer, &entity))).await
    }

    async fn patch_document(
        &self,
        descriptor: &IndexDescriptor,
        patch: &PaperPatch,
    ) -> Result<(), SearchError> {
        let open = self.require(descriptor).await?;
        let patch = patch.clone();
        blocking(move || open.patch(&patch)).await
    }

    async fn delete_document(
        &self,
        descriptor: &IndexDescriptor,
        id: &Uuid,
    ) -> Result<(), SearchError> {
        let open = self.require(descriptor).await?;
        let id = *id;
        blocking(move || open.delete(&id)).await
    }

    async fn execute(
        &self,
        descriptor: &IndexDescriptor,
        plan: &QueryPlan,
    ) -> Result<SearchHits, SearchError> {
        let open = self.require(descriptor).await?;
        let descriptor = descriptor.clone();
        let plan = plan.clone();
        blocking(move || open.execute(&descriptor, &plan)).await
    }

    async fn stats(&self, descriptor: &IndexDescriptor) -> Result<IndexStats, SearchError> {
        let open = self.require(descriptor).await?;
        Ok(IndexStats {
            document_count: open.reader.searcher().num_docs(),
            is_indexing: false,
        })
    }

    async fn shutdown(&self) -> Result<(), SearchError> {
        let open: Vec<Arc<OpenIndex>> = self.registry()?.values().cloned().collect();
        blocking(move || {
            for index in open {
                index.write(|_| Ok(()))?;
            }
            Ok(())
        })
        .await?;
        info!("Embedded indexes flushed");
        Ok(())
    }
}
