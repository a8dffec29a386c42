//! The relational store that owns paper records.
//!
//! The search index is only ever a cache of what lives here.

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::StoreError;
use crate::search::{PaperPatch, SearchQuery, SortField, SortOrder};
use crate::{NewPaper, Paper};

mod memory;
mod postgres;

pub use memory::InMemoryPaperStore;
pub use postgres::PgPaperStore;

/// Row filter for the relational read path.
///
/// Mirrors the search filters: OR within a list, AND across fields, a
/// half-open issue-date window, and a case-insensitive substring match of
/// the text over title, summary and authors. Category and author values
/// match regardless of case.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaperFilter {
    pub text: Option<String>,
    pub categories: Vec<String>,
    pub authors: Vec<String>,
    /// `start <= issued_at < end`
    pub issued_between: Option<(NaiveDate, NaiveDate)>,
}

impl From<&SearchQuery> for PaperFilter {
    fn from(query: &SearchQuery) -> Self {
        Self {
            text: query.term().map(str::to_string),
            categories: query.category_set(),
            authors: query.author_set(),
            issued_between: query.year_bounds(),
        }
    }
}

impl PaperFilter {
    /// Whether a paper passes the filter.
    pub fn matches(&self, paper: &Paper) -> bool {
        if !self.categories.is_empty() && !overlaps(&paper.categories, &self.categories) {
            return false;
        }
        if !self.authors.is_empty() && !overlaps(&paper.authors, &self.authors) {
            return false;
        }
        if let Some((start, end)) = self.issued_between {
            match paper.issued_at {
                Some(date) if date >= start && date < end => {}
                _ => return false,
            }
        }
        if let Some(ref text) = self.text {
            let needle = text.to_lowercase();
            let found = paper.title.to_lowercase().contains(&needle)
                || paper.summary.to_lowercase().contains(&needle)
                || paper.authors.join(" ").to_lowercase().contains(&needle);
            if !found {
                return false;
            }
        }
        true
    }
}

fn overlaps(values: &[String], wanted: &[String]) -> bool {
    values.iter().any(|v| wanted.iter().any(|w| v.to_lowercase() == w.to_lowercase()))
}

/// Requested order for the relational read path. Ties always break by id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaperSort {
    pub field: SortField,
    pub order: SortOrder,
}

impl From<&SearchQuery> for PaperSort {
    fn from(query: &SearchQuery) -> Self {
        Self {
            field: query.sort_by,
            order: query.sort_order,
        }
    }
}

/// Relational persistence for papers.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` to allow use across async tasks.
#[async_trait]
pub trait PaperStore: Send + Sync {
    /// Fetch the papers with these ids, in no particular order. Unknown ids are skipped.
    async fn find_many_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Paper>, StoreError>;

    /// One page of filtered, sorted papers.
    async fn find_many(
        &self,
        filter: &PaperFilter,
        sort: PaperSort,
        skip: u64,
        take: u64,
    ) -> Result<Vec<Paper>, StoreError>;

    /// Exact number of papers passing the filter.
    async fn count(&self, filter: &PaperFilter) -> Result<u64, StoreError>;

    /// Papers ordered by id, for replaying into the index.
    async fn find_batch(&self, skip: u64, take: u64) -> Result<Vec<Paper>, StoreError>;

    async fn create(&self, paper: NewPaper) -> Result<Paper, StoreError>;

    /// Apply the present fields of the patch.
    ///
    /// * `Err(StoreError::NotFound)` - If no paper has this id
    async fn update(&self, patch: &PaperPatch) -> Result<Paper, StoreError>;

    /// * `Err(StoreError::NotFound)` - If no paper has this id
    async fn delete(&self, id: &Uuid) -> Result<(), StoreError>;
}
