//! In-process paper store with the same semantics as Postgres.
//!
//! Backs tests and local runs without a database.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::search::{PaperPatch, SortField, SortOrder};
use crate::store::{PaperFilter, PaperSort, PaperStore};
use crate::{NewPaper, Paper};

/// Papers keyed by id; iteration order is id order.
#[derive(Default)]
pub struct InMemoryPaperStore {
    papers: RwLock<BTreeMap<Uuid, Paper>>,
}

impl InMemoryPaperStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_papers(papers: impl IntoIterator<Item = Paper>) -> Self {
        Self {
            papers: RwLock::new(papers.into_iter().map(|p| (p.id, p)).collect()),
        }
    }

    /// Insert or replace a fully formed record.
    pub async fn insert(&self, paper: Paper) {
        self.papers.write().await.insert(paper.id, paper);
    }

    pub async fn len(&self) -> usize {
        self.papers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.papers.read().await.is_empty()
    }
}

fn directed(ordering: Ordering, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

/// `ORDER BY <field> <order> NULLS LAST, id ASC`
fn compare(a: &Paper, b: &Paper, sort: PaperSort) -> Ordering {
    let primary = match sort.field {
        SortField::CreatedAt => directed(a.created_at.cmp(&b.created_at), sort.order),
        SortField::LikeCount => directed(a.like_count.cmp(&b.like_count), sort.order),
        SortField::ViewCount => directed(a.total_view_count.cmp(&b.total_view_count), sort.order),
        SortField::IssuedAt => match (a.issued_at, b.issued_at) {
            (Some(x), Some(y)) => directed(x.cmp(&y), sort.order),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl PaperStore for InMemoryPaperStore {
    async fn find_many_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Paper>, StoreError> {
        let papers = self.papers.read().await;
        Ok(ids.iter().filter_map(|id| papers.get(id).cloned()).collect())
    }

    async fn find_many(
        &self,
        filter: &PaperFilter,
        sort: PaperSort,
        skip: u64,
        take: u64,
    ) -> Result<Vec<Paper>, StoreError> {
        let papers = self.papers.read().await;
        let mut matching: Vec<&Paper> = papers.values().filter(|p| filter.matches(p)).collect();
        matching.sort_by(|a, b| compare(a, b, sort));

        Ok(matching
            .into_iter()
            .skip(skip as usize)
            .take(take as usize)
            .cloned()
            .collect())
    }

    async fn count(&self, filter: &PaperFilter) -> Result<u64, StoreError> {
        let papers = self.papers.read().await;
        Ok(papers.values().filter(|p| filter.matches(p)).count() as u64)
    }

    async fn find_batch(&self, skip: u64, take: u64) -> Result<Vec<Paper>, StoreError> {
        let papers = self.papers.read().await;
        Ok(papers
            .values()
            .skip(skip as usize)
            .take(take as usize)
            .cloned()
            .collect())
    }

    async fn create(&self, paper: NewPaper) -> Result<Paper, StoreError> {
        let created = Paper {
            id: Uuid::new_v4(),
            external_id: paper.external_id,
            title: paper.title,
            summary: paper.summary,
            translated_summary: paper.translated_summary,
            authors: paper.authors,
            categories: paper.categories,
            hashtags: paper.hashtags,
            doi: paper.doi,
            issued_at: paper.issued_at,
            created_at: Utc::now(),
            like_count: paper.like_count.max(0),
            total_view_count: paper.total_view_count.max(0),
        };
        self.papers
            .write()
            .await
            .insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, patch: &PaperPatch) -> Result<Paper, StoreError> {
        let mut papers = self.papers.write().await;
        let paper = papers
            .get_mut(&patch.id)
            .ok_or(StoreError::NotFound(patch.id))?;
        patch.apply_to_paper(paper);
        Ok(paper.clone())
    }

    async fn delete(&self, id: &Uuid) -> Result<(), StoreError> {
        match self.papers.write().await.remove(id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(*id)),
        }
    }
}
