//! Indexed projection of a paper and the partial-update payload.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Paper;

/// The fields of a paper mirrored into the search index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchableEntity {
    pub id: Uuid,
    pub external_id: String,
    pub title: String,
    pub summary: String,
    pub translated_summary: Option<String>,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub hashtags: Vec<String>,
    pub doi: Option<String>,
    pub issued_at: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub like_count: i64,
    pub total_view_count: i64,
}

impl From<&Paper> for SearchableEntity {
    fn from(paper: &Paper) -> Self {
        Self {
            id: paper.id,
            external_id: paper.external_id.clone(),
            title: paper.title.clone(),
            summary: paper.summary.clone(),
            translated_summary: paper.translated_summary.clone(),
            authors: paper.authors.clone(),
            categories: paper.categories.clone(),
            hashtags: paper.hashtags.clone(),
            doi: paper.doi.clone(),
            issued_at: paper.issued_at,
            created_at: paper.created_at,
            like_count: paper.like_count.max(0),
            total_view_count: paper.total_view_count.max(0),
        }
    }
}

/// Partial update of a paper.
///
/// Only fields that are `Some` are written; everything else is left as it is,
/// in the database and in the index alike. The nullable columns use a nested
/// option so they can be cleared: `Some(None)` writes a null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperPatch {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_summary: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashtags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<Option<NaiveDate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_view_count: Option<i64>,
}

impl PaperPatch {
    /// Create an empty patch for the given paper.
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = Some(categories);
        self
    }

    pub fn with_like_count(mut self, like_count: i64) -> Self {
        self.like_count = Some(like_count);
        self
    }

    pub fn with_total_view_count(mut self, total_view_count: i64) -> Self {
        self.total_view_count = Some(total_view_count);
        self
    }

    pub fn with_issued_at(mut self, issued_at: Option<NaiveDate>) -> Self {
        self.issued_at = Some(issued_at);
        self
    }

    /// Check if any fields are set for update.
    pub fn has_updates(&self) -> bool {
        self.title.is_some()
            || self.summary.is_some()
            || self.translated_summary.is_some()
            || self.authors.is_some()
            || self.categories.is_some()
            || self.hashtags.is_some()
            || self.doi.is_some()
            || self.issued_at.is_some()
            || self.like_count.is_some()
            || self.total_view_count.is_some()
    }

    /// Merge the present fields into an indexed entity.
    pub fn apply_to(&self, entity: &mut SearchableEntity) {
        if let Some(ref title) = self.title {
            entity.title = title.clone();
        }
        if let Some(ref summary) = self.summary {
            entity.summary = summary.clone();
        }
        if let Some(ref translated_summary) = self.translated_summary {
            entity.translated_summary = translated_summary.clone();
        }
        if let Some(ref authors) = self.authors {
            entity.authors = authors.clone();
        }
        if let Some(ref categories) = self.categories {
            entity.categories = categories.clone();
        }
        if let Some(ref hashtags) = self.hashtags {
            entity.hashtags = hashtags.clone();
        }
        if let Some(ref doi) = self.doi {
            entity.doi = doi.clone();
        }
        if let Some(issued_at) = self.issued_at {
            entity.issued_at = issued_at;
        }
        if let Some(like_count) = self.like_count {
            entity.like_count = like_count.max(0);
        }
        if let Some(total_view_count) = self.total_view_count {
            entity.total_view_count = total_view_count.max(0);
        }
    }

    /// Merge the present fields into a stored paper row.
    pub fn apply_to_paper(&self, paper: &mut Paper) {
        let mut entity = SearchableEntity::from(&*paper);
        self.apply_to(&mut entity);
        paper.title = entity.title;
        paper.summary = entity.summary;
        paper.translated_summary = entity.translated_summary;
        paper.authors = entity.authors;
        paper.categories = entity.categories;
        paper.hashtags = entity.hashtags;
        paper.doi = entity.doi;
        paper.issued_at = entity.issued_at;
        paper.like_count = entity.like_count;
        paper.total_view_count = entity.total_view_count;
    }
}
