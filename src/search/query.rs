//! Search requests and the backend-neutral plan they compile to.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SearchError;
use crate::search::descriptor::{
    IndexDescriptor, AUTHORS, CATEGORIES, CREATED_AT, ISSUED_AT, LIKE_COUNT, PRIMARY_KEY,
    TOTAL_VIEW_COUNT,
};

/// Largest page size a caller may ask for.
pub const MAX_PAGE_SIZE: u32 = 100;

pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Field a listing can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    IssuedAt,
    LikeCount,
    ViewCount,
}

impl SortField {
    /// Attribute name in the search index.
    pub fn attribute(&self) -> &'static str {
        match self {
            Self::CreatedAt => CREATED_AT,
            Self::IssuedAt => ISSUED_AT,
            Self::LikeCount => LIKE_COUNT,
            Self::ViewCount => TOTAL_VIEW_COUNT,
        }
    }

    /// Column name in the `papers` table.
    pub fn column(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::IssuedAt => "issued_at",
            Self::LikeCount => "like_count",
            Self::ViewCount => "total_view_count",
        }
    }
}

impl FromStr for SortField {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created_at" | "createdAt" => Ok(Self::CreatedAt),
            "issued_at" | "issuedAt" => Ok(Self::IssuedAt),
            "like_count" | "likeCount" => Ok(Self::LikeCount),
            "view_count" | "viewCount" | "total_view_count" | "totalViewCount" => {
                Ok(Self::ViewCount)
            }
            other => Err(SearchError::invalid_query(format!(
                "unknown sort field: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl FromStr for SortOrder {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(SearchError::invalid_query(format!(
                "unknown sort order: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A listing request: optional text, filters, sort and 1-based pagination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: Option<String>,
    /// Papers in any of these categories.
    pub categories: Vec<String>,
    /// Papers by any of these authors.
    pub authors: Vec<String>,
    /// Papers issued during this calendar year.
    pub year: Option<i32>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
    pub page: u32,
    pub limit: u32,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            text: None,
            categories: Vec::new(),
            authors: Vec::new(),
            year: None,
            sort_by: SortField::default(),
            sort_order: SortOrder::default(),
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors = authors.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn sorted_by(mut self, field: SortField, order: SortOrder) -> Self {
        self.sort_by = field;
        self.sort_order = order;
        self
    }

    pub fn paginate(mut self, page: u32, limit: u32) -> Self {
        self.page = page;
        self.limit = limit;
        self
    }

    /// The trimmed free-text term, if there is one.
    pub fn term(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    /// Number of results skipped before this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    /// Half-open `[year-01-01, (year+1)-01-01)` window for the year filter.
    pub fn year_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        let year = self.year?;
        let start = NaiveDate::from_ymd_opt(year, 1, 1)?;
        let end = NaiveDate::from_ymd_opt(year.checked_add(1)?, 1, 1)?;
        Some((start, end))
    }

    /// Reject requests no backend could answer.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.page == 0 {
            return Err(SearchError::invalid_query("page must be at least 1"));
        }
        if self.limit == 0 || self.limit > MAX_PAGE_SIZE {
            return Err(SearchError::invalid_query(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        if self.year.is_some() && self.year_bounds().is_none() {
            return Err(SearchError::invalid_query("year is out of range"));
        }
        Ok(())
    }

    /// Lower-cased categories without blanks or duplicates, in request order.
    pub fn category_set(&self) -> Vec<String> {
        distinct(&self.categories)
    }

    /// Lower-cased authors without blanks or duplicates, in request order.
    pub fn author_set(&self) -> Vec<String> {
        distinct(&self.authors)
    }
}

/// Filters match without regard to case, so values are lower-cased here.
fn distinct(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
        let value = value.to_lowercase();
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

/// One AND-ed clause of a plan.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterClause {
    /// The attribute holds at least one of the values.
    AnyOf {
        attribute: String,
        values: Vec<String>,
    },
    /// `start <= attribute < end`.
    DateRange {
        attribute: String,
        start: NaiveDate,
        end: NaiveDate,
    },
}

/// How matches are ordered.
#[derive(Debug, Clone, PartialEq)]
pub enum Ranking {
    /// Free text present: relevance decides, the requested sort is ignored.
    Relevance { text: String },
    /// No free text: no scoring, the requested field decides, ties broken by id.
    Sorted { attribute: String, order: SortOrder },
}

/// A validated query ready for a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub filters: Vec<FilterClause>,
    pub ranking: Ranking,
    pub offset: usize,
    pub limit: usize,
    /// Secondary sort key used by every `Sorted` plan.
    pub tie_breaker: String,
}

impl QueryPlan {
    /// Compile a query against the descriptor.
    pub fn build(query: &SearchQuery, descriptor: &IndexDescriptor) -> Result<Self, SearchError> {
        query.validate()?;

        let mut filters = Vec::new();

        let categories = query.category_set();
        if !categories.is_empty() {
            filters.push(any_of(descriptor, CATEGORIES, categories)?);
        }

        let authors = query.author_set();
        if !authors.is_empty() {
            filters.push(any_of(descriptor, AUTHORS, authors)?);
        }

        if let Some((start, end)) = query.year_bounds() {
            require_filterable(descriptor, ISSUED_AT)?;
            filters.push(FilterClause::DateRange {
                attribute: ISSUED_AT.to_string(),
                start,
                end,
            });
        }

        let ranking = match query.term() {
            Some(text) => Ranking::Relevance {
                text: text.to_string(),
            },
            None => {
                let attribute = query.sort_by.attribute();
                if !descriptor.is_sortable(attribute) {
                    return Err(SearchError::invalid_query(format!(
                        "attribute {} is not sortable",
                        attribute
                    )));
                }
                Ranking::Sorted {
                    attribute: attribute.to_string(),
                    order: query.sort_order,
                }
            }
        };

        Ok(Self {
            filters,
            ranking,
            offset: query.offset() as usize,
            limit: query.limit as usize,
            tie_breaker: PRIMARY_KEY.to_string(),
        })
    }
}

fn require_filterable(descriptor: &IndexDescriptor, attribute: &str) -> Result<(), SearchError> {
    if descriptor.is_filterable(attribute) {
        Ok(())
    } else {
        Err(SearchError::invalid_query(format!(
            "attribute {} is not filterable",
            attribute
        )))
    }
}

fn any_of(
    descriptor: &IndexDescriptor,
    attribute: &str,
    values: Vec<String>,
) -> Result<FilterClause, SearchError> {
    require_filterable(descriptor, attribute)?;
    Ok(FilterClause::AnyOf {
        attribute: attribute.to_string(),
        values,
    })
}

/// Ordered ids for one page plus the backend's estimate of all matches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchHits {
    pub ids: Vec<Uuid>,
    pub total_estimate: u64,
}
