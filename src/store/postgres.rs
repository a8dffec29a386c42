//! Postgres-backed paper store.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::search::{PaperPatch, SortOrder};
use crate::store::{PaperFilter, PaperSort, PaperStore};
use crate::{NewPaper, Paper};

const PAPER_COLUMNS: &str = "id, external_id, title, summary, translated_summary, authors, \
     categories, hashtags, doi, issued_at, created_at, like_count, total_view_count";

/// Escape `LIKE` wildcards so user text matches literally.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn lowered(values: &[String]) -> Vec<String> {
    values.iter().map(|v| v.to_lowercase()).collect()
}

/// `column` holds at least one of `values`, ignoring case.
fn push_any_of(builder: &mut QueryBuilder<'static, Postgres>, column: &str, values: &[String]) {
    builder
        .push(format!(
            " AND EXISTS (SELECT 1 FROM unnest({}) AS v WHERE lower(v) = ANY(",
            column
        ))
        .push_bind(lowered(values))
        .push("))");
}

fn push_filter(builder: &mut QueryBuilder<'static, Postgres>, filter: &PaperFilter) {
    builder.push(" WHERE TRUE");

    if !filter.categories.is_empty() {
        push_any_of(builder, "categories", &filter.categories);
    }
    if !filter.authors.is_empty() {
        push_any_of(builder, "authors", &filter.authors);
    }
    if let Some((start, end)) = filter.issued_between {
        builder
            .push(" AND issued_at >= ")
            .push_bind(start)
            .push(" AND issued_at < ")
            .push_bind(end);
    }
    if let Some(ref text) = filter.text {
        let pattern = format!("%{}%", escape_like(text));
        builder
            .push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR summary ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR array_to_string(authors, ' ') ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn select_query(
    filter: &PaperFilter,
    sort: PaperSort,
    skip: u64,
    take: u64,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT {} FROM papers", PAPER_COLUMNS));
    push_filter(&mut builder, filter);

    let direction = match sort.order {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    };
    builder.push(format!(
        " ORDER BY {} {} NULLS LAST, id ASC LIMIT ",
        sort.field.column(),
        direction
    ));
    builder
        .push_bind(take as i64)
        .push(" OFFSET ")
        .push_bind(skip as i64);
    builder
}

fn count_query(filter: &PaperFilter) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM papers");
    push_filter(&mut builder, filter);
    builder
}

/// `None` when the patch carries no fields.
fn update_query(patch: &PaperPatch) -> Option<QueryBuilder<'static, Postgres>> {
    let mut builder = QueryBuilder::new("UPDATE papers SET ");
    let mut any = false;

    {
        let mut set = builder.separated(", ");
        if let Some(ref title) = patch.title {
            set.push("title = ").push_bind_unseparated(title.clone());
            any = true;
        }
        if let Some(ref summary) = patch.summary {
            set.push("summary = ").push_bind_unseparated(summary.clone());
            any = true;
        }
        if let Some(ref translated) = patch.translated_summary {
            set.push("translated_summary = ")
                .push_bind_unseparated(translated.clone());
            any = true;
        }
        if let Some(ref authors) = patch.authors {
            set.push("authors = ").push_bind_unseparated(authors.clone());
            any = true;
        }
        if let Some(ref categories) = patch.categories {
            set.push("categories = ")
                .push_bind_unseparated(categories.clone());
            any = true;
        }
        if let Some(ref hashtags) = patch.hashtags {
            set.push("hashtags = ").push_bind_unseparated(hashtags.clone());
            any = true;
        }
        if let Some(ref doi) = patch.doi {
            set.push("doi = ").push_bind_unseparated(doi.clone());
            any = true;
        }
        if let Some(issued_at) = patch.issued_at {
            set.push("issued_at = ").push_bind_unseparated(issued_at);
            any = true;
        }
        if let Some(like_count) = patch.like_count {
            set.push("like_count = ").push_bind_unseparated(like_count);
            any = true;
        }
        if let Some(total_view_count) = patch.total_view_count {
            set.push("total_view_count = ")
                .push_bind_unseparated(total_view_count);
            any = true;
        }
    }

    if !any {
        return None;
    }

    builder
        .push(" WHERE id = ")
        .push_bind(patch.id)
        .push(format!(" RETURNING {}", PAPER_COLUMNS));
    Some(builder)
}

/// Paper store over a Postgres pool.
#[derive(Clone)]
pub struct PgPaperStore {
    pool: PgPool,
}

impl PgPaperStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Paper, StoreError> {
        sqlx::query_as::<_, Paper>(&format!(
            "SELECT {} FROM papers WHERE id = $1",
            PAPER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound(*id))
    }
}

#[async_trait]
impl PaperStore for PgPaperStore {
    async fn find_many_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Paper>, StoreError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let papers = sqlx::query_as::<_, Paper>(&format!(
            "SELECT {} FROM papers WHERE id = ANY($1)",
            PAPER_COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(papers)
    }

    async fn find_many(
        &self,
        filter: &PaperFilter,
        sort: PaperSort,
        skip: u64,
        take: u64,
    ) -> Result<Vec<Paper>, StoreError> {
        let mut query = select_query(filter, sort, skip, take);
        let papers = query
            .build_query_as::<Paper>()
            .fetch_all(&self.pool)
            .await?;
        debug!(returned = papers.len(), skip, take, "Relational page fetched");
        Ok(papers)
    }

    async fn count(&self, filter: &PaperFilter) -> Result<u64, StoreError> {
        let mut query = count_query(filter);
        let (count,): (i64,) = query.build_query_as().fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    async fn find_batch(&self, skip: u64, take: u64) -> Result<Vec<Paper>, StoreError> {
        let papers = sqlx::query_as::<_, Paper>(&format!(
            "SELECT {} FROM papers ORDER BY id ASC LIMIT $1 OFFSET $2",
            PAPER_COLUMNS
        ))
        .bind(take as i64)
        .bind(skip as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(papers)
    }

    async fn create(&self, paper: NewPaper) -> Result<Paper, StoreError> {
        let created = sqlx::query_as::<_, Paper>(&format!(
            r#"
            INSERT INTO papers ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {}
            "#,
            PAPER_COLUMNS, PAPER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&paper.external_id)
        .bind(&paper.title)
        .bind(&paper.summary)
        .bind(&paper.translated_summary)
        .bind(&paper.authors)
        .bind(&paper.categories)
        .bind(&paper.hashtags)
        .bind(&paper.doi)
        .bind(paper.issued_at)
        .bind(Utc::now())
        .bind(paper.like_count.max(0))
        .bind(paper.total_view_count.max(0))
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn update(&self, patch: &PaperPatch) -> Result<Paper, StoreError> {
        let Some(mut query) = update_query(patch) else {
            return self.find_by_id(&patch.id).await;
        };

        query
            .build_query_as::<Paper>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound(patch.id))
    }

    async fn delete(&self, id: &Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM papers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(*id));
        }
        Ok(())
    }
}
