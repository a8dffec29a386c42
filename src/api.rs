//! Thin HTTP surface over the paper repository.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

use crate::error::{RepositoryError, SearchError};
use crate::repository::{PaginatedResult, PaperRepository, ReindexReport};
use crate::search::{IndexStatus, SearchQuery};
use crate::Paper;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct Message {
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiError {
    pub error: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError {
            error: message.into(),
        }),
    )
}

impl From<RepositoryError> for (StatusCode, Json<ApiError>) {
    fn from(err: RepositoryError) -> Self {
        if err.is_client_error() {
            return bad_request(err.to_string());
        }
        error!(error = %err, "Request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError {
                error: err.to_string(),
            }),
        )
    }
}

// ============================================================================
// Query Parameters
// ============================================================================

/// `GET /api/papers` parameters. List filters are comma-separated.
#[derive(Deserialize, Debug, Default)]
pub struct ListParams {
    pub q: Option<String>,
    pub categories: Option<String>,
    pub authors: Option<String>,
    pub year: Option<i32>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl ListParams {
    pub fn to_query(&self) -> Result<SearchQuery, SearchError> {
        let defaults = SearchQuery::default();

        Ok(SearchQuery {
            text: self.q.clone(),
            categories: split_list(self.categories.as_deref()),
            authors: split_list(self.authors.as_deref()),
            year: self.year,
            sort_by: match self.sort_by.as_deref() {
                Some(field) => field.parse()?,
                None => defaults.sort_by,
            },
            sort_order: match self.sort_order.as_deref() {
                Some(order) => order.parse()?,
                None => defaults.sort_order,
            },
            page: self.page.unwrap_or(defaults.page),
            limit: self.limit.unwrap_or(defaults.limit),
        })
    }
}

// ============================================================================
// App State
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<PaperRepository>,
}

// ============================================================================
// Router Setup
// ============================================================================

pub fn create_app(repository: Arc<PaperRepository>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let state = AppState { repository };

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/papers", get(list_papers))
        .route("/api/search/status", get(search_status))
        .route("/api/search/reindex", post(reindex))
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_check() -> Json<Message> {
    Json(Message {
        message: "Backend is running!".to_string(),
    })
}

async fn list_papers(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<PaginatedResult<Paper>> {
    let query = params.to_query().map_err(|e| bad_request(e.to_string()))?;
    let page = state.repository.list(&query).await?;
    Ok(Json(page))
}

async fn search_status(State(state): State<AppState>) -> ApiResult<IndexStatus> {
    Ok(Json(state.repository.status().await?))
}

async fn reindex(State(state): State<AppState>) -> ApiResult<ReindexReport> {
    Ok(Json(state.repository.reindex_all().await?))
}
