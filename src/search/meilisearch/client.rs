//! Meilisearch driver over its REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::BackendKind;
use crate::error::SearchError;
use crate::search::backend::{IndexStats, SearchBackend};
use crate::search::descriptor::IndexDescriptor;
use crate::search::document::{PaperPatch, SearchableEntity};
use crate::search::meilisearch::queries::{document_body, patch_body, search_body};
use crate::search::query::{QueryPlan, SearchHits};

const TASK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Error payload returned by Meilisearch.
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskRef {
    task_uid: u64,
}

#[derive(Debug, Deserialize)]
struct TaskState {
    status: String,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponseBody {
    hits: Vec<Value>,
    #[serde(default)]
    estimated_total_hits: Option<u64>,
    #[serde(default)]
    total_hits: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsBody {
    number_of_documents: u64,
    #[serde(default)]
    is_indexing: bool,
}

/// Meilisearch client.
///
/// # Example
///
/// ```ignore
/// let backend = MeilisearchBackend::new("http://localhost:7700", None, Duration::from_secs(5))?;
/// let engine = SearchEngine::new(Arc::new(backend), &config);
/// engine.ensure_index_exists().await?;
/// ```
pub struct MeilisearchBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    task_timeout: Duration,
}

impl MeilisearchBackend {
    /// Create a client for the given host.
    ///
    /// # Arguments
    ///
    /// * `host` - The Meilisearch URL (e.g., "http://localhost:7700")
    /// * `api_key` - Optional key sent as a bearer token
    /// * `timeout` - Per-request timeout, also the budget for awaited tasks
    pub fn new(
        host: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SearchError> {
        let parsed = Url::parse(host).map_err(|e| SearchError::unavailable(e.to_string()))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::unavailable(e.to_string()))?;

        info!(url = %parsed, authenticated = api_key.is_some(), "Created Meilisearch client");

        Ok(Self {
            client,
            base_url: host.trim_end_matches('/').to_string(),
            api_key,
            task_timeout: timeout,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match self.api_key {
            Some(ref key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Send a request and decode a JSON body, mapping error statuses.
    async fn send(&self, builder: RequestBuilder) -> Result<Value, SearchError> {
        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            if status == StatusCode::NO_CONTENT {
                return Ok(Value::Null);
            }
            return Ok(response.json::<Value>().await?);
        }

        let text = response.text().await.unwrap_or_default();
        let body: ApiErrorBody = serde_json::from_str(&text).unwrap_or_else(|_| ApiErrorBody {
            message: text.clone(),
            code: String::new(),
        });
        Err(map_api_error(status, body))
    }

    /// Send a request that enqueues a task and return the task id.
    async fn enqueue(&self, builder: RequestBuilder) -> Result<u64, SearchError> {
        let value = self.send(builder).await?;
        let task: TaskRef = serde_json::from_value(value)?;
        Ok(task.task_uid)
    }

    /// Poll a task until it finishes.
    async fn wait_for_task(&self, task_uid: u64) -> Result<(), SearchError> {
        let deadline = Instant::now() + self.task_timeout;

        loop {
            let value = self
                .send(self.request(Method::GET, &format!("/tasks/{}", task_uid)))
                .await?;
            let task: TaskState = serde_json::from_value(value)?;

            match task.status.as_str() {
                "succeeded" => return Ok(()),
                "failed" | "canceled" => {
                    let err = task.error.unwrap_or_default();
                    error!(task_uid, code = %err.code, message = %err.message, "Task failed");
                    return Err(SearchError::request(format!(
                        "task {} {}: {} ({})",
                        task_uid, task.status, err.message, err.code
                    )));
                }
                _ => {}
            }

            if Instant::now() >= deadline {
                return Err(SearchError::Timeout(self.task_timeout));
            }
            tokio::time::sleep(TASK_POLL_INTERVAL).await;
        }
    }

    async fn patch_settings(&self, descriptor: &IndexDescriptor) -> Result<(), SearchError> {
        let task = self
            .enqueue(
                self.request(
                    Method::PATCH,
                    &format!("/indexes/{}/settings", descriptor.name),
                )
                .json(&descriptor.settings_json()),
            )
            .await?;
        self.wait_for_task(task).await
    }
}

/// Translate an error status and body into a [`SearchError`].
fn map_api_error(status: StatusCode, body: ApiErrorBody) -> SearchError {
    let detail = format!("{} ({}): {}", status.as_u16(), body.code, body.message);
    match (status.as_u16(), body.code.as_str()) {
        (_, "document_not_found") | (_, "index_not_found") => {
            SearchError::DocumentNotFound(detail)
        }
        (400, code) if code.starts_with("invalid_search") => SearchError::invalid_query(detail),
        (502..=504, _) => SearchError::unavailable(detail),
        _ => SearchError::request(detail),
    }
}

#[async_trait]
impl SearchBackend for MeilisearchBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Meilisearch
    }

    async fn health(&self) -> Result<bool, SearchError> {
        let response = self.request(Method::GET, "/health").send().await?;
        if !response.status().is_success() {
            return Ok(false);
        }
        let body: Value = response.json().await?;
        Ok(body["status"] == "available")
    }

    async fn index_exists(&self, descriptor: &IndexDescriptor) -> Result<bool, SearchError> {
        match self
            .send(self.request(Method::GET, &format!("/indexes/{}", descriptor.name)))
            .await
        {
            Ok(_) => Ok(true),
            Err(SearchError::DocumentNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, descriptor), fields(index = %descriptor.name))]
    async fn create_index(&self, descriptor: &IndexDescriptor) -> Result<(), SearchError> {
        let task = self
            .enqueue(self.request(Method::POST, "/indexes").json(&json!({
                "uid": descriptor.name,
                "primaryKey": descriptor.primary_key
            })))
            .await
            .map_err(|e| SearchError::index_creation(e.to_string()))?;
        self.wait_for_task(task)
            .await
            .map_err(|e| SearchError::index_creation(e.to_string()))?;

        if let Err(e) = self.patch_settings(descriptor).await {
            // Never leave an index without its settings behind
            error!(error = %e, "Applying settings failed, dropping new index");
            if let Err(cleanup) = self.delete_index(descriptor).await {
                warn!(error = %cleanup, "Failed to drop half-created index");
            }
            return Err(SearchError::index_creation(e.to_string()));
        }

        debug!("Index created with settings");
        Ok(())
    }

    async fn apply_settings(&self, descriptor: &IndexDescriptor) -> Result<(), SearchError> {
        self.patch_settings(descriptor).await
    }

    async fn settings_present(&self, descriptor: &IndexDescriptor) -> Result<bool, SearchError> {
        let settings = self.current_settings(descriptor).await?;

        let searchable_default = settings["searchableAttributes"] == json!(["*"]);
        let filterable_empty = settings["filterableAttributes"]
            .as_array()
            .map_or(true, |a| a.is_empty());

        Ok(!searchable_default && !filterable_empty)
    }

    async fn current_settings(&self, descriptor: &IndexDescriptor) -> Result<Value, SearchError> {
        self.send(self.request(
            Method::GET,
            &format!("/indexes/{}/settings", descriptor.name),
        ))
        .await
    }

    #[instrument(skip(self, descriptor), fields(index = %descriptor.name))]
    async fn delete_index(&self, descriptor: &IndexDescriptor) -> Result<(), SearchError> {
        let task = match self
            .enqueue(self.request(Method::DELETE, &format!("/indexes/{}", descriptor.name)))
            .await
        {
            Ok(task) => task,
            Err(SearchError::DocumentNotFound(_)) => {
                debug!("Index already absent");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        self.wait_for_task(task).await
    }

    async fn upsert_document(
        &self,
        descriptor: &IndexDescriptor,
        entity: &SearchableEntity,
    ) -> Result<(), SearchError> {
        let body = json!([document_body(entity)?]);
        let task = self
            .enqueue(
                self.request(
                    Method::POST,
                    &format!("/indexes/{}/documents", descriptor.name),
                )
                .query(&[("primaryKey", descriptor.primary_key.as_str())])
                .json(&body),
            )
            .await?;
        debug!(id = %entity.id, task_uid = task, "Document upsert enqueued");
        Ok(())
    }

    async fn patch_document(
        &self,
        descriptor: &IndexDescriptor,
        patch: &PaperPatch,
    ) -> Result<(), SearchError> {
        // PUT would create a partial document for an unknown id
        self.send(
            self.request(
                Method::GET,
                &format!("/indexes/{}/documents/{}", descriptor.name, patch.id),
            )
            .query(&[("fields", descriptor.primary_key.as_str())]),
        )
        .await?;

        // PUT merges the given fields into the stored document
        let body = json!([patch_body(patch)?]);
        let task = self
            .enqueue(
                self.request(
                    Method::PUT,
                    &format!("/indexes/{}/documents", descriptor.name),
                )
                .json(&body),
            )
            .await?;
        debug!(id = %patch.id, task_uid = task, "Document update enqueued");
        Ok(())
    }

    async fn delete_document(
        &self,
        descriptor: &IndexDescriptor,
        id: &Uuid,
    ) -> Result<(), SearchError> {
        let task = self
            .enqueue(self.request(
                Method::DELETE,
                &format!("/indexes/{}/documents/{}", descriptor.name, id),
            ))
            .await?;
        debug!(id = %id, task_uid = task, "Document delete enqueued");
        Ok(())
    }

    async fn execute(
        &self,
        descriptor: &IndexDescriptor,
        plan: &QueryPlan,
    ) -> Result<SearchHits, SearchError> {
        let value = self
            .send(
                self.request(
                    Method::POST,
                    &format!("/indexes/{}/search", descriptor.name),
                )
                .json(&search_body(plan)),
            )
            .await?;
        let response: SearchResponseBody = serde_json::from_value(value)?;

        let ids = response
            .hits
            .iter()
            .filter_map(|hit| {
                let id = hit[descriptor.primary_key.as_str()].as_str()?;
                match Uuid::parse_str(id) {
                    Ok(id) => Some(id),
                    Err(_) => {
                        warn!(id, "Skipping hit with malformed id");
                        None
                    }
                }
            })
            .collect();

        Ok(SearchHits {
            ids,
            total_estimate: response
                .estimated_total_hits
                .or(response.total_hits)
                .unwrap_or_default(),
        })
    }

    async fn stats(&self, descriptor: &IndexDescriptor) -> Result<IndexStats, SearchError> {
        let value = self
            .send(self.request(
                Method::GET,
                &format!("/indexes/{}/stats", descriptor.name),
            ))
            .await?;
        let stats: StatsBody = serde_json::from_value(value)?;
        Ok(IndexStats {
            document_count: stats.number_of_documents,
            is_indexing: stats.is_indexing,
        })
    }
}
