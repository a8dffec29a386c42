mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::paper;
use scholar_search::search::{SearchEngine, SearchIndex};
use scholar_search::store::InMemoryPaperStore;
use scholar_search::{
    PaperPatch, PaperRepository, RepositoryError, ResultSource, SearchConfig, SearchError,
    SearchQuery, SearchableEntity, SortField, SortOrder,
};

fn config(server: &MockServer) -> SearchConfig {
    SearchConfig {
        meilisearch_host: server.uri(),
        meilisearch_api_key: Some("master-key".to_string()),
        timeout: Duration::from_secs(2),
        ..SearchConfig::default()
    }
}

fn task(uid: u64) -> ResponseTemplate {
    ResponseTemplate::new(202).set_body_json(json!({ "taskUid": uid, "status": "enqueued" }))
}

async fn mount_task(server: &MockServer, uid: u64, status: &str) {
    let error = if status == "failed" {
        json!({ "message": "invalid settings", "code": "invalid_settings_ranking_rules" })
    } else {
        json!(null)
    };
    Mock::given(method("GET"))
        .and(path(format!("/tasks/{}", uid)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uid": uid,
            "status": status,
            "error": error
        })))
        .mount(server)
        .await;
}

async fn mount_healthy(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "available" })))
        .mount(server)
        .await;
}

/// An existing, configured `papers` index.
async fn mount_ready_index(server: &MockServer) {
    mount_healthy(server).await;
    Mock::given(method("GET"))
        .and(path("/indexes/papers"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "uid": "papers", "primaryKey": "id" })),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/indexes/papers/settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "searchableAttributes": ["title", "translatedSummary", "summary"],
            "filterableAttributes": ["categories", "authors", "issuedAt"]
        })))
        .mount(server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/indexes/papers/settings"))
        .respond_with(task(10))
        .mount(server)
        .await;
    mount_task(server, 10, "succeeded").await;
}

#[tokio::test]
async fn ensure_creates_missing_index_with_settings() {
    let server = MockServer::start().await;
    mount_healthy(&server).await;

    Mock::given(method("GET"))
        .and(path("/indexes/papers"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": "Index `papers` not found.",
            "code": "index_not_found"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/indexes"))
        .and(header("Authorization", "Bearer master-key"))
        .and(body_partial_json(json!({ "uid": "papers", "primaryKey": "id" })))
        .respond_with(task(1))
        .expect(1)
        .mount(&server)
        .await;
    mount_task(&server, 1, "succeeded").await;
    Mock::given(method("PATCH"))
        .and(path("/indexes/papers/settings"))
        .and(body_partial_json(json!({
            "searchableAttributes": ["title", "translatedSummary", "summary", "hashtags", "categories", "authors"],
            "rankingRules": ["words", "typo", "proximity", "attribute", "sort", "exactness"],
            "nonSeparatorTokens": ["+", "#"]
        })))
        .respond_with(task(2))
        .expect(1)
        .mount(&server)
        .await;
    mount_task(&server, 2, "succeeded").await;

    let engine = SearchEngine::from_config(&config(&server)).unwrap();
    assert!(engine.ensure_index_exists().await.unwrap());
}

#[tokio::test]
async fn failed_settings_drop_the_half_created_index() {
    let server = MockServer::start().await;
    mount_healthy(&server).await;

    Mock::given(method("GET"))
        .and(path("/indexes/papers"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": "Index `papers` not found.",
            "code": "index_not_found"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/indexes"))
        .respond_with(task(1))
        .mount(&server)
        .await;
    mount_task(&server, 1, "succeeded").await;
    Mock::given(method("PATCH"))
        .and(path("/indexes/papers/settings"))
        .respond_with(task(2))
        .mount(&server)
        .await;
    mount_task(&server, 2, "failed").await;
    Mock::given(method("DELETE"))
        .and(path("/indexes/papers"))
        .respond_with(task(3))
        .expect(1)
        .mount(&server)
        .await;
    mount_task(&server, 3, "succeeded").await;

    let engine = SearchEngine::from_config(&config(&server)).unwrap();
    let err = engine.ensure_index_exists().await.unwrap_err();
    assert!(matches!(err, SearchError::IndexCreation(_)), "{:?}", err);
}

#[tokio::test]
async fn index_with_lost_settings_is_recreated() {
    let server = MockServer::start().await;
    mount_healthy(&server).await;

    Mock::given(method("GET"))
        .and(path("/indexes/papers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "uid": "papers" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/indexes/papers/settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "searchableAttributes": ["*"],
            "filterableAttributes": []
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/indexes/papers"))
        .respond_with(task(1))
        .expect(1)
        .mount(&server)
        .await;
    mount_task(&server, 1, "succeeded").await;
    Mock::given(method("POST"))
        .and(path("/indexes"))
        .respond_with(task(2))
        .expect(1)
        .mount(&server)
        .await;
    mount_task(&server, 2, "succeeded").await;
    Mock::given(method("PATCH"))
        .and(path("/indexes/papers/settings"))
        .respond_with(task(3))
        .mount(&server)
        .await;
    mount_task(&server, 3, "succeeded").await;

    let engine = SearchEngine::from_config(&config(&server)).unwrap();
    assert!(engine.ensure_index_exists().await.unwrap());
}

#[tokio::test]
async fn search_sends_filter_and_sort_and_keeps_hit_order() {
    let server = MockServer::start().await;
    mount_ready_index(&server).await;

    let first = Uuid::from_u128(2);
    let second = Uuid::from_u128(1);
    Mock::given(method("POST"))
        .and(path("/indexes/papers/search"))
        .and(body_partial_json(json!({
            "filter": "(categories = \"nlp\" OR categories = \"vision\") AND issuedAt >= 1577836800 AND issuedAt < 1609459200",
            "sort": ["likeCount:desc", "id:asc"],
            "offset": 2,
            "limit": 2,
            "attributesToRetrieve": ["id"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": [{ "id": first }, { "id": second }],
            "estimatedTotalHits": 7
        })))
        .expect(1)
        .mount(&server)
        .await;

    let engine = SearchEngine::from_config(&config(&server)).unwrap();
    let hits = engine
        .search(
            &SearchQuery::new()
                .with_categories(["nlp", "vision"])
                .with_year(2020)
                .sorted_by(SortField::LikeCount, SortOrder::Desc)
                .paginate(2, 2),
        )
        .await
        .unwrap();

    assert_eq!(hits.ids, vec![first, second]);
    assert_eq!(hits.total_estimate, 7);
}

#[tokio::test]
async fn rejected_search_is_a_client_error_not_a_fallback() {
    let server = MockServer::start().await;
    mount_ready_index(&server).await;

    Mock::given(method("POST"))
        .and(path("/indexes/papers/search"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "message": "Attribute `likeCount` is not sortable.",
            "code": "invalid_search_sort"
        })))
        .mount(&server)
        .await;

    let engine = Arc::new(SearchEngine::from_config(&config(&server)).unwrap());
    let store = Arc::new(InMemoryPaperStore::with_papers(vec![paper(1)]));
    let repository = PaperRepository::new(store, engine);

    let err = repository
        .list(&SearchQuery::new().sorted_by(SortField::LikeCount, SortOrder::Desc))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::InvalidQuery(_)), "{:?}", err);
}

#[tokio::test]
async fn unhealthy_server_falls_back_to_the_store() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let engine = Arc::new(SearchEngine::from_config(&config(&server)).unwrap());
    assert!(!engine.ensure_index_exists().await.unwrap());

    let store = Arc::new(InMemoryPaperStore::with_papers(vec![paper(1)]));
    let repository = PaperRepository::new(store, engine.clone());
    let page = repository.list(&SearchQuery::new()).await.unwrap();
    assert_eq!(page.source, ResultSource::Relational);
    assert_eq!(page.items.len(), 1);

    let status = engine.status().await.unwrap();
    assert!(status.enabled);
    assert!(!status.reachable);
}

#[tokio::test]
async fn document_writes_use_timestamps_and_partial_bodies() {
    let server = MockServer::start().await;
    mount_ready_index(&server).await;

    let mut dated = paper(1);
    dated.issued_at = chrono::NaiveDate::from_ymd_opt(2020, 1, 1);

    Mock::given(method("POST"))
        .and(path("/indexes/papers/documents"))
        .and(query_param("primaryKey", "id"))
        .and(body_partial_json(json!([{ "id": dated.id, "issuedAt": 1577836800 }])))
        .respond_with(task(20))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/indexes/papers/documents/{}", dated.id)))
        .and(query_param("fields", "id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": dated.id })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/indexes/papers/documents"))
        .and(body_partial_json(json!([{ "id": dated.id, "likeCount": 3 }])))
        .respond_with(task(21))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("/indexes/papers/documents/{}", dated.id)))
        .respond_with(task(22))
        .expect(1)
        .mount(&server)
        .await;

    let engine = SearchEngine::from_config(&config(&server)).unwrap();
    engine
        .index_document(&SearchableEntity::from(&dated))
        .await
        .unwrap();
    engine
        .update_document(&PaperPatch::new(dated.id).with_like_count(3))
        .await
        .unwrap();
    engine.delete_document(&dated.id).await.unwrap();
}

#[tokio::test]
async fn patching_a_missing_document_is_not_found_and_writes_nothing() {
    let server = MockServer::start().await;
    mount_ready_index(&server).await;

    let id = Uuid::from_u128(404);
    Mock::given(method("GET"))
        .and(path(format!("/indexes/papers/documents/{}", id)))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": format!("Document `{}` not found.", id),
            "code": "document_not_found",
            "type": "invalid_request"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/indexes/papers/documents"))
        .respond_with(task(30))
        .expect(0)
        .mount(&server)
        .await;

    let engine = SearchEngine::from_config(&config(&server)).unwrap();
    let err = engine
        .update_document(&PaperPatch::new(id).with_like_count(1))
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::DocumentNotFound(_)), "{:?}", err);
}
