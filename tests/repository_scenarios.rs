mod common;

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use common::*;
use scholar_search::search::{SearchEngine, SearchIndex};
use scholar_search::store::{InMemoryPaperStore, PaperStore};
use scholar_search::{
    NewPaper, PaperPatch, PaperRepository, RepositoryError, ResultSource, SearchConfig,
    SearchQuery, SearchableEntity, SortField, SortOrder,
};

fn scenario_a_papers() -> Vec<scholar_search::Paper> {
    vec![
        with_categories(paper(1), &["nlp"]),
        with_categories(paper(2), &["vision"]),
        with_categories(paper(3), &["nlp", "vision"]),
    ]
}

#[tokio::test]
async fn category_filter_returns_matches_in_requested_order() {
    let (repository, _, _) = indexed_repository(scenario_a_papers()).await;

    let asc = repository
        .list(
            &SearchQuery::new()
                .with_categories(["nlp"])
                .sorted_by(SortField::CreatedAt, SortOrder::Asc),
        )
        .await
        .unwrap();
    assert_eq!(asc.source, ResultSource::SearchEngine);
    assert_eq!(ids(&asc.items), vec![Uuid::from_u128(1), Uuid::from_u128(3)]);
    assert_eq!(asc.total, 2);

    let desc = repository
        .list(
            &SearchQuery::new()
                .with_categories(["nlp"])
                .sorted_by(SortField::CreatedAt, SortOrder::Desc),
        )
        .await
        .unwrap();
    assert_eq!(ids(&desc.items), vec![Uuid::from_u128(3), Uuid::from_u128(1)]);
}

#[tokio::test]
async fn disabled_backend_serves_exact_relational_pages() {
    let papers = [5, 1, 9, 3, 7]
        .iter()
        .enumerate()
        .map(|(i, likes)| with_likes(paper(i as u128 + 1), *likes))
        .collect::<Vec<_>>();
    let store = Arc::new(InMemoryPaperStore::with_papers(papers));
    let repository = PaperRepository::new(store, disabled_engine());

    let page = repository
        .list(
            &SearchQuery::new()
                .sorted_by(SortField::LikeCount, SortOrder::Desc)
                .paginate(1, 2),
        )
        .await
        .unwrap();

    let likes: Vec<i64> = page.items.iter().map(|p| p.like_count).collect();
    assert_eq!(likes, vec![9, 7]);
    assert_eq!(page.total, 5);
    assert_eq!(page.total_pages, 3);
    assert!(page.total_is_exact);
    assert_eq!(page.source, ResultSource::Relational);
}

#[tokio::test]
async fn writes_succeed_when_the_index_throws() {
    let store = Arc::new(InMemoryPaperStore::new());
    let repository = PaperRepository::new(store.clone(), Arc::new(FailingIndex));

    let created = repository
        .create_paper(NewPaper {
            external_id: "2401.99999".to_string(),
            title: "Robust Writes".to_string(),
            summary: "Index outages must not lose data".to_string(),
            categories: vec!["systems".to_string()],
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(store.len().await, 1);

    let updated = repository
        .update_paper(&PaperPatch::new(created.id).with_like_count(4))
        .await
        .unwrap();
    assert_eq!(updated.like_count, 4);
    assert_eq!(updated.title, "Robust Writes");

    // Reads fall back to the store
    let page = repository.list(&SearchQuery::new()).await.unwrap();
    assert_eq!(page.source, ResultSource::Relational);
    assert_eq!(ids(&page.items), vec![created.id]);

    repository.delete_paper(&created.id).await.unwrap();
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn reindex_counts_batches_lost_to_an_unreachable_backend() {
    let papers: Vec<_> = (1..=250).map(paper).collect();
    let store = Arc::new(InMemoryPaperStore::with_papers(papers));
    let engine = Arc::new(SearchEngine::new(
        Arc::new(FadingBackend::new(100)),
        &SearchConfig::in_memory(),
    ));
    let repository = PaperRepository::new(store, engine.clone()).with_batch_size(100);

    let report = repository.reindex_all().await.unwrap();
    assert_eq!(report.batches, 3);
    assert_eq!(report.total, 250);
    assert_eq!(report.indexed, 100);
    assert_eq!(report.failed, 150);

    // Single writes surface the outage too
    let err = engine
        .index_document(&SearchableEntity::from(&paper(251)))
        .await
        .unwrap_err();
    assert!(err.is_unavailable(), "{:?}", err);
}

#[tokio::test]
async fn writes_to_a_disabled_index_are_no_ops() {
    let engine = disabled_engine();
    let entity = SearchableEntity::from(&paper(1));

    engine.index_document(&entity).await.unwrap();
    engine
        .update_document(&PaperPatch::new(entity.id).with_like_count(2))
        .await
        .unwrap();
    engine.delete_document(&entity.id).await.unwrap();
    assert_eq!(engine.index_batch(&[entity]).await.unwrap().len(), 1);
}

#[tokio::test]
async fn reindex_skips_failures_and_keeps_going() {
    let papers: Vec<_> = (1..=250).map(paper).collect();
    let rejected = Uuid::from_u128(150);

    let store = Arc::new(InMemoryPaperStore::with_papers(papers));
    let engine = tantivy_engine();
    let flaky = Arc::new(FlakyIndex::new(engine.clone(), [rejected]));
    let repository = PaperRepository::new(store, flaky).with_batch_size(100);

    let report = repository.reindex_all().await.unwrap();
    assert_eq!(report.batches, 3);
    assert_eq!(report.total, 250);
    assert_eq!(report.indexed, 249);
    assert_eq!(report.failed, 1);

    let status = engine.status().await.unwrap();
    assert_eq!(status.document_count, Some(249));

    // Later batches made it in
    let hits = engine
        .search(&SearchQuery::new().sorted_by(SortField::CreatedAt, SortOrder::Desc).paginate(1, 1))
        .await
        .unwrap();
    assert_eq!(hits.ids, vec![Uuid::from_u128(250)]);
}

fn equivalence_papers() -> Vec<scholar_search::Paper> {
    let categories: [&[&str]; 4] = [&["nlp"], &["vision"], &["nlp", "vision"], &["robotics"]];
    (1..=16u128)
        .map(|n| {
            let mut p = with_categories(paper(n), categories[(n % 4) as usize]);
            p.like_count = (n % 5) as i64;
            p.total_view_count = ((n * 7) % 11) as i64;
            if n % 3 != 0 {
                p = issued(p, 2019 + (n % 3) as i32, (n % 12) as u32 + 1);
            }
            if n % 2 == 0 {
                p.authors = vec!["Grace Hopper".to_string(), "Alan Turing".to_string()];
            }
            p
        })
        .collect()
}

#[tokio::test]
async fn search_and_relational_paths_agree_without_text() {
    let papers = equivalence_papers();
    let (search_repo, store, _) = indexed_repository(papers).await;
    let relational_repo = PaperRepository::new(store, disabled_engine());

    let queries = vec![
        SearchQuery::new(),
        SearchQuery::new()
            .with_categories(["nlp"])
            .sorted_by(SortField::IssuedAt, SortOrder::Asc)
            .paginate(1, 3),
        SearchQuery::new()
            .with_categories(["nlp"])
            .sorted_by(SortField::IssuedAt, SortOrder::Asc)
            .paginate(3, 3),
        SearchQuery::new()
            .with_categories(["nlp", "vision"])
            .with_year(2020)
            .sorted_by(SortField::IssuedAt, SortOrder::Desc),
        SearchQuery::new()
            .with_authors(["Grace Hopper"])
            .sorted_by(SortField::LikeCount, SortOrder::Desc)
            .paginate(2, 4),
        SearchQuery::new()
            .with_year(2021)
            .sorted_by(SortField::ViewCount, SortOrder::Asc),
        SearchQuery::new().sorted_by(SortField::IssuedAt, SortOrder::Desc),
        SearchQuery::new()
            .with_categories(["NLP", "Robotics"])
            .sorted_by(SortField::LikeCount, SortOrder::Asc),
        SearchQuery::new()
            .with_authors(["grace hopper"])
            .sorted_by(SortField::CreatedAt, SortOrder::Asc),
    ];

    for query in queries {
        let from_search = search_repo.list(&query).await.unwrap();
        let from_store = relational_repo.list(&query).await.unwrap();

        assert_eq!(from_search.source, ResultSource::SearchEngine);
        assert_eq!(from_store.source, ResultSource::Relational);
        assert_eq!(ids(&from_search.items), ids(&from_store.items), "{:?}", query);
        assert_eq!(from_search.total, from_store.total, "{:?}", query);
    }
}

#[tokio::test]
async fn page_past_the_end_is_empty_with_total() {
    let (repository, _, _) = indexed_repository((1..=5).map(paper).collect()).await;

    let page = repository
        .list(&SearchQuery::new().paginate(4, 2))
        .await
        .unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.total, 5);
    assert_eq!(page.total_pages, 3);
}

#[tokio::test]
async fn text_page_far_past_the_end_is_empty_with_total() {
    let (repository, _, _) = indexed_repository((1..=5).map(paper).collect()).await;

    let page = repository
        .list(&SearchQuery::new().with_text("paper").paginate(50_000_000, 100))
        .await
        .unwrap();
    assert_eq!(page.source, ResultSource::SearchEngine);
    assert!(page.items.is_empty());
    assert_eq!(page.total, 5);
}

#[tokio::test]
async fn list_filters_ignore_case_on_both_paths() {
    let (search_repo, store, _) = indexed_repository(equivalence_papers()).await;
    let relational_repo = PaperRepository::new(store, disabled_engine());

    let lower = SearchQuery::new()
        .with_categories(["vision"])
        .with_authors(["grace hopper"]);
    let upper = SearchQuery::new()
        .with_categories(["VISION"])
        .with_authors(["Grace Hopper"]);

    let expected = ids(&search_repo.list(&lower).await.unwrap().items);
    assert!(!expected.is_empty());
    assert_eq!(ids(&search_repo.list(&upper).await.unwrap().items), expected);
    assert_eq!(ids(&relational_repo.list(&upper).await.unwrap().items), expected);
}

#[tokio::test]
async fn malformed_queries_never_fall_back() {
    let (repository, _, _) = indexed_repository(vec![paper(1)]).await;

    for query in [
        SearchQuery::new().paginate(0, 10),
        SearchQuery::new().paginate(1, 0),
        SearchQuery::new().paginate(1, 101),
    ] {
        let err = repository.list(&query).await.unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidQuery(_)), "{:?}", err);
        assert!(err.is_client_error());
    }
}

#[tokio::test]
async fn stale_index_entries_are_dropped() {
    let (repository, store, _) = indexed_repository((1..=3).map(paper).collect()).await;

    // Removed behind the index's back
    store.delete(&Uuid::from_u128(2)).await.unwrap();

    let page = repository
        .list(&SearchQuery::new().sorted_by(SortField::CreatedAt, SortOrder::Asc))
        .await
        .unwrap();
    assert_eq!(page.source, ResultSource::SearchEngine);
    assert_eq!(ids(&page.items), vec![Uuid::from_u128(1), Uuid::from_u128(3)]);
    assert_eq!(page.total, 3);
}

#[tokio::test]
async fn text_search_ranks_by_relevance_and_hydrates() {
    let mut transformer = paper(1);
    transformer.title = "Attention Is All You Need".to_string();
    transformer.summary = "The transformer architecture".to_string();
    let mut diffusion = paper(2);
    diffusion.title = "Denoising Diffusion Probabilistic Models".to_string();
    let mut mention = paper(3);
    mention.summary = "We compare against a transformer baseline".to_string();

    let (repository, _, _) = indexed_repository(vec![transformer, diffusion, mention]).await;

    let page = repository
        .list(&SearchQuery::new().with_text("diffusion"))
        .await
        .unwrap();
    assert_eq!(ids(&page.items), vec![Uuid::from_u128(2)]);
    assert!(!page.total_is_exact);

    // One typo in a long word still matches
    let page = repository
        .list(&SearchQuery::new().with_text("transfomer"))
        .await
        .unwrap();
    assert_eq!(page.total, 2);
}

#[tokio::test]
async fn writes_are_mirrored_into_the_index() {
    let (repository, _, engine) = indexed_repository(vec![]).await;

    let created = repository
        .create_paper(NewPaper {
            external_id: "2401.00042".to_string(),
            title: "Sparse Mixture of Experts".to_string(),
            summary: "Conditional computation".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let hits = engine
        .search(&SearchQuery::new().with_text("experts"))
        .await
        .unwrap();
    assert_eq!(hits.ids, vec![created.id]);

    // Partial update leaves the title searchable
    repository
        .update_paper(&PaperPatch::new(created.id).with_like_count(12))
        .await
        .unwrap();
    let page = repository
        .list(&SearchQuery::new().with_text("mixture"))
        .await
        .unwrap();
    assert_eq!(page.items[0].like_count, 12);

    repository.delete_paper(&created.id).await.unwrap();
    let hits = engine
        .search(&SearchQuery::new().with_text("experts"))
        .await
        .unwrap();
    assert!(hits.ids.is_empty());
}

#[tokio::test]
async fn index_operations_are_idempotent() {
    let engine = tantivy_engine();
    assert!(engine.ensure_index_exists().await.unwrap());
    assert!(engine.ensure_index_exists().await.unwrap());

    let entity = scholar_search::SearchableEntity::from(&paper(1));
    engine.index_document(&entity).await.unwrap();
    engine.index_document(&entity).await.unwrap();
    assert_eq!(engine.status().await.unwrap().document_count, Some(1));

    engine.delete_document(&entity.id).await.unwrap();
    engine.delete_document(&entity.id).await.unwrap();
    assert_eq!(engine.status().await.unwrap().document_count, Some(0));
}

#[tokio::test]
async fn hanging_backend_times_out_into_fallback() {
    let config = SearchConfig {
        timeout: Duration::from_millis(50),
        ..SearchConfig::default()
    };
    let engine = Arc::new(SearchEngine::new(Arc::new(HangingBackend), &config));
    let store = Arc::new(InMemoryPaperStore::with_papers(vec![paper(1)]));
    let repository = PaperRepository::new(store, engine.clone());

    let page = tokio::time::timeout(Duration::from_secs(5), repository.list(&SearchQuery::new()))
        .await
        .expect("fallback should not wait for the backend")
        .unwrap();
    assert_eq!(page.source, ResultSource::Relational);
    assert_eq!(ids(&page.items), vec![Uuid::from_u128(1)]);

    // Schema checks see the same deadline
    assert!(!engine.ensure_index_exists().await.unwrap());
}

#[tokio::test]
async fn disabled_status_reports_without_contacting_the_engine() {
    let status = disabled_engine().status().await.unwrap();
    assert!(!status.enabled);
    assert!(!status.reachable);
    assert_eq!(status.document_count, None);
}
