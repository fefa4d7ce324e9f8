use caselens::embedding::{EmbeddingManager, DEFAULT_TIMEOUT};
use caselens::index::{HnswParams, LocalIndex};
use caselens::search::{SearchKind, SearchQuery, SearchService};
use caselens::store::{DocumentKind, PrdDocument, SqliteStore, TestCase};
use caselens::sync::Indexer;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tempfile::TempDir;

const DIMENSION: usize = 64;

fn prd(id: &str, title: &str, content: &str) -> PrdDocument {
    PrdDocument {
        id: id.to_string(),
        project_id: "shop".to_string(),
        app_version_id: "2.0".to_string(),
        module_id: Some("orders".to_string()),
        code: format!("PRD-{}", id),
        title: title.to_string(),
        content: content.to_string(),
        status: "published".to_string(),
        version: 1,
        author: "pm".to_string(),
        created_at: Utc::now() - Duration::days(10),
    }
}

fn test_case(id: &str, title: &str) -> TestCase {
    TestCase {
        id: id.to_string(),
        project_id: "shop".to_string(),
        app_version_id: "2.0".to_string(),
        module_id: Some("orders".to_string()),
        prd_id: Some("prd-orders".to_string()),
        code: format!("TC-{}", id),
        title: title.to_string(),
        precondition: "An order exists".to_string(),
        expected_result: "The customer is notified".to_string(),
        priority: "P1".to_string(),
        case_type: "functional".to_string(),
        status: "active".to_string(),
        version: 1,
        created_at: Utc::now() - Duration::days(1),
    }
}

struct Fixture {
    _dir: TempDir,
    service: SearchService,
}

async fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::open(&dir.path().join("caselens.db")).unwrap());

    store
        .insert_prd(&prd(
            "prd-orders",
            "Order lifecycle",
            "Orders move from placed to shipped to delivered.",
        ))
        .unwrap();
    store
        .insert_test_case(&test_case("tc-refund", "Refund a partially shipped order"))
        .unwrap();
    store
        .insert_test_case(&test_case("tc-login", "Login with expired password"))
        .unwrap();
    store
        .insert_test_case(&test_case("tc-refund-copy", "Refund a partially shipped order"))
        .unwrap();

    let embeddings = Arc::new(EmbeddingManager::new(DEFAULT_TIMEOUT, DIMENSION));
    embeddings.initialize(&*store).await.unwrap();

    let index = Arc::new(LocalIndex::new(DIMENSION, HnswParams::default()).unwrap());
    let report = Indexer::new(Arc::clone(&embeddings), index.clone(), store.clone())
        .sync_all()
        .await
        .unwrap();
    assert_eq!(report.prds, 1);
    assert_eq!(report.test_cases, 3);
    assert_eq!(report.failed, 0);

    let service = SearchService::new(embeddings, index, store.clone(), store);
    Fixture { _dir: dir, service }
}

#[tokio::test]
async fn exact_title_query_finds_the_case() {
    let fixture = fixture().await;

    let response = fixture
        .service
        .search(SearchQuery::new(
            "Refund a partially shipped order",
            SearchKind::TestCase,
        ))
        .await
        .unwrap();

    assert!(!response.results.is_empty());
    let top = &response.results[0];
    assert!(top.id.starts_with("tc-refund"));
    assert!(top.vector_score > 0.99);
    assert_eq!(top.highlights, vec![top.title.clone()]);
    assert!(top.content.starts_with("Precondition: An order exists"));
    assert!(response.results.iter().all(|r| r.id != "tc-login"));
}

#[tokio::test]
async fn hybrid_query_uses_keyword_matches() {
    let fixture = fixture().await;

    let response = fixture
        .service
        .search(SearchQuery::new("refund", SearchKind::TestCase).with_alpha(0.5))
        .await
        .unwrap();

    assert!(!response.results.is_empty());
    assert!(response.results[0].id.starts_with("tc-refund"));
    assert!(response.results.iter().all(|r| r.vector_score <= 1.0));
}

#[tokio::test]
async fn project_filter_excludes_other_projects() {
    let fixture = fixture().await;

    let response = fixture
        .service
        .search(
            SearchQuery::new("Refund a partially shipped order", SearchKind::All)
                .with_project("elsewhere"),
        )
        .await
        .unwrap();

    assert!(response.results.is_empty());
    assert_eq!(response.total, 0);
}

#[tokio::test]
async fn recommendations_return_the_duplicate_not_the_source() {
    let fixture = fixture().await;

    let response = fixture
        .service
        .get_recommendations("shop", DocumentKind::TestCase, "tc-refund", None)
        .await
        .unwrap();

    let ids: Vec<&str> = response.results.iter().map(|r| r.id.as_str()).collect();
    assert!(ids.contains(&"tc-refund-copy"));
    assert!(!ids.contains(&"tc-refund"));
    assert!(response.results.len() <= 5);
}
