use async_trait::async_trait;
use caselens::embedding::{EmbeddingManager, MockEmbeddingProvider, DEFAULT_TIMEOUT};
use caselens::index::{IndexDocument, IndexError, IndexHit, ScopeFilters, VectorStore};
use caselens::search::{SearchError, SearchKind, SearchQuery, SearchService};
use caselens::settings::SettingsSource;
use caselens::store::{DocumentKind, EntityStore, PrdDocument, StoreError, TestCase};
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct FakeIndex {
    vector_hits: HashMap<DocumentKind, Vec<IndexHit>>,
    hybrid_hits: HashMap<DocumentKind, Vec<IndexHit>>,
    failing: Option<DocumentKind>,
    delay: Option<Duration>,
    vector_calls: AtomicUsize,
    hybrid_calls: AtomicUsize,
    requests: Mutex<Vec<(DocumentKind, usize, f32)>>,
    hybrid_requests: Mutex<Vec<(DocumentKind, usize)>>,
}

impl FakeIndex {
    fn with_vector(mut self, kind: DocumentKind, hits: &[(&str, f32)]) -> Self {
        self.vector_hits.insert(kind, to_hits(hits));
        self
    }

    fn with_hybrid(mut self, kind: DocumentKind, hits: &[(&str, f32)]) -> Self {
        self.hybrid_hits.insert(kind, to_hits(hits));
        self
    }

    async fn check(&self, kind: DocumentKind) -> Result<(), IndexError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing == Some(kind) {
            return Err(IndexError::Request("connection refused".to_string()));
        }
        Ok(())
    }
}

fn to_hits(hits: &[(&str, f32)]) -> Vec<IndexHit> {
    hits.iter().map(|(id, score)| IndexHit::new(*id, *score)).collect()
}

#[async_trait]
impl VectorStore for FakeIndex {
    async fn search_by_vector(
        &self,
        kind: DocumentKind,
        _vector: &[f32],
        limit: usize,
        threshold: f32,
        _filters: &ScopeFilters,
    ) -> Result<Vec<IndexHit>, IndexError> {
        self.vector_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push((kind, limit, threshold));
        self.check(kind).await?;

        Ok(self
            .vector_hits
            .get(&kind)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|hit| hit.score >= threshold)
            .take(limit)
            .collect())
    }

    async fn hybrid_search(
        &self,
        kind: DocumentKind,
        _text: &str,
        _vector: &[f32],
        limit: usize,
        _alpha: f32,
        _filters: &ScopeFilters,
    ) -> Result<Vec<IndexHit>, IndexError> {
        self.hybrid_calls.fetch_add(1, Ordering::SeqCst);
        self.hybrid_requests.lock().unwrap().push((kind, limit));
        self.check(kind).await?;

        Ok(self
            .hybrid_hits
            .get(&kind)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .take(limit)
            .collect())
    }

    async fn upsert(&self, _document: &IndexDocument, _vector: &[f32]) -> Result<(), IndexError> {
        Ok(())
    }

    async fn delete(&self, _kind: DocumentKind, _id: &str) -> Result<(), IndexError> {
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<(), IndexError> {
        Ok(())
    }
}

#[derive(Default)]
struct FakeEntities {
    prds: HashMap<String, PrdDocument>,
    test_cases: HashMap<String, TestCase>,
}

impl FakeEntities {
    fn with_prd(mut self, prd: PrdDocument) -> Self {
        self.prds.insert(prd.id.clone(), prd);
        self
    }

    fn with_test_case(mut self, tc: TestCase) -> Self {
        self.test_cases.insert(tc.id.clone(), tc);
        self
    }
}

#[async_trait]
impl EntityStore for FakeEntities {
    async fn get_prd(&self, id: &str) -> Result<PrdDocument, StoreError> {
        self.prds.get(id).cloned().ok_or(StoreError::NotFound {
            kind: DocumentKind::Prd,
            id: id.to_string(),
        })
    }

    async fn get_test_case(&self, id: &str) -> Result<TestCase, StoreError> {
        self.test_cases.get(id).cloned().ok_or(StoreError::NotFound {
            kind: DocumentKind::TestCase,
            id: id.to_string(),
        })
    }

    async fn list_prds(&self) -> Result<Vec<PrdDocument>, StoreError> {
        Ok(self.prds.values().cloned().collect())
    }

    async fn list_test_cases(&self) -> Result<Vec<TestCase>, StoreError> {
        Ok(self.test_cases.values().cloned().collect())
    }
}

struct FakeSettings(Vec<(String, String)>);

impl FakeSettings {
    fn defaults() -> Self {
        Self(Vec::new())
    }

    fn with(items: &[(&str, &str)]) -> Self {
        Self(
            items
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

#[async_trait]
impl SettingsSource for FakeSettings {
    async fn get_by_keys(&self, keys: &[&str]) -> Result<Vec<(String, String)>, StoreError> {
        Ok(self
            .0
            .iter()
            .filter(|(k, _)| keys.contains(&k.as_str()))
            .cloned()
            .collect())
    }
}

fn prd(id: &str, title: &str) -> PrdDocument {
    PrdDocument {
        id: id.to_string(),
        project_id: "proj".to_string(),
        app_version_id: "v1".to_string(),
        module_id: None,
        code: format!("PRD-{}", id),
        title: title.to_string(),
        content: "Customers pay for orders with cards or wallets.".to_string(),
        status: "published".to_string(),
        version: 1,
        author: "pm".to_string(),
        created_at: Utc::now() - ChronoDuration::days(3),
    }
}

fn test_case(id: &str, title: &str, priority: &str, status: &str, age_days: i64) -> TestCase {
    TestCase {
        id: id.to_string(),
        project_id: "proj".to_string(),
        app_version_id: "v1".to_string(),
        module_id: None,
        prd_id: Some("p1".to_string()),
        code: format!("TC-{}", id),
        title: title.to_string(),
        precondition: "Logged in".to_string(),
        expected_result: "Order is paid".to_string(),
        priority: priority.to_string(),
        case_type: "functional".to_string(),
        status: status.to_string(),
        version: 1,
        created_at: Utc::now() - ChronoDuration::days(age_days),
    }
}

fn service(index: Arc<FakeIndex>, entities: FakeEntities, settings: FakeSettings) -> SearchService {
    let embeddings = Arc::new(EmbeddingManager::with_provider(Arc::new(
        MockEmbeddingProvider::new(32),
    )));
    SearchService::new(embeddings, index, Arc::new(entities), Arc::new(settings))
}

fn payment_entities() -> FakeEntities {
    FakeEntities::default()
        .with_prd(prd("p1", "Payment flow"))
        .with_prd(prd("p2", "Refund handling"))
        .with_test_case(test_case("tc-fresh", "Pay with saved card", "P0", "active", 2))
        .with_test_case(test_case("tc-stale", "Pay with legacy wallet", "P3", "deprecated", 400))
}

#[tokio::test]
async fn fresh_high_priority_case_outranks_stale_one() {
    let index = Arc::new(FakeIndex::default().with_vector(
        DocumentKind::TestCase,
        &[("tc-stale", 0.95), ("tc-fresh", 0.9)],
    ));
    let service = service(index, payment_entities(), FakeSettings::defaults());

    let response = service
        .search(SearchQuery::new("payment flow", SearchKind::TestCase))
        .await
        .unwrap();

    let ids: Vec<&str> = response.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["tc-fresh", "tc-stale"]);
    assert_eq!(response.total, 2);
    assert_eq!(response.kind, SearchKind::TestCase);
    assert!(response.results[0].score > response.results[1].score);
    assert_eq!(response.results[1].vector_score, 0.95);
}

#[tokio::test]
async fn pure_vector_alpha_never_calls_hybrid() {
    let index = Arc::new(
        FakeIndex::default()
            .with_vector(DocumentKind::Prd, &[("p1", 0.9)])
            .with_hybrid(DocumentKind::Prd, &[("p2", 0.9)]),
    );
    let service = service(Arc::clone(&index), payment_entities(), FakeSettings::defaults());

    service
        .search(SearchQuery::new("payment", SearchKind::All).with_alpha(1.0))
        .await
        .unwrap();

    assert_eq!(index.hybrid_calls.load(Ordering::SeqCst), 0);
    assert_eq!(index.vector_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn disabled_hybrid_setting_falls_back_to_vector() {
    let index = Arc::new(FakeIndex::default().with_vector(DocumentKind::Prd, &[("p1", 0.9)]));
    let settings = FakeSettings::with(&[("search_enable_hybrid", "false")]);
    let service = service(Arc::clone(&index), payment_entities(), settings);

    let response = service
        .search(SearchQuery::new("payment", SearchKind::Prd).with_alpha(0.3))
        .await
        .unwrap();

    assert_eq!(response.results.len(), 1);
    assert_eq!(index.hybrid_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn hybrid_scores_above_one_are_clamped() {
    let index = Arc::new(
        FakeIndex::default().with_hybrid(DocumentKind::Prd, &[("p1", 1.5), ("p2", 0.2)]),
    );
    let service = service(Arc::clone(&index), payment_entities(), FakeSettings::defaults());

    let response = service
        .search(SearchQuery::new("payment", SearchKind::Prd).with_alpha(0.5))
        .await
        .unwrap();

    assert_eq!(index.hybrid_calls.load(Ordering::SeqCst), 1);
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].id, "p1");
    assert_eq!(response.results[0].vector_score, 1.0);
    assert!(response.results[0].score <= 1.0);
}

#[tokio::test]
async fn hybrid_search_overfetches_twice_the_limit() {
    let index = Arc::new(FakeIndex::default().with_hybrid(
        DocumentKind::TestCase,
        &[("tc-stale", 0.95), ("tc-fresh", 0.9)],
    ));
    let service = service(Arc::clone(&index), payment_entities(), FakeSettings::defaults());

    let response = service
        .search(
            SearchQuery::new("payment", SearchKind::TestCase)
                .with_alpha(0.5)
                .with_limit(3),
        )
        .await
        .unwrap();

    assert_eq!(response.results.len(), 2);
    assert_eq!(
        *index.hybrid_requests.lock().unwrap(),
        vec![(DocumentKind::TestCase, 6)]
    );
    assert_eq!(index.vector_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn huge_hybrid_limit_saturates_instead_of_overflowing() {
    let index = Arc::new(FakeIndex::default().with_hybrid(DocumentKind::Prd, &[("p1", 0.9)]));
    let service = service(Arc::clone(&index), payment_entities(), FakeSettings::defaults());

    let response = service
        .search(
            SearchQuery::new("payment", SearchKind::Prd)
                .with_alpha(0.5)
                .with_limit(usize::MAX),
        )
        .await
        .unwrap();

    assert_eq!(response.results.len(), 1);
    assert_eq!(
        *index.hybrid_requests.lock().unwrap(),
        vec![(DocumentKind::Prd, usize::MAX)]
    );
}

#[tokio::test]
async fn stale_index_entries_are_skipped() {
    let index = Arc::new(
        FakeIndex::default().with_vector(DocumentKind::Prd, &[("deleted", 0.99), ("p1", 0.8)]),
    );
    let service = service(index, payment_entities(), FakeSettings::defaults());

    let response = service
        .search(SearchQuery::new("payment", SearchKind::Prd))
        .await
        .unwrap();

    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].id, "p1");
}

#[tokio::test]
async fn all_kinds_are_merged_and_sorted_globally() {
    let index = Arc::new(
        FakeIndex::default()
            .with_vector(DocumentKind::Prd, &[("p1", 0.75), ("p2", 0.72)])
            .with_vector(DocumentKind::TestCase, &[("tc-fresh", 0.98)]),
    );
    let service = service(index, payment_entities(), FakeSettings::defaults());

    let response = service
        .search(SearchQuery::new("payment flow", SearchKind::All).with_limit(2))
        .await
        .unwrap();

    assert_eq!(response.results.len(), 2);
    assert!(response.results[0].score >= response.results[1].score);
}

#[tokio::test]
async fn failing_kind_aborts_combined_search() {
    let index = Arc::new(FakeIndex {
        failing: Some(DocumentKind::TestCase),
        ..FakeIndex::default().with_vector(DocumentKind::Prd, &[("p1", 0.9)])
    });
    let service = service(index, payment_entities(), FakeSettings::defaults());

    let result = service
        .search(SearchQuery::new("payment", SearchKind::All))
        .await;

    assert!(matches!(
        result,
        Err(SearchError::IndexQueryFailed {
            kind: DocumentKind::TestCase,
            ..
        })
    ));
}

#[tokio::test]
async fn search_without_provider_is_unavailable() {
    let index = Arc::new(FakeIndex::default());
    let embeddings = Arc::new(EmbeddingManager::new(DEFAULT_TIMEOUT, 32));
    let service = SearchService::new(
        embeddings,
        index,
        Arc::new(payment_entities()),
        Arc::new(FakeSettings::defaults()),
    );

    let result = service
        .search(SearchQuery::new("payment", SearchKind::Prd))
        .await;
    assert!(matches!(result, Err(SearchError::EmbeddingUnavailable)));
}

#[tokio::test]
async fn slow_index_hits_the_deadline() {
    let index = Arc::new(FakeIndex {
        delay: Some(Duration::from_millis(500)),
        ..FakeIndex::default()
    });
    let service = service(index, payment_entities(), FakeSettings::defaults())
        .with_timeout(Duration::from_millis(20));

    let result = service
        .search(SearchQuery::new("payment", SearchKind::Prd))
        .await;
    assert!(matches!(result, Err(SearchError::Timeout(_))));
}

#[tokio::test]
async fn recommendations_never_include_the_source() {
    let index = Arc::new(
        FakeIndex::default()
            .with_vector(DocumentKind::Prd, &[("p1", 0.99), ("p2", 0.85)])
            .with_vector(DocumentKind::TestCase, &[("tc-fresh", 0.8)]),
    );
    let service = service(Arc::clone(&index), payment_entities(), FakeSettings::defaults());

    let response = service
        .get_recommendations("proj", DocumentKind::Prd, "p1", Some(2))
        .await
        .unwrap();

    let ids: Vec<&str> = response.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["p2", "tc-fresh"]);

    let requests = index.requests.lock().unwrap();
    assert!(requests
        .iter()
        .all(|(_, limit, threshold)| *limit == 3 && *threshold == 0.7));
}

#[tokio::test]
async fn huge_recommendation_limit_saturates_instead_of_overflowing() {
    let index = Arc::new(
        FakeIndex::default()
            .with_vector(DocumentKind::Prd, &[("p1", 0.99), ("p2", 0.85)])
            .with_vector(DocumentKind::TestCase, &[("tc-fresh", 0.8)]),
    );
    let service = service(Arc::clone(&index), payment_entities(), FakeSettings::defaults());

    let response = service
        .get_recommendations("proj", DocumentKind::Prd, "p1", Some(usize::MAX))
        .await
        .unwrap();

    let ids: Vec<&str> = response.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["p2", "tc-fresh"]);

    let requests = index.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|(_, limit, _)| *limit == usize::MAX));
}

#[tokio::test]
async fn recommendations_for_unknown_source_fail() {
    let index = Arc::new(FakeIndex::default());
    let service = service(index, payment_entities(), FakeSettings::defaults());

    let result = service
        .get_recommendations("proj", DocumentKind::TestCase, "missing", None)
        .await;
    assert!(matches!(result, Err(SearchError::NotFound { .. })));
}
