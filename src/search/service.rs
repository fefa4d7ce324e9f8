//! Search service: composition root for embedding, retrieval and reranking

use super::reranker::{self, by_score_then_id};
use super::retrieval::Retriever;
use super::types::{RetrievalParams, SearchKind, SearchQuery, SearchResponse, SearchResult};
use super::SearchError;
use crate::embedding::{EmbeddingManager, EmbeddingProvider};
use crate::index::{ScopeFilters, VectorStore};
use crate::settings::{SearchConfig, SettingsSource};
use crate::store::{DocumentKind, EntityStore};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Similarity cut for recommendations, independent of search settings
pub const RECOMMENDATION_THRESHOLD: f32 = 0.7;
pub const DEFAULT_RECOMMENDATION_LIMIT: usize = 5;

/// Apply configured defaults and validate a query
pub(crate) fn resolve_query(
    query: &SearchQuery,
    config: &SearchConfig,
) -> Result<RetrievalParams, SearchError> {
    let text = query.text.trim();
    if text.is_empty() {
        return Err(SearchError::InvalidQuery("query text is empty".to_string()));
    }

    let limit = match query.limit {
        Some(limit) if limit > 0 => limit,
        _ => config.default_limit,
    };

    let threshold = query.threshold.unwrap_or(config.default_threshold);
    if !(0.0..=1.0).contains(&threshold) {
        return Err(SearchError::InvalidQuery(format!(
            "threshold must be within [0, 1], got {}",
            threshold
        )));
    }

    let mut alpha = query.alpha.unwrap_or(config.default_alpha);
    if !(0.0..=1.0).contains(&alpha) {
        return Err(SearchError::InvalidQuery(format!(
            "alpha must be within [0, 1], got {}",
            alpha
        )));
    }
    if !config.enable_hybrid {
        alpha = 1.0;
    }

    Ok(RetrievalParams {
        text: text.to_string(),
        limit,
        threshold,
        alpha,
        filters: query.scope_filters(),
    })
}

/// Search and recommendation entry points
pub struct SearchService {
    embeddings: Arc<EmbeddingManager>,
    entities: Arc<dyn EntityStore>,
    settings: Arc<dyn SettingsSource>,
    retriever: Retriever,
    timeout: Option<Duration>,
}

impl SearchService {
    /// Create a search service with no deadline
    ///
    /// # Arguments
    /// * `embeddings` - Provider holder; searches fail while it is empty
    /// * `index` - Vector store for both document kinds
    /// * `entities` - Source of full PRD and test case records
    /// * `settings` - Global search settings, re-read on every search
    pub fn new(
        embeddings: Arc<EmbeddingManager>,
        index: Arc<dyn VectorStore>,
        entities: Arc<dyn EntityStore>,
        settings: Arc<dyn SettingsSource>,
    ) -> Self {
        Self {
            embeddings,
            retriever: Retriever::new(index, Arc::clone(&entities)),
            entities,
            settings,
            timeout: None,
        }
    }

    /// Abort calls that run longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn with_deadline<T, F>(&self, call: F) -> Result<T, SearchError>
    where
        F: Future<Output = Result<T, SearchError>>,
    {
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, call)
                .await
                .map_err(|_| SearchError::Timeout(timeout))?,
            None => call.await,
        }
    }

    fn provider(&self) -> Result<Arc<dyn EmbeddingProvider>, SearchError> {
        self.embeddings
            .current()
            .ok_or(SearchError::EmbeddingUnavailable)
    }

    /// Semantic or hybrid search over one or both document kinds
    pub async fn search(&self, query: SearchQuery) -> Result<SearchResponse, SearchError> {
        self.with_deadline(self.run_search(query)).await
    }

    async fn run_search(&self, query: SearchQuery) -> Result<SearchResponse, SearchError> {
        let started = Instant::now();

        let config = SearchConfig::load(self.settings.as_ref()).await;
        let params = resolve_query(&query, &config)?;

        let provider = self.provider()?;
        let vector = provider
            .embed(&params.text)
            .await
            .map_err(SearchError::EmbeddingFailed)?;

        tracing::debug!(
            "Searching {} (limit={}, threshold={:.2}, alpha={:.2}, {}D)",
            query.kind,
            params.limit,
            params.threshold,
            params.alpha,
            vector.len()
        );

        let mut results = match query.kind {
            SearchKind::Prd => self.ranked(DocumentKind::Prd, &vector, &params).await?,
            SearchKind::TestCase => {
                self.ranked(DocumentKind::TestCase, &vector, &params)
                    .await?
            }
            SearchKind::All => {
                let (mut prds, test_cases) = tokio::try_join!(
                    self.ranked(DocumentKind::Prd, &vector, &params),
                    self.ranked(DocumentKind::TestCase, &vector, &params),
                )?;
                prds.extend(test_cases);
                prds
            }
        };

        results.sort_by(by_score_then_id);
        results.truncate(params.limit);

        tracing::info!(
            "Search for {:?} ({}) returned {} results in {}ms",
            params.text,
            query.kind,
            results.len(),
            started.elapsed().as_millis()
        );

        Ok(SearchResponse::new(params.text, query.kind, results))
    }

    async fn ranked(
        &self,
        kind: DocumentKind,
        vector: &[f32],
        params: &RetrievalParams,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let results = self.retriever.retrieve(kind, vector, params).await?;
        Ok(reranker::rerank(results, &params.text))
    }

    /// Documents similar to a given PRD or test case, the source excluded
    pub async fn get_recommendations(
        &self,
        project_id: &str,
        source_kind: DocumentKind,
        source_id: &str,
        limit: Option<usize>,
    ) -> Result<SearchResponse, SearchError> {
        self.with_deadline(self.run_recommendations(project_id, source_kind, source_id, limit))
            .await
    }

    async fn run_recommendations(
        &self,
        project_id: &str,
        source_kind: DocumentKind,
        source_id: &str,
        limit: Option<usize>,
    ) -> Result<SearchResponse, SearchError> {
        let limit = limit
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_RECOMMENDATION_LIMIT);
        let provider = self.provider()?;

        let text = match source_kind {
            DocumentKind::Prd => {
                let prd = self
                    .entities
                    .get_prd(source_id)
                    .await
                    .map_err(SearchError::from_lookup)?;
                format!("{}\n{}", prd.title, prd.content)
            }
            DocumentKind::TestCase => {
                self.entities
                    .get_test_case(source_id)
                    .await
                    .map_err(SearchError::from_lookup)?
                    .title
            }
        };

        let vector = provider
            .embed(&text)
            .await
            .map_err(SearchError::EmbeddingFailed)?;

        let project = Some(project_id).filter(|p| !p.is_empty());
        let params = RetrievalParams {
            text: String::new(),
            limit: limit.saturating_add(1),
            threshold: RECOMMENDATION_THRESHOLD,
            alpha: 1.0,
            filters: ScopeFilters::new().with("project_id", project),
        };

        let (mut results, test_cases) = tokio::try_join!(
            self.retriever.retrieve(DocumentKind::Prd, &vector, &params),
            self.retriever
                .retrieve(DocumentKind::TestCase, &vector, &params),
        )?;
        results.extend(test_cases);

        results.retain(|r| r.id != source_id);
        results.sort_by(by_score_then_id);
        results.truncate(limit);

        tracing::info!(
            "Recommendations for {} {} returned {} results",
            source_kind,
            source_id,
            results.len()
        );

        Ok(SearchResponse::new(
            format!("recommendations for {} {}", source_kind, source_id),
            SearchKind::All,
            results,
        ))
    }
}
