//! Retrieval orchestration: index query, threshold filtering, hydration

use super::excerpt;
use super::types::{RetrievalParams, SearchResult};
use super::SearchError;
use crate::index::{IndexHit, VectorStore};
use crate::store::{DocumentKind, EntityStore, PrdDocument, StoreError, TestCase};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Hybrid requests over-fetch by this factor to leave room for the
/// client-side threshold cut
pub const HYBRID_OVERFETCH: usize = 2;

/// Clamp hybrid scores to 1.0, keep those at or above `threshold` in index
/// order, and stop after `limit`
pub fn select_hybrid_hits(hits: Vec<IndexHit>, limit: usize, threshold: f32) -> Vec<IndexHit> {
    let mut selected = Vec::with_capacity(limit.min(hits.len()));

    for mut hit in hits {
        if selected.len() >= limit {
            break;
        }
        hit.score = hit.score.min(1.0);
        if hit.score >= threshold {
            selected.push(hit);
        } else {
            tracing::debug!(
                "Dropping hybrid hit {} below threshold ({:.4} < {:.2})",
                hit.id,
                hit.score,
                threshold
            );
        }
    }

    selected
}

/// Queries one collection and turns hits into preliminary results
pub struct Retriever {
    index: Arc<dyn VectorStore>,
    entities: Arc<dyn EntityStore>,
}

impl Retriever {
    /// # Arguments
    /// * `index` - Vector store queried for candidate ids
    /// * `entities` - Store the ids are resolved against
    pub fn new(index: Arc<dyn VectorStore>, entities: Arc<dyn EntityStore>) -> Self {
        Self { index, entities }
    }

    /// Ranked hits for one document kind, hydrated into results
    ///
    /// Index failures are fatal for the kind; hits whose entity can no
    /// longer be loaded are skipped.
    pub async fn retrieve(
        &self,
        kind: DocumentKind,
        vector: &[f32],
        params: &RetrievalParams,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let hits = if params.alpha < 1.0 {
            let raw = self
                .index
                .hybrid_search(
                    kind,
                    &params.text,
                    vector,
                    params.limit.saturating_mul(HYBRID_OVERFETCH),
                    params.alpha,
                    &params.filters,
                )
                .await
                .map_err(|source| SearchError::IndexQueryFailed { kind, source })?;

            tracing::debug!("Hybrid search returned {} {} candidates", raw.len(), kind);
            select_hybrid_hits(raw, params.limit, params.threshold)
        } else {
            self.index
                .search_by_vector(
                    kind,
                    vector,
                    params.limit,
                    params.threshold,
                    &params.filters,
                )
                .await
                .map_err(|source| SearchError::IndexQueryFailed { kind, source })?
        };

        Ok(self.hydrate(kind, hits).await)
    }

    async fn hydrate(&self, kind: DocumentKind, hits: Vec<IndexHit>) -> Vec<SearchResult> {
        let mut results = Vec::with_capacity(hits.len());

        for hit in hits {
            let loaded = match kind {
                DocumentKind::Prd => self
                    .entities
                    .get_prd(&hit.id)
                    .await
                    .map(|prd| prd_result(&prd, hit.score)),
                DocumentKind::TestCase => self
                    .entities
                    .get_test_case(&hit.id)
                    .await
                    .map(|tc| test_case_result(&tc, hit.score)),
            };

            match loaded {
                Ok(result) => results.push(result),
                Err(StoreError::NotFound { .. }) => {
                    tracing::debug!("Skipping stale index entry {} {}", kind, hit.id);
                }
                Err(e) => {
                    tracing::warn!("Skipping {} {}: {}", kind, hit.id, e);
                }
            }
        }

        results
    }
}

fn optional(value: &Option<String>) -> Value {
    match value {
        Some(v) => json!(v),
        None => Value::Null,
    }
}

pub fn prd_result(prd: &PrdDocument, score: f32) -> SearchResult {
    let mut metadata = BTreeMap::new();
    metadata.insert("code".to_string(), json!(prd.code));
    metadata.insert("status".to_string(), json!(prd.status));
    metadata.insert("version".to_string(), json!(prd.version));
    metadata.insert("module_id".to_string(), optional(&prd.module_id));
    metadata.insert("app_version_id".to_string(), json!(prd.app_version_id));
    metadata.insert("created_at".to_string(), json!(prd.created_at.to_rfc3339()));

    SearchResult {
        kind: DocumentKind::Prd,
        id: prd.id.clone(),
        title: prd.title.clone(),
        content: excerpt::prd_excerpt(&prd.content),
        score,
        vector_score: score,
        metadata,
        highlights: excerpt::highlights(
            &prd.content,
            excerpt::HIGHLIGHT_COUNT,
            excerpt::HIGHLIGHT_CHUNK_CHARS,
        ),
    }
}

pub fn test_case_result(test_case: &TestCase, score: f32) -> SearchResult {
    let mut metadata = BTreeMap::new();
    metadata.insert("code".to_string(), json!(test_case.code));
    metadata.insert("priority".to_string(), json!(test_case.priority));
    metadata.insert("type".to_string(), json!(test_case.case_type));
    metadata.insert("status".to_string(), json!(test_case.status));
    metadata.insert("version".to_string(), json!(test_case.version));
    metadata.insert("module_id".to_string(), optional(&test_case.module_id));
    metadata.insert("prd_id".to_string(), optional(&test_case.prd_id));
    metadata.insert(
        "app_version_id".to_string(),
        json!(test_case.app_version_id),
    );
    metadata.insert(
        "created_at".to_string(),
        json!(test_case.created_at.to_rfc3339()),
    );

    SearchResult {
        kind: DocumentKind::TestCase,
        id: test_case.id.clone(),
        title: test_case.title.clone(),
        content: excerpt::test_case_excerpt(test_case),
        score,
        vector_score: score,
        metadata,
        highlights: vec![test_case.title.clone()],
    }
}
