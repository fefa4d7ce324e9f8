//! Multi-signal reranking
//!
//! Each result's score is recomputed from its retrieval score and its own
//! metadata as a weighted sum of independent signals, then the set is
//! sorted. Scores are always derived from `vector_score`, never from the
//! previous `score`, so reranking the same set twice gives the same order.

use super::signals;
use super::types::SearchResult;
use crate::store::DocumentKind;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

/// Weight per signal; a profile's weights sum to 1.0
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankWeights {
    pub vector: f32,
    pub title_match: f32,
    pub status: f32,
    pub freshness: f32,
    pub completeness: f32,
    pub priority: f32,
    pub prd_link: f32,
}

impl RerankWeights {
    /// Semantic relevance first, then title, publication status and age
    pub const PRD: RerankWeights = RerankWeights {
        vector: 0.50,
        title_match: 0.20,
        status: 0.15,
        freshness: 0.10,
        completeness: 0.05,
        priority: 0.0,
        prd_link: 0.0,
    };

    /// Priority carries a quarter of the score for test cases
    pub const TEST_CASE: RerankWeights = RerankWeights {
        vector: 0.40,
        title_match: 0.15,
        status: 0.10,
        freshness: 0.05,
        completeness: 0.0,
        priority: 0.25,
        prd_link: 0.05,
    };

    pub fn for_kind(kind: DocumentKind) -> Self {
        match kind {
            DocumentKind::Prd => Self::PRD,
            DocumentKind::TestCase => Self::TEST_CASE,
        }
    }

    pub fn total(&self) -> f32 {
        self.vector
            + self.title_match
            + self.status
            + self.freshness
            + self.completeness
            + self.priority
            + self.prd_link
    }
}

/// Blended score for one result
pub fn score(result: &SearchResult, query: &str, now: DateTime<Utc>) -> f32 {
    let weights = RerankWeights::for_kind(result.kind);

    let status = match result.kind {
        DocumentKind::Prd => signals::prd_status(result.meta_str("status")),
        DocumentKind::TestCase => signals::test_case_status(result.meta_str("status")),
    };

    let mut total = weights.vector * result.vector_score.clamp(0.0, 1.0)
        + weights.title_match * signals::title_match(query, &result.title)
        + weights.status * status
        + weights.freshness * signals::freshness(result.meta_str("created_at"), now);

    if weights.completeness > 0.0 {
        total += weights.completeness * signals::completeness(&result.content);
    }
    if weights.priority > 0.0 {
        total += weights.priority * signals::priority(result.meta_str("priority"));
    }
    if weights.prd_link > 0.0 {
        total += weights.prd_link * signals::prd_link(result.meta_str("prd_id"));
    }

    total
}

/// Score descending, then id ascending
pub fn by_score_then_id(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id))
}

/// Rescore against the current time and sort
pub fn rerank(results: Vec<SearchResult>, query: &str) -> Vec<SearchResult> {
    rerank_at(results, query, Utc::now())
}

/// Rescore against a fixed clock and sort
pub fn rerank_at(
    mut results: Vec<SearchResult>,
    query: &str,
    now: DateTime<Utc>,
) -> Vec<SearchResult> {
    for result in results.iter_mut() {
        result.score = score(result, query, now);
    }
    results.sort_by(by_score_then_id);
    results
}
