//! Hybrid retrieval and business-aware reranking
//!
//! - `types`: query, result and response shapes
//! - `excerpt`: result content excerpts and highlight fragments
//! - `signals`: per-signal scorers mapping metadata to [0, 1]
//! - `reranker`: weighted blend of signals per document kind
//! - `retrieval`: index query, hybrid threshold cut, entity hydration
//! - `service`: `search` and `get_recommendations`

pub mod excerpt;
pub mod reranker;
pub mod retrieval;
mod service;
pub mod signals;
mod types;

pub use reranker::{rerank, rerank_at, RerankWeights};
pub use retrieval::{select_hybrid_hits, Retriever};
pub use service::{SearchService, DEFAULT_RECOMMENDATION_LIMIT, RECOMMENDATION_THRESHOLD};
pub use types::{RetrievalParams, SearchKind, SearchQuery, SearchResponse, SearchResult};

use crate::embedding::EmbeddingError;
use crate::index::IndexError;
use crate::store::{DocumentKind, StoreError, UnknownKind};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Unsupported document kind: {0}")]
    UnsupportedKind(String),

    #[error("No embedding provider configured")]
    EmbeddingUnavailable,

    #[error("Failed to embed query: {0}")]
    EmbeddingFailed(#[source] EmbeddingError),

    #[error("Index query for {kind} failed: {source}")]
    IndexQueryFailed {
        kind: DocumentKind,
        #[source]
        source: IndexError,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: DocumentKind, id: String },

    #[error("Store error: {0}")]
    Store(#[source] StoreError),

    #[error("Search timed out after {0:?}")]
    Timeout(Duration),
}

impl From<UnknownKind> for SearchError {
    fn from(err: UnknownKind) -> Self {
        SearchError::UnsupportedKind(err.0)
    }
}

impl SearchError {
    /// Map a source-document lookup failure
    pub(crate) fn from_lookup(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => SearchError::NotFound { kind, id },
            other => SearchError::Store(other),
        }
    }
}
