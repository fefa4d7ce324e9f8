//! Vector index interface and backends
//!
//! The index stores one vector per document plus a handful of filterable
//! fields. Two query modes exist: pure dense-vector search returning a
//! certainty in [0, 1], and hybrid dense + BM25 search whose score is not
//! guaranteed to be bounded.

mod keyword;
mod local;
mod vector;
mod weaviate;

pub use local::{HnswParams, LocalIndex};
pub use weaviate::WeaviateClient;

use crate::store::{DocumentKind, PrdDocument, TestCase};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Index backend error: {0}")]
    Backend(String),

    #[error("Index request failed: {0}")]
    Request(String),

    #[error("Malformed index response: {0}")]
    InvalidResponse(String),

    #[error("Schema error: {0}")]
    Schema(String),
}

/// One raw match returned by the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHit {
    pub id: String,
    pub score: f32,
}

impl IndexHit {
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
        }
    }
}

/// Equality filters on indexed fields; every entry must match
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeFilters(BTreeMap<String, String>);

impl ScopeFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.0.insert(field.into(), value.into());
    }

    /// Builder-style insert that ignores unset values
    pub fn with(mut self, field: &str, value: Option<&str>) -> Self {
        if let Some(value) = value {
            self.insert(field, value);
        }
        self
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every filter field is present in `fields` with an equal value
    pub fn matches(&self, fields: &BTreeMap<String, String>) -> bool {
        self.0
            .iter()
            .all(|(field, value)| fields.get(field) == Some(value))
    }
}

/// A document as pushed into the index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDocument {
    pub kind: DocumentKind,
    pub id: String,
    pub title: String,
    /// Additional keyword-searchable text (PRD body; empty for test cases)
    pub body: String,
    /// Filterable properties
    pub fields: BTreeMap<String, String>,
}

impl IndexDocument {
    pub fn from_prd(prd: &PrdDocument) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("project_id".to_string(), prd.project_id.clone());
        fields.insert("app_version_id".to_string(), prd.app_version_id.clone());
        if let Some(module_id) = &prd.module_id {
            fields.insert("module_id".to_string(), module_id.clone());
        }
        fields.insert("status".to_string(), prd.status.clone());
        fields.insert("title".to_string(), prd.title.clone());
        fields.insert("created_at".to_string(), prd.created_at.to_rfc3339());

        Self {
            kind: DocumentKind::Prd,
            id: prd.id.clone(),
            title: prd.title.clone(),
            body: prd.content.clone(),
            fields,
        }
    }

    pub fn from_test_case(test_case: &TestCase) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("project_id".to_string(), test_case.project_id.clone());
        fields.insert(
            "app_version_id".to_string(),
            test_case.app_version_id.clone(),
        );
        if let Some(module_id) = &test_case.module_id {
            fields.insert("module_id".to_string(), module_id.clone());
        }
        if let Some(prd_id) = &test_case.prd_id {
            fields.insert("prd_id".to_string(), prd_id.clone());
        }
        fields.insert("status".to_string(), test_case.status.clone());
        fields.insert("priority".to_string(), test_case.priority.clone());
        fields.insert("type".to_string(), test_case.case_type.clone());
        fields.insert("title".to_string(), test_case.title.clone());
        fields.insert(
            "created_at".to_string(),
            test_case.created_at.to_rfc3339(),
        );

        Self {
            kind: DocumentKind::TestCase,
            id: test_case.id.clone(),
            title: test_case.title.clone(),
            body: String::new(),
            fields,
        }
    }

    /// Text fed to the BM25 side of hybrid search
    pub fn keyword_text(&self) -> String {
        if self.body.is_empty() {
            self.title.clone()
        } else {
            format!("{}\n{}", self.title, self.body)
        }
    }
}

/// Vector index client
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Dense-vector search; only hits with certainty >= `threshold` are returned
    async fn search_by_vector(
        &self,
        kind: DocumentKind,
        vector: &[f32],
        limit: usize,
        threshold: f32,
        filters: &ScopeFilters,
    ) -> Result<Vec<IndexHit>, IndexError>;

    /// Blended dense + keyword search; `alpha` 1.0 is pure vector, 0.0 pure keyword
    async fn hybrid_search(
        &self,
        kind: DocumentKind,
        text: &str,
        vector: &[f32],
        limit: usize,
        alpha: f32,
        filters: &ScopeFilters,
    ) -> Result<Vec<IndexHit>, IndexError>;

    /// Insert or replace a document
    async fn upsert(&self, document: &IndexDocument, vector: &[f32]) -> Result<(), IndexError>;

    async fn delete(&self, kind: DocumentKind, id: &str) -> Result<(), IndexError>;

    /// Create collections if they do not exist yet
    async fn ensure_schema(&self) -> Result<(), IndexError>;
}
