//! Query, result and response types for the search API
use super::SearchError;
use crate::index::ScopeFilters;
use crate::store::DocumentKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Which document collections a query targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    Prd,
    TestCase,
    #[default]
    All,
}

impl SearchKind {
    /// Collections to query, in merge order
    pub fn document_kinds(&self) -> &'static [DocumentKind] {
        match self {
            SearchKind::Prd => &[DocumentKind::Prd],
            SearchKind::TestCase => &[DocumentKind::TestCase],
            SearchKind::All => &[DocumentKind::Prd, DocumentKind::TestCase],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchKind::Prd => "prd",
            SearchKind::TestCase => "testcase",
            SearchKind::All => "all",
        }
    }
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchKind {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prd" => Ok(SearchKind::Prd),
            "testcase" | "test_case" => Ok(SearchKind::TestCase),
            "all" => Ok(SearchKind::All),
            other => Err(SearchError::UnsupportedKind(other.to_string())),
        }
    }
}

impl From<DocumentKind> for SearchKind {
    fn from(kind: DocumentKind) -> Self {
        match kind {
            DocumentKind::Prd => SearchKind::Prd,
            DocumentKind::TestCase => SearchKind::TestCase,
        }
    }
}

/// A search request; unset fields take the configured defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    #[serde(rename = "type", default)]
    pub kind: SearchKind,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub threshold: Option<f32>,
    /// 0 = pure keyword, 1 = pure vector
    #[serde(default)]
    pub alpha: Option<f32>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub module_id: Option<String>,
    #[serde(default)]
    pub app_version_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, kind: SearchKind) -> Self {
        Self {
            text: text.into(),
            kind,
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = Some(alpha);
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Scope filters from the set fields, keyed by index property name
    pub fn scope_filters(&self) -> ScopeFilters {
        ScopeFilters::new()
            .with("project_id", self.project_id.as_deref())
            .with("module_id", self.module_id.as_deref())
            .with("app_version_id", self.app_version_id.as_deref())
            .with("status", self.status.as_deref())
    }
}

/// Fully-resolved retrieval parameters for one search call
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalParams {
    pub text: String,
    pub limit: usize,
    pub threshold: f32,
    pub alpha: f32,
    pub filters: ScopeFilters,
}

/// One ranked document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(rename = "type")]
    pub kind: DocumentKind,
    pub id: String,
    pub title: String,
    pub content: String,
    /// Final score; equals `vector_score` until reranked
    pub score: f32,
    /// Relevance score returned by the index
    pub vector_score: f32,
    pub metadata: BTreeMap<String, Value>,
    pub highlights: Vec<String>,
}

impl SearchResult {
    /// String-valued metadata field, if present
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub total: usize,
    pub query: String,
    #[serde(rename = "type")]
    pub kind: SearchKind,
}

impl SearchResponse {
    pub fn new(query: impl Into<String>, kind: SearchKind, results: Vec<SearchResult>) -> Self {
        Self {
            total: results.len(),
            results,
            query: query.into(),
            kind,
        }
    }
}
