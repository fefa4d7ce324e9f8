//! Entity records and the relational store interface
//!
//! The search core never writes entities; it only resolves identifiers
//! returned by the vector index into full PRD and test case records.

mod database;

pub use database::{DbPool, SqliteStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: DocumentKind, id: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Store task failed: {0}")]
    Task(String),
}

/// Kind of a searchable document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Prd,
    TestCase,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Prd => "prd",
            DocumentKind::TestCase => "testcase",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised document kind string
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unsupported document kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for DocumentKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prd" => Ok(DocumentKind::Prd),
            "testcase" | "test_case" => Ok(DocumentKind::TestCase),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}

/// PRD document as stored in the relational store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrdDocument {
    pub id: String,
    pub project_id: String,
    pub app_version_id: String,
    #[serde(default)]
    pub module_id: Option<String>,
    pub code: String,
    pub title: String,
    pub content: String,
    /// published, draft or archived
    pub status: String,
    #[serde(default = "default_version")]
    pub version: i64,
    #[serde(default)]
    pub author: String,
    pub created_at: DateTime<Utc>,
}

/// Test case as stored in the relational store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    pub project_id: String,
    pub app_version_id: String,
    #[serde(default)]
    pub module_id: Option<String>,
    #[serde(default)]
    pub prd_id: Option<String>,
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub precondition: String,
    pub expected_result: String,
    /// high/medium/low or P0..P4
    pub priority: String,
    #[serde(rename = "type")]
    pub case_type: String,
    /// active, draft or deprecated
    pub status: String,
    #[serde(default = "default_version")]
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

fn default_version() -> i64 {
    1
}

/// Documents loaded in one go, e.g. from a JSON fixture
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportBundle {
    #[serde(default)]
    pub prds: Vec<PrdDocument>,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

/// Read access to full entity records
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn get_prd(&self, id: &str) -> Result<PrdDocument, StoreError>;

    async fn get_test_case(&self, id: &str) -> Result<TestCase, StoreError>;

    async fn list_prds(&self) -> Result<Vec<PrdDocument>, StoreError>;

    async fn list_test_cases(&self) -> Result<Vec<TestCase>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("prd".parse::<DocumentKind>().unwrap(), DocumentKind::Prd);
        assert_eq!(
            "TestCase".parse::<DocumentKind>().unwrap(),
            DocumentKind::TestCase
        );
        assert_eq!(
            "test_case".parse::<DocumentKind>().unwrap(),
            DocumentKind::TestCase
        );
        assert!("bug".parse::<DocumentKind>().is_err());
    }

    #[test]
    fn test_kind_serde_matches_display() {
        let json = serde_json::to_string(&DocumentKind::TestCase).unwrap();
        assert_eq!(json, "\"testcase\"");
        assert_eq!(DocumentKind::Prd.to_string(), "prd");
    }
}
