//! Caselens - hybrid retrieval and reranking for PRDs and test cases
//!
//! Embeds a query, pulls candidates from a vector index (pure vector or
//! blended with keyword relevance), resolves them to full records, and
//! reorders them with business signals such as status, priority, freshness
//! and completeness. Also recommends documents similar to a given one.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod search;
pub mod settings;
pub mod store;
pub mod sync;

pub use error::{CaselensError, Result};
pub use search::{SearchError, SearchKind, SearchQuery, SearchResponse, SearchResult, SearchService};
