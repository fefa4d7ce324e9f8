//! Embedding generation
//!
//! - `EmbeddingProvider` capability trait
//! - `MockEmbeddingProvider`: deterministic stub for tests and offline use
//! - `OpenAiEmbeddingProvider` / `VolcanoArkEmbeddingProvider`: remote APIs
//! - `FastEmbedProvider`: local ONNX models
//! - `EmbeddingManager`: selects one provider from settings and publishes it

mod http;
mod manager;
mod provider;

pub use http::{OpenAiEmbeddingProvider, VolcanoArkEmbeddingProvider, DEFAULT_TIMEOUT};
pub use manager::{EmbeddingManager, ManagerError};
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider, MockEmbeddingProvider};
