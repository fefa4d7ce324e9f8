//! Pushes entities from the relational store into the vector index

use crate::embedding::{EmbeddingManager, EmbeddingProvider};
use crate::index::{IndexDocument, IndexError, VectorStore};
use crate::store::{EntityStore, PrdDocument, StoreError, TestCase};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_BATCH_SIZE: usize = 32;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("No embedding provider configured")]
    EmbeddingUnavailable,

    #[error("Failed to list documents: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to prepare index: {0}")]
    Index(#[from] IndexError),
}

/// Outcome of a full sync
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub prds: usize,
    pub test_cases: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

/// Document paired with the text its vector is computed from
struct SyncItem {
    document: IndexDocument,
    text: String,
}

impl SyncItem {
    fn prd(prd: &PrdDocument) -> Self {
        Self {
            document: IndexDocument::from_prd(prd),
            text: format!("{}\n\n{}", prd.title, prd.content),
        }
    }

    fn test_case(test_case: &TestCase) -> Self {
        Self {
            document: IndexDocument::from_test_case(test_case),
            text: test_case.title.clone(),
        }
    }
}

/// Embeds store entities in batches and upserts them into the index
pub struct Indexer {
    embeddings: Arc<EmbeddingManager>,
    index: Arc<dyn VectorStore>,
    entities: Arc<dyn EntityStore>,
    batch_size: usize,
}

impl Indexer {
    /// Create an indexer with the default batch size
    ///
    /// # Arguments
    /// * `embeddings` - Provider used to embed every document
    /// * `index` - Vector store that receives the documents
    /// * `entities` - Store listed by `sync_all`
    pub fn new(
        embeddings: Arc<EmbeddingManager>,
        index: Arc<dyn VectorStore>,
        entities: Arc<dyn EntityStore>,
    ) -> Self {
        Self {
            embeddings,
            index,
            entities,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Index every PRD and test case
    ///
    /// A document that fails to embed or upsert is logged and counted in
    /// `failed`; it never aborts the run.
    pub async fn sync_all(&self) -> Result<SyncReport, SyncError> {
        let start = std::time::Instant::now();
        let provider = self
            .embeddings
            .current()
            .ok_or(SyncError::EmbeddingUnavailable)?;

        self.index.ensure_schema().await?;

        let prds = self.entities.list_prds().await?;
        let test_cases = self.entities.list_test_cases().await?;

        info!(
            "Syncing {} PRDs and {} test cases with {}",
            prds.len(),
            test_cases.len(),
            provider.model_name()
        );

        let prd_items: Vec<SyncItem> = prds.iter().map(SyncItem::prd).collect();
        let (prd_ok, prd_failed) = self.process(provider.as_ref(), prd_items).await;

        let test_case_items: Vec<SyncItem> = test_cases.iter().map(SyncItem::test_case).collect();
        let (tc_ok, tc_failed) = self.process(provider.as_ref(), test_case_items).await;

        let report = SyncReport {
            prds: prd_ok,
            test_cases: tc_ok,
            failed: prd_failed + tc_failed,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "Sync complete: {} PRDs, {} test cases, {} failed, {}ms",
            report.prds, report.test_cases, report.failed, report.duration_ms
        );

        Ok(report)
    }

    /// Index a single PRD
    pub async fn index_prd(&self, prd: &PrdDocument) -> Result<bool, SyncError> {
        self.index_one(SyncItem::prd(prd)).await
    }

    /// Index a single test case
    pub async fn index_test_case(&self, test_case: &TestCase) -> Result<bool, SyncError> {
        self.index_one(SyncItem::test_case(test_case)).await
    }

    async fn index_one(&self, item: SyncItem) -> Result<bool, SyncError> {
        let provider = self
            .embeddings
            .current()
            .ok_or(SyncError::EmbeddingUnavailable)?;
        let (ok, _) = self.process(provider.as_ref(), vec![item]).await;
        Ok(ok == 1)
    }

    async fn process(
        &self,
        provider: &dyn EmbeddingProvider,
        items: Vec<SyncItem>,
    ) -> (usize, usize) {
        let mut processed = 0;
        let mut failed = 0;

        for chunk in items.chunks(self.batch_size) {
            let vectors = self.embed_chunk(provider, chunk).await;

            for (item, vector) in chunk.iter().zip(vectors) {
                let Some(vector) = vector else {
                    failed += 1;
                    continue;
                };

                match self.index.upsert(&item.document, &vector).await {
                    Ok(()) => processed += 1,
                    Err(e) => {
                        warn!(
                            "Failed to index {} {}: {}",
                            item.document.kind, item.document.id, e
                        );
                        failed += 1;
                    }
                }
            }

            debug!("Processed chunk of {} documents", chunk.len());
        }

        (processed, failed)
    }

    /// One vector per item; a failed batch falls back to per-item calls so
    /// a single bad document only loses itself
    async fn embed_chunk(
        &self,
        provider: &dyn EmbeddingProvider,
        chunk: &[SyncItem],
    ) -> Vec<Option<Vec<f32>>> {
        let texts: Vec<String> = chunk.iter().map(|item| item.text.clone()).collect();

        match provider.embed_batch(&texts).await {
            Ok(vectors) if vectors.len() == chunk.len() => {
                return vectors.into_iter().map(Some).collect();
            }
            Ok(vectors) => warn!(
                "Embedding count mismatch: expected {}, got {}; retrying one by one",
                chunk.len(),
                vectors.len()
            ),
            Err(e) => debug!("Batch embedding failed, retrying one by one: {}", e),
        }

        let mut vectors = Vec::with_capacity(chunk.len());
        for item in chunk {
            match provider.embed(&item.text).await {
                Ok(vector) => vectors.push(Some(vector)),
                Err(e) => {
                    warn!(
                        "Failed to embed {} {}: {}",
                        item.document.kind, item.document.id, e
                    );
                    vectors.push(None);
                }
            }
        }
        vectors
    }
}
