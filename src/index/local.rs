//! Embedded index backend: HNSW for vectors, Tantivy for BM25
//!
//! Lives entirely in process memory; the binary rebuilds it from the
//! entity store on startup.

use super::keyword::KeywordCollection;
use super::vector::VectorCollection;
use super::{IndexDocument, IndexError, IndexHit, ScopeFilters, VectorStore};
use crate::store::DocumentKind;
use ahash::AHashMap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard};

/// HNSW graph parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HnswParams {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub max_elements: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 64,
            max_elements: 100_000,
        }
    }
}

type FieldTable = AHashMap<String, BTreeMap<String, String>>;

/// Vectors, keyword postings and filterable fields of one document kind
struct Collection {
    vectors: VectorCollection,
    keywords: KeywordCollection,
    fields: RwLock<FieldTable>,
}

impl Collection {
    fn new(dimension: usize, params: HnswParams) -> Result<Self, IndexError> {
        Ok(Self {
            vectors: VectorCollection::new(
                dimension,
                params.m,
                params.ef_construction,
                params.ef_search,
                params.max_elements,
            ),
            keywords: KeywordCollection::new()?,
            fields: RwLock::new(AHashMap::new()),
        })
    }

    fn fields(&self) -> Result<RwLockReadGuard<'_, FieldTable>, IndexError> {
        self.fields
            .read()
            .map_err(|_| IndexError::Backend("field table poisoned".to_string()))
    }

    /// Keep only ids whose stored fields satisfy every filter
    fn filtered(
        &self,
        scored: Vec<(String, f32)>,
        filters: &ScopeFilters,
    ) -> Result<Vec<(String, f32)>, IndexError> {
        let fields = self.fields()?;
        Ok(scored
            .into_iter()
            .filter(|(id, _)| {
                fields
                    .get(id)
                    .map(|f| filters.matches(f))
                    .unwrap_or(false)
            })
            .collect())
    }

    fn search_by_vector(
        &self,
        vector: &[f32],
        limit: usize,
        threshold: f32,
        filters: &ScopeFilters,
    ) -> Result<Vec<IndexHit>, IndexError> {
        let scored = self.filtered(self.vectors.search(vector)?, filters)?;

        Ok(scored
            .into_iter()
            .filter(|(_, certainty)| *certainty >= threshold)
            .take(limit)
            .map(|(id, certainty)| IndexHit::new(id, certainty))
            .collect())
    }

    fn hybrid_search(
        &self,
        text: &str,
        vector: &[f32],
        limit: usize,
        alpha: f32,
        filters: &ScopeFilters,
    ) -> Result<Vec<IndexHit>, IndexError> {
        let candidates = self.vectors.len().max(1);

        let dense = self.filtered(self.vectors.search(vector)?, filters)?;
        let sparse = self.filtered(self.keywords.search(text, candidates)?, filters)?;

        let fused = fuse_relative_scores(&dense, &sparse, alpha);
        Ok(fused
            .into_iter()
            .take(limit)
            .map(|(id, score)| IndexHit::new(id, score))
            .collect())
    }

    fn upsert(&self, document: &IndexDocument, vector: &[f32]) -> Result<(), IndexError> {
        self.vectors.upsert(&document.id, vector)?;
        self.keywords.upsert(&document.id, &document.keyword_text())?;
        self.fields
            .write()
            .map_err(|_| IndexError::Backend("field table poisoned".to_string()))?
            .insert(document.id.clone(), document.fields.clone());
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), IndexError> {
        self.vectors.remove(id)?;
        self.keywords.remove(id)?;
        self.fields
            .write()
            .map_err(|_| IndexError::Backend("field table poisoned".to_string()))?
            .remove(id);
        Ok(())
    }
}

/// In-process `VectorStore`
///
/// Graph searches and keyword commits are CPU-bound, so every operation
/// runs on the blocking thread pool.
pub struct LocalIndex {
    prds: Arc<Collection>,
    test_cases: Arc<Collection>,
}

impl LocalIndex {
    /// Create an empty index for both document kinds
    ///
    /// # Arguments
    /// * `dimension` - length of every vector stored or queried
    /// * `params` - HNSW graph parameters shared by both collections
    pub fn new(dimension: usize, params: HnswParams) -> Result<Self, IndexError> {
        tracing::debug!(
            "Creating local index: {}D, m={}, ef_construction={}",
            dimension,
            params.m,
            params.ef_construction
        );

        Ok(Self {
            prds: Arc::new(Collection::new(dimension, params)?),
            test_cases: Arc::new(Collection::new(dimension, params)?),
        })
    }

    fn collection(&self, kind: DocumentKind) -> &Arc<Collection> {
        match kind {
            DocumentKind::Prd => &self.prds,
            DocumentKind::TestCase => &self.test_cases,
        }
    }

    /// Run `f` against one collection on the blocking pool
    async fn run<T, F>(&self, kind: DocumentKind, f: F) -> Result<T, IndexError>
    where
        T: Send + 'static,
        F: FnOnce(&Collection) -> Result<T, IndexError> + Send + 'static,
    {
        let collection = Arc::clone(self.collection(kind));
        tokio::task::spawn_blocking(move || f(&collection))
            .await
            .map_err(|e| IndexError::Backend(format!("index task failed: {}", e)))?
    }

    /// Number of live documents of one kind
    pub fn len(&self, kind: DocumentKind) -> usize {
        self.collection(kind).vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prds.vectors.is_empty() && self.test_cases.vectors.is_empty()
    }
}

#[async_trait]
impl VectorStore for LocalIndex {
    async fn search_by_vector(
        &self,
        kind: DocumentKind,
        vector: &[f32],
        limit: usize,
        threshold: f32,
        filters: &ScopeFilters,
    ) -> Result<Vec<IndexHit>, IndexError> {
        let vector = vector.to_vec();
        let filters = filters.clone();
        self.run(kind, move |c| c.search_by_vector(&vector, limit, threshold, &filters))
            .await
    }

    async fn hybrid_search(
        &self,
        kind: DocumentKind,
        text: &str,
        vector: &[f32],
        limit: usize,
        alpha: f32,
        filters: &ScopeFilters,
    ) -> Result<Vec<IndexHit>, IndexError> {
        let text = text.to_string();
        let vector = vector.to_vec();
        let filters = filters.clone();
        self.run(kind, move |c| {
            c.hybrid_search(&text, &vector, limit, alpha, &filters)
        })
        .await
    }

    async fn upsert(&self, document: &IndexDocument, vector: &[f32]) -> Result<(), IndexError> {
        let document = document.clone();
        let vector = vector.to_vec();
        self.run(document.kind, move |c| c.upsert(&document, &vector)).await
    }

    async fn delete(&self, kind: DocumentKind, id: &str) -> Result<(), IndexError> {
        let id = id.to_string();
        self.run(kind, move |c| c.delete(&id)).await
    }

    async fn ensure_schema(&self) -> Result<(), IndexError> {
        Ok(())
    }
}

/// Relative score fusion
///
/// Each list is min-max normalised to [0, 1] (a list whose scores are all
/// equal normalises to 1.0), then a document's fused score is
/// `alpha * dense + (1 - alpha) * sparse`, with 0 for a list it is missing
/// from. Output is sorted by fused score desc, then id asc.
pub(crate) fn fuse_relative_scores(
    dense: &[(String, f32)],
    sparse: &[(String, f32)],
    alpha: f32,
) -> Vec<(String, f32)> {
    let mut fused: AHashMap<&str, f32> = AHashMap::new();

    for (id, score) in normalize(dense) {
        *fused.entry(id).or_insert(0.0) += alpha * score;
    }
    for (id, score) in normalize(sparse) {
        *fused.entry(id).or_insert(0.0) += (1.0 - alpha) * score;
    }

    let mut results: Vec<(String, f32)> = fused
        .into_iter()
        .map(|(id, score)| (id.to_string(), score))
        .collect();
    results.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    results
}

fn normalize(scored: &[(String, f32)]) -> impl Iterator<Item = (&str, f32)> {
    let min = scored.iter().map(|(_, s)| *s).fold(f32::INFINITY, f32::min);
    let max = scored
        .iter()
        .map(|(_, s)| *s)
        .fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    scored.iter().map(move |(id, score)| {
        let normalized = if range > f32::EPSILON {
            (score - min) / range
        } else {
            1.0
        };
        (id.as_str(), normalized)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(items: &[(&str, f32)]) -> Vec<(String, f32)> {
        items.iter().map(|(id, s)| (id.to_string(), *s)).collect()
    }

    fn document(kind: DocumentKind, id: &str, title: &str, project: &str) -> IndexDocument {
        let mut fields = BTreeMap::new();
        fields.insert("project_id".to_string(), project.to_string());
        IndexDocument {
            kind,
            id: id.to_string(),
            title: title.to_string(),
            body: String::new(),
            fields,
        }
    }

    fn unit(axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; 4];
        v[axis] = 1.0;
        v
    }

    #[test]
    fn test_fusion_weights_by_alpha() {
        let dense = scored(&[("a", 0.9), ("b", 0.5)]);
        let sparse = scored(&[("b", 12.0), ("c", 3.0)]);

        let fused = fuse_relative_scores(&dense, &sparse, 0.5);
        let get = |id: &str| fused.iter().find(|(i, _)| i == id).unwrap().1;

        assert!((get("a") - 0.5).abs() < 1e-6);
        assert!((get("b") - 0.5).abs() < 1e-6);
        assert!(get("c").abs() < 1e-6);
        // equal scores fall back to id order
        assert_eq!(fused[0].0, "a");
    }

    #[test]
    fn test_fusion_pure_keyword() {
        let dense = scored(&[("a", 0.9)]);
        let sparse = scored(&[("b", 2.0)]);
        let fused = fuse_relative_scores(&dense, &sparse, 0.0);
        assert_eq!(fused[0], ("b".to_string(), 1.0));
    }

    #[tokio::test]
    async fn test_vector_search_applies_threshold_and_filters() {
        let index = LocalIndex::new(4, HnswParams::default()).unwrap();
        index
            .upsert(&document(DocumentKind::TestCase, "t1", "Login", "p1"), &unit(0))
            .await
            .unwrap();
        index
            .upsert(&document(DocumentKind::TestCase, "t2", "Logout", "p2"), &unit(0))
            .await
            .unwrap();
        index
            .upsert(&document(DocumentKind::TestCase, "t3", "Export", "p1"), &unit(1))
            .await
            .unwrap();

        let filters = ScopeFilters::new().with("project_id", Some("p1"));
        let hits = index
            .search_by_vector(DocumentKind::TestCase, &unit(0), 10, 0.7, &filters)
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "t1");

        let prd_hits = index
            .search_by_vector(DocumentKind::Prd, &unit(0), 10, 0.0, &ScopeFilters::new())
            .await
            .unwrap();
        assert!(prd_hits.is_empty());
    }

    #[tokio::test]
    async fn test_hybrid_search_finds_keyword_match() {
        let index = LocalIndex::new(4, HnswParams::default()).unwrap();
        index
            .upsert(
                &document(DocumentKind::Prd, "p-pay", "Payment gateway", "p1"),
                &unit(1),
            )
            .await
            .unwrap();
        index
            .upsert(
                &document(DocumentKind::Prd, "p-login", "Login screen", "p1"),
                &unit(0),
            )
            .await
            .unwrap();

        let hits = index
            .hybrid_search(
                DocumentKind::Prd,
                "payment",
                &unit(0),
                10,
                0.0,
                &ScopeFilters::new(),
            )
            .await
            .unwrap();

        assert_eq!(hits[0].id, "p-pay");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_delete_removes_document() {
        let index = LocalIndex::new(4, HnswParams::default()).unwrap();
        let doc = document(DocumentKind::Prd, "p1", "Checkout", "proj");
        index.upsert(&doc, &unit(2)).await.unwrap();
        assert_eq!(index.len(DocumentKind::Prd), 1);

        index.delete(DocumentKind::Prd, "p1").await.unwrap();
        assert!(index.is_empty());

        let hits = index
            .hybrid_search(
                DocumentKind::Prd,
                "checkout",
                &unit(2),
                10,
                0.5,
                &ScopeFilters::new(),
            )
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_searches_share_the_index() {
        let index = Arc::new(LocalIndex::new(4, HnswParams::default()).unwrap());
        for axis in 0..4 {
            let id = format!("t{}", axis);
            index
                .upsert(&document(DocumentKind::TestCase, &id, "Checkout", "p1"), &unit(axis))
                .await
                .unwrap();
        }

        let mut tasks = Vec::new();
        for round in 0..16 {
            let index = Arc::clone(&index);
            tasks.push(tokio::spawn(async move {
                let axis = round % 4;
                let hits = index
                    .hybrid_search(
                        DocumentKind::TestCase,
                        "checkout",
                        &unit(axis),
                        2,
                        0.5,
                        &ScopeFilters::new(),
                    )
                    .await
                    .unwrap();
                (axis, hits)
            }));
        }

        for task in tasks {
            let (axis, hits) = task.await.unwrap();
            assert_eq!(hits.len(), 2);
            assert_eq!(hits[0].id, format!("t{}", axis));
        }
        assert_eq!(index.len(DocumentKind::TestCase), 4);
    }
}
