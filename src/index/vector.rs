//! HNSW vector collection for similarity search
use super::IndexError;
use ahash::AHashMap;
use hnsw_rs::prelude::*;
use std::sync::RwLock;

/// HNSW graphs cannot drop points, so a replaced or deleted document keeps
/// its slot in the graph and is masked out here.
#[derive(Default)]
struct SlotTable {
    by_id: AHashMap<String, usize>,
    ids: Vec<Option<String>>,
}

/// Cosine HNSW index keyed by string document ids
pub struct VectorCollection {
    index: Hnsw<'static, f32, DistCosine>,
    slots: RwLock<SlotTable>,
    dimension: usize,
    ef_search: usize,
}

impl VectorCollection {
    /// Create an empty cosine-distance collection
    ///
    /// # Arguments
    /// * `dimension` - Vector dimension (must match the embedding provider)
    /// * `m` - HNSW M parameter (connections per layer)
    /// * `ef_construction` - HNSW construction parameter (higher = better recall, slower build)
    /// * `ef_search` - Candidate list size at query time
    /// * `max_elements` - Capacity hint for the graph
    pub fn new(
        dimension: usize,
        m: usize,
        ef_construction: usize,
        ef_search: usize,
        max_elements: usize,
    ) -> Self {
        let index = Hnsw::<f32, DistCosine>::new(m, max_elements, 16, ef_construction, DistCosine);

        Self {
            index,
            slots: RwLock::new(SlotTable::default()),
            dimension,
            ef_search,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Insert a vector, masking any earlier vector stored under the same id
    pub fn upsert(&self, id: &str, vector: &[f32]) -> Result<(), IndexError> {
        self.check_dimension(vector)?;

        let mut slots = self
            .slots
            .write()
            .map_err(|_| IndexError::Backend("vector slot table poisoned".to_string()))?;

        let slot = slots.ids.len();
        self.index.insert((vector, slot));

        if let Some(old) = slots.by_id.insert(id.to_string(), slot) {
            slots.ids[old] = None;
        }
        slots.ids.push(Some(id.to_string()));

        Ok(())
    }

    pub fn remove(&self, id: &str) -> Result<bool, IndexError> {
        let mut slots = self
            .slots
            .write()
            .map_err(|_| IndexError::Backend("vector slot table poisoned".to_string()))?;

        match slots.by_id.remove(id) {
            Some(slot) => {
                slots.ids[slot] = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Every live document with its certainty, best first
    ///
    /// Certainty is `1 - d/2` for cosine distance `d`, which maps [0, 2]
    /// onto [1, 0].
    pub fn search(&self, query: &[f32]) -> Result<Vec<(String, f32)>, IndexError> {
        self.check_dimension(query)?;

        let slots = self
            .slots
            .read()
            .map_err(|_| IndexError::Backend("vector slot table poisoned".to_string()))?;

        if slots.by_id.is_empty() {
            return Ok(Vec::new());
        }

        let k = slots.ids.len();
        let neighbours = self.index.search(query, k, self.ef_search.max(k));

        let mut results: Vec<(String, f32)> = neighbours
            .into_iter()
            .filter_map(|n| {
                let id = slots.ids.get(n.d_id)?.as_ref()?;
                let certainty = (1.0 - n.distance / 2.0).clamp(0.0, 1.0);
                Some((id.clone(), certainty))
            })
            .collect();

        results.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(results)
    }

    /// Number of live documents
    pub fn len(&self) -> usize {
        self.slots.read().map(|s| s.by_id.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
