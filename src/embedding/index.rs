/// HNSW vector index for similarity search
use hnsw_rs::prelude::*;
use std::sync::{Arc, RwLock};
use thiserror::Error;

const HNSW_M: usize = 16;
const HNSW_MAX_LAYER: usize = 16;
const HNSW_EF_CONSTRUCTION: usize = 200;
const HNSW_EF_SEARCH: usize = 50;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}

/// Search result with ordinal ID and similarity score
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Ordinal assigned at insert time
    pub id: u64,
    /// Cosine similarity score, higher is more similar
    pub score: f32,
}

/// In-memory HNSW index, rebuilt for every run
///
/// Uses cosine distance; FastEmbed output is normalized, so the ranking
/// matches dot-product ordering.
pub struct VectorIndex {
    index: Arc<RwLock<Hnsw<'static, f32, DistCosine>>>,
    dimension: usize,
    count: Arc<RwLock<u64>>,
}

impl VectorIndex {
    /// Create a new vector index
    ///
    /// `capacity` sizes the internal layers; it is the expected number of
    /// vectors, not a hard cap.
    pub fn new(dimension: usize, capacity: usize) -> Self {
        let index = Hnsw::<f32, DistCosine>::new(
            HNSW_M,
            capacity.max(1),
            HNSW_MAX_LAYER,
            HNSW_EF_CONSTRUCTION,
            DistCosine,
        );

        Self {
            index: Arc::new(RwLock::new(index)),
            dimension,
            count: Arc::new(RwLock::new(0)),
        }
    }

    /// Insert a vector under the given ordinal
    pub fn insert(&self, id: u64, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let data = vector.to_vec();

        let index = self.index.write().unwrap();
        index.insert((&data, id as usize));

        let mut count = self.count.write().unwrap();
        *count += 1;

        Ok(())
    }

    /// Insert multiple vectors in batch
    pub fn insert_batch(&self, items: &[(u64, Vec<f32>)]) -> Result<(), VectorIndexError> {
        for (id, vector) in items {
            self.insert(*id, vector)?;
        }
        Ok(())
    }

    /// Search for the k nearest neighbors
    ///
    /// Results are sorted by similarity descending.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, VectorIndexError> {
        if query.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let index = self.index.read().unwrap();
        let results = index.search(query, k, HNSW_EF_SEARCH.max(k));

        Ok(results
            .into_iter()
            .map(|neighbor| SearchResult {
                id: neighbor.d_id as u64,
                score: 1.0 - neighbor.distance,
            })
            .collect())
    }

    /// Get the number of vectors in the index
    pub fn len(&self) -> u64 {
        *self.count.read().unwrap()
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get vector dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_creation() {
        let index = VectorIndex::new(8, 16);
        assert_eq!(index.dimension(), 8);
        assert_eq!(index.len(), 0);
        assert!(index.is_empty());
    }

    #[test]
    fn test_insert_and_search() {
        let index = VectorIndex::new(8, 16);

        let mut vec1 = vec![0.0; 8];
        vec1[0] = 1.0;

        let mut vec2 = vec![0.0; 8];
        vec2[1] = 1.0;

        let mut vec3 = vec![0.0; 8];
        vec3[0] = 0.9;
        vec3[1] = 0.1;

        index.insert(0, &vec1).unwrap();
        index.insert(1, &vec2).unwrap();
        index.insert(2, &vec3).unwrap();

        assert_eq!(index.len(), 3);

        let results = index.search(&vec1, 2).unwrap();
        assert_eq!(results.len(), 2);

        // Nearest to vec1 is itself or the near-parallel vec3
        assert!(results[0].id == 0 || results[0].id == 2);
        assert!(results[0].score > 0.8);
    }

    #[test]
    fn test_batch_insert() {
        let index = VectorIndex::new(8, 16);

        let items: Vec<(u64, Vec<f32>)> = (0..10).map(|i| (i, vec![(i + 1) as f32; 8])).collect();

        index.insert_batch(&items).unwrap();
        assert_eq!(index.len(), 10);
    }

    #[test]
    fn test_dimension_validation() {
        let index = VectorIndex::new(8, 16);

        let vec = vec![1.0; 4];
        let result = index.insert(0, &vec);
        assert!(matches!(
            result,
            Err(VectorIndexError::InvalidDimension {
                expected: 8,
                actual: 4
            })
        ));
    }
}
