//! Exact nearest-neighbour index over one document's passages.

use crate::core::errors::RagError;
use crate::rag::chunker::Passage;
use crate::rag::embedding_cache::EmbeddingCache;
use crate::vector_math::rank_ascending_by_l2;

#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub position: usize,
    pub passage: Passage,
    pub vector: Vec<f32>,
}

/// One search result; `distance` is squared L2, lower is closer.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub position: usize,
    pub passage: Passage,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    document_id: String,
    namespace: String,
    dimension: usize,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Embeds every passage through the cache and pairs it with its vector.
    pub async fn build(
        document_id: &str,
        passages: Vec<Passage>,
        cache: &EmbeddingCache,
    ) -> Result<Self, RagError> {
        let texts: Vec<String> = passages.iter().map(|p| p.text.clone()).collect();
        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            cache.get_or_compute_batch(&texts).await?
        };

        let pairs = passages
            .into_iter()
            .zip(vectors)
            .map(|(passage, vector)| (passage, vector.values))
            .collect();
        let index = Self::from_pairs(document_id, cache.namespace(), pairs)?;

        let stats = cache.stats();
        tracing::info!(
            "Built index for {}: {} passages, dimension {} (cache hits {}, misses {})",
            document_id,
            index.len(),
            index.dimension(),
            stats.hits,
            stats.misses
        );
        Ok(index)
    }

    /// Assigns positions in order; every vector must share one dimension.
    pub fn from_pairs(
        document_id: &str,
        namespace: &str,
        pairs: Vec<(Passage, Vec<f32>)>,
    ) -> Result<Self, RagError> {
        let dimension = pairs.first().map(|(_, v)| v.len()).unwrap_or(0);
        let mut entries = Vec::with_capacity(pairs.len());
        for (position, (passage, vector)) in pairs.into_iter().enumerate() {
            if vector.len() != dimension || dimension == 0 {
                return Err(RagError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            entries.push(IndexEntry {
                position,
                passage,
                vector,
            });
        }

        Ok(Self {
            document_id: document_id.to_string(),
            namespace: namespace.to_string(),
            dimension,
            entries,
        })
    }

    /// Up to `k` entries by ascending distance; ties keep index order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, RagError> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let vectors: Vec<Vec<f32>> = self.entries.iter().map(|e| e.vector.clone()).collect();
        let ranked = rank_ascending_by_l2(query, &vectors)?;

        Ok(ranked
            .into_iter()
            .take(k)
            .map(|(idx, distance)| {
                let entry = &self.entries[idx];
                SearchHit {
                    position: entry.position,
                    passage: entry.passage.clone(),
                    distance,
                }
            })
            .collect())
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
