//! Nearest-neighbour lookup over chunk embeddings.
//!
//! [`ExactIndex`] scans every entry on each search: O(n·d) per query and O(1)
//! amortised upsert, with exact results and deterministic ordering. An
//! approximate graph index such as HNSW answers in roughly O(log n · d) but
//! trades recall for speed and makes tie order depend on graph construction.
//! For single-node corpora of up to a few hundred thousand chunks the exact
//! scan stays within interactive latency, so it is the only implementation.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::error::MemoryError;
use crate::types::ChunkId;

/// Similarity function. Higher scores are always better.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Cosine,
    Dot,
    /// Negative Euclidean distance.
    Euclidean,
}

impl Metric {
    #[must_use]
    pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => cosine_similarity(a, b),
            Self::Dot => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            Self::Euclidean => -a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub id: ChunkId,
    pub score: f32,
}

pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite one entry. An existing id keeps its insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the vector is empty, non-finite, or of the wrong dimension.
    fn upsert(&self, id: ChunkId, embedding: Vec<f32>) -> Result<(), MemoryError>;

    /// Remove `remove` and upsert `upsert` as one atomic step.
    ///
    /// Nothing changes when any vector is rejected.
    ///
    /// # Errors
    ///
    /// Same as [`VectorIndex::upsert`], for any of the vectors.
    fn replace(
        &self,
        remove: &[ChunkId],
        upsert: Vec<(ChunkId, Vec<f32>)>,
    ) -> Result<(), MemoryError>;

    /// Check whether [`VectorIndex::replace`] would accept these arguments.
    ///
    /// # Errors
    ///
    /// The error `replace` would return.
    fn check_replace(
        &self,
        remove: &[ChunkId],
        upsert: &[(ChunkId, Vec<f32>)],
    ) -> Result<(), MemoryError>;

    /// Top `k` entries by descending score, ties broken by insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query is non-finite or of the wrong dimension.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, MemoryError>;

    fn remove(&self, id: &ChunkId) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dimension(&self) -> Option<usize>;

    /// All entries in insertion order.
    fn entries(&self) -> Vec<(ChunkId, Vec<f32>)>;
}

struct Entry {
    seq: u64,
    vector: Vec<f32>,
}

#[derive(Default)]
struct IndexInner {
    entries: HashMap<ChunkId, Entry>,
    next_seq: u64,
    dimension: Option<usize>,
}

impl IndexInner {
    fn insert(&mut self, id: ChunkId, vector: Vec<f32>) {
        self.dimension = Some(vector.len());
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.vector = vector;
        } else {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.entries.insert(id, Entry { seq, vector });
        }
    }

    fn delete(&mut self, id: &ChunkId) -> bool {
        let removed = self.entries.remove(id).is_some();
        if self.entries.is_empty() {
            self.dimension = None;
        }
        removed
    }

    /// Dimension the index will require once `remove` is applied.
    fn dimension_after(&self, remove: &[ChunkId]) -> Option<usize> {
        let removed: HashSet<&ChunkId> = remove.iter().collect();
        let survivors = self.entries.keys().any(|id| !removed.contains(id));
        if survivors { self.dimension } else { None }
    }
}

fn validate(vector: &[f32], expected: Option<usize>) -> Result<(), MemoryError> {
    if vector.is_empty() {
        return Err(MemoryError::InvalidVector("empty vector".into()));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(MemoryError::InvalidVector("non-finite component".into()));
    }
    match expected {
        Some(expected) if expected != vector.len() => Err(MemoryError::DimensionMismatch {
            expected,
            actual: vector.len(),
        }),
        _ => Ok(()),
    }
}

fn validate_batch(
    upsert: &[(ChunkId, Vec<f32>)],
    mut expected: Option<usize>,
) -> Result<(), MemoryError> {
    for (_, vector) in upsert {
        validate(vector, expected)?;
        expected = Some(vector.len());
    }
    Ok(())
}

/// Brute-force index guarded by a single `RwLock`.
pub struct ExactIndex {
    metric: Metric,
    inner: RwLock<IndexInner>,
}

impl ExactIndex {
    #[must_use]
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            inner: RwLock::new(IndexInner::default()),
        }
    }

    #[must_use]
    pub fn metric(&self) -> Metric {
        self.metric
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ExactIndex {
    fn default() -> Self {
        Self::new(Metric::default())
    }
}

impl std::fmt::Debug for ExactIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExactIndex")
            .field("metric", &self.metric)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl VectorIndex for ExactIndex {
    fn upsert(&self, id: ChunkId, embedding: Vec<f32>) -> Result<(), MemoryError> {
        let mut inner = self.write();
        let expected = inner.dimension_after(std::slice::from_ref(&id));
        validate(&embedding, expected)?;
        inner.insert(id, embedding);
        Ok(())
    }

    fn replace(
        &self,
        remove: &[ChunkId],
        upsert: Vec<(ChunkId, Vec<f32>)>,
    ) -> Result<(), MemoryError> {
        let mut inner = self.write();
        validate_batch(&upsert, inner.dimension_after(remove))?;
        for id in remove {
            inner.delete(id);
        }
        for (id, vector) in upsert {
            inner.insert(id, vector);
        }
        Ok(())
    }

    fn check_replace(
        &self,
        remove: &[ChunkId],
        upsert: &[(ChunkId, Vec<f32>)],
    ) -> Result<(), MemoryError> {
        let inner = self.read();
        validate_batch(upsert, inner.dimension_after(remove))
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, MemoryError> {
        let inner = self.read();
        if k == 0 || inner.entries.is_empty() {
            return Ok(Vec::new());
        }
        validate(query, inner.dimension)?;

        let mut scored: Vec<(u64, ScoredChunk)> = inner
            .entries
            .iter()
            .map(|(id, entry)| {
                let score = self.metric.score(query, &entry.vector);
                (entry.seq, ScoredChunk { id: *id, score })
            })
            .collect();
        drop(inner);

        let order = |a: &(u64, ScoredChunk), b: &(u64, ScoredChunk)| -> Ordering {
            b.1.score.total_cmp(&a.1.score).then(a.0.cmp(&b.0))
        };
        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, order);
            scored.truncate(k);
        }
        scored.sort_unstable_by(order);

        Ok(scored.into_iter().map(|(_, hit)| hit).collect())
    }

    fn remove(&self, id: &ChunkId) -> bool {
        self.write().delete(id)
    }

    fn len(&self) -> usize {
        self.read().entries.len()
    }

    fn dimension(&self) -> Option<usize> {
        self.read().dimension
    }

    fn entries(&self) -> Vec<(ChunkId, Vec<f32>)> {
        let inner = self.read();
        let mut all: Vec<(u64, ChunkId, Vec<f32>)> = inner
            .entries
            .iter()
            .map(|(id, e)| (e.seq, *id, e.vector.clone()))
            .collect();
        all.sort_unstable_by_key(|(seq, _, _)| *seq);
        all.into_iter().map(|(_, id, v)| (id, v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentId;

    fn id(n: usize) -> ChunkId {
        ChunkId::derive(&DocumentId::new("doc"), n, 0, 1, "x")
    }

    #[test]
    fn search_empty_returns_empty() {
        let index = ExactIndex::default();
        assert!(index.search(&[1.0, 0.0], 5).unwrap().is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn search_ranks_by_similarity() {
        let index = ExactIndex::default();
        index.upsert(id(0), vec![1.0, 0.0]).unwrap();
        index.upsert(id(1), vec![0.0, 1.0]).unwrap();
        index.upsert(id(2), vec![0.7, 0.7]).unwrap();

        let hits = index.search(&[1.0, 0.1], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, id(0));
        assert_eq!(hits[1].id, id(2));
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn k_zero_returns_empty() {
        let index = ExactIndex::default();
        index.upsert(id(0), vec![1.0]).unwrap();
        assert!(index.search(&[1.0], 0).unwrap().is_empty());
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let index = ExactIndex::default();
        for n in 0..5 {
            index.upsert(id(n), vec![1.0, 1.0]).unwrap();
        }
        let hits = index.search(&[1.0, 1.0], 3).unwrap();
        let ids: Vec<ChunkId> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![id(0), id(1), id(2)]);
    }

    #[test]
    fn upsert_keeps_original_sequence() {
        let index = ExactIndex::default();
        index.upsert(id(0), vec![1.0, 0.0]).unwrap();
        index.upsert(id(1), vec![1.0, 0.0]).unwrap();
        index.upsert(id(0), vec![2.0, 0.0]).unwrap();

        let hits = index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].id, id(0));
        assert_eq!(index.entries()[0].0, id(0));
    }

    #[test]
    fn sequential_upserts_leave_last_value() {
        let index = ExactIndex::new(Metric::Dot);
        index.upsert(id(0), vec![1.0, 0.0]).unwrap();
        index.upsert(id(0), vec![0.0, 3.0]).unwrap();

        assert_eq!(index.len(), 1);
        assert_eq!(index.entries(), vec![(id(0), vec![0.0, 3.0])]);
        let hits = index.search(&[0.0, 1.0], 1).unwrap();
        assert!((hits[0].score - 3.0).abs() < f32::EPSILON);
    }

    #[test]
    fn dimension_mismatch_rejected() {
        let index = ExactIndex::default();
        index.upsert(id(0), vec![1.0, 0.0]).unwrap();

        let err = index.upsert(id(1), vec![1.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            MemoryError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
        let err = index.search(&[1.0], 1).unwrap_err();
        assert!(matches!(err, MemoryError::DimensionMismatch { .. }));
    }

    #[test]
    fn overwriting_only_entry_may_change_dimension() {
        let index = ExactIndex::default();
        index.upsert(id(0), vec![1.0, 0.0]).unwrap();
        index.upsert(id(0), vec![1.0, 0.0, 0.0]).unwrap();
        assert_eq!(index.dimension(), Some(3));
    }

    #[test]
    fn non_finite_vectors_rejected() {
        let index = ExactIndex::default();
        assert!(matches!(
            index.upsert(id(0), vec![f32::NAN]),
            Err(MemoryError::InvalidVector(_))
        ));
        assert!(matches!(
            index.upsert(id(0), Vec::new()),
            Err(MemoryError::InvalidVector(_))
        ));
        index.upsert(id(0), vec![1.0]).unwrap();
        assert!(index.search(&[f32::INFINITY], 1).is_err());
    }

    #[test]
    fn replace_is_all_or_nothing() {
        let index = ExactIndex::default();
        index.upsert(id(0), vec![1.0, 0.0]).unwrap();
        index.upsert(id(1), vec![0.0, 1.0]).unwrap();

        let bad = vec![(id(2), vec![1.0, 1.0]), (id(3), vec![1.0])];
        assert!(index.check_replace(&[id(0)], &bad).is_err());
        assert!(index.replace(&[id(0)], bad).is_err());
        assert_eq!(index.len(), 2);

        index
            .replace(&[id(0)], vec![(id(2), vec![1.0, 1.0])])
            .unwrap();
        let ids: Vec<ChunkId> = index.entries().into_iter().map(|(i, _)| i).collect();
        assert_eq!(ids, vec![id(1), id(2)]);
    }

    #[test]
    fn replace_everything_resets_dimension() {
        let index = ExactIndex::default();
        index.upsert(id(0), vec![1.0, 0.0]).unwrap();
        index.replace(&[id(0)], vec![(id(1), vec![1.0, 0.0, 0.0])]).unwrap();
        assert_eq!(index.dimension(), Some(3));
    }

    #[test]
    fn remove_entry() {
        let index = ExactIndex::default();
        index.upsert(id(0), vec![1.0]).unwrap();
        assert!(index.remove(&id(0)));
        assert!(!index.remove(&id(0)));
        assert!(index.is_empty());
        assert_eq!(index.dimension(), None);
    }

    #[test]
    fn euclidean_prefers_nearest() {
        let index = ExactIndex::new(Metric::Euclidean);
        index.upsert(id(0), vec![10.0, 10.0]).unwrap();
        index.upsert(id(1), vec![1.0, 1.0]).unwrap();
        let hits = index.search(&[0.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].id, id(1));
        assert!(hits[0].score <= 0.0);
    }

    #[test]
    fn cosine_zero_vector_scores_zero() {
        assert!(Metric::Cosine.score(&[0.0, 0.0], &[1.0, 0.0]).abs() < f32::EPSILON);
    }

    #[test]
    fn metric_deserializes_lowercase() {
        let m: Metric = serde_json::from_str("\"euclidean\"").unwrap();
        assert_eq!(m, Metric::Euclidean);
    }

    mod proptest_index {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(200))]

            #[test]
            fn large_k_returns_all_sorted_unique(
                vectors in proptest::collection::vec(
                    proptest::collection::vec(-1.0f32..1.0, 4),
                    0..60,
                ),
                query in proptest::collection::vec(-1.0f32..1.0, 4),
                extra in 0usize..10,
            ) {
                let index = ExactIndex::default();
                for (n, v) in vectors.iter().enumerate() {
                    index.upsert(id(n), v.clone()).unwrap();
                }
                let hits = index.search(&query, vectors.len() + extra).unwrap();
                prop_assert_eq!(hits.len(), vectors.len());
                for pair in hits.windows(2) {
                    prop_assert!(pair[0].score >= pair[1].score);
                }
                let unique: HashSet<ChunkId> = hits.iter().map(|h| h.id).collect();
                prop_assert_eq!(unique.len(), hits.len());
            }

            #[test]
            fn top_k_is_prefix_of_full_ranking(
                vectors in proptest::collection::vec(
                    proptest::collection::vec(-1.0f32..1.0, 3),
                    1..40,
                ),
                query in proptest::collection::vec(-1.0f32..1.0, 3),
                k in 1usize..40,
            ) {
                let index = ExactIndex::new(Metric::Dot);
                for (n, v) in vectors.iter().enumerate() {
                    index.upsert(id(n), v.clone()).unwrap();
                }
                let full = index.search(&query, vectors.len()).unwrap();
                let top = index.search(&query, k).unwrap();
                prop_assert_eq!(&full[..top.len()], &top[..]);
            }
        }
    }
}
