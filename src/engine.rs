//! Production query entry point (spec.md §4.7, §6): assembles the
//! cache-gated forward-index and posting-store readers for a set of
//! segments and runs a multi-leaf search over them. Grounded on the
//! teacher's `InvertedIndex::search`, which is the same shape — gather
//! one `PostingList` per component, score, merge — but here each
//! segment's two readers are looked up through [`crate::cache`] rather
//! than held as owned fields of the index itself.

use std::sync::Arc;

use roaring::RoaringBitmap;

use crate::cache::ReadThroughCache;
use crate::concurrency::{CancellationToken, Deadline};
use crate::external::StorageBackend;
use crate::forward_index::cached::CacheGatedForwardIndexReader;
use crate::forward_index::disk::{DiskForwardIndexReader, ForwardIndexOffsets};
use crate::posting::cached::CacheGatedPostingStoreReader;
use crate::posting::disk::{DiskPostingStoreReader, PostingOffsets};
use crate::posting::PostingClusters;
use crate::query::{search_multi_leaf, LeafContext, ScoredDoc};
use crate::segment::SegmentKey;
use crate::sparse_vector::SparseVector;

/// One segment's offset tables, handed to [`QueryEngine`] by whatever
/// owns the storage engine's segment metadata. The posting blob is
/// addressed under a distinct storage field (`{field}#postings`) from
/// the forward-index blob so the two tiers never collide within one
/// `StorageBackend`.
pub struct SegmentSource {
    pub segment: SegmentKey,
    pub forward_offsets: Arc<dyn ForwardIndexOffsets>,
    pub posting_offsets: Arc<dyn PostingOffsets>,
}

fn posting_segment_key(segment: &SegmentKey) -> SegmentKey {
    SegmentKey::new(segment.segment, format!("{}#postings", segment.field))
}

/// Runs queries against a set of finalized segments through the
/// cache-gated tier (spec.md §4.5, §4.7). Holds one shared
/// `StorageBackend` and the two segment-wide caches; per-query leaves
/// are built fresh from [`SegmentSource`]s passed into [`Self::search`].
pub struct QueryEngine {
    backend: Arc<dyn StorageBackend>,
    forward_cache: Arc<ReadThroughCache<Option<SparseVector>>>,
    posting_cache: Arc<ReadThroughCache<Option<PostingClusters>>>,
}

impl QueryEngine {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        forward_cache: Arc<ReadThroughCache<Option<SparseVector>>>,
        posting_cache: Arc<ReadThroughCache<Option<PostingClusters>>>,
    ) -> Self {
        Self {
            backend,
            forward_cache,
            posting_cache,
        }
    }

    /// Searches every `source` as an independent leaf and merges into a
    /// single top-`k` (spec.md §4.7).
    pub fn search(
        &self,
        sources: &[SegmentSource],
        query: &SparseVector,
        k: usize,
        heap_factor: f32,
        accept_docs: Option<&RoaringBitmap>,
        cancel: &CancellationToken,
        deadline: &Deadline,
    ) -> Vec<ScoredDoc> {
        let forward_readers: Vec<CacheGatedForwardIndexReader> = sources
            .iter()
            .map(|src| {
                let disk = DiskForwardIndexReader::new(
                    src.segment.clone(),
                    Arc::clone(&self.backend),
                    Arc::clone(&src.forward_offsets),
                );
                CacheGatedForwardIndexReader::new(src.segment.clone(), disk, Arc::clone(&self.forward_cache))
            })
            .collect();

        let posting_readers: Vec<CacheGatedPostingStoreReader> = sources
            .iter()
            .map(|src| {
                let posting_segment = posting_segment_key(&src.segment);
                let disk = DiskPostingStoreReader::new(
                    posting_segment.clone(),
                    Arc::clone(&self.backend),
                    Arc::clone(&src.posting_offsets),
                );
                CacheGatedPostingStoreReader::new(posting_segment, disk, Arc::clone(&self.posting_cache))
            })
            .collect();

        let leaves: Vec<LeafContext> = forward_readers
            .iter()
            .zip(posting_readers.iter())
            .map(|(forward, posting)| LeafContext { forward, posting })
            .collect();

        search_multi_leaf(&leaves, query, k, heap_factor, accept_docs, cancel, deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::CircuitBreaker;
    use crate::forward_index::encode as encode_forward;
    use crate::posting::disk::MapPostingOffsets;
    use crate::posting::{encode as encode_posting, DocumentCluster};
    use crate::testutil::{make_sparse_vector, CountingCircuitBreaker, InMemoryStorageBackend};
    use std::collections::HashMap;
    use std::ops::Range;
    use uuid::Uuid;

    struct FixedOffsets(HashMap<u32, Range<u64>>);
    impl ForwardIndexOffsets for FixedOffsets {
        fn range(&self, doc_id: u32) -> Option<Range<u64>> {
            self.0.get(&doc_id).cloned()
        }
    }

    fn engine(backend: Arc<dyn StorageBackend>) -> QueryEngine {
        let breaker = || Arc::new(CountingCircuitBreaker::new(10_000_000)) as Arc<dyn CircuitBreaker>;
        QueryEngine::new(
            backend,
            Arc::new(ReadThroughCache::new(breaker())),
            Arc::new(ReadThroughCache::new(breaker())),
        )
    }

    fn build_segment(
        backend: &InMemoryStorageBackend,
        field: &str,
        docs: &[(u32, &[(u16, f32)])],
        term: u16,
    ) -> SegmentSource {
        let segment = SegmentKey::new(Uuid::new_v4(), field);

        let mut forward_blob = Vec::new();
        let mut forward_offsets = HashMap::new();
        let mut postings = Vec::new();
        for &(doc_id, pairs) in docs {
            let vector = make_sparse_vector(pairs);
            let encoded = encode_forward(&vector);
            let start = forward_blob.len() as u64;
            forward_blob.extend_from_slice(&encoded);
            forward_offsets.insert(doc_id, start..forward_blob.len() as u64);
            postings.push(crate::clustering::TermPosting {
                doc_id,
                term_weight: vector.weights()[0],
                vector,
            });
        }
        backend.put(segment.segment, &segment.field, forward_blob.into());

        let clusters = crate::clustering::build_term_clusters(
            &postings,
            docs.len(),
            1.0,
            &crate::clustering::strategy::PruningStrategy::default(),
            &crate::clustering::strategy::SummarizationStrategy::default(),
        );
        let posting_bytes = encode_posting(&clusters);
        let posting_field = posting_segment_key(&segment);
        backend.put(posting_field.segment, &posting_field.field, posting_bytes.clone().into());
        let posting_offsets = Arc::new(MapPostingOffsets::new());
        posting_offsets.insert(&term.to_le_bytes(), 0..posting_bytes.len() as u64);

        SegmentSource {
            segment,
            forward_offsets: Arc::new(FixedOffsets(forward_offsets)),
            posting_offsets,
        }
    }

    #[test]
    fn search_reads_through_the_cache_gated_tier_end_to_end() {
        let backend = Arc::new(InMemoryStorageBackend::new());
        let docs: Vec<(u32, &[(u16, f32)])> = vec![
            (0, &[(7, 1.0)]),
            (1, &[(7, 2.0)]),
            (2, &[(7, 3.0)]),
        ];
        let source = build_segment(&backend, "body", &docs, 7);
        let eng = engine(backend);

        let query = make_sparse_vector(&[(7, 1.0)]);
        let results = eng.search(
            &[source],
            &query,
            2,
            1.0,
            None,
            &CancellationToken::new(),
            &Deadline::far_future(),
        );
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].doc_id, 2);
        assert_eq!(results[1].doc_id, 1);
    }

    #[test]
    fn repeated_search_populates_cache_and_is_consistent() {
        let backend = Arc::new(InMemoryStorageBackend::new());
        let docs: Vec<(u32, &[(u16, f32)])> = vec![(0, &[(3, 1.0)]), (1, &[(3, 5.0)])];
        let source = build_segment(&backend, "title", &docs, 3);
        let eng = engine(backend);
        let query = make_sparse_vector(&[(3, 1.0)]);

        let first = eng.search(&[source], &query, 1, 1.0, None, &CancellationToken::new(), &Deadline::far_future());
        assert_eq!(first[0].doc_id, 1);

        let forward_hits = eng.forward_cache.len();
        assert!(forward_hits > 0);
    }

    #[test]
    fn merging_across_segments_still_respects_a_cancelled_token() {
        let backend = Arc::new(InMemoryStorageBackend::new());
        let docs: Vec<(u32, &[(u16, f32)])> = vec![(0, &[(1, 1.0)])];
        let source = build_segment(&backend, "body", &docs, 1);
        let eng = engine(backend);
        let query = make_sparse_vector(&[(1, 1.0)]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let results = eng.search(&[source], &query, 1, 1.0, None, &cancel, &Deadline::far_future());
        assert!(results.is_empty());
    }
}
