//! Admin broadcast operations: `warmup` and `clear_cache` (spec.md
//! §4.8), grounded on `motedb-motedb`'s shard-broadcast admin handlers
//! — validate against index settings before touching a single shard,
//! then fan out and collect a per-shard success/failure tally rather
//! than failing the whole call on one bad shard.

use std::collections::HashMap;
use std::sync::Arc;

use rayon::prelude::*;

use crate::config::IndexSettings;
use crate::error::{Result, SeismicError};

/// One shard's admin surface. The concrete transport to an actual
/// remote shard is external to this crate (spec.md §6); this trait is
/// the boundary [`warmup`]/[`clear_cache`] broadcast against.
pub trait Shard: Send + Sync {
    fn warmup(&self) -> Result<()>;
    fn clear_cache(&self) -> Result<()>;
}

/// Tally returned by a broadcast admin op (spec.md §4.8, §6 wire
/// shape): every shard is attempted regardless of earlier failures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BroadcastResult {
    pub total_shards: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<String>,
}

/// Forces cache population (C5) on every shard holding any of
/// `indices`. Rejects with `InvalidIndices` before any shard-level work
/// if an index is not sparse (spec.md §4.8 validation contract);
/// warmup itself runs shard-parallel (spec.md §4.5).
pub fn warmup(
    indices: &[String],
    settings: &HashMap<String, IndexSettings>,
    shards: &[Arc<dyn Shard>],
) -> Result<BroadcastResult> {
    validate_indices(indices, settings, "warmup")?;
    Ok(broadcast(shards, |shard| shard.warmup()))
}

/// Evicts every C2/C3 in-memory entry keyed by a segment of any of
/// `indices`, on every shard holding one. Same validation contract as
/// [`warmup`].
pub fn clear_cache(
    indices: &[String],
    settings: &HashMap<String, IndexSettings>,
    shards: &[Arc<dyn Shard>],
) -> Result<BroadcastResult> {
    validate_indices(indices, settings, "clear_cache")?;
    Ok(broadcast(shards, |shard| shard.clear_cache()))
}

fn validate_indices(
    indices: &[String],
    settings: &HashMap<String, IndexSettings>,
    operation: &str,
) -> Result<()> {
    let bad: Vec<String> = indices
        .iter()
        .filter(|name| !settings.get(*name).map(|s| s.is_sparse).unwrap_or(false))
        .cloned()
        .collect();
    if !bad.is_empty() {
        return Err(SeismicError::InvalidIndices {
            names: bad,
            operation: operation.into(),
        });
    }
    Ok(())
}

fn broadcast(shards: &[Arc<dyn Shard>], op: impl Fn(&dyn Shard) -> Result<()> + Sync) -> BroadcastResult {
    let results: Vec<Result<()>> = shards.par_iter().map(|shard| op(shard.as_ref())).collect();

    let mut succeeded = 0usize;
    let mut failures = Vec::new();
    for (idx, result) in results.into_iter().enumerate() {
        match result {
            Ok(()) => succeeded += 1,
            Err(err) => {
                tracing::warn!(shard = idx, %err, "shard admin operation failed");
                failures.push(err.to_string());
            }
        }
    }
    BroadcastResult {
        total_shards: shards.len(),
        succeeded,
        failed: failures.len(),
        failures,
    }
}

/// A [`Shard`] backed by this crate's own in-process segment state: an
/// [`crate::indexing::IndexingEngine`] plus the two read-through caches
/// layered over it. `warmup` forces a per-doc / per-term cache load of
/// every finished segment's forward index and posting store (spec.md
/// §4.5 population contract); `clear_cache` evicts them. Hosts that
/// actually distribute segments across remote shards implement
/// [`Shard`] themselves instead.
pub struct SegmentShard {
    segments: Vec<crate::segment::SegmentKey>,
    engine: Arc<crate::indexing::IndexingEngine>,
    forward_cache: Arc<crate::cache::ReadThroughCache<Option<crate::sparse_vector::SparseVector>>>,
    posting_cache: Arc<crate::cache::ReadThroughCache<Option<crate::posting::PostingClusters>>>,
}

impl SegmentShard {
    pub fn new(
        segments: Vec<crate::segment::SegmentKey>,
        engine: Arc<crate::indexing::IndexingEngine>,
        forward_cache: Arc<crate::cache::ReadThroughCache<Option<crate::sparse_vector::SparseVector>>>,
        posting_cache: Arc<crate::cache::ReadThroughCache<Option<crate::posting::PostingClusters>>>,
    ) -> Self {
        Self {
            segments,
            engine,
            forward_cache,
            posting_cache,
        }
    }

    fn not_finalized(segment: &crate::segment::SegmentKey) -> SeismicError {
        SeismicError::StorageError(format!("segment {} has no finalized state", segment.segment))
    }
}

impl Shard for SegmentShard {
    fn warmup(&self) -> Result<()> {
        use crate::cache::CacheKey;
        use crate::forward_index::ForwardIndexReader;
        use crate::posting::PostingStoreReader;

        for segment in &self.segments {
            let forward = self
                .engine
                .forward_index(segment)
                .ok_or_else(|| Self::not_finalized(segment))?;
            for doc_id in forward.doc_ids() {
                self.forward_cache.get_or_load(
                    CacheKey::forward_doc(segment.clone(), doc_id),
                    || forward.read(doc_id),
                )?;
            }

            let posting = self
                .engine
                .posting_store(segment)
                .ok_or_else(|| Self::not_finalized(segment))?;
            for term in posting.terms() {
                self.posting_cache.get_or_load(
                    CacheKey::posting(segment.clone(), &term),
                    || posting.read(&term),
                )?;
            }
        }
        Ok(())
    }

    fn clear_cache(&self) -> Result<()> {
        for segment in &self.segments {
            self.forward_cache.evict_segment(segment);
            self.posting_cache.evict_segment(segment);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::strategy::{PruningStrategy, SummarizationStrategy};
    use crate::concurrency::{BoundedPool, CancellationToken};
    use crate::config::FieldAlgorithmConfig;
    use crate::forward_index::ForwardIndexReader;
    use crate::indexing::IndexingEngine;
    use crate::posting::PostingClusters;
    use crate::segment::SegmentKey;
    use crate::sparse_vector::SparseVector;
    use crate::testutil::{make_sparse_vector, CountingCircuitBreaker};
    use uuid::Uuid;

    fn settings(sparse_names: &[&str], dense_names: &[&str]) -> HashMap<String, IndexSettings> {
        let mut map = HashMap::new();
        for &name in sparse_names {
            map.insert(name.to_string(), IndexSettings { is_sparse: true });
        }
        for &name in dense_names {
            map.insert(name.to_string(), IndexSettings { is_sparse: false });
        }
        map
    }

    struct AlwaysOk;
    impl Shard for AlwaysOk {
        fn warmup(&self) -> Result<()> {
            Ok(())
        }
        fn clear_cache(&self) -> Result<()> {
            Ok(())
        }
    }

    struct AlwaysFail;
    impl Shard for AlwaysFail {
        fn warmup(&self) -> Result<()> {
            Err(SeismicError::StorageError("unreachable shard".into()))
        }
        fn clear_cache(&self) -> Result<()> {
            Err(SeismicError::StorageError("unreachable shard".into()))
        }
    }

    #[test]
    fn s5_warmup_validation_rejects_before_any_shard_work() {
        let set = settings(&["a"], &["b"]);
        let shards: Vec<Arc<dyn Shard>> = vec![Arc::new(AlwaysFail)];
        let err = warmup(&["a".to_string(), "b".to_string()], &set, &shards).unwrap_err();
        match err {
            SeismicError::InvalidIndices { names, operation } => {
                assert_eq!(names, vec!["b".to_string()]);
                assert_eq!(operation, "warmup");
            }
            other => panic!("expected InvalidIndices, got {other:?}"),
        }
    }

    #[test]
    fn unknown_index_name_is_also_invalid() {
        let set = settings(&["a"], &[]);
        let shards: Vec<Arc<dyn Shard>> = vec![];
        let err = warmup(&["unknown".to_string()], &set, &shards).unwrap_err();
        assert!(matches!(err, SeismicError::InvalidIndices { .. }));
    }

    #[test]
    fn broadcast_tallies_successes_and_failures_across_shards() {
        let set = settings(&["a"], &[]);
        let shards: Vec<Arc<dyn Shard>> = vec![Arc::new(AlwaysOk), Arc::new(AlwaysFail), Arc::new(AlwaysOk)];
        let result = clear_cache(&["a".to_string()], &set, &shards).unwrap();
        assert_eq!(result.total_shards, 3);
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.failed, 1);
        assert_eq!(result.failures.len(), 1);
    }

    fn build_finished_segment(engine: &IndexingEngine, doc_count: u32) -> SegmentKey {
        let seg = SegmentKey::new(Uuid::new_v4(), "body");
        let builder = engine.get_or_create(seg.clone(), doc_count as usize);
        for id in 0..doc_count {
            builder
                .insert_document(id, make_sparse_vector(&[(1, 1.0 + id as f32)]))
                .unwrap();
        }
        let pool = BoundedPool::new(2, 100);
        engine
            .finalize_segment(
                &seg,
                &FieldAlgorithmConfig::default(),
                &PruningStrategy::default(),
                &SummarizationStrategy::default(),
                &pool,
                &CancellationToken::new(),
            )
            .unwrap();
        seg
    }

    fn forward_entry_cache() -> Arc<crate::cache::ReadThroughCache<Option<SparseVector>>> {
        Arc::new(crate::cache::ReadThroughCache::new(Arc::new(
            CountingCircuitBreaker::new(10_000_000),
        )))
    }

    fn posting_entry_cache() -> Arc<crate::cache::ReadThroughCache<Option<PostingClusters>>> {
        Arc::new(crate::cache::ReadThroughCache::new(Arc::new(
            CountingCircuitBreaker::new(10_000_000),
        )))
    }

    #[test]
    fn s6_merge_eviction_then_read_of_merged_segment_succeeds() {
        let engine = Arc::new(IndexingEngine::new());
        let seg_1 = build_finished_segment(&engine, 5);
        let seg_2 = build_finished_segment(&engine, 5);

        let forward_cache = forward_entry_cache();
        let posting_cache = posting_entry_cache();

        let shard = SegmentShard::new(
            vec![seg_1.clone(), seg_2.clone()],
            Arc::clone(&engine),
            Arc::clone(&forward_cache),
            Arc::clone(&posting_cache),
        );
        shard.warmup().unwrap();
        assert!(forward_cache.contains(&crate::cache::CacheKey::forward_doc(seg_1.clone(), 0)));
        assert!(forward_cache.contains(&crate::cache::CacheKey::forward_doc(seg_2.clone(), 0)));

        // merge seg_1 + seg_2 into seg_3
        engine.prepare_merge(&[seg_1.clone(), seg_2.clone()], &forward_cache, &posting_cache);
        let seg_3 = build_finished_segment(&engine, 10);

        assert!(!forward_cache.contains(&crate::cache::CacheKey::forward_doc(seg_1, 0)));
        assert!(!forward_cache.contains(&crate::cache::CacheKey::forward_doc(seg_2, 0)));

        let read = engine.forward_index(&seg_3).unwrap().read(0).unwrap();
        assert!(read.is_some());
    }

    #[test]
    fn warmup_is_a_no_op_on_an_already_warmed_cache() {
        let engine = Arc::new(IndexingEngine::new());
        let seg = build_finished_segment(&engine, 5);
        let forward_cache = forward_entry_cache();
        let posting_cache = posting_entry_cache();
        let shard = SegmentShard::new(
            vec![seg],
            Arc::clone(&engine),
            Arc::clone(&forward_cache),
            Arc::clone(&posting_cache),
        );
        shard.warmup().unwrap();
        let len_after_first = forward_cache.len();
        shard.warmup().unwrap();
        assert_eq!(forward_cache.len(), len_after_first);
    }

    #[test]
    fn warmup_populates_cache_per_doc_and_per_term() {
        let engine = Arc::new(IndexingEngine::new());
        let seg = build_finished_segment(&engine, 5);
        let forward_cache = forward_entry_cache();
        let posting_cache = posting_entry_cache();
        let shard = SegmentShard::new(
            vec![seg.clone()],
            Arc::clone(&engine),
            Arc::clone(&forward_cache),
            Arc::clone(&posting_cache),
        );
        shard.warmup().unwrap();
        assert_eq!(forward_cache.len(), 5);
        assert_eq!(posting_cache.len(), 1);
        assert!(posting_cache.contains(&crate::cache::CacheKey::posting(seg, &1u16.to_le_bytes())));
    }
}
