//! Segment build and merge path (spec.md §4.6), grounded on
//! `fschlatt-seismic`'s `InvertedIndex::build` — distribute pairs by
//! component, then build per-component — adapted to a streaming
//! per-document ingestion API plus a segment-level flat/clustered
//! fallback the teacher does not have.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::cache::ReadThroughCache;
use crate::clustering::strategy::{PruningStrategy, SummarizationStrategy};
use crate::clustering::{build_term_clusters, TermPosting};
use crate::concurrency::{BoundedPool, CancellationToken};
use crate::config::FieldAlgorithmConfig;
use crate::error::{Result, SeismicError};
use crate::forward_index::memory::InMemoryForwardIndex;
use crate::forward_index::{ForwardIndexReader, ForwardIndexWriter};
use crate::posting::memory::InMemoryPostingStore;
use crate::posting::{DocumentCluster, PostingClusters, PostingStoreWriter};
use crate::segment::SegmentKey;
use crate::sparse_vector::SparseVector;

type ForwardEntryCache = ReadThroughCache<Option<SparseVector>>;
type PostingEntryCache = ReadThroughCache<Option<PostingClusters>>;

/// Accumulates one segment's forward index and raw per-term postings
/// while documents stream in, then builds the clustered posting store
/// on [`Self::finalize`].
pub struct SegmentBuilder {
    segment: SegmentKey,
    expected_doc_count: usize,
    forward: InMemoryForwardIndex,
    raw_postings: DashMap<u16, Mutex<Vec<TermPosting>>>,
    inserted: AtomicU32,
}

impl SegmentBuilder {
    pub fn new(segment: SegmentKey, expected_doc_count: usize) -> Self {
        Self {
            forward: InMemoryForwardIndex::new(segment.clone()),
            segment,
            expected_doc_count,
            raw_postings: DashMap::new(),
            inserted: AtomicU32::new(0),
        }
    }

    pub fn segment(&self) -> &SegmentKey {
        &self.segment
    }

    pub fn inserted_doc_count(&self) -> usize {
        self.inserted.load(Ordering::Acquire) as usize
    }

    /// Inserts one document's vector into the forward index and
    /// appends a raw posting for each of its tokens. Fails with
    /// `DuplicateDoc` on re-insertion of `doc_id`.
    pub fn insert_document(&self, doc_id: u32, vector: SparseVector) -> Result<()> {
        self.forward.insert(doc_id, vector.clone())?;
        for (&token, &weight) in vector.tokens().iter().zip(vector.weights()) {
            self.raw_postings
                .entry(token)
                .or_insert_with(|| Mutex::new(Vec::new()))
                .lock()
                .push(TermPosting {
                    doc_id,
                    term_weight: weight,
                    vector: vector.clone(),
                });
        }
        self.inserted.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Builds the clustered (or flat) posting store for every term seen
    /// so far, distributing per-term work across `pool`. A term whose
    /// clustering fails is logged and excluded rather than aborting the
    /// whole segment (spec.md §4.6).
    pub fn finalize(
        &self,
        cfg: &FieldAlgorithmConfig,
        pruning: &PruningStrategy,
        summarization: &SummarizationStrategy,
        pool: &BoundedPool,
        cancel: &CancellationToken,
    ) -> Result<InMemoryPostingStore> {
        let store = InMemoryPostingStore::new(self.segment.clone());
        let flat = self.expected_doc_count < cfg.algo_trigger_doc_count;
        let doc_count = self.expected_doc_count;
        let cluster_ratio = cfg.cluster_ratio;

        let terms: Vec<u16> = self.raw_postings.iter().map(|e| *e.key()).collect();
        let mut receivers = Vec::with_capacity(terms.len());

        for token in terms {
            let postings = self
                .raw_postings
                .get(&token)
                .map(|v| v.lock().clone())
                .unwrap_or_default();
            let pruning = *pruning;
            let summarization = *summarization;
            let cancel = cancel.clone();
            let rx = pool.submit_collect(move || -> (u16, Result<PostingClusters>) {
                if cancel.is_cancelled() {
                    return (token, Err(SeismicError::Cancelled));
                }
                let clusters = if flat {
                    flat_clusters(&postings)
                } else {
                    build_term_clusters(&postings, doc_count, cluster_ratio, &pruning, &summarization)
                };
                (token, Ok(clusters))
            })?;
            receivers.push(rx);
        }

        for rx in receivers {
            let (token, result) = rx
                .recv()
                .map_err(|_| SeismicError::StorageError("training worker dropped its result".into()))?;
            match result {
                Ok(clusters) => {
                    if !clusters.is_empty() {
                        store.write(&token.to_le_bytes(), clusters)?;
                    }
                }
                Err(err) => {
                    tracing::warn!(term = token, %err, "term clustering failed, term excluded from segment");
                }
            }
        }

        Ok(store)
    }

    /// A snapshot reader over everything inserted so far, independent
    /// of whether [`Self::finalize`] has run.
    pub fn forward_reader(&self) -> &dyn ForwardIndexReader {
        &self.forward
    }
}

/// A single cluster with no pruning and no summary: every posting for
/// the term is kept and is always visited at query time (spec.md §4.6
/// flat fallback for small segments).
fn flat_clusters(postings: &[TermPosting]) -> PostingClusters {
    if postings.is_empty() {
        return PostingClusters::default();
    }
    let doc_ids: Vec<u32> = postings.iter().map(|p| p.doc_id).collect();
    let empty = SparseVector::new(&[]).expect("empty pair list is always valid");
    let cluster = DocumentCluster::new(empty, &doc_ids, true)
        .expect("postings is non-empty, checked above");
    PostingClusters::new(vec![cluster])
}

/// Coordinates in-progress segment builders and the finished
/// forward-index / posting-store pair each segment produces, plus
/// merge-time cache invalidation (spec.md §4.6).
#[derive(Default)]
pub struct IndexingEngine {
    builders: DashMap<SegmentKey, Arc<SegmentBuilder>>,
    finished_forward: DashMap<SegmentKey, Arc<InMemoryForwardIndex>>,
    finished_postings: DashMap<SegmentKey, Arc<InMemoryPostingStore>>,
}

impl IndexingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the in-progress builder for `segment`, creating one
    /// scoped to `expected_doc_count` if this is the first call
    /// (SPEC_FULL.md §9 open-question resolution: segment-key +
    /// doc-count is the primary key for builder identity).
    pub fn get_or_create(&self, segment: SegmentKey, expected_doc_count: usize) -> Arc<SegmentBuilder> {
        Arc::clone(
            &self
                .builders
                .entry(segment.clone())
                .or_insert_with(|| Arc::new(SegmentBuilder::new(segment, expected_doc_count))),
        )
    }

    /// Thin adapter for callers that identify segments by an opaque
    /// write-state token from the host engine rather than constructing
    /// a [`SegmentKey`] directly; the host is expected to have already
    /// resolved that token to `(segment, expected_doc_count)`.
    pub fn from_write_state(&self, segment: SegmentKey, expected_doc_count: usize) -> Arc<SegmentBuilder> {
        self.get_or_create(segment, expected_doc_count)
    }

    pub fn finalize_segment(
        &self,
        segment: &SegmentKey,
        cfg: &FieldAlgorithmConfig,
        pruning: &PruningStrategy,
        summarization: &SummarizationStrategy,
        pool: &BoundedPool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let builder = self
            .builders
            .get(segment)
            .map(|e| Arc::clone(&e))
            .ok_or_else(|| SeismicError::StorageError(format!("no builder for segment {segment}")))?;

        let store = builder.finalize(cfg, pruning, summarization, pool, cancel)?;

        self.finished_postings
            .insert(segment.clone(), Arc::new(store));
        self.finished_forward
            .insert(segment.clone(), Arc::new(builder.forward.clone()));
        self.builders.remove(segment);
        Ok(())
    }

    pub fn forward_index(&self, segment: &SegmentKey) -> Option<Arc<InMemoryForwardIndex>> {
        self.finished_forward.get(segment).map(|e| Arc::clone(&e))
    }

    pub fn posting_store(&self, segment: &SegmentKey) -> Option<Arc<InMemoryPostingStore>> {
        self.finished_postings.get(segment).map(|e| Arc::clone(&e))
    }

    /// Evicts cache entries for every input segment before a merge
    /// rebuild (spec.md §4.6): callers then re-index the merged
    /// document set under `output` via [`Self::get_or_create`].
    pub fn prepare_merge(
        &self,
        inputs: &[SegmentKey],
        forward_cache: &ForwardEntryCache,
        posting_cache: &PostingEntryCache,
    ) {
        for segment in inputs {
            forward_cache.evict_segment(segment);
            posting_cache.evict_segment(segment);
            self.finished_forward.remove(segment);
            self.finished_postings.remove(segment);
        }
    }
}
