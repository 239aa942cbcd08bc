//! Per-leaf top-k query executor (spec.md §4.7), grounded on the
//! teacher's `InvertedIndex::search` / `PostingList::search` in
//! `inverted_index.rs`: dense query materialization, a per-term walk
//! over clusters pruned against a `heap_factor`-scaled top-k threshold,
//! and a `must_visit` escape hatch for clusters (or whole postings)
//! that skipped clustering.
//!
//! Every candidate doc is scored at most once per leaf regardless of
//! how many of its terms' clusters surface it — the visited set here
//! plays the same role as the teacher's `visited: HashSet<usize>`.
//! Multiple leaves run concurrently via `rayon`; merging their results
//! into a single top-k happens back on the caller's thread.

use rayon::prelude::*;
use roaring::RoaringBitmap;

use crate::concurrency::{CancellationToken, Deadline};
use crate::error::{Result, SeismicError};
use crate::forward_index::ForwardIndexReader;
use crate::posting::{DocumentCluster, PostingStoreReader};
use crate::sparse_vector::SparseVector;
use crate::telemetry::TimerGuard;

/// One scored candidate. Ordering used by [`TopKHeap`] treats a higher
/// `score` as better, and a lower `doc_id` as better among ties.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredDoc {
    pub doc_id: u32,
    pub score: f32,
}

fn is_better(a: &ScoredDoc, b: &ScoredDoc) -> bool {
    a.score > b.score || (a.score == b.score && a.doc_id < b.doc_id)
}

/// Bounded top-k accumulator with ascending-doc_id tie-breaking. Not a
/// binary heap: `k` is small (tens to low thousands) and a linear
/// worst-scan per `offer` is simpler to reason about than tuning a
/// custom `Ord` for `f32` scores, at a cost nobody has yet needed to
/// optimize away.
pub struct TopKHeap {
    k: usize,
    items: Vec<ScoredDoc>,
}

impl TopKHeap {
    pub fn new(k: usize) -> Self {
        Self {
            k: k.max(1),
            items: Vec::new(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.k
    }

    /// Current k-th best score, or `-inf` while the heap has not yet
    /// filled (meaning nothing should be pruned against it).
    pub fn threshold(&self) -> f32 {
        if self.items.len() < self.k {
            f32::NEG_INFINITY
        } else {
            self.items
                .iter()
                .map(|d| d.score)
                .fold(f32::INFINITY, f32::min)
        }
    }

    pub fn offer(&mut self, candidate: ScoredDoc) {
        if self.items.len() < self.k {
            self.items.push(candidate);
            return;
        }
        let worst_idx = (0..self.items.len())
            .min_by(|&i, &j| {
                let (a, b) = (self.items[i], self.items[j]);
                if is_better(&a, &b) {
                    std::cmp::Ordering::Greater
                } else if is_better(&b, &a) {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .expect("items is non-empty: len >= k >= 1");
        if is_better(&candidate, &self.items[worst_idx]) {
            self.items[worst_idx] = candidate;
        }
    }

    /// Consumes the heap, returning its contents sorted best-first.
    pub fn into_sorted_vec(mut self) -> Vec<ScoredDoc> {
        self.items.sort_unstable_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.doc_id.cmp(&b.doc_id))
        });
        self.items
    }
}

/// Explicit traversal state over one term's clusters, mirroring the
/// teacher's component-major block walk in `PostingList::search`: a
/// step-wise cursor rather than a bare `for` loop, so cancellation and
/// deadline checks have a natural place to live between clusters.
enum ScorerState {
    Init,
    InCluster { cluster_idx: usize },
    Exhausted,
}

struct ClusterScorer<'a> {
    clusters: &'a [DocumentCluster],
    state: ScorerState,
}

impl<'a> ClusterScorer<'a> {
    fn new(clusters: &'a [DocumentCluster]) -> Self {
        Self {
            clusters,
            state: ScorerState::Init,
        }
    }

    fn next_cluster(&mut self) -> Option<&'a DocumentCluster> {
        let next_idx = match self.state {
            ScorerState::Init => 0,
            ScorerState::InCluster { cluster_idx } => cluster_idx + 1,
            ScorerState::Exhausted => return None,
        };
        if next_idx >= self.clusters.len() {
            self.state = ScorerState::Exhausted;
            return None;
        }
        self.state = ScorerState::InCluster {
            cluster_idx: next_idx,
        };
        Some(&self.clusters[next_idx])
    }
}

/// The forward index and posting store for one leaf (segment/field
/// pair). Both capabilities are `Send + Sync` so a `&[LeafContext]`
/// can be scattered across `rayon`'s thread pool.
pub struct LeafContext<'a> {
    pub forward: &'a dyn ForwardIndexReader,
    pub posting: &'a dyn PostingStoreReader,
}

/// Runs one leaf's top-k search (spec.md §4.7):
///
/// 1. materialize the query densely over its own token range
/// 2. visit query terms in descending weight order (tightens the
///    pruning threshold sooner)
/// 3. for each term's clusters: a `must_visit` cluster, or any cluster
///    while the heap has not yet filled, is always visited; once full,
///    a cluster is skipped when its summary's dot product against the
///    query falls below `heap.threshold() / heap_factor`
/// 4. each surfaced doc is scored at most once (`visited`), filtered
///    by `accept_docs` if given, and scored by a full dot product
///    against the doc's forward-index vector
///
/// A missing or unreadable forward-index entry excludes that one doc
/// from scoring (logged) rather than failing the whole leaf; a term
/// absent from the posting store is simply skipped.
pub fn search_leaf(
    leaf: &LeafContext,
    query: &SparseVector,
    k: usize,
    heap_factor: f32,
    accept_docs: Option<&RoaringBitmap>,
    cancel: &CancellationToken,
    deadline: &Deadline,
) -> Result<Vec<ScoredDoc>> {
    let _timer = TimerGuard::start(tracing::debug_span!("search_leaf", elapsed_us = tracing::field::Empty));

    let mut heap = TopKHeap::new(k);
    if query.is_empty() {
        return Ok(heap.into_sorted_vec());
    }

    let max_token = *query.tokens().last().expect("checked non-empty above");
    let dense = query.to_dense(max_token);

    let mut term_order: Vec<usize> = (0..query.tokens().len()).collect();
    term_order.sort_unstable_by(|&i, &j| query.weights()[j].total_cmp(&query.weights()[i]));

    let mut visited = RoaringBitmap::new();

    for idx in term_order {
        if cancel.is_cancelled() {
            return Err(SeismicError::Cancelled);
        }
        if deadline.is_expired() {
            return Err(SeismicError::DeadlineExceeded);
        }

        let token = query.tokens()[idx];
        let clusters = match leaf.posting.read(&token.to_le_bytes())? {
            Some(c) => c,
            None => continue,
        };

        let mut scorer = ClusterScorer::new(clusters.clusters());
        while let Some(cluster) = scorer.next_cluster() {
            if cancel.is_cancelled() {
                return Err(SeismicError::Cancelled);
            }
            if deadline.is_expired() {
                return Err(SeismicError::DeadlineExceeded);
            }

            if !cluster.must_visit && heap.is_full() {
                let bound = heap.threshold() / heap_factor;
                if cluster.summary.dot_dense(&dense) < bound {
                    continue;
                }
            }

            for doc_id in cluster.doc_ids() {
                if visited.contains(doc_id) {
                    continue;
                }
                visited.insert(doc_id);

                if let Some(accept) = accept_docs {
                    if !accept.contains(doc_id) {
                        continue;
                    }
                }

                match leaf.forward.read(doc_id) {
                    Ok(Some(vector)) => {
                        let score = vector.dot_dense(&dense);
                        heap.offer(ScoredDoc { doc_id, score });
                    }
                    Ok(None) => {
                        tracing::warn!(
                            doc_id,
                            "forward index missing doc referenced by posting cluster"
                        );
                    }
                    Err(err) => {
                        tracing::warn!(doc_id, %err, "forward index read failed, doc excluded");
                    }
                }
            }
        }
    }

    Ok(heap.into_sorted_vec())
}

/// Fans a query out across `leaves` in parallel (one `rayon` task per
/// leaf) and merges the per-leaf top-k lists into a single top-k on
/// the calling thread. A leaf whose search errors is excluded from the
/// merge and logged rather than failing the whole query.
pub fn search_multi_leaf(
    leaves: &[LeafContext],
    query: &SparseVector,
    k: usize,
    heap_factor: f32,
    accept_docs: Option<&RoaringBitmap>,
    cancel: &CancellationToken,
    deadline: &Deadline,
) -> Vec<ScoredDoc> {
    let per_leaf: Vec<Result<Vec<ScoredDoc>>> = leaves
        .par_iter()
        .map(|leaf| search_leaf(leaf, query, k, heap_factor, accept_docs, cancel, deadline))
        .collect();

    let mut merged = TopKHeap::new(k);
    for (leaf_idx, result) in per_leaf.into_iter().enumerate() {
        match result {
            Ok(docs) => {
                for doc in docs {
                    merged.offer(doc);
                }
            }
            Err(err) => {
                tracing::warn!(leaf = leaf_idx, %err, "leaf search failed, excluded from merge");
            }
        }
    }
    merged.into_sorted_vec()
}
