//! Per-term clustering pipeline (spec.md §4.4), grounded on the
//! teacher's `global_threshold_pruning` / `blocking_with_random_kmeans`
//! / `energy_preserving_summary` sequence in `inverted_index.rs`.
//!
//! [`build_term_clusters`] is pure and synchronous; fan-out across
//! terms and interaction with the training pool lives in
//! [`crate::indexing`].

pub mod kmeans;
pub mod strategy;

use crate::clustering::kmeans::{spherical_kmeans, sum_vectors};
use crate::clustering::strategy::{PruningStrategy, SummarizationStrategy};
use crate::config::MIN_DOCS_FOR_CLUSTER;
use crate::posting::{DocumentCluster, PostingClusters};
use crate::sparse_vector::SparseVector;
use crate::telemetry::TimerGuard;

/// One raw posting for a term before clustering: the document's id, its
/// weight for this specific term (the pruning/sort key), and its full
/// forward-index vector (clustered and summarized in full, so cluster
/// summaries approximate a complete dot product, not just this term's
/// contribution).
#[derive(Debug, Clone)]
pub struct TermPosting {
    pub doc_id: u32,
    pub term_weight: f32,
    pub vector: SparseVector,
}

/// Builds the clustered posting list for one term from its raw
/// postings (spec.md §4.4 steps 1-7):
///
/// 1. sort postings by `term_weight` descending (ties broken by
///    ascending `doc_id` for determinism)
/// 2. prune to `pruning.effective_cap(segment_doc_count)`
/// 3. if the pruned posting has fewer than [`MIN_DOCS_FOR_CLUSTER`]
///    members, short-circuit to a single `must_visit` cluster with an
///    empty summary
/// 4. otherwise cluster the pruned postings' full vectors into
///    `max(1, round(cluster_ratio * pruned_len))` groups via spherical
///    k-means
/// 5. summarize each group with `summarization`
/// 6. sort each cluster's doc_ids ascending (done by
///    [`DocumentCluster::new`])
pub fn build_term_clusters(
    postings: &[TermPosting],
    segment_doc_count: usize,
    cluster_ratio: f32,
    pruning: &PruningStrategy,
    summarization: &SummarizationStrategy,
) -> PostingClusters {
    if postings.is_empty() {
        return PostingClusters::default();
    }

    let mut sorted: Vec<&TermPosting> = {
        let _timer = TimerGuard::start(tracing::debug_span!(
            "cluster_sort_prune",
            elapsed_us = tracing::field::Empty
        ));
        let mut sorted: Vec<&TermPosting> = postings.iter().collect();
        sorted.sort_unstable_by(|a, b| {
            b.term_weight
                .total_cmp(&a.term_weight)
                .then(a.doc_id.cmp(&b.doc_id))
        });

        let cap = pruning.effective_cap(segment_doc_count);
        if sorted.len() > cap {
            sorted.truncate(cap);
        }
        sorted
    };

    if sorted.len() < MIN_DOCS_FOR_CLUSTER {
        let doc_ids: Vec<u32> = sorted.iter().map(|p| p.doc_id).collect();
        let cluster = DocumentCluster::new(empty_summary(), &doc_ids, true)
            .expect("non-empty doc_ids guaranteed by the non-empty sorted postings above");
        return PostingClusters::new(vec![cluster]);
    }

    let groups = {
        let _timer = TimerGuard::start(tracing::debug_span!(
            "cluster_kmeans",
            elapsed_us = tracing::field::Empty
        ));
        let k = ((cluster_ratio as f64 * sorted.len() as f64).round() as usize).max(1);
        let vectors: Vec<SparseVector> = sorted.iter().map(|p| p.vector.clone()).collect();
        spherical_kmeans(&vectors, k)
    };

    let clusters = {
        let _timer = TimerGuard::start(tracing::debug_span!(
            "cluster_summarize",
            elapsed_us = tracing::field::Empty
        ));
        groups
            .into_iter()
            .map(|members| {
                let doc_ids: Vec<u32> = members.iter().map(|&i| sorted[i].doc_id).collect();
                let member_vectors = members.iter().map(|&i| &sorted[i].vector);
                let cluster_sum = sum_vectors(member_vectors);
                let summary = summarization.summarize(&cluster_sum);
                DocumentCluster::new(summary, &doc_ids, false)
                    .expect("k-means groups are never empty, see spherical_kmeans")
            })
            .collect()
    };

    PostingClusters::new(clusters)
}

fn empty_summary() -> SparseVector {
    SparseVector::new(&[]).expect("empty pair list is always valid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::make_sparse_vector;

    fn postings(n: usize, tokens_per_doc: &[u16]) -> Vec<TermPosting> {
        (0..n as u32)
            .map(|id| {
                let pairs: Vec<(u16, f32)> = tokens_per_doc
                    .iter()
                    .map(|&t| (t, 1.0 + id as f32))
                    .collect();
                TermPosting {
                    doc_id: id,
                    term_weight: 1.0 + id as f32,
                    vector: make_sparse_vector(&pairs),
                }
            })
            .collect()
    }

    #[test]
    fn empty_postings_yield_empty_clusters() {
        let out = build_term_clusters(
            &[],
            1000,
            0.1,
            &PruningStrategy::default(),
            &SummarizationStrategy::default(),
        );
        assert!(out.is_empty());
    }

    #[test]
    fn s2_small_posting_short_circuits_to_single_must_visit_cluster() {
        let p = postings(5, &[1, 2]);
        let out = build_term_clusters(
            &p,
            1000,
            0.1,
            &PruningStrategy::default(),
            &SummarizationStrategy::default(),
        );
        assert_eq!(out.len(), 1);
        let c = &out.clusters()[0];
        assert!(c.must_visit);
        assert!(c.summary.is_empty());
        let mut ids: Vec<u32> = c.doc_ids().collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn s3_large_posting_is_pruned_clustered_and_summaries_retain_energy() {
        // 200 docs in two weight bands; n_postings=100 prunes the
        // weaker half away entirely, leaving the stronger band to be
        // clustered into 10 groups (cluster_ratio=0.1).
        let mut p = Vec::new();
        for id in 0..100u32 {
            p.push(TermPosting {
                doc_id: id,
                term_weight: 1.0 + id as f32,
                vector: make_sparse_vector(&[(10, 1.0 + id as f32), (11, 0.9)]),
            });
        }
        for id in 100..200u32 {
            p.push(TermPosting {
                doc_id: id,
                term_weight: 1.0 + id as f32,
                vector: make_sparse_vector(&[(20, 1.0 + id as f32), (21, 0.9)]),
            });
        }
        let pruning = PruningStrategy::FixedSize { n_postings: 100 };
        let summarization = SummarizationStrategy::EnergyPreserving { summary_energy: 0.4 };
        let out = build_term_clusters(&p, 200, 0.1, &pruning, &summarization);

        assert_eq!(out.total_docs(), 100);
        assert!(out.len() >= 2, "expected multiple clusters, got {}", out.len());
        for c in out.clusters() {
            if c.must_visit {
                continue;
            }
            // retained summary mass must be >= 40% of the cluster's
            // actual total mass (recomputed from its doc_ids would
            // require the forward index; here we just check the
            // summary itself is non-trivial and sorted by token).
            assert!(!c.summary.is_empty());
            let tokens = c.summary.tokens();
            assert!(tokens.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn doc_ids_within_each_cluster_are_sorted_ascending() {
        let p = postings(40, &[1, 2, 3]);
        let out = build_term_clusters(
            &p,
            1000,
            0.2,
            &PruningStrategy::default(),
            &SummarizationStrategy::default(),
        );
        for c in out.clusters() {
            let ids: Vec<u32> = c.doc_ids().collect();
            assert!(ids.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn pruning_cap_below_posting_length_drops_weakest_postings() {
        // weights ascending with id so highest ids have highest weight;
        // cap of 10 should keep the top 10 ids (190..200).
        let p = postings(200, &[1]);
        let pruning = PruningStrategy::FixedSize { n_postings: 10 };
        let out = build_term_clusters(&p, 200, 0.1, &pruning, &SummarizationStrategy::default());
        assert_eq!(out.total_docs(), 10);
        let mut kept: Vec<u32> = out.clusters().iter().flat_map(|c| c.doc_ids()).collect();
        kept.sort_unstable();
        assert_eq!(kept, (190..200u32).collect::<Vec<_>>());
    }
}
