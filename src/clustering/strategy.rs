//! Pluggable pruning/summarization strategies (SPEC_FULL.md §1.2),
//! mirroring the upstream SEISMIC research crate's `Configuration`
//! builder. `GlobalThreshold` + `EnergyPreserving` are the default and
//! the only strategies exercised by [`crate::clustering::build_term_clusters`]
//! elsewhere in this crate; `FixedSize` variants are carried over for
//! experimentation and have no other caller.

use serde::{Deserialize, Serialize};

/// Posting-prune strategy applied before clustering (spec.md §4.4 step 2).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PruningStrategy {
    /// Every posting list is pruned to its top-`n_postings` by frequency.
    FixedSize { n_postings: usize },
    /// The posting is pruned to `min(n_postings, ceil(ratio *
    /// segment_doc_count))`, floored at `posting_minimum_length`. This
    /// is the literal behavior described in spec.md §4.4 step 2.
    GlobalThreshold {
        n_postings: usize,
        posting_prune_ratio: f32,
        posting_minimum_length: usize,
    },
}

impl Default for PruningStrategy {
    fn default() -> Self {
        Self::GlobalThreshold {
            n_postings: 0,
            posting_prune_ratio: 1.0,
            posting_minimum_length: crate::config::DEFAULT_POSTING_MINIMUM_LENGTH,
        }
    }
}

impl PruningStrategy {
    /// The number of postings to retain out of `segment_doc_count`
    /// total documents indexed for this field (spec.md §4.4 step 2).
    pub fn effective_cap(&self, segment_doc_count: usize) -> usize {
        match *self {
            Self::FixedSize { n_postings } => n_postings.max(1),
            Self::GlobalThreshold {
                n_postings,
                posting_prune_ratio,
                posting_minimum_length,
            } => {
                let ratio_cap =
                    (posting_prune_ratio as f64 * segment_doc_count as f64).ceil() as usize;
                let cap = if n_postings > 0 {
                    n_postings.min(ratio_cap)
                } else {
                    ratio_cap
                };
                cap.max(posting_minimum_length)
            }
        }
    }
}

/// Cluster-summary construction strategy (spec.md §4.4 step 5).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SummarizationStrategy {
    /// Retain a fixed number of (highest-weight) components per summary.
    FixedSize { n_components: usize },
    /// Retain the largest-mass prefix whose cumulative weight reaches
    /// `summary_energy` of the cluster's total mass — this is
    /// [`crate::sparse_vector::SparseVector::prune_alpha`] and is the
    /// strategy spec.md §4.4 step 5 describes.
    EnergyPreserving { summary_energy: f32 },
}

impl Default for SummarizationStrategy {
    fn default() -> Self {
        Self::EnergyPreserving {
            summary_energy: 0.4,
        }
    }
}

impl SummarizationStrategy {
    /// Builds a cluster summary from the (unnormalized) sum of its
    /// members' vectors (spec.md §4.4 step 5).
    pub fn summarize(&self, cluster_sum: &crate::sparse_vector::SparseVector) -> crate::sparse_vector::SparseVector {
        match *self {
            Self::EnergyPreserving { summary_energy } => cluster_sum.prune_alpha(summary_energy),
            Self::FixedSize { n_components } => {
                let mut by_weight: Vec<(u16, f32)> = cluster_sum
                    .tokens()
                    .iter()
                    .copied()
                    .zip(cluster_sum.weights().iter().copied())
                    .collect();
                by_weight.sort_unstable_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
                by_weight.truncate(n_components);
                by_weight.sort_unstable_by_key(|&(t, _)| t);
                let (tokens, weights) = by_weight.into_iter().unzip();
                crate::sparse_vector::SparseVector::from_sorted_unchecked(tokens, weights)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_behavior() {
        assert_eq!(
            SummarizationStrategy::default(),
            SummarizationStrategy::EnergyPreserving {
                summary_energy: 0.4
            }
        );
    }

    #[test]
    fn global_threshold_cap_is_floored_and_capped() {
        let s = PruningStrategy::GlobalThreshold {
            n_postings: 100,
            posting_prune_ratio: 0.5,
            posting_minimum_length: 160,
        };
        assert_eq!(s.effective_cap(10), 160);
        assert_eq!(s.effective_cap(1000), 100);
    }

    #[test]
    fn fixed_size_summarize_keeps_top_n_in_token_order() {
        let v = crate::sparse_vector::SparseVector::new(&[(1, 1.0), (2, 3.0), (3, 2.0)]).unwrap();
        let s = SummarizationStrategy::FixedSize { n_components: 2 };
        let summary = s.summarize(&v);
        assert_eq!(summary.tokens(), &[2, 3]);
    }
}
