//! Index settings and per-field algorithm parameters.
//!
//! These are plain serde-(de)serializable structs so a host engine can
//! load them from its own mapping JSON. [`FieldAlgorithmConfig::validate`]
//! rejects out-of-range parameters at config-load time, never at first
//! use (spec.md §7, `InvalidParameter`).

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeismicError};

/// Immutable per-index setting. `is_sparse` gates admin operations
/// (warmup/clear_cache) and the choice of query path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSettings {
    pub is_sparse: bool,
}

/// Default posting-length floor applied during the posting-prune stage
/// regardless of `n_postings`/`posting_prune_ratio` (spec.md §4.4 step 2).
pub const DEFAULT_POSTING_MINIMUM_LENGTH: usize = 160;

/// Below this retained-posting size, clustering is skipped and a single
/// `must_visit` cluster is produced instead (spec.md §4.4 step 3).
pub const MIN_DOCS_FOR_CLUSTER: usize = 10;

/// Per-field mapping parameters controlling the clustering pipeline and
/// the query-time pruning behavior (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldAlgorithmConfig {
    /// Maximum postings retained per term; 0 disables the cap (only
    /// `posting_prune_ratio` applies).
    pub n_postings: usize,
    /// Fraction of a term's raw postings retained before clustering,
    /// applied when `n_postings == 0` or to compute the effective cap
    /// together with `n_postings`.
    pub posting_prune_ratio: f32,
    /// Alpha-mass retained when pruning a cluster summary, `α ∈ (0, 1]`.
    pub summary_prune_ratio: f32,
    /// Clusters per term as a fraction of the (pruned) posting length,
    /// `β ∈ (0, 1)`.
    pub cluster_ratio: f32,
    /// Segment doc counts below this fall back to flat (unclustered)
    /// postings.
    pub algo_trigger_doc_count: usize,
    /// Pruning slack applied at query time, `heap_factor >= 1.0`.
    pub heap_factor: f32,
    /// Default top-k bound per query.
    pub k: usize,
    /// Floor applied to the posting-prune stage (spec.md §4.4 step 2).
    pub posting_minimum_length: usize,
}

impl Default for FieldAlgorithmConfig {
    fn default() -> Self {
        Self {
            n_postings: 0,
            posting_prune_ratio: 1.0,
            summary_prune_ratio: 0.4,
            cluster_ratio: 0.1,
            algo_trigger_doc_count: 5000,
            heap_factor: 1.0,
            k: 10,
            posting_minimum_length: DEFAULT_POSTING_MINIMUM_LENGTH,
        }
    }
}

impl FieldAlgorithmConfig {
    /// Validates every parameter against the ranges named in spec.md §3.
    /// Rejects the two divergent-revision field name aliases (`alpha`,
    /// `lambda`) explicitly via [`Self::reject_legacy_keys`] — callers
    /// building a config from an untyped map should call that first.
    pub fn validate(&self) -> Result<()> {
        if !(self.summary_prune_ratio > 0.0 && self.summary_prune_ratio <= 1.0) {
            return Err(SeismicError::InvalidParameter {
                field: "summary_prune_ratio".into(),
                reason: "must be in (0, 1]".into(),
            });
        }
        if !(self.cluster_ratio > 0.0 && self.cluster_ratio < 1.0) {
            return Err(SeismicError::InvalidParameter {
                field: "cluster_ratio".into(),
                reason: "must be in (0, 1)".into(),
            });
        }
        if self.heap_factor < 1.0 {
            return Err(SeismicError::InvalidParameter {
                field: "heap_factor".into(),
                reason: "must be >= 1.0".into(),
            });
        }
        if !(self.posting_prune_ratio > 0.0 && self.posting_prune_ratio <= 1.0) {
            return Err(SeismicError::InvalidParameter {
                field: "posting_prune_ratio".into(),
                reason: "must be in (0, 1]".into(),
            });
        }
        if self.k == 0 {
            return Err(SeismicError::InvalidParameter {
                field: "k".into(),
                reason: "must be >= 1".into(),
            });
        }
        Ok(())
    }

    /// Rejects mapping keys from divergent source revisions (`alpha`,
    /// `lambda`) that were superseded by `summary_prune_ratio`/
    /// `n_postings` (SPEC_FULL.md §9 open-question resolution).
    pub fn reject_legacy_keys(mapping: &std::collections::HashMap<String, serde_json::Value>) -> Result<()> {
        for legacy in ["alpha", "lambda"] {
            if mapping.contains_key(legacy) {
                return Err(SeismicError::InvalidParameter {
                    field: legacy.into(),
                    reason: format!(
                        "use {} instead",
                        if legacy == "alpha" {
                            "summary_prune_ratio"
                        } else {
                            "n_postings"
                        }
                    ),
                });
            }
        }
        Ok(())
    }

    /// `min(n_postings, ceil(posting_prune_ratio * segment_doc_count))`
    /// if `n_postings > 0`, else the ratio applied alone, floored at
    /// `posting_minimum_length` (spec.md §4.4 step 2).
    pub fn effective_posting_cap(&self, segment_doc_count: usize) -> usize {
        let ratio_cap =
            (self.posting_prune_ratio as f64 * segment_doc_count as f64).ceil() as usize;
        let cap = if self.n_postings > 0 {
            self.n_postings.min(ratio_cap)
        } else {
            ratio_cap
        };
        cap.max(self.posting_minimum_length)
    }
}
