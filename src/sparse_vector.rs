//! Sorted `(token_id, weight)` sparse vectors (spec.md §4.1).

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeismicError};
use crate::space_usage::SpaceUsage;

/// A document or query vector over a sparse token space: an ordered
/// sequence of `(token_id, weight)` pairs, sorted by `token_id`
/// ascending, with no duplicate tokens. Weights are finite and
/// non-negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    tokens: Vec<u16>,
    weights: Vec<f32>,
}

impl SparseVector {
    /// Builds a vector from `(token_id, weight)` pairs, sorting by
    /// token and rejecting duplicate tokens with `MalformedVector`
    /// (spec.md §4.1 chooses rejection over summation).
    pub fn new(pairs: &[(u16, f32)]) -> Result<Self> {
        for &(_, w) in pairs {
            if !w.is_finite() {
                return Err(SeismicError::ArithmeticOverflow);
            }
            if w < 0.0 {
                return Err(SeismicError::MalformedVector(format!(
                    "negative weight {w}"
                )));
            }
        }

        let mut sorted: Vec<(u16, f32)> = pairs.to_vec();
        sorted.sort_unstable_by_key(|&(t, _)| t);

        for w in sorted.windows(2) {
            if w[0].0 == w[1].0 {
                return Err(SeismicError::MalformedVector(format!(
                    "duplicate token_id {}",
                    w[0].0
                )));
            }
        }

        let (tokens, weights) = sorted.into_iter().unzip();
        Ok(Self { tokens, weights })
    }

    /// Builds a vector from already-sorted, deduplicated, validated
    /// parallel arrays without re-checking invariants. Used by readers
    /// that decode the on-disk byte form (spec.md §4.2), which is
    /// written in sorted order by construction.
    pub(crate) fn from_sorted_unchecked(tokens: Vec<u16>, weights: Vec<f32>) -> Self {
        debug_assert_eq!(tokens.len(), weights.len());
        debug_assert!(tokens.windows(2).all(|w| w[0] < w[1]));
        Self { tokens, weights }
    }

    pub fn tokens(&self) -> &[u16] {
        &self.tokens
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// One past the largest token id present, or 0 if empty.
    pub fn dim(&self) -> u16 {
        self.tokens.last().map(|&t| t + 1).unwrap_or(0)
    }

    /// Sum of weights (L1 mass), used by [`Self::prune_alpha`].
    pub fn l1_mass(&self) -> f32 {
        self.weights.iter().sum()
    }

    /// `sum(w[i] * dense[token[i]])` for all `token[i] < dense.len()`.
    /// Tokens are sorted, so once one is out of range every subsequent
    /// one is too; the loop exits at the first out-of-range token.
    pub fn dot_dense(&self, dense: &[f32]) -> f32 {
        let mut acc = 0.0f32;
        for (&t, &w) in self.tokens.iter().zip(self.weights.iter()) {
            if t as usize >= dense.len() {
                break;
            }
            acc += w * dense[t as usize];
        }
        acc
    }

    /// Sparse-sparse dot product via a merge over both sorted token
    /// arrays; cheaper than `to_dense` + `dot_dense` for two vectors of
    /// comparable length (e.g. cluster-summary pruning checks).
    pub fn dot_sparse(&self, other: &SparseVector) -> f32 {
        let mut acc = 0.0f32;
        let (mut i, mut j) = (0usize, 0usize);
        while i < self.tokens.len() && j < other.tokens.len() {
            match self.tokens[i].cmp(&other.tokens[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    acc += self.weights[i] * other.weights[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        acc
    }

    /// Materializes a dense vector of length `dim + 1`; entries for
    /// tokens greater than `dim` are dropped.
    pub fn to_dense(&self, dim: u16) -> Vec<f32> {
        let mut dense = vec![0.0f32; dim as usize + 1];
        for (&t, &w) in self.tokens.iter().zip(self.weights.iter()) {
            if t > dim {
                break;
            }
            dense[t as usize] = w;
        }
        dense
    }

    /// Returns the largest prefix (by weight, descending) whose
    /// cumulative L1 mass is `>= alpha * total_mass`, then re-sorts
    /// that prefix back into token order (ties broken by ascending
    /// token_id). Used to build cluster summaries (spec.md §4.1, §4.4
    /// step 5).
    pub fn prune_alpha(&self, alpha: f32) -> SparseVector {
        if self.tokens.is_empty() {
            return SparseVector {
                tokens: Vec::new(),
                weights: Vec::new(),
            };
        }

        let total_mass = self.l1_mass();
        if total_mass <= 0.0 {
            return self.clone();
        }

        let mut by_weight: Vec<(u16, f32)> = self
            .tokens
            .iter()
            .copied()
            .zip(self.weights.iter().copied())
            .collect();
        by_weight.sort_unstable_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let target = alpha as f64 * total_mass as f64;
        let mut acc = 0.0f64;
        let mut kept = Vec::with_capacity(by_weight.len());
        for pair in by_weight {
            if acc >= target && !kept.is_empty() {
                break;
            }
            acc += pair.1 as f64;
            kept.push(pair);
        }

        kept.sort_unstable_by_key(|&(t, _)| t);
        let (tokens, weights) = kept.into_iter().unzip();
        SparseVector { tokens, weights }
    }

    /// Byte-quantizes every weight against `wmax` (spec.md §3 — 255 is
    /// the chosen scale, see SPEC_FULL.md §9 open question).
    pub fn quantize_bytes(&self, wmax: f32) -> QuantizedSparseVector {
        let bytes = self
            .weights
            .iter()
            .map(|&w| ByteQuantizer::quantize(w, wmax))
            .collect();
        QuantizedSparseVector {
            tokens: self.tokens.clone(),
            bytes,
            wmax,
        }
    }
}

impl SpaceUsage for SparseVector {
    fn ram_bytes(&self) -> u64 {
        let shallow = std::mem::size_of::<Self>() as u64;
        let tokens = (self.tokens.len() * std::mem::size_of::<u16>()) as u64;
        let weights = (self.weights.len() * std::mem::size_of::<f32>()) as u64;
        shallow + tokens + weights
    }
}

/// Fixed scale factor for byte quantization: `round(w * 255 / wmax)`,
/// saturating at both ends. 255 (not 127) per SPEC_FULL.md §9.
pub struct ByteQuantizer;

impl ByteQuantizer {
    pub const SCALE: f32 = 255.0;

    pub fn quantize(weight: f32, wmax: f32) -> u8 {
        if wmax <= 0.0 {
            return 0;
        }
        let scaled = (weight * Self::SCALE / wmax).round();
        scaled.clamp(0.0, 255.0) as u8
    }

    pub fn dequantize(byte: u8, wmax: f32) -> f32 {
        byte as f32 * wmax / Self::SCALE
    }
}

/// Byte-quantized variant of a [`SparseVector`] (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizedSparseVector {
    tokens: Vec<u16>,
    bytes: Vec<u8>,
    wmax: f32,
}

impl QuantizedSparseVector {
    pub fn dot_dense(&self, dense: &[f32]) -> f32 {
        let mut acc = 0.0f32;
        for (&t, &b) in self.tokens.iter().zip(self.bytes.iter()) {
            if t as usize >= dense.len() {
                break;
            }
            acc += ByteQuantizer::dequantize(b, self.wmax) * dense[t as usize];
        }
        acc
    }

    pub fn tokens(&self) -> &[u16] {
        &self.tokens
    }
}

impl SpaceUsage for QuantizedSparseVector {
    fn ram_bytes(&self) -> u64 {
        let shallow = std::mem::size_of::<Self>() as u64;
        let tokens = (self.tokens.len() * std::mem::size_of::<u16>()) as u64;
        let bytes = self.bytes.len() as u64;
        shallow + tokens + bytes
    }
}
