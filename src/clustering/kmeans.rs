//! Spherical k-means-like clustering over sparse vectors (spec.md §4.4
//! step 4), grounded on the teacher's `blocking_with_random_kmeans` but
//! using the spec's deterministic evenly-spaced centroid init rather
//! than a random one.

use std::collections::BTreeMap;

use crate::sparse_vector::SparseVector;

const MAX_ITERATIONS: usize = 25;

/// Component-wise sum of a set of sparse vectors (not normalized),
/// used both to seed and to recompute centroids.
pub fn sum_vectors<'a>(vectors: impl IntoIterator<Item = &'a SparseVector>) -> SparseVector {
    let mut acc: BTreeMap<u16, f32> = BTreeMap::new();
    for v in vectors {
        for (&t, &w) in v.tokens().iter().zip(v.weights()) {
            *acc.entry(t).or_insert(0.0) += w;
        }
    }
    let tokens: Vec<u16> = acc.keys().copied().collect();
    let weights: Vec<f32> = acc.values().copied().collect();
    SparseVector::from_sorted_unchecked(tokens, weights)
}

/// Clusters `vectors` (assumed already frequency-sorted, as produced by
/// the posting-prune stage) into at most `k` groups. Returns the
/// members of each surviving (non-empty) cluster as indices into
/// `vectors`, in the order clusters were finalized.
///
/// Initial centroids are `k` vectors spaced evenly across `vectors` in
/// their given order (spec.md §4.4 step 4). Assignment is by maximum
/// dot product against the (unnormalized) centroid sums; centroids are
/// recomputed as the sum of assigned members each iteration, with no
/// renormalization, matching the spec's literal description.
pub fn spherical_kmeans(vectors: &[SparseVector], k: usize) -> Vec<Vec<usize>> {
    let n = vectors.len();
    if n == 0 {
        return Vec::new();
    }
    let k = k.clamp(1, n);

    let mut centroids: Vec<SparseVector> = (0..k)
        .map(|i| {
            let idx = if k == 1 { 0 } else { i * (n - 1) / (k - 1) };
            vectors[idx].clone()
        })
        .collect();

    let mut assignment: Vec<usize> = vec![usize::MAX; n];
    let max_dim = vectors.iter().map(|v| v.dim()).max().unwrap_or(0);

    for _ in 0..MAX_ITERATIONS {
        let dense_centroids: Vec<Vec<f32>> = centroids
            .iter()
            .map(|c| c.to_dense(max_dim.max(c.dim())))
            .collect();

        let mut changed = false;
        for (i, v) in vectors.iter().enumerate() {
            let mut best = 0usize;
            let mut best_score = f32::MIN;
            for (c_idx, dense) in dense_centroids.iter().enumerate() {
                let score = v.dot_dense(dense);
                if score > best_score {
                    best_score = score;
                    best = c_idx;
                }
            }
            if assignment[i] != best {
                assignment[i] = best;
                changed = true;
            }
        }

        if !changed {
            break;
        }

        for (c_idx, centroid) in centroids.iter_mut().enumerate() {
            let members: Vec<&SparseVector> = vectors
                .iter()
                .enumerate()
                .filter(|&(i, _)| assignment[i] == c_idx)
                .map(|(_, v)| v)
                .collect();
            if !members.is_empty() {
                *centroid = sum_vectors(members.into_iter());
            }
        }
    }

    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); k];
    for (i, &c) in assignment.iter().enumerate() {
        groups[c].push(i);
    }
    groups.retain(|g| !g.is_empty());
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::make_sparse_vector;

    #[test]
    fn single_cluster_when_k_is_one() {
        let vectors = vec![
            make_sparse_vector(&[(1, 1.0)]),
            make_sparse_vector(&[(2, 1.0)]),
        ];
        let groups = spherical_kmeans(&vectors, 1);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
    }

    #[test]
    fn separates_disjoint_clusters() {
        // Two tight groups on disjoint token sets {10,11} and {20,21}.
        let vectors = vec![
            make_sparse_vector(&[(10, 1.0), (11, 0.9)]),
            make_sparse_vector(&[(10, 0.95), (11, 1.0)]),
            make_sparse_vector(&[(20, 1.0), (21, 0.9)]),
            make_sparse_vector(&[(20, 0.9), (21, 1.0)]),
        ];
        let groups = spherical_kmeans(&vectors, 2);
        assert_eq!(groups.len(), 2);
        let total: usize = groups.iter().map(Vec::len).sum();
        assert_eq!(total, 4);
        // each group should be internally homogeneous (all low-id or
        // all high-id members)
        for g in &groups {
            let all_low = g.iter().all(|&i| i < 2);
            let all_high = g.iter().all(|&i| i >= 2);
            assert!(all_low || all_high);
        }
    }

    #[test]
    fn empty_input_yields_no_clusters() {
        let groups = spherical_kmeans(&[], 5);
        assert!(groups.is_empty());
    }

    #[test]
    fn k_clamped_to_input_len() {
        let vectors = vec![make_sparse_vector(&[(1, 1.0)])];
        let groups = spherical_kmeans(&vectors, 10);
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn deterministic_across_runs() {
        let vectors: Vec<_> = (0..20u16)
            .map(|i| make_sparse_vector(&[(i, 1.0), (i + 1, 0.5)]))
            .collect();
        let a = spherical_kmeans(&vectors, 4);
        let b = spherical_kmeans(&vectors, 4);
        assert_eq!(a, b);
    }

    #[test]
    fn sum_vectors_accumulates_shared_tokens() {
        let a = make_sparse_vector(&[(1, 1.0), (2, 2.0)]);
        let b = make_sparse_vector(&[(2, 3.0), (3, 4.0)]);
        let sum = sum_vectors([&a, &b]);
        assert_eq!(sum.tokens(), &[1, 2, 3]);
        assert_eq!(sum.weights(), &[1.0, 5.0, 4.0]);
    }
}
