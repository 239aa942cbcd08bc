//! Per-segment forward index: `doc_id -> SparseVector` (spec.md §4.2).
//!
//! Three capability shapes, composed rather than inherited (SPEC_FULL.md
//! §9 "avoid polymorphic object graphs"): an in-memory slot array
//! ([`memory::InMemoryForwardIndex`]), a disk-backed reader over
//! [`crate::external::StorageBackend`] ([`disk::DiskForwardIndexReader`]),
//! and a cache-gated composition of the two over [`crate::cache`]
//! ([`cached::CacheGatedForwardIndexReader`]).

pub mod cached;
pub mod disk;
pub mod memory;

use crate::error::Result;
use crate::sparse_vector::SparseVector;

/// Read-only capability: `doc_id -> Option<SparseVector>`. `Send + Sync`
/// so a reader can be shared across the query executor's per-leaf
/// `rayon` fan-out (spec.md §4.7).
pub trait ForwardIndexReader: Send + Sync {
    fn read(&self, doc_id: u32) -> Result<Option<SparseVector>>;
}

/// Write capability: at most one `insert` per `doc_id`.
pub trait ForwardIndexWriter: Send + Sync {
    /// Fails with `DuplicateDoc` on re-insertion of the same `doc_id`.
    fn insert(&self, doc_id: u32, vec: SparseVector) -> Result<()>;

    /// Returns the RAM freed by removing `doc_id`, or 0 if absent.
    fn erase(&self, doc_id: u32) -> u64;
}

/// Encodes a [`SparseVector`] into the bit-exact persisted form (spec.md
/// §4.2 / §6): `u16 count; (u16 token, f32 weight)*count`, little-endian.
pub fn encode(vec: &SparseVector) -> Vec<u8> {
    let mut buf = Vec::with_capacity(2 + vec.len() * 6);
    buf.extend_from_slice(&(vec.len() as u16).to_le_bytes());
    for (&t, &w) in vec.tokens().iter().zip(vec.weights()) {
        buf.extend_from_slice(&t.to_le_bytes());
        buf.extend_from_slice(&w.to_le_bytes());
    }
    buf
}

/// Decodes the bit-exact persisted form written by [`encode`].
pub fn decode(bytes: &[u8]) -> Result<SparseVector> {
    use crate::error::SeismicError;

    if bytes.len() < 2 {
        return Err(SeismicError::StorageError(
            "forward index entry truncated (missing count)".into(),
        ));
    }
    let count = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
    let expected_len = 2 + count * 6;
    if bytes.len() < expected_len {
        return Err(SeismicError::StorageError(format!(
            "forward index entry truncated: expected {expected_len} bytes, got {}",
            bytes.len()
        )));
    }

    let mut tokens = Vec::with_capacity(count);
    let mut weights = Vec::with_capacity(count);
    let mut offset = 2;
    for _ in 0..count {
        let token = u16::from_le_bytes([bytes[offset], bytes[offset + 1]]);
        let weight = f32::from_le_bytes([
            bytes[offset + 2],
            bytes[offset + 3],
            bytes[offset + 4],
            bytes[offset + 5],
        ]);
        tokens.push(token);
        weights.push(weight);
        offset += 6;
    }

    if let Some(w) = tokens.windows(2).find(|w| w[0] >= w[1]) {
        return Err(SeismicError::MalformedVector(format!(
            "forward index entry tokens not strictly increasing at {:?}",
            w
        )));
    }

    Ok(SparseVector::from_sorted_unchecked(tokens, weights))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::make_sparse_vector;

    #[test]
    fn encode_decode_round_trip() {
        let v = make_sparse_vector(&[(1, 0.5), (3, 0.25), (100, 9.0)]);
        let bytes = encode(&v);
        let back = decode(&bytes).unwrap();
        assert_eq!(v, back);
    }

    #[test]
    fn encode_empty_vector() {
        let v = make_sparse_vector(&[]);
        let bytes = encode(&v);
        assert_eq!(bytes, vec![0, 0]);
        let back = decode(&bytes).unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn decode_rejects_truncated_bytes() {
        let v = make_sparse_vector(&[(1, 0.5), (3, 0.25)]);
        let mut bytes = encode(&v);
        bytes.truncate(bytes.len() - 1);
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn decode_byte_layout_is_little_endian() {
        let v = make_sparse_vector(&[(1, 1.0)]);
        let bytes = encode(&v);
        // count=1, token=1 (LE u16), weight=1.0f32 LE
        assert_eq!(&bytes[0..2], &1u16.to_le_bytes());
        assert_eq!(&bytes[2..4], &1u16.to_le_bytes());
        assert_eq!(&bytes[4..8], &1.0f32.to_le_bytes());
    }
}
