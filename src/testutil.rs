//! Test-only doubles for the external collaborator traits (SPEC_FULL.md
//! §4.11). Not part of the public API.

#![cfg(test)]

use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use bytes::Bytes;
use uuid::Uuid;

use crate::error::{Result, SeismicError};
use crate::external::{CircuitBreaker, StorageBackend};
use crate::sparse_vector::SparseVector;

/// In-memory stand-in for a host's segmented storage engine, keyed by
/// `(segment, field)` with the full byte blob stored per key (logical
/// ranges slice into it).
#[derive(Default)]
pub struct InMemoryStorageBackend {
    blobs: Mutex<HashMap<(Uuid, String), Bytes>>,
}

impl InMemoryStorageBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, segment: Uuid, field: &str, bytes: Bytes) {
        self.blobs
            .lock()
            .unwrap()
            .insert((segment, field.to_string()), bytes);
    }
}

impl StorageBackend for InMemoryStorageBackend {
    fn read_bytes(&self, segment: Uuid, field: &str, logical_range: Range<u64>) -> Result<Bytes> {
        let blobs = self.blobs.lock().unwrap();
        let blob = blobs
            .get(&(segment, field.to_string()))
            .ok_or_else(|| SeismicError::StorageError(format!("no blob for {segment}/{field}")))?;
        let start = logical_range.start as usize;
        let end = (logical_range.end as usize).min(blob.len());
        if start > blob.len() || start > end {
            return Err(SeismicError::StorageError("range out of bounds".into()));
        }
        Ok(blob.slice(start..end))
    }

    fn write_finalize(&self, segment: Uuid, field: &str, bytes: Bytes) -> Result<()> {
        self.put(segment, field, bytes);
        Ok(())
    }
}

/// Plain atomic-counter circuit breaker: `reserve` fails once
/// `used + bytes > limit`.
pub struct CountingCircuitBreaker {
    used: AtomicI64,
    limit: i64,
}

impl CountingCircuitBreaker {
    pub fn new(limit: u64) -> Self {
        Self {
            used: AtomicI64::new(0),
            limit: limit as i64,
        }
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire).max(0) as u64
    }
}

impl CircuitBreaker for CountingCircuitBreaker {
    fn reserve(&self, bytes: u64) -> Result<()> {
        let bytes = bytes as i64;
        let prev = self.used.fetch_add(bytes, Ordering::AcqRel);
        if prev + bytes > self.limit {
            self.used.fetch_sub(bytes, Ordering::AcqRel);
            return Err(SeismicError::CapacityExceeded {
                requested: bytes as u64,
                used: prev as u64,
                limit: self.limit as u64,
            });
        }
        Ok(())
    }

    fn release(&self, bytes: u64) {
        self.used.fetch_sub(bytes as i64, Ordering::AcqRel);
    }
}

pub fn make_sparse_vector(pairs: &[(u16, f32)]) -> SparseVector {
    SparseVector::new(pairs).expect("valid test vector")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_backend_round_trips_bytes() {
        let backend = InMemoryStorageBackend::new();
        let segment = Uuid::new_v4();
        backend.put(segment, "f", Bytes::from_static(b"hello world"));
        let got = backend.read_bytes(segment, "f", 0..5).unwrap();
        assert_eq!(&got[..], b"hello");
    }

    #[test]
    fn circuit_breaker_rejects_over_budget() {
        let cb = CountingCircuitBreaker::new(100);
        assert!(cb.reserve(60).is_ok());
        assert!(cb.reserve(60).is_err());
        assert_eq!(cb.used(), 60);
        cb.release(60);
        assert_eq!(cb.used(), 0);
    }
}
