//! Narrow trait boundaries to externally-owned collaborators (spec.md
//! §6): the host's tokenizer, the segmented storage engine, and the
//! admin-settings circuit breaker. This crate only depends on these
//! contracts, never on a concrete transport/storage implementation.

use std::ops::Range;

use bytes::Bytes;
use uuid::Uuid;

use crate::error::Result;

/// Converts free text into `(token_id, weight)` pairs. Tokenization and
/// weighting are entirely opaque to this crate (spec.md §6).
pub trait TokenSource: Send + Sync {
    fn tokenize(&self, text: &str) -> Result<Vec<(u16, f32)>>;
}

/// Byte-addressable read/write access into the host's segmented storage
/// engine, scoped to a `(segment, field)` pair (spec.md §6). Treated as
/// an opaque KV interface: this crate never interprets the storage
/// engine's own framing.
pub trait StorageBackend: Send + Sync {
    fn read_bytes(&self, segment: Uuid, field: &str, logical_range: Range<u64>) -> Result<Bytes>;

    fn write_finalize(&self, segment: Uuid, field: &str, bytes: Bytes) -> Result<()>;
}

/// Externally-owned memory accounting callback (spec.md §4.5, §6). The
/// cache layer calls `reserve` before installing a new entry and
/// `release` on eviction; `reserve` failing means the install is skipped
/// and the cache falls back to an uncached read.
pub trait CircuitBreaker: Send + Sync {
    fn reserve(&self, bytes: u64) -> Result<()>;

    fn release(&self, bytes: u64);
}
