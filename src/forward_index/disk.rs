//! Disk-backed forward index tier: decodes the bit-exact persisted form
//! (spec.md §4.2) on every read from an opaque byte-range reader. This
//! tier holds no cache of its own; see [`crate::forward_index::cached`]
//! for the cache-gated composition.

use std::sync::Arc;

use crate::error::Result;
use crate::external::StorageBackend;
use crate::forward_index::{decode, ForwardIndexReader};
use crate::segment::SegmentKey;
use crate::sparse_vector::SparseVector;

/// An offset table mapping `doc_id -> byte range` within the segment's
/// forward-index blob. The storage engine owns the actual blob framing;
/// this crate only needs to know where each entry starts and ends.
pub trait ForwardIndexOffsets: Send + Sync {
    fn range(&self, doc_id: u32) -> Option<std::ops::Range<u64>>;
}

pub struct DiskForwardIndexReader {
    segment: SegmentKey,
    backend: Arc<dyn StorageBackend>,
    offsets: Arc<dyn ForwardIndexOffsets>,
}

impl DiskForwardIndexReader {
    pub fn new(
        segment: SegmentKey,
        backend: Arc<dyn StorageBackend>,
        offsets: Arc<dyn ForwardIndexOffsets>,
    ) -> Self {
        Self {
            segment,
            backend,
            offsets,
        }
    }
}

impl ForwardIndexReader for DiskForwardIndexReader {
    fn read(&self, doc_id: u32) -> Result<Option<SparseVector>> {
        let Some(range) = self.offsets.range(doc_id) else {
            return Ok(None);
        };
        let bytes = self
            .backend
            .read_bytes(self.segment.segment, &self.segment.field, range)?;
        decode(&bytes).map(Some)
    }
}
