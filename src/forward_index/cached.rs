//! Cache-gated forward-index reader (spec.md §4.5): checks
//! [`ReadThroughCache`] first, and on a miss loads exactly the requested
//! `doc_id` from the wrapped disk reader, keyed per-doc so a miss never
//! pulls in the rest of the segment.

use std::sync::Arc;

use crate::cache::{CacheKey, ReadThroughCache};
use crate::error::Result;
use crate::forward_index::disk::DiskForwardIndexReader;
use crate::forward_index::ForwardIndexReader;
use crate::segment::SegmentKey;
use crate::sparse_vector::SparseVector;

/// Wraps a [`DiskForwardIndexReader`] with a [`ReadThroughCache`] keyed
/// by [`CacheKey::forward_doc`]. A miss (including "doc not present in
/// this segment") is cached as `None`, so a repeated lookup for an
/// absent doc never re-touches the disk reader.
pub struct CacheGatedForwardIndexReader {
    segment: SegmentKey,
    disk: DiskForwardIndexReader,
    cache: Arc<ReadThroughCache<Option<SparseVector>>>,
}

impl CacheGatedForwardIndexReader {
    pub fn new(
        segment: SegmentKey,
        disk: DiskForwardIndexReader,
        cache: Arc<ReadThroughCache<Option<SparseVector>>>,
    ) -> Self {
        Self {
            segment,
            disk,
            cache,
        }
    }
}

impl ForwardIndexReader for CacheGatedForwardIndexReader {
    fn read(&self, doc_id: u32) -> Result<Option<SparseVector>> {
        let key = CacheKey::forward_doc(self.segment.clone(), doc_id);
        let disk = &self.disk;
        let entry = self.cache.get_or_load(key, || disk.read(doc_id))?;
        Ok((*entry).clone())
    }
}
