//! Disk-backed clustered posting store tier: decodes the bit-exact
//! persisted form (spec.md §6) from an opaque byte-range reader.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;
use crate::external::StorageBackend;
use crate::posting::{decode, PostingClusters, PostingStoreReader};
use crate::segment::SegmentKey;

/// Maps term bytes to their byte range within the segment's clustered
/// posting blob. Owned by the storage engine; this crate only consumes
/// it to know where to read.
pub trait PostingOffsets: Send + Sync {
    fn range(&self, term: &[u8]) -> Option<Range<u64>>;
}

/// A [`PostingOffsets`] backed by a plain in-process map, useful both
/// for tests and for storage backends that keep their offset table
/// resident.
#[derive(Default)]
pub struct MapPostingOffsets(RwLock<HashMap<Vec<u8>, Range<u64>>>);

impl MapPostingOffsets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, term: &[u8], range: Range<u64>) {
        self.0.write().insert(term.to_vec(), range);
    }
}

impl PostingOffsets for MapPostingOffsets {
    fn range(&self, term: &[u8]) -> Option<Range<u64>> {
        self.0.read().get(term).cloned()
    }
}

pub struct DiskPostingStoreReader {
    segment: SegmentKey,
    backend: Arc<dyn StorageBackend>,
    offsets: Arc<dyn PostingOffsets>,
}

impl DiskPostingStoreReader {
    pub fn new(
        segment: SegmentKey,
        backend: Arc<dyn StorageBackend>,
        offsets: Arc<dyn PostingOffsets>,
    ) -> Self {
        Self {
            segment,
            backend,
            offsets,
        }
    }
}

impl PostingStoreReader for DiskPostingStoreReader {
    fn read(&self, term: &[u8]) -> Result<Option<PostingClusters>> {
        let Some(range) = self.offsets.range(term) else {
            return Ok(None);
        };
        let bytes = self
            .backend
            .read_bytes(self.segment.segment, &self.segment.field, range)?;
        decode(&bytes).map(Some)
    }
}
