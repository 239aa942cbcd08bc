//! Cache-gated posting-store reader (spec.md §4.5): checks
//! [`ReadThroughCache`] first, and on a miss loads exactly the requested
//! term's clusters from the wrapped disk reader, keyed per-term via
//! [`CacheKey::posting`] so a miss never pulls in the rest of the
//! segment's postings.

use std::sync::Arc;

use crate::cache::{CacheKey, ReadThroughCache};
use crate::error::Result;
use crate::posting::disk::DiskPostingStoreReader;
use crate::posting::{PostingClusters, PostingStoreReader};
use crate::segment::SegmentKey;

/// Wraps a [`DiskPostingStoreReader`] with a [`ReadThroughCache`] keyed
/// by [`CacheKey::posting`]. A miss ("term not present in this
/// segment") is cached as `None`.
pub struct CacheGatedPostingStoreReader {
    segment: SegmentKey,
    disk: DiskPostingStoreReader,
    cache: Arc<ReadThroughCache<Option<PostingClusters>>>,
}

impl CacheGatedPostingStoreReader {
    pub fn new(
        segment: SegmentKey,
        disk: DiskPostingStoreReader,
        cache: Arc<ReadThroughCache<Option<PostingClusters>>>,
    ) -> Self {
        Self {
            segment,
            disk,
            cache,
        }
    }
}

impl PostingStoreReader for CacheGatedPostingStoreReader {
    fn read(&self, term: &[u8]) -> Result<Option<PostingClusters>> {
        let key = CacheKey::posting(self.segment.clone(), term);
        let disk = &self.disk;
        let entry = self.cache.get_or_load(key, || disk.read(term))?;
        Ok((*entry).clone())
    }
}
