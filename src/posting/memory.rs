//! In-memory clustered posting store tier: a concurrent map keyed by
//! term bytes, serialized per-term writes (spec.md §4.3, §5).

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{Result, SeismicError};
use crate::posting::{PostingClusters, PostingStoreReader, PostingStoreWriter};
use crate::segment::SegmentKey;
use crate::space_usage::SpaceUsage;

#[derive(Default, Clone)]
pub struct InMemoryPostingStore {
    terms: DashMap<Vec<u8>, PostingClusters>,
    segment: SegmentKey,
}

impl InMemoryPostingStore {
    pub fn new(segment: SegmentKey) -> Self {
        Self {
            terms: DashMap::new(),
            segment,
        }
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    pub fn terms(&self) -> Vec<Vec<u8>> {
        self.terms.iter().map(|e| e.key().clone()).collect()
    }
}

impl PostingStoreReader for InMemoryPostingStore {
    fn read(&self, term: &[u8]) -> Result<Option<PostingClusters>> {
        Ok(self.terms.get(term).map(|v| v.clone()))
    }
}

impl PostingStoreWriter for InMemoryPostingStore {
    fn write(&self, term: &[u8], clusters: PostingClusters) -> Result<()> {
        match self.terms.entry(term.to_vec()) {
            Entry::Occupied(_) => Err(SeismicError::DuplicateTerm {
                segment: self.segment.segment,
                field: self.segment.field.clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(clusters);
                Ok(())
            }
        }
    }
}

impl SpaceUsage for InMemoryPostingStore {
    fn ram_bytes(&self) -> u64 {
        self.terms.iter().map(|e| e.value().ram_bytes()).sum()
    }
}
