//! In-memory forward index tier: a concurrent map keyed by local
//! `doc_id` (spec.md §4.2). Segment doc ids are dense small integers in
//! the source system, but nothing here depends on that — a `DashMap`
//! gives idempotent, publication-safe inserts without a single
//! segment-wide writer lock.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{Result, SeismicError};
use crate::forward_index::{ForwardIndexReader, ForwardIndexWriter};
use crate::space_usage::SpaceUsage;
use crate::sparse_vector::SparseVector;

/// In-memory `doc_id -> SparseVector` store for one `(segment, field)`.
/// Readers never observe a partially-initialized vector: entries are
/// published by moving a fully-built `SparseVector` into the map under
/// one atomic `insert`.
#[derive(Default, Clone)]
pub struct InMemoryForwardIndex {
    slots: DashMap<u32, Arc<SparseVector>>,
    segment: crate::segment::SegmentKey,
}

impl InMemoryForwardIndex {
    pub fn new(segment: crate::segment::SegmentKey) -> Self {
        Self {
            slots: DashMap::new(),
            segment,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, doc_id: u32) -> bool {
        self.slots.contains_key(&doc_id)
    }

    pub fn doc_ids(&self) -> Vec<u32> {
        self.slots.iter().map(|e| *e.key()).collect()
    }
}

impl ForwardIndexReader for InMemoryForwardIndex {
    fn read(&self, doc_id: u32) -> Result<Option<SparseVector>> {
        Ok(self.slots.get(&doc_id).map(|v| (**v).clone()))
    }
}

impl ForwardIndexWriter for InMemoryForwardIndex {
    fn insert(&self, doc_id: u32, vec: SparseVector) -> Result<()> {
        match self.slots.entry(doc_id) {
            Entry::Occupied(_) => Err(SeismicError::DuplicateDoc {
                segment: self.segment.segment,
                field: self.segment.field.clone(),
                doc_id,
            }),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(vec));
                Ok(())
            }
        }
    }

    fn erase(&self, doc_id: u32) -> u64 {
        self.slots
            .remove(&doc_id)
            .map(|(_, v)| v.ram_bytes())
            .unwrap_or(0)
    }
}

impl SpaceUsage for InMemoryForwardIndex {
    fn ram_bytes(&self) -> u64 {
        self.slots.iter().map(|e| e.value().ram_bytes()).sum()
    }
}
