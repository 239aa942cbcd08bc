//! Segment/field keys (spec.md §3, §9): all in-memory structures are
//! keyed by `(segment_uuid, field_name)`; eviction is a structural drop,
//! never a cascade, since no structure references another segment's
//! data.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentKey {
    pub segment: Uuid,
    pub field: String,
}

impl SegmentKey {
    pub fn new(segment: Uuid, field: impl Into<String>) -> Self {
        Self {
            segment,
            field: field.into(),
        }
    }
}

impl std::fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.segment, self.field)
    }
}
