//! Clustered posting store: `term -> PostingClusters` per segment/field
//! (spec.md §4.3). Same three-shape composition as
//! [`crate::forward_index`]: [`memory::InMemoryPostingStore`],
//! [`disk::DiskPostingStoreReader`], and the cache-gated
//! [`cached::CacheGatedPostingStoreReader`].

pub mod cached;
pub mod disk;
pub mod memory;

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SeismicError};
use crate::space_usage::SpaceUsage;
use crate::sparse_vector::SparseVector;

/// A single cluster within a term's posting list: a pruned summary
/// vector plus the sorted set of member doc ids (spec.md §3).
///
/// If `must_visit` is `true` the cluster is never pruned at query time
/// and `summary` may be empty (spec.md §4.4 step 3, the small-posting
/// short circuit).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentCluster {
    pub summary: SparseVector,
    doc_ids: RoaringBitmap,
    pub must_visit: bool,
}

impl DocumentCluster {
    /// `doc_ids` is sorted ascending and deduplicated on construction
    /// (required by the query-time iterator contract, spec.md §4.4
    /// step 6). Fails if `doc_ids` is empty (spec.md §3 invariant).
    pub fn new(summary: SparseVector, doc_ids: &[u32], must_visit: bool) -> Result<Self> {
        if doc_ids.is_empty() {
            return Err(SeismicError::MalformedVector(
                "DocumentCluster requires at least one doc_id".into(),
            ));
        }
        let mut bitmap = RoaringBitmap::new();
        for &id in doc_ids {
            bitmap.insert(id);
        }
        Ok(Self {
            summary,
            doc_ids: bitmap,
            must_visit,
        })
    }

    pub fn doc_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.doc_ids.iter()
    }

    pub fn len(&self) -> usize {
        self.doc_ids.len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }
}

impl SpaceUsage for DocumentCluster {
    fn ram_bytes(&self) -> u64 {
        self.summary.ram_bytes() + self.doc_ids.serialized_size() as u64 + 1
    }
}

/// The ordered list of clusters for one term (spec.md §3). Order is the
/// order produced by clustering and must be preserved: query-time
/// traversal relies on it for the scorer state machine (spec.md §4.7).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostingClusters {
    clusters: Vec<DocumentCluster>,
}

impl PostingClusters {
    pub fn new(clusters: Vec<DocumentCluster>) -> Self {
        Self { clusters }
    }

    pub fn clusters(&self) -> &[DocumentCluster] {
        &self.clusters
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn total_docs(&self) -> usize {
        self.clusters.iter().map(DocumentCluster::len).sum()
    }
}

impl SpaceUsage for PostingClusters {
    fn ram_bytes(&self) -> u64 {
        self.clusters.ram_bytes()
    }
}

/// Read-only capability: `term -> Option<PostingClusters>`. `Send +
/// Sync` so a reader can be shared across the query executor's
/// per-leaf `rayon` fan-out (spec.md §4.7).
pub trait PostingStoreReader: Send + Sync {
    fn read(&self, term: &[u8]) -> Result<Option<PostingClusters>>;
}

/// Write capability: at most one `write` per term.
pub trait PostingStoreWriter: Send + Sync {
    /// Fails with `DuplicateTerm` if this term was already written for
    /// this segment/field.
    fn write(&self, term: &[u8], clusters: PostingClusters) -> Result<()>;
}

/// Encodes a [`PostingClusters`] into the bit-exact persisted form
/// (spec.md §6): `u32 cluster_count; per cluster { u8 must_visit; u16
/// summary_count; (u16,f32)*; u32 doc_count; u32*doc_count }`,
/// little-endian, doc ids sorted ascending.
pub fn encode(clusters: &PostingClusters) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(clusters.clusters.len() as u32).to_le_bytes());
    for cluster in &clusters.clusters {
        buf.push(cluster.must_visit as u8);
        buf.extend_from_slice(&(cluster.summary.len() as u16).to_le_bytes());
        for (&t, &w) in cluster
            .summary
            .tokens()
            .iter()
            .zip(cluster.summary.weights())
        {
            buf.extend_from_slice(&t.to_le_bytes());
            buf.extend_from_slice(&w.to_le_bytes());
        }
        buf.extend_from_slice(&(cluster.len() as u32).to_le_bytes());
        for doc_id in cluster.doc_ids() {
            buf.extend_from_slice(&doc_id.to_le_bytes());
        }
    }
    buf
}

/// Decodes the bit-exact persisted form written by [`encode`].
pub fn decode(bytes: &[u8]) -> Result<PostingClusters> {
    let mut offset = 0usize;
    let read_u32 = |bytes: &[u8], offset: &mut usize| -> Result<u32> {
        if *offset + 4 > bytes.len() {
            return Err(truncated());
        }
        let v = u32::from_le_bytes(bytes[*offset..*offset + 4].try_into().unwrap());
        *offset += 4;
        Ok(v)
    };
    let read_u16 = |bytes: &[u8], offset: &mut usize| -> Result<u16> {
        if *offset + 2 > bytes.len() {
            return Err(truncated());
        }
        let v = u16::from_le_bytes(bytes[*offset..*offset + 2].try_into().unwrap());
        *offset += 2;
        Ok(v)
    };
    let read_f32 = |bytes: &[u8], offset: &mut usize| -> Result<f32> {
        if *offset + 4 > bytes.len() {
            return Err(truncated());
        }
        let v = f32::from_le_bytes(bytes[*offset..*offset + 4].try_into().unwrap());
        *offset += 4;
        Ok(v)
    };
    let read_u8 = |bytes: &[u8], offset: &mut usize| -> Result<u8> {
        if *offset + 1 > bytes.len() {
            return Err(truncated());
        }
        let v = bytes[*offset];
        *offset += 1;
        Ok(v)
    };

    let cluster_count = read_u32(bytes, &mut offset)?;
    let mut clusters = Vec::with_capacity(cluster_count as usize);
    for _ in 0..cluster_count {
        let must_visit = read_u8(bytes, &mut offset)? != 0;
        let summary_count = read_u16(bytes, &mut offset)?;
        let mut tokens = Vec::with_capacity(summary_count as usize);
        let mut weights = Vec::with_capacity(summary_count as usize);
        for _ in 0..summary_count {
            tokens.push(read_u16(bytes, &mut offset)?);
            weights.push(read_f32(bytes, &mut offset)?);
        }
        let summary = SparseVector::from_sorted_unchecked(tokens, weights);

        let doc_count = read_u32(bytes, &mut offset)?;
        let mut doc_ids = Vec::with_capacity(doc_count as usize);
        for _ in 0..doc_count {
            doc_ids.push(read_u32(bytes, &mut offset)?);
        }
        if doc_ids.is_empty() {
            // A persisted empty cluster is a format violation: the
            // invariant (spec.md §3) requires non-empty doc_ids.
            return Err(SeismicError::MalformedVector(
                "persisted cluster has zero doc_ids".into(),
            ));
        }
        clusters.push(DocumentCluster::new(summary, &doc_ids, must_visit)?);
    }

    Ok(PostingClusters::new(clusters))
}

fn truncated() -> SeismicError {
    SeismicError::StorageError("clustered posting entry truncated".into())
}
