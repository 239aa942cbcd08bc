#![doc = include_str!("../README.md")]

pub mod admin;
pub mod cache;
pub mod clustering;
pub mod concurrency;
pub mod config;
pub mod engine;
pub mod error;
pub mod external;
pub mod forward_index;
pub mod indexing;
pub mod posting;
pub mod query;
pub mod segment;
pub mod space_usage;
pub mod sparse_vector;
pub mod telemetry;

#[cfg(test)]
mod testutil;

pub use admin::{clear_cache, warmup, BroadcastResult, SegmentShard, Shard};
pub use cache::{CacheKey, ReadThroughCache};
pub use clustering::{build_term_clusters, TermPosting};
pub use concurrency::{BoundedPool, CancellationToken, Deadline};
pub use config::{FieldAlgorithmConfig, IndexSettings};
pub use engine::{QueryEngine, SegmentSource};
pub use error::{Result, SeismicError};
pub use external::{CircuitBreaker, StorageBackend, TokenSource};
pub use indexing::{IndexingEngine, SegmentBuilder};
pub use posting::{DocumentCluster, PostingClusters, PostingStoreReader, PostingStoreWriter};
pub use query::{search_leaf, search_multi_leaf, LeafContext, ScoredDoc, TopKHeap};
pub use segment::SegmentKey;
pub use space_usage::SpaceUsage;
pub use sparse_vector::{ByteQuantizer, QuantizedSparseVector, SparseVector};
