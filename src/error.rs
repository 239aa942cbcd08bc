//! Crate-wide error taxonomy.
//!
//! Every fallible public entry point returns [`Result<T>`]. Per-document
//! failures inside clustering and query scoring are recovered locally
//! (the failing document is excluded and counted, see `tracing::warn!`
//! call sites in `clustering` and `query`); only failures that abort the
//! whole operation are represented here.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SeismicError>;

#[derive(Debug, Error)]
pub enum SeismicError {
    #[error("malformed sparse vector: {0}")]
    MalformedVector(String),

    #[error("arithmetic overflow: non-finite weight encountered")]
    ArithmeticOverflow,

    #[error("duplicate insert for doc_id {doc_id} in segment {segment}/{field}")]
    DuplicateDoc {
        segment: uuid::Uuid,
        field: String,
        doc_id: u32,
    },

    #[error("duplicate write for term in segment {segment}/{field}")]
    DuplicateTerm { segment: uuid::Uuid, field: String },

    #[error("storage backend error: {0}")]
    StorageError(String),

    #[error("memory budget exceeded: requested {requested} bytes, {used}/{limit} in use")]
    CapacityExceeded {
        requested: u64,
        used: u64,
        limit: u64,
    },

    #[error("invalid parameter {field}: {reason}")]
    InvalidParameter { field: String, reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("task queue full (bound {bound})")]
    QueueFull { bound: usize },

    #[error("invalid indices {names:?} for operation {operation}")]
    InvalidIndices {
        names: Vec<String>,
        operation: String,
    },
}

impl SeismicError {
    /// Whether this error reflects a condition the caller may retry
    /// (as opposed to a structural/data bug).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SeismicError::StorageError(_)
                | SeismicError::QueueFull { .. }
                | SeismicError::CapacityExceeded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(SeismicError::QueueFull { bound: 1000 }.is_retryable());
        assert!(!SeismicError::MalformedVector("x".into()).is_retryable());
    }

    #[test]
    fn display_is_human_readable() {
        let err = SeismicError::InvalidParameter {
            field: "heap_factor".into(),
            reason: "must be >= 1.0".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid parameter heap_factor: must be >= 1.0"
        );
    }
}
