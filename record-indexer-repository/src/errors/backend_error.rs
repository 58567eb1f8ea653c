//! Backend error types.
//!
//! This module defines the unified error type for all index backend
//! operations. The one distinction the pipeline cares about is transient
//! versus everything else: a transient error is an explicit "temporarily
//! unavailable, try again" signal and is the only kind the upload sink
//! retries.

use thiserror::Error;

/// Unified errors from index backend operations.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The backend is temporarily unavailable; the operation may be retried.
    #[error("Backend temporarily unavailable: {0}")]
    Transient(String),

    /// Failed to establish a connection to the backend.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Failed to add documents to the index.
    #[error("Index error: {0}")]
    Index(String),

    /// Failed to commit pending changes.
    #[error("Commit error: {0}")]
    Commit(String),

    /// Failed to delete documents.
    #[error("Delete error: {0}")]
    Delete(String),

    /// A lookup query against the index failed.
    #[error("Query error: {0}")]
    Query(String),
}

impl BackendError {
    /// Create a transient (retryable) error.
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create an index error.
    pub fn index(msg: impl Into<String>) -> Self {
        Self::Index(msg.into())
    }

    /// Create a commit error.
    pub fn commit(msg: impl Into<String>) -> Self {
        Self::Commit(msg.into())
    }

    /// Create a delete error.
    pub fn delete(msg: impl Into<String>) -> Self {
        Self::Delete(msg.into())
    }

    /// Create a query error.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Whether the failed operation may be retried after a short wait.
    ///
    /// Anything that is not explicitly transient is treated as fatal by the
    /// pipeline.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(BackendError::transient("busy").is_transient());
        assert!(!BackendError::connection("refused").is_transient());
        assert!(!BackendError::index("bad field").is_transient());
        assert!(!BackendError::commit("boom").is_transient());
        assert!(!BackendError::delete("boom").is_transient());
        assert!(!BackendError::query("boom").is_transient());
    }

    #[test]
    fn test_display_includes_detail() {
        let err = BackendError::transient("maintenance window");
        assert!(err.to_string().contains("maintenance window"));
    }
}
