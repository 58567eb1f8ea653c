//! Index backend trait definition.
//!
//! This module defines the abstract interface the pipeline uses to talk to
//! the document-index backend, allowing for different implementations
//! (OpenSearch, Solr, in-memory, ...).

use async_trait::async_trait;

use crate::errors::BackendError;
use record_indexer_shared::IndexDocument;

/// Abstracts the underlying document-index backend.
///
/// Implementations are injected into the pipeline's upload sink and cleaner
/// to enable dependency injection and testing with in-memory or mock
/// backends. Uploaded documents become visible only after [`commit`]; the
/// pipeline batches adds and commits on its own schedule.
///
/// Errors follow the [`BackendError`] taxonomy; implementations must report
/// a temporary outage as [`BackendError::Transient`] so the pipeline can
/// retry commits, and anything else as a non-transient variant.
///
/// [`commit`]: IndexBackend::commit
#[async_trait]
pub trait IndexBackend: Send + Sync {
    /// Add a batch of documents to the index (not yet visible).
    ///
    /// An existing document with the same id is replaced.
    async fn add_documents(&self, documents: &[IndexDocument]) -> Result<(), BackendError>;

    /// Make all added and deleted documents visible.
    async fn commit(&self) -> Result<(), BackendError>;

    /// Delete every document whose timestamp field is older than the
    /// threshold (epoch milliseconds, exclusive).
    ///
    /// Issued unconditionally by a full reindex; it is on the backend to
    /// make an empty match cheap.
    async fn delete_older_than(&self, threshold_millis: i64) -> Result<(), BackendError>;

    /// Delete documents by their backend-native string ids.
    ///
    /// Ids that do not exist are ignored.
    async fn delete_by_ids(&self, ids: &[String]) -> Result<(), BackendError>;
}
