//! Error types for the indexing pipeline.

use std::time::Duration;

use thiserror::Error;

use record_indexer_repository::BackendError;

/// Errors that can occur while a pipeline run is executing.
///
/// Backend errors keep their [`BackendError`] taxonomy; everything else is a
/// pipeline-level failure. All variants except the internal retry handling of
/// transient commits abort the current run; already committed batches stay
/// committed.
#[derive(Error, Debug)]
pub enum IndexError {
    /// Error from the index backend.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// A record could not be converted into a backend document.
    #[error("Document build error: {0}")]
    DocumentBuild(String),

    /// Document construction exceeded the configured timeout.
    #[error("Document build timed out after {0:?}")]
    BuildTimeout(Duration),

    /// A required value was missing from the run context.
    #[error("Pipeline state error: {0}")]
    State(String),

    /// A fan-out worker terminated abnormally.
    #[error("Worker error: {0}")]
    Worker(String),

    /// The run was canceled.
    #[error("Run canceled")]
    Canceled,
}

impl IndexError {
    /// Create a document build error.
    pub fn document_build(msg: impl Into<String>) -> Self {
        Self::DocumentBuild(msg.into())
    }

    /// Create a pipeline state error.
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    /// Create a worker error.
    pub fn worker(msg: impl Into<String>) -> Self {
        Self::Worker(msg.into())
    }
}
