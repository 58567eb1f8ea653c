//! Sink chain primitives.
//!
//! A sink is a consumer stage of the pipeline: it accepts values under a
//! shared run context and flushes on commit. Decorator sinks wrap a
//! downstream sink; the chain terminates in the upload sink. Stages that run
//! under the parallel fan-out additionally implement [`CloneableSink`] so
//! each worker gets independent per-worker state while sharing run-scoped
//! resources.

pub mod aggregating;
pub mod cleaning;
pub mod creating;
pub mod existing;
pub mod filtering;
pub mod index_sink;
pub mod parallel;
pub mod timestamp;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregating::AggregatingSink;
pub use cleaning::CleaningSink;
pub use creating::{CreatingSink, DocumentMapper, MapperError};
pub use existing::{ExistingLookup, ExistingValuesGetter};
pub use filtering::FilteringSink;
pub use index_sink::IndexSink;
pub use parallel::ParallelizingSink;
pub use timestamp::TimestampSetter;

use async_trait::async_trait;

use crate::errors::IndexError;
use record_indexer_shared::Container;

/// A consumer stage in the indexing pipeline.
///
/// `commit` is the end-of-run cascade: a decorator finishes its own work,
/// then forwards the commit downstream. Within one sink, `accept` calls are
/// sequential; concurrency only enters through the parallel fan-out, which
/// gives every worker its own chain clone.
#[async_trait]
pub trait Sink<T: Send + 'static>: Send {
    /// Consume one value under the run's shared context.
    async fn accept(&mut self, value: T, metadata: &Container) -> Result<(), IndexError>;

    /// Finish the run: flush buffered state and forward downstream.
    async fn commit(&mut self, metadata: &Container) -> Result<(), IndexError>;
}

/// A sink that can be replicated for parallel workers.
///
/// A clone gets fresh per-worker state (buffers) but shares run-scoped
/// terminal resources (the backend connection, the commit counter), so any
/// number of clones may run concurrently against the same run context.
#[async_trait]
pub trait CloneableSink<T: Send + 'static>: Sink<T> {
    /// Create an independent clone for one worker.
    fn create_clone(&self) -> Self
    where
        Self: Sized;

    /// Flush worker-local buffers downstream without triggering end-of-run
    /// side effects (final backend commit, delete reconciliation).
    async fn partial_commit(&mut self, metadata: &Container) -> Result<(), IndexError>;
}

#[async_trait]
impl<T: Send + 'static> Sink<T> for Box<dyn Sink<T>> {
    async fn accept(&mut self, value: T, metadata: &Container) -> Result<(), IndexError> {
        (**self).accept(value, metadata).await
    }

    async fn commit(&mut self, metadata: &Container) -> Result<(), IndexError> {
        (**self).commit(metadata).await
    }
}
