//! Filtering decorator.

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::IndexError;
use crate::sinks::Sink;
use record_indexer_shared::Container;

/// Drops values failing a predicate before forwarding.
///
/// Filtering by itself has no effect on delete accounting; it sits in front
/// of the cleaning stage, so a record dropped here is never marked as seen
/// and, on a targeted reindex, its id is deleted from the index.
pub struct FilteringSink<T, S> {
    target: S,
    predicate: Arc<dyn Fn(&T) -> bool + Send + Sync>,
}

impl<T, S> FilteringSink<T, S> {
    pub fn new(target: S, predicate: Arc<dyn Fn(&T) -> bool + Send + Sync>) -> Self {
        Self { target, predicate }
    }
}

#[async_trait]
impl<T, S> Sink<T> for FilteringSink<T, S>
where
    T: Send + 'static,
    S: Sink<T>,
{
    async fn accept(&mut self, value: T, metadata: &Container) -> Result<(), IndexError> {
        if (self.predicate)(&value) {
            self.target.accept(value, metadata).await?;
        }
        Ok(())
    }

    async fn commit(&mut self, metadata: &Container) -> Result<(), IndexError> {
        self.target.commit(metadata).await
    }
}
