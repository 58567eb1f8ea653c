//! Timestamp stamping stage.

use async_trait::async_trait;

use crate::errors::IndexError;
use crate::sinks::{CloneableSink, Sink};
use record_indexer_shared::{Container, IndexDocument, Selector, TIMESTAMP_FIELD};

/// Stamps every document with the run's start time.
///
/// The timestamp is what lets a full reindex delete expired content
/// afterwards: documents the run did not touch keep their old stamp and fall
/// below the sweep threshold.
pub struct TimestampSetter<S> {
    target: S,
    timestamp: Selector<i64>,
}

impl<S> TimestampSetter<S> {
    pub fn new(target: S, timestamp: Selector<i64>) -> Self {
        Self { target, timestamp }
    }
}

#[async_trait]
impl<S> Sink<IndexDocument> for TimestampSetter<S>
where
    S: Sink<IndexDocument>,
{
    async fn accept(
        &mut self,
        mut doc: IndexDocument,
        metadata: &Container,
    ) -> Result<(), IndexError> {
        let timestamp = metadata
            .get(&self.timestamp)
            .ok_or_else(|| IndexError::state("no run timestamp in context"))?;
        doc.set_field(TIMESTAMP_FIELD, *timestamp);
        self.target.accept(doc, metadata).await
    }

    async fn commit(&mut self, metadata: &Container) -> Result<(), IndexError> {
        self.target.commit(metadata).await
    }
}

#[async_trait]
impl<S> CloneableSink<IndexDocument> for TimestampSetter<S>
where
    S: CloneableSink<IndexDocument>,
{
    fn create_clone(&self) -> Self {
        Self {
            target: self.target.create_clone(),
            timestamp: self.timestamp.clone(),
        }
    }

    async fn partial_commit(&mut self, metadata: &Container) -> Result<(), IndexError> {
        self.target.partial_commit(metadata).await
    }
}
