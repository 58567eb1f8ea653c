//! Document creation stage.
//!
//! Converts a typed record into its backend document through a pluggable
//! [`DocumentMapper`]. The mapper is opaque to the pipeline (possibly slow,
//! possibly failing), so it runs on the blocking pool under a bounded
//! timeout. A record that cannot be converted, or whose conversion exceeds
//! the timeout, is a data-model mismatch and fatal for the run, never
//! silently dropped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::timeout;

use crate::errors::IndexError;
use crate::sinks::{CloneableSink, Sink};
use record_indexer_shared::{Container, IndexDocument};

/// Error from a document mapper.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct MapperError(pub String);

impl MapperError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Maps one record to its backend document.
///
/// Implemented for plain functions, so a closure can be passed directly.
pub trait DocumentMapper<T>: Send + Sync {
    fn map(&self, record: &T) -> Result<IndexDocument, MapperError>;
}

impl<T, F> DocumentMapper<T> for F
where
    F: Fn(&T) -> Result<IndexDocument, MapperError> + Send + Sync,
{
    fn map(&self, record: &T) -> Result<IndexDocument, MapperError> {
        self(record)
    }
}

/// Stage that builds backend documents from records.
pub struct CreatingSink<T, S> {
    target: S,
    mapper: Arc<dyn DocumentMapper<T>>,
    build_timeout: Duration,
}

impl<T, S> CreatingSink<T, S> {
    pub fn new(target: S, mapper: Arc<dyn DocumentMapper<T>>, build_timeout: Duration) -> Self {
        Self {
            target,
            mapper,
            build_timeout,
        }
    }
}

#[async_trait]
impl<T, S> Sink<T> for CreatingSink<T, S>
where
    T: Send + 'static,
    S: Sink<IndexDocument>,
{
    async fn accept(&mut self, value: T, metadata: &Container) -> Result<(), IndexError> {
        let mapper = self.mapper.clone();
        // The blocking task is not killed on timeout; the run aborts and the
        // stray build finishes without an observer.
        let build = tokio::task::spawn_blocking(move || mapper.map(&value));
        let doc = match timeout(self.build_timeout, build).await {
            Err(_) => return Err(IndexError::BuildTimeout(self.build_timeout)),
            Ok(Err(join_error)) => {
                return Err(IndexError::document_build(format!(
                    "document mapper panicked: {}",
                    join_error
                )))
            }
            Ok(Ok(Err(e))) => return Err(IndexError::document_build(e.to_string())),
            Ok(Ok(Ok(doc))) => doc,
        };
        self.target.accept(doc, metadata).await
    }

    async fn commit(&mut self, metadata: &Container) -> Result<(), IndexError> {
        self.target.commit(metadata).await
    }
}

#[async_trait]
impl<T, S> CloneableSink<T> for CreatingSink<T, S>
where
    T: Send + 'static,
    S: CloneableSink<IndexDocument>,
{
    fn create_clone(&self) -> Self {
        Self {
            target: self.target.create_clone(),
            mapper: self.mapper.clone(),
            build_timeout: self.build_timeout,
        }
    }

    async fn partial_commit(&mut self, metadata: &Container) -> Result<(), IndexError> {
        self.target.partial_commit(metadata).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::testing::CollectingSink;
    use record_indexer_shared::Schema;

    fn title_mapper() -> Arc<dyn DocumentMapper<(i64, String)>> {
        Arc::new(
            |record: &(i64, String)| -> Result<IndexDocument, MapperError> {
                let mut doc = IndexDocument::with_id(record.0.to_string());
                doc.set_field("title", record.1.clone());
                Ok(doc)
            },
        )
    }

    #[tokio::test]
    async fn test_maps_record_to_document() {
        let collector = CollectingSink::new();
        let docs = collector.values();
        let mut sink = CreatingSink::new(collector, title_mapper(), Duration::from_secs(1));
        let metadata = Schema::new("test").create_container();

        sink.accept((7, "hello".to_string()), &metadata)
            .await
            .unwrap();

        let docs = docs.lock().unwrap();
        assert_eq!(docs[0].id(), Some("7"));
        assert_eq!(docs[0].field("title"), Some(&"hello".into()));
    }

    #[tokio::test]
    async fn test_mapper_failure_is_fatal() {
        let mapper: Arc<dyn DocumentMapper<i64>> =
            Arc::new(|_: &i64| -> Result<IndexDocument, MapperError> {
                Err(MapperError::new("unmappable record"))
            });
        let mut sink = CreatingSink::new(CollectingSink::new(), mapper, Duration::from_secs(1));
        let metadata = Schema::new("test").create_container();

        let err = sink.accept(1, &metadata).await.unwrap_err();
        assert!(matches!(err, IndexError::DocumentBuild(_)));
    }

    #[tokio::test]
    async fn test_slow_mapper_times_out() {
        let mapper: Arc<dyn DocumentMapper<i64>> =
            Arc::new(|_: &i64| -> Result<IndexDocument, MapperError> {
                std::thread::sleep(Duration::from_millis(250));
                Ok(IndexDocument::new())
            });
        let mut sink = CreatingSink::new(CollectingSink::new(), mapper, Duration::from_millis(20));
        let metadata = Schema::new("test").create_container();

        let err = sink.accept(1, &metadata).await.unwrap_err();
        assert!(matches!(err, IndexError::BuildTimeout(_)));
    }
}
