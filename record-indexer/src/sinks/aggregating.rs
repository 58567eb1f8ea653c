//! Aggregating decorator.

use async_trait::async_trait;

use crate::errors::IndexError;
use crate::sinks::{CloneableSink, Sink};
use record_indexer_shared::Container;

/// Buffers values into fixed-size batches before forwarding, reducing
/// round-trips to the backend.
///
/// The buffer is worker-local: clones get a fresh, empty buffer over a clone
/// of the downstream sink.
pub struct AggregatingSink<T, S> {
    target: S,
    window: usize,
    buffer: Vec<T>,
}

impl<T, S> AggregatingSink<T, S>
where
    T: Send + 'static,
    S: Sink<Vec<T>>,
{
    pub fn new(target: S, window: usize) -> Self {
        let window = window.max(1);
        Self {
            target,
            window,
            buffer: Vec::with_capacity(window),
        }
    }

    async fn flush(&mut self, metadata: &Container) -> Result<(), IndexError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.window));
        self.target.accept(batch, metadata).await
    }
}

#[async_trait]
impl<T, S> Sink<T> for AggregatingSink<T, S>
where
    T: Send + 'static,
    S: Sink<Vec<T>>,
{
    async fn accept(&mut self, value: T, metadata: &Container) -> Result<(), IndexError> {
        self.buffer.push(value);
        if self.buffer.len() >= self.window {
            self.flush(metadata).await?;
        }
        Ok(())
    }

    async fn commit(&mut self, metadata: &Container) -> Result<(), IndexError> {
        self.flush(metadata).await?;
        self.target.commit(metadata).await
    }
}

#[async_trait]
impl<T, S> CloneableSink<T> for AggregatingSink<T, S>
where
    T: Send + 'static,
    S: CloneableSink<Vec<T>>,
{
    fn create_clone(&self) -> Self {
        Self {
            target: self.target.create_clone(),
            window: self.window,
            buffer: Vec::with_capacity(self.window),
        }
    }

    async fn partial_commit(&mut self, metadata: &Container) -> Result<(), IndexError> {
        self.flush(metadata).await?;
        self.target.partial_commit(metadata).await
    }
}
