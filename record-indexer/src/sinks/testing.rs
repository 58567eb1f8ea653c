//! Test doubles shared by the sink tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::errors::IndexError;
use crate::sinks::{CloneableSink, Sink};
use record_indexer_shared::Container;

/// Terminal sink that records everything it accepts.
///
/// Clones share the same value store, mirroring how real chains share the
/// terminal upload sink across worker clones.
pub struct CollectingSink<T> {
    values: Arc<Mutex<Vec<T>>>,
    commits: Arc<Mutex<usize>>,
    partial_commits: Arc<Mutex<usize>>,
}

impl<T> CollectingSink<T> {
    pub fn new() -> Self {
        Self {
            values: Arc::new(Mutex::new(Vec::new())),
            commits: Arc::new(Mutex::new(0)),
            partial_commits: Arc::new(Mutex::new(0)),
        }
    }

    pub fn values(&self) -> Arc<Mutex<Vec<T>>> {
        self.values.clone()
    }

    /// Snapshot of everything accepted so far.
    pub fn collected(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.values.lock().unwrap().clone()
    }

    pub fn commit_count(&self) -> usize {
        *self.commits.lock().unwrap()
    }

    pub fn partial_commit_count(&self) -> usize {
        *self.partial_commits.lock().unwrap()
    }
}

#[async_trait]
impl<T: Send + 'static> Sink<T> for CollectingSink<T> {
    async fn accept(&mut self, value: T, _metadata: &Container) -> Result<(), IndexError> {
        self.values.lock().unwrap().push(value);
        Ok(())
    }

    async fn commit(&mut self, _metadata: &Container) -> Result<(), IndexError> {
        *self.commits.lock().unwrap() += 1;
        Ok(())
    }
}

#[async_trait]
impl<T: Send + 'static> CloneableSink<T> for CollectingSink<T> {
    fn create_clone(&self) -> Self {
        Self {
            values: self.values.clone(),
            commits: self.commits.clone(),
            partial_commits: self.partial_commits.clone(),
        }
    }

    async fn partial_commit(&mut self, _metadata: &Container) -> Result<(), IndexError> {
        *self.partial_commits.lock().unwrap() += 1;
        Ok(())
    }
}
