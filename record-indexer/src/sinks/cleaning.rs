//! Cleaning decorator.

use std::sync::Arc;

use async_trait::async_trait;

use crate::delete::{Cleaner, DeleteStrategy, IdFetcher};
use crate::errors::IndexError;
use crate::sinks::Sink;
use record_indexer_shared::{Container, Selector};

/// Marks every accepted record's id as seen, then triggers delete
/// reconciliation on commit.
///
/// An id is seen the moment its record enters this stage, regardless of what
/// later stages do to it. Ids that never reach this stage, because an
/// upstream filter dropped the record or the miner never produced it, stay
/// unseen and are subject to deletion. On commit, the run's
/// [`DeleteStrategy`] purges the unseen remainder before the commit cascades
/// downstream.
pub struct CleaningSink<T, S> {
    target: S,
    cleaner: Arc<dyn Cleaner>,
    strategy: Selector<DeleteStrategy>,
    deletions_issued: Selector<bool>,
    fetch_id: IdFetcher<T>,
}

impl<T, S> CleaningSink<T, S> {
    pub fn new(
        target: S,
        cleaner: Arc<dyn Cleaner>,
        strategy: Selector<DeleteStrategy>,
        deletions_issued: Selector<bool>,
        fetch_id: IdFetcher<T>,
    ) -> Self {
        Self {
            target,
            cleaner,
            strategy,
            deletions_issued,
            fetch_id,
        }
    }

    fn strategy(&self, metadata: &Container) -> Result<Arc<DeleteStrategy>, IndexError> {
        metadata
            .get(&self.strategy)
            .ok_or_else(|| IndexError::state("no delete strategy in run context"))
    }
}

#[async_trait]
impl<T, S> Sink<T> for CleaningSink<T, S>
where
    T: Send + 'static,
    S: Sink<T>,
{
    async fn accept(&mut self, value: T, metadata: &Container) -> Result<(), IndexError> {
        let strategy = self.strategy(metadata)?;
        strategy.accept((self.fetch_id)(&value));
        self.target.accept(value, metadata).await
    }

    async fn commit(&mut self, metadata: &Container) -> Result<(), IndexError> {
        let strategy = self.strategy(metadata)?;
        let issued = strategy.delete_remaining(self.cleaner.as_ref()).await?;
        metadata.set(&self.deletions_issued, issued);
        self.target.commit(metadata).await
    }
}
