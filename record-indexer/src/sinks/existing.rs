//! Pairs incoming records with their currently-indexed counterparts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use crate::delete::{DeleteStrategy, IdFetcher};
use crate::errors::IndexError;
use crate::sinks::Sink;
use record_indexer_repository::BackendError;
use record_indexer_shared::{Container, Selector, UpdatePair};

/// Batched lookup of the previously indexed versions of a set of records.
#[async_trait]
pub trait ExistingLookup<T>: Send + Sync {
    async fn fetch_by_ids(&self, ids: &[i64]) -> Result<Vec<T>, BackendError>;
}

/// Turns batches of incoming records into [`UpdatePair`]s by looking up the
/// previously indexed version of each record in one batched query.
///
/// A failed lookup is recovered locally: the batch degrades to insert-only
/// pairs and the run continues. Requested ids the lookup does not return are
/// reported to the delete strategy as absent, so the remaining-ids strategy
/// does not try to delete what was never indexed. This is distinct from the
/// cleaning stage, which marks ids as processed.
pub struct ExistingValuesGetter<T, S> {
    target: S,
    lookup: Arc<dyn ExistingLookup<T>>,
    fetch_id: IdFetcher<T>,
    strategy: Selector<DeleteStrategy>,
}

impl<T, S> ExistingValuesGetter<T, S>
where
    T: Send + 'static,
    S: Sink<Vec<UpdatePair<T>>>,
{
    pub fn new(
        target: S,
        lookup: Arc<dyn ExistingLookup<T>>,
        fetch_id: IdFetcher<T>,
        strategy: Selector<DeleteStrategy>,
    ) -> Self {
        Self {
            target,
            lookup,
            fetch_id,
            strategy,
        }
    }

    fn combine(&self, values: Vec<T>, mut existing: HashMap<i64, T>) -> Vec<UpdatePair<T>> {
        values
            .into_iter()
            .map(|update| {
                let id = (self.fetch_id)(&update);
                UpdatePair::with_existing(update, existing.remove(&id))
            })
            .collect()
    }
}

#[async_trait]
impl<T, S> Sink<Vec<T>> for ExistingValuesGetter<T, S>
where
    T: Send + 'static,
    S: Sink<Vec<UpdatePair<T>>>,
{
    async fn accept(&mut self, values: Vec<T>, metadata: &Container) -> Result<(), IndexError> {
        let ids: Vec<i64> = values.iter().map(|v| (self.fetch_id)(v)).collect();
        let existing = match self.lookup.fetch_by_ids(&ids).await {
            Ok(existing) => existing,
            Err(e) => {
                error!(error = %e, "Cannot load existing documents, treating batch as new");
                let pairs = self.combine(values, HashMap::new());
                return self.target.accept(pairs, metadata).await;
            }
        };

        let mut by_id = HashMap::with_capacity(existing.len());
        for prior in existing {
            by_id.insert((self.fetch_id)(&prior), prior);
        }
        if let Some(strategy) = metadata.get(&self.strategy) {
            for requested in &ids {
                if !by_id.contains_key(requested) {
                    strategy.accept(*requested);
                }
            }
        }

        let pairs = self.combine(values, by_id);
        self.target.accept(pairs, metadata).await
    }

    async fn commit(&mut self, metadata: &Container) -> Result<(), IndexError> {
        self.target.commit(metadata).await
    }
}
