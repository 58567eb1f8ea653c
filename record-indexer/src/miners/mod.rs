//! Record sources driving the pipeline.
//!
//! A miner digs records out of some source system and feeds them into a
//! sink chain under a shared run context. The indexer owns the commit
//! cascade; miners only produce.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::delete::{DeleteStrategy, IdFormatter};
use crate::errors::IndexError;
use crate::sinks::Sink;
use record_indexer_shared::{Container, Selector};

/// A source of records of type `T`.
#[async_trait]
pub trait Miner<T: Send + 'static>: Send + Sync {
    /// Feed every record of the source into the sink.
    async fn dig_all_into(
        &self,
        sink: &mut dyn Sink<T>,
        metadata: &Container,
    ) -> Result<(), IndexError>;

    /// Feed only the records with the given ids into the sink.
    async fn dig_ids_into(
        &self,
        sink: &mut dyn Sink<T>,
        metadata: &Container,
        ids: &[i64],
    ) -> Result<(), IndexError>;
}

/// Decorating miner that stamps the run context before delegating.
///
/// Records the run start time and installs the matching delete strategy: a
/// full run gets the timestamp sweep, a targeted run gets the remaining-ids
/// set seeded with the requested ids.
pub struct DeleteStrategyInjector<T> {
    target: Box<dyn Miner<T>>,
    timestamp: Selector<i64>,
    strategy: Selector<DeleteStrategy>,
    format_id: IdFormatter,
}

impl<T: Send + 'static> DeleteStrategyInjector<T> {
    pub fn new(
        target: Box<dyn Miner<T>>,
        timestamp: Selector<i64>,
        strategy: Selector<DeleteStrategy>,
        format_id: IdFormatter,
    ) -> Self {
        Self {
            target,
            timestamp,
            strategy,
            format_id,
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Miner<T> for DeleteStrategyInjector<T> {
    async fn dig_all_into(
        &self,
        sink: &mut dyn Sink<T>,
        metadata: &Container,
    ) -> Result<(), IndexError> {
        let started_at = Utc::now().timestamp_millis();
        metadata.set(&self.timestamp, started_at);
        metadata.set(&self.strategy, DeleteStrategy::timestamp(started_at));
        debug!(started_at, "Starting full indexing run");

        self.target.dig_all_into(sink, metadata).await
    }

    async fn dig_ids_into(
        &self,
        sink: &mut dyn Sink<T>,
        metadata: &Container,
        ids: &[i64],
    ) -> Result<(), IndexError> {
        let started_at = Utc::now().timestamp_millis();
        metadata.set(&self.timestamp, started_at);
        metadata.set(
            &self.strategy,
            DeleteStrategy::remaining_ids(ids.iter().copied(), self.format_id.clone()),
        );
        debug!(started_at, count = ids.len(), "Starting targeted indexing run");

        self.target.dig_ids_into(sink, metadata, ids).await
    }
}

/// Miner over a fixed in-memory set of records, mainly for tests and seeding.
pub struct StaticMiner<T> {
    records: Vec<T>,
    fetch_id: crate::delete::IdFetcher<T>,
}

impl<T: Clone + Send + Sync + 'static> StaticMiner<T> {
    pub fn new(records: Vec<T>, fetch_id: crate::delete::IdFetcher<T>) -> Self {
        Self { records, fetch_id }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Miner<T> for StaticMiner<T> {
    async fn dig_all_into(
        &self,
        sink: &mut dyn Sink<T>,
        metadata: &Container,
    ) -> Result<(), IndexError> {
        for record in &self.records {
            sink.accept(record.clone(), metadata).await?;
        }
        Ok(())
    }

    async fn dig_ids_into(
        &self,
        sink: &mut dyn Sink<T>,
        metadata: &Container,
        ids: &[i64],
    ) -> Result<(), IndexError> {
        let wanted: HashSet<i64> = ids.iter().copied().collect();
        for record in &self.records {
            if wanted.contains(&(self.fetch_id)(record)) {
                sink.accept(record.clone(), metadata).await?;
            }
        }
        Ok(())
    }
}
