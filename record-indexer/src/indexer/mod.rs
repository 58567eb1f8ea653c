//! Per-run orchestration and chain building.
//!
//! [`IndexerBuilder`] assembles the full sink chain for one record type:
//! filters feed the cleaning stage, which feeds the parallel fan-out, whose
//! workers each run document build, timestamp stamping and batch aggregation
//! into the shared upload terminal. Filters sit above the cleaning stage on
//! purpose: a record dropped by a filter is never marked as seen, so its
//! stale index entry is deleted at the end of the run.

use std::sync::Arc;

use tracing::info;

use crate::cancel::CancelToken;
use crate::config::IndexerConfig;
use crate::delete::{DefaultCleaner, DeleteStrategy, IdFetcher, IdFormatter};
use crate::errors::IndexError;
use crate::miners::{DeleteStrategyInjector, Miner};
use crate::sinks::{
    AggregatingSink, CleaningSink, CreatingSink, DocumentMapper, FilteringSink, IndexSink,
    ParallelizingSink, Sink, TimestampSetter,
};
use record_indexer_repository::IndexBackend;
use record_indexer_shared::{Container, Schema, Selector};

/// Outcome of one completed indexing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Total number of documents uploaded and committed.
    pub documents_uploaded: u64,
    /// Whether delete reconciliation issued any delete call.
    pub deletions_issued: bool,
}

/// Builder for an [`Indexer`] over records of type `T`.
pub struct IndexerBuilder<T> {
    name: String,
    backend: Arc<dyn IndexBackend>,
    miner: Box<dyn Miner<T>>,
    mapper: Arc<dyn DocumentMapper<T>>,
    fetch_id: IdFetcher<T>,
    format_id: IdFormatter,
    filters: Vec<Arc<dyn Fn(&T) -> bool + Send + Sync>>,
    config: IndexerConfig,
}

impl<T: Send + 'static> IndexerBuilder<T> {
    pub fn new(
        name: impl Into<String>,
        backend: Arc<dyn IndexBackend>,
        miner: impl Miner<T> + 'static,
        mapper: impl DocumentMapper<T> + 'static,
        fetch_id: IdFetcher<T>,
    ) -> Self {
        Self {
            name: name.into(),
            backend,
            miner: Box::new(miner),
            mapper: Arc::new(mapper),
            fetch_id,
            format_id: Arc::new(|id| id.to_string()),
            filters: Vec::new(),
            config: IndexerConfig::default(),
        }
    }

    pub fn config(mut self, config: IndexerConfig) -> Self {
        self.config = config;
        self
    }

    /// Override how record ids are rendered as backend document identifiers.
    pub fn format_id(mut self, format_id: IdFormatter) -> Self {
        self.format_id = format_id;
        self
    }

    /// Drop records failing the predicate.
    ///
    /// Dropped records are not marked as seen, so a targeted run deletes
    /// their stale index entries.
    pub fn filter(mut self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.filters.push(Arc::new(predicate));
        self
    }

    pub fn build(self) -> Indexer<T> {
        let schema = Schema::new(self.name);
        let cancel = schema.create_selector::<CancelToken>();
        let timestamp = schema.create_selector::<i64>();
        let strategy = schema.create_selector::<DeleteStrategy>();
        let deletions_issued = schema.create_selector::<bool>();

        let terminal = IndexSink::new(self.backend.clone(), &schema, &self.config, cancel.clone());
        let uploaded_total = terminal.uploaded_total_selector();
        let aggregating = AggregatingSink::new(terminal, self.config.upload_chunk_size);
        let stamping = TimestampSetter::new(aggregating, timestamp.clone());
        let creating = CreatingSink::new(stamping, self.mapper, self.config.build_timeout);
        let fan_out = ParallelizingSink::new(creating, &self.config, cancel.clone());

        let cleaner = Arc::new(DefaultCleaner::new(self.backend));
        let cleaning = CleaningSink::new(
            fan_out,
            cleaner,
            strategy.clone(),
            deletions_issued.clone(),
            self.fetch_id,
        );
        let mut sink: Box<dyn Sink<T>> = Box::new(cleaning);
        for predicate in self.filters {
            sink = Box::new(FilteringSink::new(sink, predicate));
        }

        let miner = DeleteStrategyInjector::new(self.miner, timestamp, strategy, self.format_id);

        Indexer {
            schema,
            miner: Box::new(miner),
            sink,
            cancel_token: CancelToken::new(),
            cancel,
            uploaded_total,
            deletions_issued,
        }
    }
}

/// Runs complete indexing passes over one record type.
///
/// One indexer can serve any number of consecutive runs; each run gets a
/// fresh context. Runs must not overlap, since the sink chain carries
/// run-scoped buffers.
pub struct Indexer<T: Send + 'static> {
    schema: Schema,
    miner: Box<dyn Miner<T>>,
    sink: Box<dyn Sink<T>>,
    cancel_token: CancelToken,
    cancel: Selector<CancelToken>,
    uploaded_total: Selector<u64>,
    deletions_issued: Selector<bool>,
}

impl<T: Send + 'static> Indexer<T> {
    /// Handle for aborting runs from another task.
    ///
    /// Cancellation is permanent: a canceled indexer refuses further runs.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel_token.clone()
    }

    /// Reindex everything the miner can produce, then sweep the index for
    /// documents the run did not refresh.
    #[tracing::instrument(skip(self), fields(schema = %self.schema.name()))]
    pub async fn index_all(&mut self) -> Result<RunSummary, IndexError> {
        let metadata = self.start_run()?;
        self.miner.dig_all_into(self.sink.as_mut(), &metadata).await?;
        self.finish_run(&metadata).await
    }

    /// Reindex exactly the given ids, then delete the index entries of every
    /// requested id the run did not refresh.
    #[tracing::instrument(skip(self, ids), fields(schema = %self.schema.name(), count = ids.len()))]
    pub async fn index_ids(&mut self, ids: &[i64]) -> Result<RunSummary, IndexError> {
        let metadata = self.start_run()?;
        self.miner
            .dig_ids_into(self.sink.as_mut(), &metadata, ids)
            .await?;
        self.finish_run(&metadata).await
    }

    fn start_run(&self) -> Result<Container, IndexError> {
        if self.cancel_token.is_canceled() {
            return Err(IndexError::Canceled);
        }
        let metadata = self.schema.create_container();
        metadata.set(&self.cancel, self.cancel_token.clone());
        Ok(metadata)
    }

    async fn finish_run(&mut self, metadata: &Container) -> Result<RunSummary, IndexError> {
        self.sink.commit(metadata).await?;
        let documents_uploaded = metadata
            .get(&self.uploaded_total)
            .map(|v| *v)
            .unwrap_or(0);
        let deletions_issued = metadata
            .get(&self.deletions_issued)
            .map(|v| *v)
            .unwrap_or(false);
        info!(
            schema = self.schema.name(),
            documents_uploaded, deletions_issued, "Indexing run finished"
        );
        Ok(RunSummary {
            documents_uploaded,
            deletions_issued,
        })
    }
}
