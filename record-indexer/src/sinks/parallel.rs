//! Parallel fan-out over worker-local chain clones.
//!
//! Values are distributed round-robin to tokio worker tasks over bounded
//! queues, so a slow downstream applies backpressure to the producer instead
//! of buffering without limit. Each worker drives its own clone of the
//! downstream chain; the commit cascade asks every worker to flush via
//! partial commit, joins them, and then commits the primary chain exactly
//! once.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::cancel::CancelToken;
use crate::config::IndexerConfig;
use crate::errors::IndexError;
use crate::sinks::{CloneableSink, Sink};
use record_indexer_shared::{Container, Selector};

enum WorkerCommand<T> {
    Accept(T, Container),
    PartialCommit(Container, oneshot::Sender<Result<(), IndexError>>),
}

struct WorkerSet<T> {
    senders: Vec<mpsc::Sender<WorkerCommand<T>>>,
    handles: Vec<JoinHandle<()>>,
}

/// Fans accepted values out to parallel workers, each running a clone of the
/// downstream chain.
///
/// Workers are spawned lazily on the first `accept` and torn down by the
/// commit cascade, so the sink can serve any number of consecutive runs.
pub struct ParallelizingSink<T, S> {
    primary: S,
    worker_count: usize,
    queue_size: usize,
    cancel: Selector<CancelToken>,
    workers: Option<WorkerSet<T>>,
    next_worker: usize,
    failure: Arc<Mutex<Option<IndexError>>>,
}

impl<T, S> ParallelizingSink<T, S>
where
    T: Send + 'static,
    S: CloneableSink<T> + Send + 'static,
{
    pub fn new(primary: S, config: &IndexerConfig, cancel: Selector<CancelToken>) -> Self {
        Self {
            primary,
            worker_count: config.worker_count.max(1),
            queue_size: config.queue_size.max(1),
            cancel,
            workers: None,
            next_worker: 0,
            failure: Arc::new(Mutex::new(None)),
        }
    }

    fn spawn_workers(&mut self) {
        let mut senders = Vec::with_capacity(self.worker_count);
        let mut handles = Vec::with_capacity(self.worker_count);
        for _ in 0..self.worker_count {
            let (tx, rx) = mpsc::channel(self.queue_size);
            let sink = self.primary.create_clone();
            let failure = self.failure.clone();
            handles.push(tokio::spawn(worker_loop(sink, rx, failure)));
            senders.push(tx);
        }
        debug!(workers = self.worker_count, "Spawned indexing workers");
        self.workers = Some(WorkerSet { senders, handles });
    }

    fn take_failure(&self) -> IndexError {
        self.failure
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .unwrap_or_else(|| IndexError::worker("indexing worker terminated unexpectedly"))
    }

    /// Flush every worker, join their tasks, and report the first failure.
    async fn shutdown_workers(&mut self, metadata: &Container) -> Result<(), IndexError> {
        let Some(workers) = self.workers.take() else {
            return Ok(());
        };
        self.next_worker = 0;

        let mut result = Ok(());
        let mut acks = Vec::with_capacity(workers.senders.len());
        for sender in &workers.senders {
            let (ack_tx, ack_rx) = oneshot::channel();
            let command = WorkerCommand::PartialCommit(metadata.clone(), ack_tx);
            if sender.send(command).await.is_err() {
                // Worker already bailed out of its loop.
                if result.is_ok() {
                    result = Err(self.take_failure());
                }
                continue;
            }
            acks.push(ack_rx);
        }
        for ack in acks {
            match ack.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if result.is_ok() => result = Err(e),
                Err(_) if result.is_ok() => result = Err(self.take_failure()),
                _ => {}
            }
        }
        drop(workers.senders);
        for handle in workers.handles {
            if handle.await.is_err() && result.is_ok() {
                result = Err(IndexError::worker("indexing worker panicked"));
            }
        }
        result
    }
}

async fn worker_loop<T, S>(
    mut sink: S,
    mut commands: mpsc::Receiver<WorkerCommand<T>>,
    failure: Arc<Mutex<Option<IndexError>>>,
) where
    T: Send + 'static,
    S: CloneableSink<T>,
{
    while let Some(command) = commands.recv().await {
        match command {
            WorkerCommand::Accept(value, metadata) => {
                if let Err(e) = sink.accept(value, &metadata).await {
                    error!(error = %e, "Indexing worker failed");
                    failure
                        .lock()
                        .unwrap_or_else(|p| p.into_inner())
                        .get_or_insert(e);
                    // Dropping the receiver fails the producer's next send.
                    break;
                }
            }
            WorkerCommand::PartialCommit(metadata, ack) => {
                let result = sink.partial_commit(&metadata).await;
                let failed = result.is_err();
                let _ = ack.send(result);
                if failed {
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl<T, S> Sink<T> for ParallelizingSink<T, S>
where
    T: Send + 'static,
    S: CloneableSink<T> + Send + 'static,
{
    async fn accept(&mut self, value: T, metadata: &Container) -> Result<(), IndexError> {
        if self.workers.is_none() {
            self.spawn_workers();
        }
        let workers = self.workers.as_ref().expect("workers just spawned");
        let sender = &workers.senders[self.next_worker % workers.senders.len()];
        self.next_worker = self.next_worker.wrapping_add(1);

        let command = WorkerCommand::Accept(value, metadata.clone());
        let sent = match metadata.get(&self.cancel) {
            Some(cancel) => tokio::select! {
                sent = sender.send(command) => sent,
                _ = cancel.cancelled() => return Err(IndexError::Canceled),
            },
            None => sender.send(command).await,
        };
        sent.map_err(|_| self.take_failure())
    }

    async fn commit(&mut self, metadata: &Container) -> Result<(), IndexError> {
        self.shutdown_workers(metadata).await?;
        self.primary.commit(metadata).await
    }
}

#[async_trait]
impl<T, S> CloneableSink<T> for ParallelizingSink<T, S>
where
    T: Send + 'static,
    S: CloneableSink<T> + Send + 'static,
{
    fn create_clone(&self) -> Self {
        Self {
            primary: self.primary.create_clone(),
            worker_count: self.worker_count,
            queue_size: self.queue_size,
            cancel: self.cancel.clone(),
            workers: None,
            next_worker: 0,
            failure: Arc::new(Mutex::new(None)),
        }
    }

    async fn partial_commit(&mut self, metadata: &Container) -> Result<(), IndexError> {
        self.shutdown_workers(metadata).await?;
        self.primary.partial_commit(metadata).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::testing::CollectingSink;
    use std::time::Duration;

    fn config(worker_count: usize, queue_size: usize) -> IndexerConfig {
        IndexerConfig {
            worker_count,
            queue_size,
            ..IndexerConfig::default()
        }
    }

    fn cancel_selector(schema: &record_indexer_shared::Schema) -> Selector<CancelToken> {
        schema.create_selector::<CancelToken>()
    }

    #[tokio::test]
    async fn test_single_worker_preserves_order() {
        let schema = record_indexer_shared::Schema::new("test");
        let collector = CollectingSink::<u32>::new();
        let mut sink =
            ParallelizingSink::new(collector.create_clone(), &config(1, 4), cancel_selector(&schema));
        let metadata = schema.create_container();

        for value in 1..=5 {
            sink.accept(value, &metadata).await.unwrap();
        }
        sink.commit(&metadata).await.unwrap();

        assert_eq!(collector.collected(), vec![1, 2, 3, 4, 5]);
        assert_eq!(collector.commit_count(), 1);
        assert_eq!(collector.partial_commit_count(), 1);
    }

    #[tokio::test]
    async fn test_fan_out_loses_and_duplicates_nothing() {
        let schema = record_indexer_shared::Schema::new("test");
        let collector = CollectingSink::<u32>::new();
        let mut sink =
            ParallelizingSink::new(collector.create_clone(), &config(4, 2), cancel_selector(&schema));
        let metadata = schema.create_container();

        for value in 0..100 {
            sink.accept(value, &metadata).await.unwrap();
        }
        sink.commit(&metadata).await.unwrap();

        let mut values = collector.collected();
        values.sort_unstable();
        assert_eq!(values, (0..100).collect::<Vec<_>>());
        // Every worker flushed, the primary committed exactly once.
        assert_eq!(collector.commit_count(), 1);
        assert_eq!(collector.partial_commit_count(), 4);
    }

    #[tokio::test]
    async fn test_workers_respawn_for_a_second_run() {
        let schema = record_indexer_shared::Schema::new("test");
        let collector = CollectingSink::<u32>::new();
        let mut sink =
            ParallelizingSink::new(collector.create_clone(), &config(2, 4), cancel_selector(&schema));

        let first = schema.create_container();
        sink.accept(1, &first).await.unwrap();
        sink.commit(&first).await.unwrap();

        let second = schema.create_container();
        sink.accept(2, &second).await.unwrap();
        sink.commit(&second).await.unwrap();

        let mut values = collector.collected();
        values.sort_unstable();
        assert_eq!(values, vec![1, 2]);
        assert_eq!(collector.commit_count(), 2);
    }

    struct FailingSink;

    #[async_trait]
    impl Sink<u32> for FailingSink {
        async fn accept(&mut self, value: u32, _metadata: &Container) -> Result<(), IndexError> {
            Err(IndexError::document_build(format!("cannot map {}", value)))
        }

        async fn commit(&mut self, _metadata: &Container) -> Result<(), IndexError> {
            Ok(())
        }
    }

    #[async_trait]
    impl CloneableSink<u32> for FailingSink {
        fn create_clone(&self) -> Self {
            FailingSink
        }

        async fn partial_commit(&mut self, _metadata: &Container) -> Result<(), IndexError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_worker_failure_surfaces_at_commit() {
        let schema = record_indexer_shared::Schema::new("test");
        let mut sink = ParallelizingSink::new(FailingSink, &config(1, 4), cancel_selector(&schema));
        let metadata = schema.create_container();

        sink.accept(7, &metadata).await.unwrap();
        let err = sink.commit(&metadata).await.unwrap_err();

        assert!(matches!(err, IndexError::DocumentBuild(_)));
    }

    struct PendingSink;

    #[async_trait]
    impl Sink<u32> for PendingSink {
        async fn accept(&mut self, _value: u32, _metadata: &Container) -> Result<(), IndexError> {
            std::future::pending::<()>().await;
            Ok(())
        }

        async fn commit(&mut self, _metadata: &Container) -> Result<(), IndexError> {
            Ok(())
        }
    }

    #[async_trait]
    impl CloneableSink<u32> for PendingSink {
        fn create_clone(&self) -> Self {
            PendingSink
        }

        async fn partial_commit(&mut self, _metadata: &Container) -> Result<(), IndexError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cancel_unblocks_a_full_queue() {
        let schema = record_indexer_shared::Schema::new("test");
        let cancel = cancel_selector(&schema);
        let mut sink = ParallelizingSink::new(PendingSink, &config(1, 1), cancel.clone());
        let metadata = schema.create_container();
        let token = CancelToken::new();
        metadata.set(&cancel, token.clone());

        // First value occupies the worker forever, second fills the queue.
        sink.accept(1, &metadata).await.unwrap();
        sink.accept(2, &metadata).await.unwrap();

        let canceler = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });
        let err = sink.accept(3, &metadata).await.unwrap_err();
        canceler.await.unwrap();

        assert!(matches!(err, IndexError::Canceled));
    }
}
