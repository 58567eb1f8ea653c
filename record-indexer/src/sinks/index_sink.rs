//! Terminal upload sink.
//!
//! Sends document batches to the backend and owns commit timing: a shared
//! atomic counter tracks documents uploaded since the last commit, and the
//! thread that carries it across the configured threshold wins a
//! compare-exchange race and performs exactly one commit. Clones for
//! parallel workers share the backend handle and the counter, so the
//! threshold applies to the run as a whole, not per worker.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::config::IndexerConfig;
use crate::errors::IndexError;
use crate::sinks::{CloneableSink, Sink};
use record_indexer_repository::IndexBackend;
use record_indexer_shared::{Container, IndexDocument, Schema, Selector};

use std::time::Duration;

/// Terminal sink uploading document batches to the index backend.
pub struct IndexSink {
    backend: Arc<dyn IndexBackend>,
    updates_before_commit: usize,
    retry_limit: u32,
    retry_delay: Duration,
    commit_counter: Arc<AtomicUsize>,
    doc_counter: Selector<AtomicU64>,
    uploaded_total: Selector<u64>,
    cancel: Selector<CancelToken>,
}

impl IndexSink {
    /// Create the sink, minting its run-context slots from `schema`.
    pub fn new(
        backend: Arc<dyn IndexBackend>,
        schema: &Schema,
        config: &IndexerConfig,
        cancel: Selector<CancelToken>,
    ) -> Self {
        Self {
            backend,
            updates_before_commit: config.updates_before_commit.max(1),
            retry_limit: config.commit_retry_limit,
            retry_delay: config.commit_retry_delay,
            commit_counter: Arc::new(AtomicUsize::new(0)),
            doc_counter: schema.create_lazy_selector(AtomicU64::default),
            uploaded_total: schema.create_selector::<u64>(),
            cancel,
        }
    }

    /// Slot holding the run's cumulative uploaded-document count, written by
    /// the end-of-run commit.
    pub fn uploaded_total_selector(&self) -> Selector<u64> {
        self.uploaded_total.clone()
    }

    /// Commit with bounded retry on transient backend errors.
    ///
    /// Cancellation during the retry wait aborts the loop; any non-transient
    /// error, or exhausting the budget, propagates as fatal.
    async fn commit_with_retry(&self, metadata: &Container) -> Result<(), IndexError> {
        let mut attempt: u32 = 0;
        loop {
            match self.backend.commit().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < self.retry_limit => {
                    attempt += 1;
                    warn!(
                        attempt,
                        error = %e,
                        "Transient commit failure, will retry"
                    );
                    match metadata.get(&self.cancel) {
                        Some(cancel) => tokio::select! {
                            _ = sleep(self.retry_delay) => {}
                            _ = cancel.cancelled() => return Err(IndexError::Canceled),
                        },
                        None => sleep(self.retry_delay).await,
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[async_trait]
impl Sink<Vec<IndexDocument>> for IndexSink {
    async fn accept(
        &mut self,
        docs: Vec<IndexDocument>,
        metadata: &Container,
    ) -> Result<(), IndexError> {
        if docs.is_empty() {
            return Ok(());
        }

        self.backend.add_documents(&docs).await?;
        let n = docs.len();
        let mut update_count = self.commit_counter.fetch_add(n, Ordering::SeqCst) + n;
        while update_count >= self.updates_before_commit {
            if self
                .commit_counter
                .compare_exchange(update_count, 0, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                // Single winner: account for the swapped-out documents, then
                // commit. Losers observe the reset counter and return.
                if let Some(counter) = metadata.get(&self.doc_counter) {
                    counter.fetch_add(update_count as u64, Ordering::SeqCst);
                }
                debug!(count = update_count, "Commit threshold reached");
                self.commit_with_retry(metadata).await?;
                return Ok(());
            }
            update_count = self.commit_counter.load(Ordering::SeqCst);
        }
        Ok(())
    }

    async fn commit(&mut self, metadata: &Container) -> Result<(), IndexError> {
        let mut count = self.commit_counter.swap(0, Ordering::SeqCst) as u64;
        if count > 0 {
            self.commit_with_retry(metadata).await?;
        }
        if let Some(counter) = metadata.remove(&self.doc_counter) {
            count += counter.load(Ordering::SeqCst);
        }
        if count > 0 {
            info!(count, "Uploaded documents to the index");
        }
        metadata.set(&self.uploaded_total, count);
        Ok(())
    }
}

#[async_trait]
impl CloneableSink<Vec<IndexDocument>> for IndexSink {
    fn create_clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            updates_before_commit: self.updates_before_commit,
            retry_limit: self.retry_limit,
            retry_delay: self.retry_delay,
            commit_counter: self.commit_counter.clone(),
            doc_counter: self.doc_counter.clone(),
            uploaded_total: self.uploaded_total.clone(),
            cancel: self.cancel.clone(),
        }
    }

    async fn partial_commit(&mut self, _metadata: &Container) -> Result<(), IndexError> {
        // The terminal is shared; intermediate commits are driven by the
        // threshold counter and the final commit by the primary chain.
        Ok(())
    }
}
