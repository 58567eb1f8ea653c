//! Delete reconciliation: strategies and the cleaner boundary.
//!
//! One [`DeleteStrategy`] governs one run. It is placed in the run context
//! by the [`DeleteStrategyInjector`](crate::miners::DeleteStrategyInjector)
//! and is visible to every stage and worker clone of that run. During the
//! run, ids flowing through the cleaning stage are marked as seen; at commit
//! time, [`DeleteStrategy::delete_remaining`] purges whatever the run did not
//! refresh. Call it exactly once per run; a second call is harmless but
//! wasteful (an empty no-op for the remaining-ids variant, a repeated sweep
//! for the timestamp variant).

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::info;

use record_indexer_repository::{BackendError, IndexBackend};

/// Renders a record id as the backend-native string identifier.
pub type IdFormatter = Arc<dyn Fn(i64) -> String + Send + Sync>;

/// Extracts the numeric id from a record.
pub type IdFetcher<T> = Arc<dyn Fn(&T) -> i64 + Send + Sync>;

/// The narrow interface a delete strategy uses to issue deletions.
///
/// Errors are propagated, not retried, at this layer; retry is the
/// implementation's concern.
#[async_trait]
pub trait Cleaner: Send + Sync {
    /// Callback from the timestamp-based delete strategy.
    ///
    /// `started_at` is the run's start time in epoch milliseconds; the
    /// implementation decides how much slack to apply below it.
    async fn delete_by_timestamp(&self, started_at: i64) -> Result<(), BackendError>;

    /// Callback from the id-based delete strategy.
    async fn delete_by_ids(&self, ids: Vec<String>) -> Result<(), BackendError>;
}

/// Slack below the run start time when sweeping by timestamp, tolerating
/// clock skew and in-flight commits from the previous run's tail.
const DELETE_GRACE_MILLIS: i64 = 10_000;

/// [`Cleaner`] issuing deletions straight to an [`IndexBackend`].
pub struct DefaultCleaner {
    backend: Arc<dyn IndexBackend>,
}

impl DefaultCleaner {
    pub fn new(backend: Arc<dyn IndexBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Cleaner for DefaultCleaner {
    async fn delete_by_timestamp(&self, started_at: i64) -> Result<(), BackendError> {
        self.backend
            .delete_older_than(started_at - DELETE_GRACE_MILLIS)
            .await
    }

    async fn delete_by_ids(&self, ids: Vec<String>) -> Result<(), BackendError> {
        self.backend.delete_by_ids(&ids).await
    }
}

/// Run-scoped policy deciding which previously indexed ids must be purged.
pub enum DeleteStrategy {
    /// Full reindex: everything older than the run start is stale.
    ///
    /// Ids seen during the run are irrelevant; the sweep query is always
    /// issued, even when nothing matches.
    Timestamp { started_at: i64 },

    /// Targeted reindex: seeded with the requested ids; whatever is still in
    /// the set at commit time was requested but never processed, so it is
    /// stale in the index.
    RemainingIds {
        remaining: Mutex<HashSet<i64>>,
        format_id: IdFormatter,
    },
}

impl DeleteStrategy {
    /// Strategy for a full reindex started at `started_at` (epoch millis).
    pub fn timestamp(started_at: i64) -> Self {
        Self::Timestamp { started_at }
    }

    /// Strategy for a targeted reindex of exactly `ids`.
    pub fn remaining_ids(ids: impl IntoIterator<Item = i64>, format_id: IdFormatter) -> Self {
        Self::RemainingIds {
            remaining: Mutex::new(ids.into_iter().collect()),
            format_id,
        }
    }

    /// Mark an id as seen; it will not be deleted by this run.
    pub fn accept(&self, id: i64) {
        if let Self::RemainingIds { remaining, .. } = self {
            remaining.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
        }
    }

    /// Purge everything this run did not refresh.
    ///
    /// Returns whether a delete call was issued.
    pub async fn delete_remaining(&self, cleaner: &dyn Cleaner) -> Result<bool, BackendError> {
        match self {
            Self::Timestamp { started_at } => {
                cleaner.delete_by_timestamp(*started_at).await?;
                Ok(true)
            }
            Self::RemainingIds {
                remaining,
                format_id,
            } => {
                let ids: Vec<String> = {
                    let remaining = remaining.lock().unwrap_or_else(|e| e.into_inner());
                    remaining.iter().map(|id| format_id(*id)).collect()
                };
                if ids.is_empty() {
                    return Ok(false);
                }
                info!(ids = ?ids, "Removing unprocessed but requested ids");
                cleaner.delete_by_ids(ids).await?;
                Ok(true)
            }
        }
    }
}

impl std::fmt::Debug for DeleteStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timestamp { started_at } => f
                .debug_struct("DeleteStrategy::Timestamp")
                .field("started_at", started_at)
                .finish(),
            Self::RemainingIds { remaining, .. } => {
                let count = remaining
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .len();
                f.debug_struct("DeleteStrategy::RemainingIds")
                    .field("remaining", &count)
                    .finish()
            }
        }
    }
}
