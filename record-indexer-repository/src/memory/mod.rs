//! In-memory index backend.
//!
//! A functional [`IndexBackend`] holding documents in maps, with the same
//! staged-until-commit visibility rule as a real backend. Used for local
//! development and throughout the pipeline's tests; it also records delete
//! calls and can be told to fail upcoming commits, which is how the retry
//! and reconciliation paths are exercised.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::BackendError;
use crate::interfaces::IndexBackend;
use record_indexer_shared::IndexDocument;

/// In-memory [`IndexBackend`] implementation.
#[derive(Default)]
pub struct InMemoryBackend {
    staged: Mutex<Vec<IndexDocument>>,
    committed: Mutex<BTreeMap<String, IndexDocument>>,
    anonymous_ids: AtomicUsize,
    commit_calls: AtomicUsize,
    commit_failures: Mutex<VecDeque<BackendError>>,
    delete_thresholds: Mutex<Vec<i64>>,
    id_deletes: Mutex<Vec<Vec<String>>>,
}

impl InMemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert documents directly into the committed index, bypassing staging.
    ///
    /// Useful for seeding pre-existing index state in tests.
    pub fn seed(&self, documents: impl IntoIterator<Item = IndexDocument>) {
        let mut committed = lock(&self.committed);
        for doc in documents {
            let key = self.key_for(&doc);
            committed.insert(key, doc);
        }
    }

    /// Queue an error to be returned by an upcoming `commit` call.
    ///
    /// Queued errors are consumed in order, one per call, before any staged
    /// documents become visible.
    pub fn fail_next_commit(&self, error: BackendError) {
        lock(&self.commit_failures).push_back(error);
    }

    /// Number of `commit` calls so far, including failed ones.
    pub fn commit_calls(&self) -> usize {
        self.commit_calls.load(Ordering::SeqCst)
    }

    /// Snapshot of all committed documents.
    pub fn committed_documents(&self) -> Vec<IndexDocument> {
        lock(&self.committed).values().cloned().collect()
    }

    /// Sorted ids of all committed documents.
    pub fn committed_ids(&self) -> Vec<String> {
        lock(&self.committed).keys().cloned().collect()
    }

    /// Number of documents staged but not yet committed.
    pub fn staged_count(&self) -> usize {
        lock(&self.staged).len()
    }

    /// Thresholds passed to `delete_older_than`, in call order.
    pub fn recorded_delete_thresholds(&self) -> Vec<i64> {
        lock(&self.delete_thresholds).clone()
    }

    /// Id lists passed to `delete_by_ids`, in call order.
    pub fn recorded_id_deletes(&self) -> Vec<Vec<String>> {
        lock(&self.id_deletes).clone()
    }

    fn key_for(&self, doc: &IndexDocument) -> String {
        match doc.id() {
            Some(id) => id.to_string(),
            None => format!(
                "_anonymous_{}",
                self.anonymous_ids.fetch_add(1, Ordering::Relaxed)
            ),
        }
    }
}

#[async_trait]
impl IndexBackend for InMemoryBackend {
    async fn add_documents(&self, documents: &[IndexDocument]) -> Result<(), BackendError> {
        lock(&self.staged).extend(documents.iter().cloned());
        Ok(())
    }

    async fn commit(&self) -> Result<(), BackendError> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = lock(&self.commit_failures).pop_front() {
            return Err(error);
        }
        let staged: Vec<IndexDocument> = lock(&self.staged).drain(..).collect();
        let count = staged.len();
        let mut committed = lock(&self.committed);
        for doc in staged {
            let key = self.key_for(&doc);
            committed.insert(key, doc);
        }
        debug!(count, "Committed staged documents");
        Ok(())
    }

    async fn delete_older_than(&self, threshold_millis: i64) -> Result<(), BackendError> {
        lock(&self.delete_thresholds).push(threshold_millis);
        let mut committed = lock(&self.committed);
        let before = committed.len();
        committed.retain(|_, doc| match doc.timestamp() {
            Some(ts) => ts >= threshold_millis,
            None => true,
        });
        debug!(
            removed = before - committed.len(),
            threshold_millis, "Deleted stale documents"
        );
        Ok(())
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<(), BackendError> {
        lock(&self.id_deletes).push(ids.to_vec());
        let mut committed = lock(&self.committed);
        for id in ids {
            committed.remove(id);
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use record_indexer_shared::TIMESTAMP_FIELD;

    fn doc(id: &str, timestamp: i64) -> IndexDocument {
        let mut doc = IndexDocument::with_id(id);
        doc.set_field(TIMESTAMP_FIELD, timestamp);
        doc
    }

    #[tokio::test]
    async fn test_documents_visible_only_after_commit() {
        let backend = InMemoryBackend::new();
        backend
            .add_documents(&[doc("a", 1), doc("b", 2)])
            .await
            .unwrap();

        assert_eq!(backend.committed_documents().len(), 0);
        assert_eq!(backend.staged_count(), 2);

        backend.commit().await.unwrap();
        assert_eq!(backend.committed_ids(), vec!["a", "b"]);
        assert_eq!(backend.staged_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_commit_keeps_staged() {
        let backend = InMemoryBackend::new();
        backend.add_documents(&[doc("a", 1)]).await.unwrap();
        backend.fail_next_commit(BackendError::transient("busy"));

        let err = backend.commit().await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(backend.staged_count(), 1);

        backend.commit().await.unwrap();
        assert_eq!(backend.committed_ids(), vec!["a"]);
        assert_eq!(backend.commit_calls(), 2);
    }

    #[tokio::test]
    async fn test_delete_older_than_spares_fresh_documents() {
        let backend = InMemoryBackend::new();
        backend.seed([doc("old", 100), doc("fresh", 200)]);

        backend.delete_older_than(150).await.unwrap();

        assert_eq!(backend.committed_ids(), vec!["fresh"]);
        assert_eq!(backend.recorded_delete_thresholds(), vec![150]);
    }

    #[tokio::test]
    async fn test_delete_by_ids_ignores_missing() {
        let backend = InMemoryBackend::new();
        backend.seed([doc("a", 1), doc("b", 2)]);

        backend
            .delete_by_ids(&["b".to_string(), "nope".to_string()])
            .await
            .unwrap();

        assert_eq!(backend.committed_ids(), vec!["a"]);
        assert_eq!(
            backend.recorded_id_deletes(),
            vec![vec!["b".to_string(), "nope".to_string()]]
        );
    }

    #[tokio::test]
    async fn test_add_replaces_same_id() {
        let backend = InMemoryBackend::new();
        let mut first = doc("a", 1);
        first.set_field("title", "one");
        let mut second = doc("a", 2);
        second.set_field("title", "two");

        backend.add_documents(&[first]).await.unwrap();
        backend.commit().await.unwrap();
        backend.add_documents(&[second]).await.unwrap();
        backend.commit().await.unwrap();

        let committed = backend.committed_documents();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].field("title"), Some(&"two".into()));
    }
}
