//! # Record Indexer
//!
//! Indexing pipeline that takes a stream of domain-model records, publishes
//! them to a document-index backend, and reconciles deletions so that the
//! index holds no stale entries after a run completes.
//!
//! ## Architecture
//!
//! A pluggable [`Miner`](miners::Miner) produces records into a chain of
//! composable sink stages:
//!
//! 1. **Filtering**: drops records that should not be indexed
//! 2. **Cleaning**: marks each record's id as seen for delete reconciliation
//! 3. **Fan-out**: replicates the downstream chain across worker tasks
//! 4. **Document build**: maps a record to its backend document
//! 5. **Upload**: batches documents and commits on a configured threshold
//!
//! Stages share per-run state through a typed
//! [`Container`](record_indexer_shared::Container). At the end of a run the
//! commit cascade flushes all buffers, triggers the final backend commit,
//! and issues deletions for every previously indexed id that was not seen.
//!
//! ## Modules
//!
//! - [`config`]: pipeline configuration
//! - [`sinks`]: sink chain primitives and the upload terminal
//! - [`delete`]: delete strategies and the cleaner boundary
//! - [`miners`]: producer abstraction and the strategy injector
//! - [`indexer`]: per-run orchestration and chain building
//! - [`errors`]: error types for the pipeline

pub mod cancel;
pub mod config;
pub mod delete;
pub mod errors;
pub mod indexer;
pub mod miners;
pub mod sinks;

pub use cancel::CancelToken;
pub use config::IndexerConfig;
pub use delete::{Cleaner, DefaultCleaner, DeleteStrategy};
pub use errors::IndexError;
pub use indexer::{Indexer, IndexerBuilder, RunSummary};
pub use miners::{Miner, StaticMiner};
pub use sinks::{CloneableSink, Sink};
