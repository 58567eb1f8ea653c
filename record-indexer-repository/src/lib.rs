//! # Record Indexer Repository
//!
//! This crate provides the trait and error taxonomy for interacting with the
//! document-index backend, plus an in-memory implementation used for local
//! development and by the pipeline's tests. Real deployments plug in a
//! backend client (OpenSearch, Solr, ...) behind the same trait.

pub mod errors;
pub mod interfaces;
pub mod memory;

pub use errors::BackendError;
pub use interfaces::IndexBackend;
pub use memory::InMemoryBackend;
