//! # Record Indexer Shared
//!
//! Shared types and data structures for the record indexer system:
//! the typed run-context container and the document/update-pair types
//! that flow through the indexing pipeline.

pub mod context;
pub mod types;

pub use context::{Container, Schema, Selector};
pub use types::{IndexDocument, UpdatePair, ID_FIELD, TIMESTAMP_FIELD};
