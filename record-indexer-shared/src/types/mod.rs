//! Shared data types flowing through the indexing pipeline.

pub mod document;
pub mod update_pair;

pub use document::{IndexDocument, ID_FIELD, TIMESTAMP_FIELD};
pub use update_pair::UpdatePair;
