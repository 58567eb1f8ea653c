//! Error types for index backend operations.

pub mod backend_error;

pub use backend_error::BackendError;
