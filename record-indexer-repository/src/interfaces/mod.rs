//! Interface traits for index backend implementations.

pub mod index_backend;

pub use index_backend::IndexBackend;
