//! imgflow Storage Library
//!
//! This crate provides the object store abstraction the pipeline reads source images from and
//! writes derived artifacts to, with implementations for S3, the local filesystem and memory.
//!
//! # Addressing
//!
//! Every object is addressed by a `location` (the bucket) and a `key`. Keys must not contain
//! `..` or start with `/`; the local backend maps `location/key` onto its root directory.

pub mod factory;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use imgflow_core::StorageBackend;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use memory::InMemoryStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
