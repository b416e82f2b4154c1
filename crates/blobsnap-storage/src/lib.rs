//! Blobsnap Storage Library
//!
//! This crate provides the storage abstraction the upload services are built
//! on: the [`Storage`] trait, its error taxonomy, path templates, content
//! hashing, and implementations for S3 and the local filesystem.
//!
//! # Object addressing
//!
//! Objects are addressed by `(container, key)`. Keys usually come from a
//! [`PathTemplate`] with a single `{0}` slot, filled with a UTC timestamp for
//! immutable "direct" objects or with `latest` for the movable alias.
//!
//! Keys must not contain `..` segments or a leading `/`. Validation is
//! centralized in the `keys` module so all backends stay consistent.

pub mod factory;
pub mod hash;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use blobsnap_core::{ContainerAccess, StorageBackend};
pub use factory::create_storage;
pub use keys::PathTemplate;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{
    CopyHandle, CopyStatus, ObjectProperties, ObjectRead, ObjectReader, ObjectVersion,
    Precondition, Storage, StorageError, StorageResult,
};
