//! Blobsnap Core Library
//!
//! This crate provides configuration and the small set of shared types
//! (backend kinds, container access levels, constants) used by every
//! Blobsnap component.

pub mod config;
pub mod constants;
pub mod storage_types;

// Re-export commonly used types
pub use config::{AppConfig, StorageConfig};
pub use storage_types::{ContainerAccess, StorageBackend};
// Note: Storage, StorageError, StorageResult live in blobsnap-storage
