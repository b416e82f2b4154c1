//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement,
//! together with the error taxonomy every backend maps its failures onto.

use crate::{ContainerAccess, StorageBackend};
use async_trait::async_trait;
use blobsnap_core::constants::COPY_POLL_INTERVAL;
use std::fmt;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("Storage backend error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::ConcurrencyConflict(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Streamed object content.
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// Opaque version marker (ETag) of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ObjectVersion(String);

impl ObjectVersion {
    pub fn new(value: impl Into<String>) -> Self {
        ObjectVersion(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Condition a write or copy destination must satisfy for the operation to proceed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Precondition {
    /// Unconditional write.
    #[default]
    None,
    /// The target must exist and currently carry this version.
    IfMatch(ObjectVersion),
    /// The target must not exist.
    IfNotExists,
}

/// Properties recorded alongside an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectProperties {
    pub version: ObjectVersion,
    /// Base64 MD5 of the content, when the backend has one on record.
    pub content_md5: Option<String>,
    pub content_type: Option<String>,
    pub size: u64,
}

/// An opened object: its content stream plus its properties.
pub struct ObjectRead {
    pub reader: ObjectReader,
    pub properties: ObjectProperties,
}

impl fmt::Debug for ObjectRead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRead")
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

/// State of a server-side copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyStatus {
    Pending,
    Success(ObjectVersion),
    Failed(String),
    Aborted,
}

/// Handle to a started server-side copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyHandle {
    pub copy_id: String,
    pub status: CopyStatus,
}

/// Storage abstraction trait
///
/// All storage backends (S3, local filesystem) must implement this trait.
/// Objects live in named containers and are addressed by `(container, key)`.
/// No operation retries internally; retry policy belongs to the caller.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Check whether a container exists
    async fn container_exists(&self, container: &str) -> StorageResult<bool>;

    /// Create a container unless it already exists.
    ///
    /// Returns `true` if the container was created by this call.
    async fn create_container_if_absent(
        &self,
        container: &str,
        access: ContainerAccess,
    ) -> StorageResult<bool>;

    /// Check if an object exists
    async fn exists(&self, container: &str, key: &str) -> StorageResult<bool>;

    /// Fetch the properties of an object without opening its content.
    ///
    /// Returns `NotFound` when the container or the object is absent.
    async fn properties(&self, container: &str, key: &str) -> StorageResult<ObjectProperties>;

    /// Open an object for streaming reads.
    ///
    /// Returns `NotFound` when the container or the object is absent.
    async fn open_read(&self, container: &str, key: &str) -> StorageResult<ObjectRead>;

    /// Write an object from a stream, consuming the reader until EOF.
    ///
    /// The content type, when given, is stored as an object property. Fails
    /// with `ConcurrencyConflict` if `precondition` does not hold; in that
    /// case the existing object is left untouched.
    async fn write(
        &self,
        container: &str,
        key: &str,
        reader: ObjectReader,
        content_type: Option<&str>,
        precondition: Precondition,
    ) -> StorageResult<ObjectVersion>;

    /// Start a server-side copy. `precondition` applies to the destination.
    async fn start_copy(
        &self,
        source_container: &str,
        source_key: &str,
        dest_container: &str,
        dest_key: &str,
        precondition: Precondition,
    ) -> StorageResult<CopyHandle>;

    /// Report the state of a copy previously started into `(container, key)`.
    async fn copy_status(
        &self,
        container: &str,
        key: &str,
        copy_id: &str,
    ) -> StorageResult<CopyStatus>;

    /// Public URL of an object
    fn object_url(&self, container: &str, key: &str) -> String;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;

    /// Copy an object and wait for the copy to complete.
    ///
    /// Polls [`Storage::copy_status`] every [`COPY_POLL_INTERVAL`] while the
    /// copy is pending. There is no timeout; callers needing one should wrap
    /// the future in `tokio::time::timeout`.
    async fn copy(
        &self,
        source_container: &str,
        source_key: &str,
        dest_container: &str,
        dest_key: &str,
        precondition: Precondition,
    ) -> StorageResult<ObjectVersion> {
        let start = std::time::Instant::now();
        let handle = self
            .start_copy(source_container, source_key, dest_container, dest_key, precondition)
            .await?;

        let mut status = handle.status;
        let mut polls = 0u32;
        loop {
            match status {
                CopyStatus::Success(version) => {
                    tracing::debug!(
                        source_key = %source_key,
                        dest_key = %dest_key,
                        polls,
                        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                        "Copy completed"
                    );
                    return Ok(version);
                }
                CopyStatus::Failed(reason) => {
                    return Err(StorageError::Transport(format!(
                        "Copy {} to {}/{} failed: {}",
                        handle.copy_id, dest_container, dest_key, reason
                    )));
                }
                CopyStatus::Aborted => {
                    return Err(StorageError::Transport(format!(
                        "Copy {} to {}/{} was aborted",
                        handle.copy_id, dest_container, dest_key
                    )));
                }
                CopyStatus::Pending => {
                    tokio::time::sleep(COPY_POLL_INTERVAL).await;
                    polls += 1;
                    status = self
                        .copy_status(dest_container, dest_key, &handle.copy_id)
                        .await?;
                }
            }
        }
    }
}
