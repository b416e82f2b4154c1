#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
use crate::{Storage, StorageError, StorageResult};
use blobsnap_core::StorageConfig;
use std::sync::Arc;

/// Create a storage backend based on configuration
pub async fn create_storage(config: &StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    match config {
        #[cfg(feature = "storage-s3")]
        StorageConfig::S3 {
            bucket,
            region,
            endpoint,
        } => {
            let storage = S3Storage::new(bucket.clone(), region.clone(), endpoint.clone()).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageConfig::S3 { .. } => Err(StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        StorageConfig::Local {
            base_path,
            base_url,
        } => {
            if base_path.is_empty() {
                return Err(StorageError::ConfigError(
                    "Local storage path not configured".to_string(),
                ));
            }
            let storage = LocalStorage::new(base_path.clone(), base_url.clone()).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageConfig::Local { .. } => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),
    }
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;
    use crate::StorageBackend;

    #[tokio::test]
    async fn creates_local_storage_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig::Local {
            base_path: dir.path().to_string_lossy().into_owned(),
            base_url: "http://localhost:8080/blobs".to_string(),
        };

        let storage = create_storage(&config).await.unwrap();
        assert_eq!(storage.backend_type(), StorageBackend::Local);
        assert_eq!(
            storage.object_url("c", "k.txt"),
            "http://localhost:8080/blobs/c/k.txt"
        );
    }

    #[tokio::test]
    async fn rejects_empty_local_path() {
        let config = StorageConfig::Local {
            base_path: String::new(),
            base_url: "http://localhost".to_string(),
        };
        assert!(matches!(
            create_storage(&config).await,
            Err(StorageError::ConfigError(_))
        ));
    }
}
