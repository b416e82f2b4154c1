use crate::hash::ContentHasher;
use crate::keys::{validate_container, validate_key};
use crate::traits::{
    CopyHandle, CopyStatus, ObjectProperties, ObjectRead, ObjectReader, ObjectVersion,
    Precondition, Storage, StorageError, StorageResult,
};
use crate::{ContainerAccess, StorageBackend};
use async_trait::async_trait;
use blobsnap_core::constants::HASH_CHUNK_SIZE;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use object_store::aws::{AmazonS3, AmazonS3Builder, S3ConditionalPut};
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, Attributes, GetOptions, GetResult, ObjectStore, ObjectStoreExt, PutMode,
    PutOptions, PutPayload, UpdateVersion,
};
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;
use uuid::Uuid;

/// User metadata entry carrying the base64 MD5 of the object content.
const MD5_METADATA_KEY: &str = "content-md5";

/// Marker object that makes a container exist.
const CONTAINER_MARKER: &str = ".blobsnap-container";

/// S3 storage implementation
///
/// A single bucket backs every container: a container is the key prefix
/// `{container}/`, brought into existence by a marker object recording its
/// access level. Anonymous access itself is governed by the bucket policy.
#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
    region: String,
    endpoint_url: Option<String>, // Custom endpoint for S3-compatible providers
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
    ) -> StorageResult<Self> {
        // Build AmazonS3 object store from environment and explicit settings.
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region.clone())
            .with_bucket_name(bucket.clone())
            .with_conditional_put(S3ConditionalPut::ETagMatch);

        if let Some(ref endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3Storage {
            store,
            bucket,
            region,
            endpoint_url,
        })
    }

    fn location(container: &str, key: &str) -> StorageResult<Path> {
        validate_container(container)?;
        validate_key(key)?;
        Ok(Path::from(format!("{}/{}", container, key)))
    }

    /// Generate public URL for S3 object
    ///
    /// For AWS S3, uses the standard format: https://{bucket}.s3.{region}.amazonaws.com/{key}
    /// For S3-compatible providers, uses path-style URLs on the endpoint
    fn generate_url(&self, container: &str, key: &str) -> String {
        if let Some(ref endpoint) = self.endpoint_url {
            let base_url = endpoint.trim_end_matches('/');
            format!("{}/{}/{}/{}", base_url, self.bucket, container, key)
        } else {
            format!(
                "https://{}.s3.{}.amazonaws.com/{}/{}",
                self.bucket, self.region, container, key
            )
        }
    }

    fn put_mode(precondition: &Precondition) -> PutMode {
        match precondition {
            Precondition::None => PutMode::Overwrite,
            Precondition::IfNotExists => PutMode::Create,
            Precondition::IfMatch(version) => PutMode::Update(UpdateVersion {
                e_tag: Some(version.as_str().to_string()),
                version: None,
            }),
        }
    }

    fn map_error(error: ObjectStoreError, container: &str, key: &str, precondition: &Precondition) -> StorageError {
        match error {
            ObjectStoreError::Precondition { .. } | ObjectStoreError::AlreadyExists { .. } => {
                StorageError::ConcurrencyConflict(format!(
                    "{}/{} does not satisfy {:?}",
                    container, key, precondition
                ))
            }
            // An If-Match against a missing object is a lost race, not a lookup failure.
            ObjectStoreError::NotFound { .. } if matches!(precondition, Precondition::IfMatch(_)) => {
                StorageError::ConcurrencyConflict(format!("{}/{} no longer exists", container, key))
            }
            ObjectStoreError::NotFound { .. } => {
                StorageError::NotFound(format!("{}/{}", container, key))
            }
            other => StorageError::Transport(other.to_string()),
        }
    }

    fn properties_from(result: &GetResult, container: &str, key: &str) -> StorageResult<ObjectProperties> {
        let etag = result.meta.e_tag.clone().ok_or_else(|| {
            StorageError::Transport(format!("{}/{} has no ETag", container, key))
        })?;

        Ok(ObjectProperties {
            version: ObjectVersion::new(etag),
            content_md5: result
                .attributes
                .get(&Attribute::Metadata(MD5_METADATA_KEY.into()))
                .map(|value| value.to_string()),
            content_type: result
                .attributes
                .get(&Attribute::ContentType)
                .map(|value| value.to_string()),
            size: result.meta.size as u64,
        })
    }

    async fn put(
        &self,
        container: &str,
        key: &str,
        payload: Bytes,
        attributes: Attributes,
        precondition: &Precondition,
    ) -> StorageResult<ObjectVersion> {
        let location = Self::location(container, key)?;
        let size = payload.len();
        let start = std::time::Instant::now();

        let options = PutOptions {
            mode: Self::put_mode(precondition),
            attributes,
            ..Default::default()
        };

        let result = self
            .store
            .put_opts(&location, PutPayload::from(payload), options)
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    container = %container,
                    key = %key,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 write failed"
                );
                Self::map_error(e, container, key, precondition)
            })?;

        tracing::info!(
            bucket = %self.bucket,
            container = %container,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 write successful"
        );

        match result.e_tag {
            Some(etag) => Ok(ObjectVersion::new(etag)),
            None => Ok(self.properties(container, key).await?.version),
        }
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn container_exists(&self, container: &str) -> StorageResult<bool> {
        let marker = Self::location(container, CONTAINER_MARKER)?;
        match self.store.head(&marker).await {
            Ok(_) => return Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => {}
            Err(e) => return Err(StorageError::Transport(e.to_string())),
        }

        // Prefixes written by other tools count as containers too.
        let prefix = Path::from(container.to_string());
        match self.store.list(Some(&prefix)).next().await {
            Some(Ok(_)) => Ok(true),
            Some(Err(e)) => Err(StorageError::Transport(e.to_string())),
            None => Ok(false),
        }
    }

    async fn create_container_if_absent(
        &self,
        container: &str,
        access: ContainerAccess,
    ) -> StorageResult<bool> {
        if self.container_exists(container).await? {
            return Ok(false);
        }

        let payload = Bytes::from(access.to_string());
        match self
            .put(container, CONTAINER_MARKER, payload, Attributes::new(), &Precondition::IfNotExists)
            .await
        {
            Ok(_) => {
                tracing::info!(
                    bucket = %self.bucket,
                    container = %container,
                    access = %access,
                    "S3 container created"
                );
                Ok(true)
            }
            Err(StorageError::ConcurrencyConflict(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn exists(&self, container: &str, key: &str) -> StorageResult<bool> {
        let location = Self::location(container, key)?;
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::Transport(e.to_string())),
        }
    }

    async fn properties(&self, container: &str, key: &str) -> StorageResult<ObjectProperties> {
        let location = Self::location(container, key)?;
        let options = GetOptions {
            head: true,
            ..Default::default()
        };
        let result = self
            .store
            .get_opts(&location, options)
            .await
            .map_err(|e| Self::map_error(e, container, key, &Precondition::None))?;
        Self::properties_from(&result, container, key)
    }

    async fn open_read(&self, container: &str, key: &str) -> StorageResult<ObjectRead> {
        let location = Self::location(container, key)?;

        let result = self.store.get(&location).await.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(format!("{}/{}", container, key)),
            other => {
                tracing::error!(
                    error = %other,
                    bucket = %self.bucket,
                    container = %container,
                    key = %key,
                    "S3 download failed"
                );
                StorageError::Transport(other.to_string())
            }
        })?;

        let properties = Self::properties_from(&result, container, key)?;
        let stream = result.into_stream().map_err(std::io::Error::other);

        tracing::debug!(
            bucket = %self.bucket,
            container = %container,
            key = %key,
            size_bytes = properties.size,
            "S3 object opened"
        );

        Ok(ObjectRead {
            reader: Box::pin(StreamReader::new(stream)),
            properties,
        })
    }

    async fn write(
        &self,
        container: &str,
        key: &str,
        mut reader: ObjectReader,
        content_type: Option<&str>,
        precondition: Precondition,
    ) -> StorageResult<ObjectVersion> {
        // Read the entire stream into memory and upload it in a single put,
        // hashing as we go so the MD5 can travel with the object.
        let mut buffer = Vec::new();
        let mut temp_buf = vec![0u8; HASH_CHUNK_SIZE];
        let mut hasher = ContentHasher::new();

        loop {
            let bytes_read = reader.read(&mut temp_buf).await.map_err(|e| {
                StorageError::Transport(format!("Failed to read from stream: {}", e))
            })?;

            if bytes_read == 0 {
                break;
            }

            hasher.update(&temp_buf[..bytes_read]);
            buffer.extend_from_slice(&temp_buf[..bytes_read]);
        }

        let mut attributes = Attributes::new();
        attributes.insert(
            Attribute::Metadata(MD5_METADATA_KEY.into()),
            hasher.finish().into(),
        );
        if let Some(content_type) = content_type {
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
        }

        self.put(container, key, Bytes::from(buffer), attributes, &precondition)
            .await
    }

    async fn start_copy(
        &self,
        source_container: &str,
        source_key: &str,
        dest_container: &str,
        dest_key: &str,
        precondition: Precondition,
    ) -> StorageResult<CopyHandle> {
        let start = std::time::Instant::now();
        let from = Self::location(source_container, source_key)?;
        let to = Self::location(dest_container, dest_key)?;

        let version = match precondition {
            Precondition::None => {
                self.store
                    .copy(&from, &to)
                    .await
                    .map_err(|e| Self::map_error(e, source_container, source_key, &Precondition::None))?;
                self.properties(dest_container, dest_key).await?.version
            }
            // S3 has no conditional server-side copy; re-put the source under the precondition.
            ref conditional => {
                let source = self
                    .store
                    .get(&from)
                    .await
                    .map_err(|e| Self::map_error(e, source_container, source_key, &Precondition::None))?;
                let attributes = source.attributes.clone();
                let payload = source
                    .bytes()
                    .await
                    .map_err(|e| StorageError::Transport(e.to_string()))?;
                self.put(dest_container, dest_key, payload, attributes, conditional)
                    .await?
            }
        };

        tracing::info!(
            from_key = %from,
            to_key = %to,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 copy successful"
        );

        Ok(CopyHandle {
            copy_id: Uuid::new_v4().to_string(),
            status: CopyStatus::Success(version),
        })
    }

    async fn copy_status(
        &self,
        container: &str,
        key: &str,
        _copy_id: &str,
    ) -> StorageResult<CopyStatus> {
        // object_store copies complete before the request returns.
        let properties = self.properties(container, key).await?;
        Ok(CopyStatus::Success(properties.version))
    }

    fn object_url(&self, container: &str, key: &str) -> String {
        self.generate_url(container, key)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
