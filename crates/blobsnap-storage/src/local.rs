use crate::hash::ContentHasher;
use crate::keys::{validate_container, validate_key};
use crate::traits::{
    CopyHandle, CopyStatus, ObjectProperties, ObjectRead, ObjectReader, ObjectVersion,
    Precondition, Storage, StorageError, StorageResult,
};
use crate::{ContainerAccess, StorageBackend};
use async_trait::async_trait;
use blobsnap_core::constants::HASH_CHUNK_SIZE;
use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Directory under the base path holding everything that is not object content.
const META_DIR: &str = ".blobsnap";

/// Properties persisted next to each object.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredProperties {
    etag: String,
    content_md5: String,
    content_type: Option<String>,
    size: u64,
    /// Content modification time (ns since the epoch) when these properties were recorded.
    #[serde(default)]
    modified_ns: Option<u64>,
}

impl StoredProperties {
    /// Whether these properties still describe the file with `metadata`.
    fn describes(&self, metadata: &Metadata) -> std::io::Result<bool> {
        Ok(self.size == metadata.len() && self.modified_ns == Some(modified_ns(metadata)?))
    }
}

fn modified_ns(metadata: &Metadata) -> std::io::Result<u64> {
    let modified = metadata
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or_default();
    Ok(modified)
}

impl From<StoredProperties> for ObjectProperties {
    fn from(stored: StoredProperties) -> Self {
        ObjectProperties {
            version: ObjectVersion::new(stored.etag),
            content_md5: Some(stored.content_md5),
            content_type: stored.content_type,
            size: stored.size,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ContainerProperties {
    access: ContainerAccess,
}

/// Local filesystem storage implementation
///
/// Each container is a directory under `base_path`. Object properties (ETag,
/// MD5, content type) are kept as JSON under `base_path/.blobsnap/objects`.
/// Content is staged in `base_path/.blobsnap/tmp` and renamed into place, so
/// a reader never observes a partially written object. Precondition checks
/// and commits are serialized by an in-process lock shared by all clones.
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
    commit_lock: Arc<Mutex<()>>,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for containers (e.g., "/var/lib/blobsnap")
    /// * `base_url` - Base URL the directory is served from (e.g., "http://localhost:8080/blobs")
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let base_path = base_path.into();

        for dir in [
            base_path.join(META_DIR).join("objects"),
            base_path.join(META_DIR).join("containers"),
            base_path.join(META_DIR).join("tmp"),
        ] {
            fs::create_dir_all(&dir).await.map_err(|e| {
                StorageError::ConfigError(format!(
                    "Failed to create storage directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        Ok(LocalStorage {
            base_path,
            base_url,
            commit_lock: Arc::new(Mutex::new(())),
        })
    }

    fn container_path(&self, container: &str) -> StorageResult<PathBuf> {
        validate_container(container)?;
        Ok(self.base_path.join(container))
    }

    /// Convert a container/key pair to a filesystem path with security validation
    fn key_to_path(&self, container: &str, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.container_path(container)?.join(key))
    }

    fn properties_path(&self, container: &str, key: &str) -> PathBuf {
        self.base_path
            .join(META_DIR)
            .join("objects")
            .join(container)
            .join(format!("{}.json", key))
    }

    fn container_properties_path(&self, container: &str) -> PathBuf {
        self.base_path
            .join(META_DIR)
            .join("containers")
            .join(format!("{}.json", container))
    }

    fn staging_path(&self) -> PathBuf {
        self.base_path
            .join(META_DIR)
            .join("tmp")
            .join(Uuid::new_v4().simple().to_string())
    }

    /// Generate public URL for an object
    fn generate_url(&self, container: &str, key: &str) -> String {
        format!("{}/{}/{}", self.base_url.trim_end_matches('/'), container, key)
    }

    fn new_etag() -> String {
        format!("\"0x{}\"", Uuid::new_v4().simple())
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn require_container(&self, container: &str) -> StorageResult<()> {
        let path = self.container_path(container)?;
        if fs::try_exists(&path).await? {
            Ok(())
        } else {
            Err(StorageError::NotFound(format!("container {}", container)))
        }
    }

    /// Load the properties of an object, or `None` if it does not exist.
    ///
    /// Objects placed in the directory by other tools have no properties file,
    /// and objects overwritten by them have one that no longer matches the
    /// file's size or modification time. For those the version is derived from
    /// modification time and size, and no MD5 is reported.
    async fn load_properties(
        &self,
        container: &str,
        key: &str,
    ) -> StorageResult<Option<ObjectProperties>> {
        let path = self.key_to_path(container, key)?;
        let metadata = match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match fs::read(self.properties_path(container, key)).await {
            Ok(raw) => {
                let stored: StoredProperties = serde_json::from_slice(&raw).map_err(|e| {
                    StorageError::Transport(format!(
                        "Corrupt properties for {}/{}: {}",
                        container, key, e
                    ))
                })?;
                if stored.describes(&metadata)? {
                    return Ok(Some(stored.into()));
                }
                tracing::debug!(
                    container = %container,
                    key = %key,
                    "Stale properties ignored, object changed outside the store"
                );
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        Ok(Some(ObjectProperties {
            version: ObjectVersion::new(format!(
                "\"{:x}-{:x}\"",
                modified_ns(&metadata)?,
                metadata.len()
            )),
            content_md5: None,
            content_type: None,
            size: metadata.len(),
        }))
    }

    async fn store_properties(
        &self,
        container: &str,
        key: &str,
        stored: &StoredProperties,
    ) -> StorageResult<()> {
        let path = self.properties_path(container, key);
        self.ensure_parent_dir(&path).await?;
        let raw = serde_json::to_vec(stored)
            .map_err(|e| StorageError::Transport(format!("Failed to encode properties: {}", e)))?;

        let staged = self.staging_path();
        let written = async {
            fs::write(&staged, raw).await?;
            fs::rename(&staged, &path).await
        }
        .await;
        if let Err(e) = written {
            Self::discard(&staged).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove_properties(&self, container: &str, key: &str) -> StorageResult<()> {
        match fs::remove_file(self.properties_path(container, key)).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn check_precondition(
        container: &str,
        key: &str,
        current: Option<&ObjectProperties>,
        precondition: &Precondition,
    ) -> StorageResult<()> {
        match (precondition, current) {
            (Precondition::None, _) => Ok(()),
            (Precondition::IfNotExists, None) => Ok(()),
            (Precondition::IfNotExists, Some(existing)) => Err(StorageError::ConcurrencyConflict(
                format!("{}/{} already exists with version {}", container, key, existing.version),
            )),
            (Precondition::IfMatch(expected), Some(existing)) if existing.version == *expected => {
                Ok(())
            }
            (Precondition::IfMatch(expected), Some(existing)) => {
                Err(StorageError::ConcurrencyConflict(format!(
                    "{}/{} has version {}, expected {}",
                    container, key, existing.version, expected
                )))
            }
            (Precondition::IfMatch(expected), None) => Err(StorageError::ConcurrencyConflict(
                format!("{}/{} does not exist, expected version {}", container, key, expected),
            )),
        }
    }

    /// Move a staged file into place and record its properties.
    ///
    /// The previous properties are removed before the content moves, so a
    /// failure part way never pairs new content with an old ETag and MD5.
    /// Must be called with the commit lock held.
    async fn commit(
        &self,
        staged: &Path,
        container: &str,
        key: &str,
        stored: &mut StoredProperties,
    ) -> StorageResult<()> {
        let path = self.key_to_path(container, key)?;
        self.ensure_parent_dir(&path).await?;
        // Renaming keeps the modification time of the staged file.
        stored.modified_ns = Some(modified_ns(&fs::metadata(staged).await?)?);

        self.remove_properties(container, key).await?;
        fs::rename(staged, &path).await.map_err(|e| {
            StorageError::Transport(format!("Failed to move object into {}: {}", path.display(), e))
        })?;
        self.store_properties(container, key, stored).await
    }

    async fn discard(staged: &Path) {
        match fs::remove_file(staged).await {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                tracing::warn!(path = %staged.display(), error = %e, "Failed to remove staged file");
            }
            _ => {}
        }
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn container_exists(&self, container: &str) -> StorageResult<bool> {
        let path = self.container_path(container)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn create_container_if_absent(
        &self,
        container: &str,
        access: ContainerAccess,
    ) -> StorageResult<bool> {
        let path = self.container_path(container)?;

        match fs::create_dir(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => {
                return Err(StorageError::Transport(format!(
                    "Failed to create container {}: {}",
                    path.display(),
                    e
                )))
            }
        }

        let raw = serde_json::to_vec(&ContainerProperties { access })
            .map_err(|e| StorageError::Transport(e.to_string()))?;
        fs::write(self.container_properties_path(container), raw).await?;

        tracing::info!(
            container = %container,
            access = %access,
            path = %path.display(),
            "Local storage container created"
        );

        Ok(true)
    }

    async fn exists(&self, container: &str, key: &str) -> StorageResult<bool> {
        Ok(self.load_properties(container, key).await?.is_some())
    }

    async fn properties(&self, container: &str, key: &str) -> StorageResult<ObjectProperties> {
        self.load_properties(container, key)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("{}/{}", container, key)))
    }

    async fn open_read(&self, container: &str, key: &str) -> StorageResult<ObjectRead> {
        let properties = self.properties(container, key).await?;
        let path = self.key_to_path(container, key)?;

        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(format!("{}/{}", container, key)))
            }
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(
            container = %container,
            key = %key,
            size_bytes = properties.size,
            "Local storage object opened"
        );

        Ok(ObjectRead {
            reader: Box::pin(file),
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
        let path = self.key_to_path(container, key)?;
        self.require_container(container).await?;
        let start = std::time::Instant::now();

        let staged = self.staging_path();
        let mut file = fs::File::create(&staged).await.map_err(|e| {
            StorageError::Transport(format!("Failed to create file {}: {}", staged.display(), e))
        })?;

        let mut hasher = ContentHasher::new();
        let mut buf = vec![0u8; HASH_CHUNK_SIZE];
        let streamed: StorageResult<()> = async {
            loop {
                let read = reader.read(&mut buf).await?;
                if read == 0 {
                    break;
                }
                hasher.update(&buf[..read]);
                file.write_all(&buf[..read]).await?;
            }
            file.sync_all().await?;
            Ok(())
        }
        .await;
        drop(file);

        if let Err(e) = streamed {
            Self::discard(&staged).await;
            return Err(e);
        }

        let size = hasher.len();
        let mut stored = StoredProperties {
            etag: Self::new_etag(),
            content_md5: hasher.finish(),
            content_type: content_type.map(str::to_string),
            size,
            modified_ns: None,
        };

        let _guard = self.commit_lock.lock().await;
        let committed: StorageResult<()> = async {
            let current = self.load_properties(container, key).await?;
            Self::check_precondition(container, key, current.as_ref(), &precondition)?;
            self.commit(&staged, container, key, &mut stored).await
        }
        .await;
        if let Err(e) = committed {
            Self::discard(&staged).await;
            return Err(e);
        }

        tracing::info!(
            path = %path.display(),
            container = %container,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage write successful"
        );

        Ok(ObjectVersion::new(stored.etag))
    }

    async fn start_copy(
        &self,
        source_container: &str,
        source_key: &str,
        dest_container: &str,
        dest_key: &str,
        precondition: Precondition,
    ) -> StorageResult<CopyHandle> {
        let from_path = self.key_to_path(source_container, source_key)?;
        self.key_to_path(dest_container, dest_key)?;
        self.require_container(dest_container).await?;

        let _guard = self.commit_lock.lock().await;
        let source = self.properties(source_container, source_key).await?;
        let current = self.load_properties(dest_container, dest_key).await?;
        Self::check_precondition(dest_container, dest_key, current.as_ref(), &precondition)?;

        let staged = self.staging_path();
        let committed: StorageResult<StoredProperties> = async {
            fs::copy(&from_path, &staged).await.map_err(|e| {
                StorageError::Transport(format!(
                    "Failed to copy {} to {}: {}",
                    from_path.display(),
                    staged.display(),
                    e
                ))
            })?;

            let content_md5 = match source.content_md5 {
                Some(md5) => md5,
                None => {
                    let mut file = fs::File::open(&staged).await?;
                    crate::hash::md5_base64(&mut file).await?
                }
            };
            let mut stored = StoredProperties {
                etag: Self::new_etag(),
                content_md5,
                content_type: source.content_type,
                size: source.size,
                modified_ns: None,
            };
            self.commit(&staged, dest_container, dest_key, &mut stored)
                .await?;
            Ok(stored)
        }
        .await;
        let stored = match committed {
            Ok(stored) => stored,
            Err(e) => {
                Self::discard(&staged).await;
                return Err(e);
            }
        };

        tracing::info!(
            from_container = %source_container,
            from_key = %source_key,
            to_container = %dest_container,
            to_key = %dest_key,
            "Local storage copy successful"
        );

        Ok(CopyHandle {
            copy_id: Uuid::new_v4().to_string(),
            status: CopyStatus::Success(ObjectVersion::new(stored.etag)),
        })
    }

    async fn copy_status(
        &self,
        container: &str,
        key: &str,
        _copy_id: &str,
    ) -> StorageResult<CopyStatus> {
        // Local copies complete before start_copy returns.
        let properties = self.properties(container, key).await?;
        Ok(CopyStatus::Success(properties.version))
    }

    fn object_url(&self, container: &str, key: &str) -> String {
        self.generate_url(container, key)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
