//! Upload orchestration: direct (timestamped) objects and the latest alias.

use crate::clock::Clock;
use crate::content::Content;
use blobsnap_storage::keys::validate_container;
use blobsnap_storage::{
    ContainerAccess, ObjectReader, ObjectVersion, PathTemplate, Precondition, Storage,
    StorageError, StorageResult,
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Where an object was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectLocation {
    pub container: String,
    pub key: String,
    pub url: String,
}

/// Locations written by an upload; a field is present only if that object was written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct: Option<ObjectLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<ObjectLocation>,
}

/// How an upload lays out its objects, derived from the request flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    /// Write a timestamped direct object, then copy it over the latest alias if requested.
    Timestamped,
    /// Write the content straight to the latest alias; no direct object.
    LatestOnly,
}

pub struct UploadRequest {
    pub content: Content,
    pub container: String,
    pub template: PathTemplate,
    pub content_type: Option<String>,
    pub write_direct: bool,
    pub write_latest: bool,
    /// Version the latest alias must still carry for the upload to proceed.
    pub expected_version: Option<ObjectVersion>,
}

impl UploadRequest {
    /// A request writing only the direct object; adjust with the builder methods.
    pub fn new(container: impl Into<String>, template: PathTemplate, content: Content) -> Self {
        UploadRequest {
            content,
            container: container.into(),
            template,
            content_type: None,
            write_direct: true,
            write_latest: false,
            expected_version: None,
        }
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn write_direct(mut self, write_direct: bool) -> Self {
        self.write_direct = write_direct;
        self
    }

    pub fn write_latest(mut self, write_latest: bool) -> Self {
        self.write_latest = write_latest;
        self
    }

    pub fn expected_version(mut self, version: Option<ObjectVersion>) -> Self {
        self.expected_version = version;
        self
    }

    pub fn kind(&self) -> StorageResult<UploadKind> {
        match (self.write_direct, self.write_latest) {
            (true, _) => Ok(UploadKind::Timestamped),
            (false, true) => Ok(UploadKind::LatestOnly),
            (false, false) => Err(StorageError::InvalidArgument(
                "Upload must write the direct object, the latest object, or both".to_string(),
            )),
        }
    }
}

impl fmt::Debug for UploadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadRequest")
            .field("content", &self.content)
            .field("container", &self.container)
            .field("template", &self.template)
            .field("content_type", &self.content_type)
            .field("write_direct", &self.write_direct)
            .field("write_latest", &self.write_latest)
            .field("expected_version", &self.expected_version)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct GetLatestRequest {
    pub container: String,
    pub template: PathTemplate,
}

/// The current latest object, opened for reading.
pub struct LatestObject {
    pub reader: ObjectReader,
    pub content_md5: Option<String>,
    pub version: ObjectVersion,
    pub location: ObjectLocation,
}

impl fmt::Debug for LatestObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LatestObject")
            .field("content_md5", &self.content_md5)
            .field("version", &self.version)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

/// Writes direct objects and maintains the latest alias.
#[derive(Clone)]
pub struct UploadOrchestrator {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    container_access: ContainerAccess,
}

impl UploadOrchestrator {
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>) -> Self {
        UploadOrchestrator {
            storage,
            clock,
            container_access: ContainerAccess::default(),
        }
    }

    /// Access level for containers this orchestrator creates.
    pub fn with_container_access(mut self, access: ContainerAccess) -> Self {
        self.container_access = access;
        self
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    fn location(&self, container: &str, key: &str) -> ObjectLocation {
        ObjectLocation {
            container: container.to_string(),
            key: key.to_string(),
            url: self.storage.object_url(container, key),
        }
    }

    async fn ensure_container(&self, container: &str) -> StorageResult<()> {
        if self.storage.container_exists(container).await? {
            return Ok(());
        }
        if self
            .storage
            .create_container_if_absent(container, self.container_access)
            .await?
        {
            tracing::info!(
                container = %container,
                access = %self.container_access,
                "Container created"
            );
        }
        Ok(())
    }

    /// Fail with `ConcurrencyConflict` unless the latest alias still carries `expected`.
    async fn verify_latest_version(
        &self,
        container: &str,
        latest_key: &str,
        expected: &ObjectVersion,
    ) -> StorageResult<()> {
        match self.storage.properties(container, latest_key).await {
            Ok(current) if current.version == *expected => Ok(()),
            Ok(current) => Err(StorageError::ConcurrencyConflict(format!(
                "{}/{} moved to version {} (expected {})",
                container, latest_key, current.version, expected
            ))),
            Err(e) if e.is_not_found() => Err(StorageError::ConcurrencyConflict(format!(
                "{}/{} disappeared (expected version {})",
                container, latest_key, expected
            ))),
            Err(e) => Err(e),
        }
    }

    /// Upload content as described by the request.
    ///
    /// With an expected version, the latest alias must still carry that
    /// version, the direct object is created only if its key is free, and the
    /// latest alias is replaced only if it has not moved in the meantime. Any
    /// violation fails with `ConcurrencyConflict` and leaves the latest alias
    /// untouched. Nothing is ever deleted.
    pub async fn upload(&self, request: UploadRequest) -> StorageResult<UploadResult> {
        let kind = request.kind()?;
        validate_container(&request.container)?;
        let start = std::time::Instant::now();

        self.ensure_container(&request.container).await?;

        let UploadRequest {
            content,
            container,
            template,
            content_type,
            write_latest,
            expected_version,
            ..
        } = request;
        let latest_key = template.latest_key();
        let reader: ObjectReader = Box::pin(content);
        let mut result = UploadResult::default();

        match kind {
            UploadKind::Timestamped => {
                let direct_key = template.direct_key(self.clock.now());
                let direct_precondition = match &expected_version {
                    Some(expected) => {
                        self.verify_latest_version(&container, &latest_key, expected)
                            .await?;
                        Precondition::IfNotExists
                    }
                    None => Precondition::None,
                };

                self.storage
                    .write(
                        &container,
                        &direct_key,
                        reader,
                        content_type.as_deref(),
                        direct_precondition,
                    )
                    .await?;
                result.direct = Some(self.location(&container, &direct_key));

                if write_latest {
                    let latest_precondition = expected_version
                        .map(Precondition::IfMatch)
                        .unwrap_or_default();
                    self.storage
                        .copy(
                            &container,
                            &direct_key,
                            &container,
                            &latest_key,
                            latest_precondition,
                        )
                        .await?;
                    result.latest = Some(self.location(&container, &latest_key));
                }
            }
            UploadKind::LatestOnly => {
                let precondition = expected_version
                    .map(Precondition::IfMatch)
                    .unwrap_or_default();
                self.storage
                    .write(
                        &container,
                        &latest_key,
                        reader,
                        content_type.as_deref(),
                        precondition,
                    )
                    .await?;
                result.latest = Some(self.location(&container, &latest_key));
            }
        }

        tracing::info!(
            container = %container,
            template = %template,
            direct_key = result.direct.as_ref().map(|l| l.key.as_str()).unwrap_or("-"),
            latest_updated = result.latest.is_some(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Upload completed"
        );

        Ok(result)
    }

    /// Open the current latest object, or `None` if it (or its container) does not exist.
    pub async fn get_latest(&self, request: &GetLatestRequest) -> StorageResult<Option<LatestObject>> {
        validate_container(&request.container)?;
        if !self.storage.container_exists(&request.container).await? {
            return Ok(None);
        }

        let key = request.template.latest_key();
        match self.storage.open_read(&request.container, &key).await {
            Ok(object) => Ok(Some(LatestObject {
                reader: object.reader,
                content_md5: object.properties.content_md5,
                version: object.properties.version,
                location: self.location(&request.container, &key),
            })),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
