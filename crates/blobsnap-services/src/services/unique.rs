//! Unique uploads: skip the upload when the candidate matches the latest object.
//!
//! The candidate is compared against the latest object only, never against
//! older direct objects, so a unique upload can still duplicate an earlier
//! snapshot that is no longer the latest.

use super::upload::{
    GetLatestRequest, LatestObject, ObjectLocation, UploadOrchestrator, UploadRequest, UploadResult,
};
use crate::equality::EqualityStrategy;
use crate::trace::TraceSink;
use blobsnap_storage::hash::md5_base64;
use blobsnap_storage::{ObjectVersion, StorageError, StorageResult};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

pub struct UniqueUploadRequest {
    pub upload: UploadRequest,
    /// Consulted when the hashes differ; `None` compares by hash only.
    pub equality: Option<Arc<dyn EqualityStrategy>>,
    pub only_unique: bool,
}

impl UniqueUploadRequest {
    /// A request with uniqueness checking enabled and hash-only comparison.
    pub fn new(upload: UploadRequest) -> Self {
        UniqueUploadRequest {
            upload,
            equality: None,
            only_unique: true,
        }
    }

    pub fn equality(mut self, strategy: Arc<dyn EqualityStrategy>) -> Self {
        self.equality = Some(strategy);
        self
    }

    pub fn only_unique(mut self, only_unique: bool) -> Self {
        self.only_unique = only_unique;
        self
    }
}

impl fmt::Debug for UniqueUploadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniqueUploadRequest")
            .field("upload", &self.upload)
            .field("equality", &self.equality.is_some())
            .field("only_unique", &self.only_unique)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipReason {
    /// Same MD5 as the latest object.
    Identical,
    /// Different bytes, but the equality strategy accepted them.
    Equivalent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded(UploadResult),
    Skipped(SkipReason),
}

impl UploadOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, UploadOutcome::Skipped(_))
    }

    pub fn into_result(self) -> Option<UploadResult> {
        match self {
            UploadOutcome::Uploaded(result) => Some(result),
            UploadOutcome::Skipped(_) => None,
        }
    }
}

enum Decision {
    Skip(SkipReason),
    /// Upload, guarded by the version of the latest object compared against (if any).
    Upload(Option<ObjectVersion>),
}

/// Decision engine wrapping an [`UploadOrchestrator`].
#[derive(Clone)]
pub struct UniqueUploader {
    orchestrator: UploadOrchestrator,
    trace: Arc<dyn TraceSink>,
}

impl UniqueUploader {
    pub fn new(orchestrator: UploadOrchestrator, trace: Arc<dyn TraceSink>) -> Self {
        UniqueUploader {
            orchestrator,
            trace,
        }
    }

    pub fn orchestrator(&self) -> &UploadOrchestrator {
        &self.orchestrator
    }

    /// Upload unless the content is unchanged from the current latest object.
    ///
    /// Uniqueness checking forces the latest alias to be written, and threads
    /// the compared-against version into the upload so that a concurrent
    /// writer who moved the latest alias in between causes a
    /// `ConcurrencyConflict` instead of a silent overwrite. Conflicts are
    /// returned as-is; re-issue the whole call to retry against the new state.
    pub async fn upload_if_unique(
        &self,
        request: UniqueUploadRequest,
    ) -> StorageResult<UploadOutcome> {
        let UniqueUploadRequest {
            mut upload,
            equality,
            only_unique,
        } = request;

        if !only_unique {
            return self
                .orchestrator
                .upload(upload)
                .await
                .map(UploadOutcome::Uploaded);
        }

        if !upload.content.is_seekable() {
            return Err(StorageError::InvalidArgument(
                "Unique uploads need seekable content: it is read once to compare and again to upload"
                    .to_string(),
            ));
        }
        upload.write_latest = true;

        self.trace.write("Checking for existing latest content... ");
        let decision = match self.decide(&mut upload, equality.as_deref()).await {
            Ok(decision) => decision,
            Err(e) => {
                self.trace.write_line("failed.");
                return Err(e);
            }
        };

        match decision {
            Decision::Skip(reason) => {
                self.trace.write_line(match reason {
                    SkipReason::Identical => "exactly the same! No upload required.",
                    SkipReason::Equivalent => "equivalent! No upload required.",
                });
                tracing::info!(
                    container = %upload.container,
                    template = %upload.template,
                    reason = ?reason,
                    "Upload skipped, content unchanged"
                );
                Ok(UploadOutcome::Skipped(reason))
            }
            Decision::Upload(baseline) => {
                self.trace.write_line(if baseline.is_some() {
                    "different. Uploading."
                } else {
                    "non-existent. Uploading."
                });
                upload.content.rewind().await?;
                upload.expected_version = baseline;
                self.orchestrator
                    .upload(upload)
                    .await
                    .map(UploadOutcome::Uploaded)
            }
        }
    }

    /// Compare the candidate with the latest object.
    ///
    /// The latest object's stream is dropped before this returns, on every path.
    async fn decide(
        &self,
        upload: &mut UploadRequest,
        equality: Option<&dyn EqualityStrategy>,
    ) -> StorageResult<Decision> {
        let request = GetLatestRequest {
            container: upload.container.clone(),
            template: upload.template.clone(),
        };
        let Some(mut latest) = self.orchestrator.get_latest(&request).await? else {
            return Ok(Decision::Upload(None));
        };

        // Backends without a recorded MD5 get the latest content hashed here,
        // which consumes its stream.
        let (latest_md5, latest_consumed) = match latest.content_md5.clone() {
            Some(md5) => (md5, false),
            None => (md5_base64(&mut latest.reader).await?, true),
        };
        upload.content.rewind().await?;
        let candidate_md5 = md5_base64(&mut upload.content).await?;

        tracing::debug!(
            latest = %latest.location.key,
            latest_md5 = %latest_md5,
            candidate_md5 = %candidate_md5,
            "Compared content hashes"
        );

        if candidate_md5 == latest_md5 {
            return Ok(Decision::Skip(SkipReason::Identical));
        }

        if let Some(equality) = equality {
            if latest_consumed {
                self.reopen_latest(&mut latest).await?;
            }
            upload.content.rewind().await?;
            if equality
                .equivalent(&mut upload.content, &mut latest.reader)
                .await?
            {
                return Ok(Decision::Skip(SkipReason::Equivalent));
            }
        }

        Ok(Decision::Upload(Some(latest.version)))
    }

    /// Open the latest object again after its stream was used up for hashing.
    ///
    /// Fails with `ConcurrencyConflict` if it moved or vanished in between, so
    /// the strategy never judges content other than what was hashed.
    async fn reopen_latest(&self, latest: &mut LatestObject) -> StorageResult<()> {
        let ObjectLocation { container, key, .. } = &latest.location;
        match self.orchestrator.storage().open_read(container, key).await {
            Ok(object) if object.properties.version == latest.version => {
                latest.reader = object.reader;
                Ok(())
            }
            Ok(object) => Err(StorageError::ConcurrencyConflict(format!(
                "{}/{} moved to version {} during comparison (expected {})",
                container, key, object.properties.version, latest.version
            ))),
            Err(e) if e.is_not_found() => Err(StorageError::ConcurrencyConflict(format!(
                "{}/{} disappeared during comparison",
                container, key
            ))),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_helpers() {
        let uploaded = UploadOutcome::Uploaded(UploadResult::default());
        assert!(!uploaded.is_skipped());
        assert_eq!(uploaded.into_result(), Some(UploadResult::default()));

        let skipped = UploadOutcome::Skipped(SkipReason::Identical);
        assert!(skipped.is_skipped());
        assert_eq!(skipped.into_result(), None);
    }

    #[test]
    fn skip_reason_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&SkipReason::Equivalent).unwrap(),
            "\"equivalent\""
        );
    }
}
