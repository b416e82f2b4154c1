#![allow(dead_code)]

use async_trait::async_trait;
use blobsnap_services::{
    BufferSink, Clock, Content, EqualityStrategy, FixedClock, PathTemplate, UniqueUploadRequest,
    UniqueUploader, UploadOrchestrator, UploadRequest,
};
use blobsnap_storage::{
    ContainerAccess, CopyHandle, CopyStatus, LocalStorage, ObjectProperties, ObjectRead,
    ObjectReader, ObjectVersion, Precondition, Storage, StorageBackend, StorageResult,
};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt};

pub const CONTAINER: &str = "snapshots";
pub const TEMPLATE: &str = "prefix/{0}.txt";

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// Forwards to a local store while counting mutating calls.
pub struct RecordingStorage {
    inner: LocalStorage,
    pub writes: AtomicUsize,
    pub copies: AtomicUsize,
}

impl RecordingStorage {
    pub fn mutations(&self) -> usize {
        self.writes.load(Ordering::SeqCst) + self.copies.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Storage for RecordingStorage {
    async fn container_exists(&self, container: &str) -> StorageResult<bool> {
        self.inner.container_exists(container).await
    }

    async fn create_container_if_absent(
        &self,
        container: &str,
        access: ContainerAccess,
    ) -> StorageResult<bool> {
        self.inner.create_container_if_absent(container, access).await
    }

    async fn exists(&self, container: &str, key: &str) -> StorageResult<bool> {
        self.inner.exists(container, key).await
    }

    async fn properties(&self, container: &str, key: &str) -> StorageResult<ObjectProperties> {
        self.inner.properties(container, key).await
    }

    async fn open_read(&self, container: &str, key: &str) -> StorageResult<ObjectRead> {
        self.inner.open_read(container, key).await
    }

    async fn write(
        &self,
        container: &str,
        key: &str,
        reader: ObjectReader,
        content_type: Option<&str>,
        precondition: Precondition,
    ) -> StorageResult<ObjectVersion> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner
            .write(container, key, reader, content_type, precondition)
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
        self.copies.fetch_add(1, Ordering::SeqCst);
        self.inner
            .start_copy(source_container, source_key, dest_container, dest_key, precondition)
            .await
    }

    async fn copy_status(
        &self,
        container: &str,
        key: &str,
        copy_id: &str,
    ) -> StorageResult<CopyStatus> {
        self.inner.copy_status(container, key, copy_id).await
    }

    fn object_url(&self, container: &str, key: &str) -> String {
        self.inner.object_url(container, key)
    }

    fn backend_type(&self) -> StorageBackend {
        self.inner.backend_type()
    }
}

pub struct TestEnv {
    pub dir: TempDir,
    pub storage: Arc<RecordingStorage>,
    pub clock: Arc<FixedClock>,
    pub trace: Arc<BufferSink>,
    pub uploader: UniqueUploader,
}

impl TestEnv {
    pub fn template(&self) -> PathTemplate {
        PathTemplate::parse(TEMPLATE).unwrap()
    }

    /// A unique upload request writing both the direct object and the latest alias.
    pub fn request(&self, content: &str) -> UniqueUploadRequest {
        UniqueUploadRequest::new(
            UploadRequest::new(CONTAINER, self.template(), Content::from_bytes(content))
                .write_latest(true),
        )
    }

    /// Direct key for the clock's current time.
    pub fn direct_key_now(&self) -> String {
        self.template().direct_key(self.clock.now())
    }

    pub async fn read(&self, key: &str) -> String {
        let mut object = self.storage.open_read(CONTAINER, key).await.unwrap();
        let mut text = String::new();
        object.reader.read_to_string(&mut text).await.unwrap();
        text
    }

    pub async fn latest(&self) -> String {
        self.read(&self.template().latest_key()).await
    }

    /// A second uploader over the same storage with its own clock.
    pub fn uploader_with_clock(&self, clock: Arc<FixedClock>) -> UniqueUploader {
        let orchestrator = UploadOrchestrator::new(self.storage.clone(), clock);
        UniqueUploader::new(orchestrator, self.trace.clone())
    }
}

pub async fn setup_test_env() -> TestEnv {
    let dir = tempfile::tempdir().unwrap();
    let inner = LocalStorage::new(dir.path(), "http://localhost:8080/blobs".to_string())
        .await
        .unwrap();
    let storage = Arc::new(RecordingStorage {
        inner,
        writes: AtomicUsize::new(0),
        copies: AtomicUsize::new(0),
    });
    let clock = Arc::new(FixedClock::new(start_time()));
    let trace = Arc::new(BufferSink::new());

    let orchestrator = UploadOrchestrator::new(storage.clone(), clock.clone());
    let uploader = UniqueUploader::new(orchestrator, trace.clone());

    TestEnv {
        dir,
        storage,
        clock,
        trace,
        uploader,
    }
}

/// Equality strategy that records how it was called.
pub struct CountingEquality {
    pub answer: bool,
    pub calls: AtomicUsize,
    pub seen_candidates: Mutex<Vec<Vec<u8>>>,
}

impl CountingEquality {
    pub fn new(answer: bool) -> Arc<Self> {
        Arc::new(CountingEquality {
            answer,
            calls: AtomicUsize::new(0),
            seen_candidates: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EqualityStrategy for CountingEquality {
    async fn equivalent(
        &self,
        candidate: &mut (dyn AsyncRead + Send + Unpin),
        _latest: &mut (dyn AsyncRead + Send + Unpin),
    ) -> StorageResult<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut bytes = Vec::new();
        candidate.read_to_end(&mut bytes).await?;
        self.seen_candidates.lock().unwrap().push(bytes);
        Ok(self.answer)
    }
}
