//! Blobsnap Services Layer
//!
//! This crate is the **business service layer**: the upload orchestrator that
//! writes timestamped ("direct") objects and maintains the movable "latest"
//! alias, and the decision engine that skips uploads whose content is
//! unchanged from the current latest object. Storage primitives live in
//! blobsnap-storage; command-line handling lives in blobsnap-cli.

pub mod clock;
pub mod content;
pub mod equality;
pub mod services;
pub mod trace;

pub use blobsnap_storage::{
    create_storage, ContainerAccess, ObjectVersion, PathTemplate, Storage, StorageBackend,
    StorageError, StorageResult,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use content::{Content, SeekableRead};
pub use equality::{EqualityStrategy, FnEquality, JsonEquality};
pub use services::unique::{SkipReason, UniqueUploadRequest, UniqueUploader, UploadOutcome};
pub use services::upload::{
    GetLatestRequest, LatestObject, ObjectLocation, UploadKind, UploadOrchestrator, UploadRequest,
    UploadResult,
};
pub use trace::{BufferSink, NullSink, TraceSink, TracingSink};
