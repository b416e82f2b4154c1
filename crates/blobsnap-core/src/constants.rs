//! Shared constants.

use std::time::Duration;

/// Literal substituted into a path template to address the latest alias.
pub const LATEST_TOKEN: &str = "latest";

/// `chrono` format for direct object names: sortable, second resolution.
pub const TIMESTAMP_FORMAT: &str = "%Y.%m.%d.%H.%M.%S";

/// Placeholder a path template must contain exactly once.
pub const TEMPLATE_SLOT: &str = "{0}";

/// Chunk size used when hashing streams.
pub const HASH_CHUNK_SIZE: usize = 8 * 1024;

/// Delay between copy status polls.
pub const COPY_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub const CONNECTION_STRING_ENV: &str = "BLOBSNAP_CONNECTION_STRING";
pub const CONTAINER_ACCESS_ENV: &str = "BLOBSNAP_CONTAINER_ACCESS";
