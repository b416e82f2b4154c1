//! Content hashing.
//!
//! Hashes are MD5 digests encoded as padded standard base64, the format blob
//! stores report in their `Content-MD5` property.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use blobsnap_core::constants::HASH_CHUNK_SIZE;
use md5::{Digest, Md5};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Incremental MD5 hasher.
#[derive(Default, Clone)]
pub struct ContentHasher {
    inner: Md5,
    len: u64,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
        self.len += chunk.len() as u64;
    }

    /// Number of bytes hashed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn finish(self) -> String {
        STANDARD.encode(self.inner.finalize())
    }
}

/// Hash a reader to EOF in fixed-size chunks.
pub async fn md5_base64<R>(reader: &mut R) -> std::io::Result<String>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut hasher = ContentHasher::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];
    loop {
        let read = reader.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hasher.finish())
}

/// Hash an in-memory buffer.
pub fn md5_base64_bytes(data: &[u8]) -> String {
    let mut hasher = ContentHasher::new();
    hasher.update(data);
    hasher.finish()
}
