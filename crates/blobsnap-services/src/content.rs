//! Candidate content handed to an upload.

use blobsnap_storage::{StorageError, StorageResult};
use std::fmt;
use std::io::SeekFrom;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncSeek, AsyncSeekExt, ReadBuf};

/// A stream that can be rewound.
pub trait SeekableRead: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> SeekableRead for T {}

/// Upload content: a one-shot stream, or a seekable one that can be read
/// more than once. Uniqueness checks read the content before uploading it,
/// so they require the seekable form.
pub enum Content {
    Stream(Box<dyn AsyncRead + Send + Unpin>),
    Seekable(Box<dyn SeekableRead>),
}

impl Content {
    pub fn stream(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Content::Stream(Box::new(reader))
    }

    pub fn seekable(reader: impl SeekableRead + 'static) -> Self {
        Content::Seekable(Box::new(reader))
    }

    /// In-memory content, always seekable.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Content::seekable(std::io::Cursor::new(data.into()))
    }

    pub fn is_seekable(&self) -> bool {
        matches!(self, Content::Seekable(_))
    }

    /// Position the content at its first byte.
    pub async fn rewind(&mut self) -> StorageResult<()> {
        match self {
            Content::Seekable(reader) => {
                reader.seek(SeekFrom::Start(0)).await?;
                Ok(())
            }
            Content::Stream(_) => Err(StorageError::InvalidArgument(
                "Content stream is not seekable".to_string(),
            )),
        }
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Content::Stream(_) => f.write_str("Content::Stream"),
            Content::Seekable(_) => f.write_str("Content::Seekable"),
        }
    }
}

impl AsyncRead for Content {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Content::Stream(reader) => Pin::new(reader.as_mut()).poll_read(cx, buf),
            Content::Seekable(reader) => Pin::new(reader.as_mut()).poll_read(cx, buf),
        }
    }
}
