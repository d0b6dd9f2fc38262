//! Streaming read session for one open file.
//!
//! A session owns the live byte stream of a single fetch. Content is strictly
//! forward-only: there is no seeking and nothing is cached once handed out.
//! Each `read` call polls the stream at most once, so a read may return fewer
//! bytes than requested without being at end of stream.

use bytes::Bytes;
use futures::StreamExt;
use s3fuse_storage::{ByteStream, StorageError, UrlFetcher};

use crate::error::VfsError;
use crate::inode::{NodeId, VirtualFile, VirtualNode};
use crate::options::VfsOptions;

/// Result of a single read.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadChunk<'a> {
    /// Bytes delivered by this read. May be shorter than requested.
    Data(&'a [u8]),
    /// The stream is exhausted.
    EndOfStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Streaming,
    Exhausted,
    Released,
}

/// Remote read session backing one open handle.
pub struct RemoteReadSession {
    /// Node id of the file being read.
    file_id: NodeId,
    /// Remote locator, kept for diagnostics.
    url: String,
    /// Live stream (None once exhausted or released).
    stream: Option<ByteStream>,
    /// Bytes of the last network chunk not yet handed out.
    pending: Bytes,
    /// Fixed-capacity read buffer.
    buffer: Box<[u8]>,
    /// Bytes delivered so far.
    position: u64,
    state: SessionState,
    strict_sequential: bool,
}

impl RemoteReadSession {
    /// Start streaming the content of `file`.
    ///
    /// # Arguments
    /// * `fetcher` - Transport used to open the URL
    /// * `file` - File node to read
    /// * `options` - Buffer capacity and offset checking
    ///
    /// # Returns
    /// A session positioned at offset 0, or `VfsError::Fetch` if the remote
    /// endpoint is unreachable or answers with a non-success status.
    pub async fn open(
        fetcher: &dyn UrlFetcher,
        file: &VirtualFile,
        options: &VfsOptions,
    ) -> Result<Self, VfsError> {
        let url: String = file.url().to_string();
        let stream: ByteStream = fetcher.get(&url).await.map_err(|source| VfsError::Fetch {
            url: url.clone(),
            source,
        })?;

        tracing::debug!(id = file.id(), url = %url, "opened remote stream");

        Ok(Self::from_stream(file.id(), url, stream, options))
    }

    /// Wrap an already open stream.
    pub fn from_stream(
        file_id: NodeId,
        url: String,
        stream: ByteStream,
        options: &VfsOptions,
    ) -> Self {
        Self {
            file_id,
            url,
            stream: Some(stream),
            pending: Bytes::new(),
            buffer: vec![0u8; options.read_buffer_size.max(1)].into_boxed_slice(),
            position: 0,
            state: SessionState::Streaming,
            strict_sequential: options.strict_sequential,
        }
    }

    /// Read the next bytes of the stream.
    ///
    /// `size` is clamped to the buffer capacity. Leftover bytes from the
    /// previous network chunk are served first without polling; otherwise the
    /// stream is polled exactly once. A poll that yields nothing ends the
    /// stream: the session drops it and every later read reports
    /// `EndOfStream` without touching the transport.
    ///
    /// # Arguments
    /// * `offset` - Offset the caller believes it is at (checked only in
    ///   strict mode)
    /// * `size` - Maximum number of bytes wanted
    pub async fn read(&mut self, offset: u64, size: usize) -> Result<ReadChunk<'_>, VfsError> {
        if self.state == SessionState::Released {
            return Err(VfsError::Released {
                url: self.url.clone(),
            });
        }

        if self.strict_sequential && offset != self.position {
            return Err(VfsError::SequentialityViolation {
                expected: self.position,
                actual: offset,
            });
        }

        if self.state == SessionState::Exhausted {
            return Ok(ReadChunk::EndOfStream);
        }

        let want: usize = size.min(self.buffer.len());
        if want == 0 {
            return Ok(ReadChunk::Data(&[]));
        }

        if self.pending.is_empty() {
            let next: Option<Result<Bytes, StorageError>> = match self.stream.as_mut() {
                Some(stream) => stream.next().await,
                None => None,
            };
            match next {
                Some(Ok(chunk)) if !chunk.is_empty() => self.pending = chunk,
                Some(Ok(_)) | None => {
                    self.exhaust();
                    return Ok(ReadChunk::EndOfStream);
                }
                Some(Err(source)) => {
                    return Err(VfsError::Stream {
                        url: self.url.clone(),
                        source,
                    })
                }
            }
        }

        let n: usize = want.min(self.pending.len());
        let chunk: Bytes = self.pending.split_to(n);
        self.buffer[..n].copy_from_slice(&chunk);
        self.position += n as u64;

        tracing::trace!(
            id = self.file_id,
            offset,
            requested = size,
            delivered = n,
            "read from remote stream"
        );

        Ok(ReadChunk::Data(&self.buffer[..n]))
    }

    fn exhaust(&mut self) {
        tracing::debug!(id = self.file_id, bytes = self.position, "remote stream exhausted");
        self.state = SessionState::Exhausted;
        self.stream = None;
    }

    /// Close the stream. Safe to call any number of times.
    ///
    /// # Returns
    /// True if this call performed the release.
    pub fn release(&mut self) -> bool {
        if self.state == SessionState::Released {
            return false;
        }
        self.state = SessionState::Released;
        self.stream = None;
        self.pending = Bytes::new();
        tracing::debug!(id = self.file_id, bytes = self.position, "released remote stream");
        true
    }

    /// Node id of the file.
    pub fn file_id(&self) -> NodeId {
        self.file_id
    }

    /// Remote locator.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Bytes delivered so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Capacity of the read buffer.
    pub fn buffer_capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Check if end of stream has been reached.
    pub fn is_exhausted(&self) -> bool {
        self.state == SessionState::Exhausted
    }

    /// Check if the session has been released.
    pub fn is_released(&self) -> bool {
        self.state == SessionState::Released
    }
}

impl std::fmt::Debug for RemoteReadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteReadSession")
            .field("file_id", &self.file_id)
            .field("url", &self.url)
            .field("position", &self.position)
            .field("pending", &self.pending.len())
            .field("state", &self.state)
            .finish()
    }
}
