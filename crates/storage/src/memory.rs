//! In-memory fetcher for tests.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use parking_lot::RwLock;

use crate::error::StorageError;
use crate::traits::{ByteStream, UrlFetcher};

/// What a URL resolves to.
#[derive(Debug, Clone)]
enum MemoryObject {
    /// Successful response with this body.
    Body(Bytes),
    /// Response with a non-success status.
    Status(u16),
    /// Body that breaks after `prefix` has been delivered.
    Broken(Bytes),
    /// Body that never yields again after `prefix` has been delivered.
    Stalled(Bytes),
}

/// In-memory fetcher keyed by URL.
///
/// Bodies are split into chunks of `chunk_size` bytes to imitate a network
/// stream. Counts requests and currently open streams so tests can check
/// that handles fetch independently and that release closes the stream.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    /// Objects by URL.
    objects: RwLock<HashMap<String, MemoryObject>>,
    /// Chunk size for delivered bodies (0 = whole body in one chunk).
    chunk_size: usize,
    /// Number of `get` calls.
    requests: AtomicU64,
    /// Number of streams handed out and not yet dropped.
    open_streams: Arc<AtomicUsize>,
}

impl MemoryFetcher {
    /// Create an empty fetcher that delivers each body as one chunk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver bodies in chunks of at most `chunk_size` bytes.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Serve `data` at `url`.
    pub fn insert(&self, url: impl Into<String>, data: impl Into<Bytes>) {
        self.objects
            .write()
            .insert(url.into(), MemoryObject::Body(data.into()));
    }

    /// Answer `url` with a non-success status.
    pub fn insert_status(&self, url: impl Into<String>, status: u16) {
        self.objects
            .write()
            .insert(url.into(), MemoryObject::Status(status));
    }

    /// Serve `prefix` at `url`, then fail the stream.
    pub fn insert_broken(&self, url: impl Into<String>, prefix: impl Into<Bytes>) {
        self.objects
            .write()
            .insert(url.into(), MemoryObject::Broken(prefix.into()));
    }

    /// Serve `prefix` at `url`, then hang: the stream stays open but never
    /// yields another item.
    pub fn insert_stalled(&self, url: impl Into<String>, prefix: impl Into<Bytes>) {
        self.objects
            .write()
            .insert(url.into(), MemoryObject::Stalled(prefix.into()));
    }

    /// Number of `get` calls so far.
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Number of streams that are still alive.
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    fn chunks(&self, body: &Bytes) -> Vec<Result<Bytes, StorageError>> {
        if self.chunk_size == 0 || body.len() <= self.chunk_size {
            return if body.is_empty() {
                Vec::new()
            } else {
                vec![Ok(body.clone())]
            };
        }
        (0..body.len())
            .step_by(self.chunk_size)
            .map(|start| {
                let end: usize = (start + self.chunk_size).min(body.len());
                Ok(body.slice(start..end))
            })
            .collect()
    }

    fn tracked(&self, chunks: Vec<Result<Bytes, StorageError>>) -> ByteStream {
        self.tracked_stream(stream::iter(chunks).boxed())
    }

    fn tracked_stream(&self, inner: ByteStream) -> ByteStream {
        self.open_streams.fetch_add(1, Ordering::SeqCst);
        TrackedStream {
            inner,
            open_streams: self.open_streams.clone(),
        }
        .boxed()
    }
}

#[async_trait]
impl UrlFetcher for MemoryFetcher {
    async fn get(&self, url: &str) -> Result<ByteStream, StorageError> {
        self.requests.fetch_add(1, Ordering::Relaxed);

        let object: Option<MemoryObject> = self.objects.read().get(url).cloned();
        match object {
            None => Err(StorageError::Unreachable {
                url: url.to_string(),
                message: "no such object in memory fetcher".to_string(),
            }),
            Some(MemoryObject::Status(status)) => Err(StorageError::HttpStatus {
                url: url.to_string(),
                status,
            }),
            Some(MemoryObject::Body(body)) => Ok(self.tracked(self.chunks(&body))),
            Some(MemoryObject::Broken(prefix)) => {
                let mut chunks: Vec<Result<Bytes, StorageError>> = self.chunks(&prefix);
                chunks.push(Err(StorageError::Stream {
                    url: url.to_string(),
                    message: "connection reset".to_string(),
                }));
                Ok(self.tracked(chunks))
            }
            Some(MemoryObject::Stalled(prefix)) => {
                let head = stream::iter(self.chunks(&prefix));
                let tail = stream::pending::<Result<Bytes, StorageError>>();
                Ok(self.tracked_stream(head.chain(tail).boxed()))
            }
        }
    }
}

/// Stream wrapper that decrements the open-stream counter when dropped.
struct TrackedStream {
    inner: ByteStream,
    open_streams: Arc<AtomicUsize>,
}

impl Stream for TrackedStream {
    type Item = Result<Bytes, StorageError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.open_streams.fetch_sub(1, Ordering::SeqCst);
    }
}
