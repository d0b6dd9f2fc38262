//! Fetcher trait for remote content.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::StorageError;

/// Body of a GET response, delivered as a sequence of chunks.
///
/// Chunk boundaries are whatever the transport produced; consumers must not
/// assume any particular size. The stream is closed by dropping it.
pub type ByteStream = BoxStream<'static, Result<Bytes, StorageError>>;

/// Stream-producing GET-by-URL operation.
///
/// Implementations must check the response status: a non-success status is
/// an error, never an empty stream.
#[async_trait]
pub trait UrlFetcher: Send + Sync {
    /// Start fetching `url` from the beginning.
    ///
    /// # Arguments
    /// * `url` - Opaque remote locator taken from the manifest
    ///
    /// # Returns
    /// The live body stream.
    async fn get(&self, url: &str) -> Result<ByteStream, StorageError>;
}
