//! Streaming GET-by-URL fetchers for the s3fuse virtual filesystem.
//!
//! The filesystem never interprets a file's URL; it hands it to a
//! [`UrlFetcher`] and consumes the returned [`ByteStream`] sequentially.
//!
//! - [`HttpFetcher`] - `reqwest`-backed fetcher for real mounts
//! - [`MemoryFetcher`] - in-memory fetcher with configurable chunking and
//!   failure injection, for tests

mod error;
mod http;
mod memory;
mod traits;

pub use error::StorageError;
pub use http::{HttpFetcher, HttpSettings};
pub use memory::MemoryFetcher;
pub use traits::{ByteStream, UrlFetcher};
