//! Error types for remote fetches.

use thiserror::Error;

/// Errors that can occur while fetching remote content.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// The endpoint could not be reached (DNS, connect, TLS, bad URL).
    #[error("Request to {url} failed: {message}")]
    Unreachable { url: String, message: String },

    /// The endpoint answered with a non-success status.
    #[error("GET {url} returned status {status}")]
    HttpStatus { url: String, status: u16 },

    /// The body stream broke after the response started.
    #[error("Stream from {url} failed: {message}")]
    Stream { url: String, message: String },

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl StorageError {
    /// HTTP status of the failed response, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            StorageError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
