//! `reqwest`-backed fetcher.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};

use crate::error::StorageError;
use crate::traits::{ByteStream, UrlFetcher};

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,
    /// Overall per-request timeout, including body streaming (None = no timeout).
    pub timeout: Option<Duration>,
    /// User-Agent header value.
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            timeout: None,
            user_agent: concat!("s3fuse/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpSettings {
    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the overall request timeout.
    ///
    /// # Arguments
    /// * `timeout` - Request timeout (None = no timeout)
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the User-Agent header.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Fetches content over HTTP(S) with a shared connection pool.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Build a fetcher from settings.
    ///
    /// # Arguments
    /// * `settings` - Client configuration
    pub fn new(settings: HttpSettings) -> Result<Self, StorageError> {
        let mut builder = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .user_agent(settings.user_agent);
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }
        let client: Client = builder
            .build()
            .map_err(|e| StorageError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an already configured client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UrlFetcher for HttpFetcher {
    async fn get(&self, url: &str) -> Result<ByteStream, StorageError> {
        let response: Response =
            self.client
                .get(url)
                .send()
                .await
                .map_err(|e| StorageError::Unreachable {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;

        let status: StatusCode = response.status();
        if !status.is_success() {
            return Err(StorageError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        tracing::debug!(
            "GET {} -> {} (content-length {:?})",
            url,
            status,
            response.content_length()
        );

        let owned_url: String = url.to_string();
        let stream: ByteStream = response
            .bytes_stream()
            .map(move |chunk| {
                chunk.map_err(|e| StorageError::Stream {
                    url: owned_url.clone(),
                    message: e.to_string(),
                })
            })
            .boxed();
        Ok(stream)
    }
}
