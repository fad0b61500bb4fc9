/*
[INPUT]:  HTTP configuration (base URL, timeouts, chunk size)
[OUTPUT]: Configured reqwest client ready for upload API calls
[POS]:    HTTP layer - core client implementation
[UPDATE]: When adding connection options or changing client behavior
*/

use crate::http::{Result, UploadError};
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default size of a single uploaded chunk (256 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub chunk_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// HTTP client for the chunked upload API
#[derive(Debug, Clone)]
pub struct UploadClient {
    http_client: Client,
    base_url: Url,
    chunk_size: usize,
}

impl UploadClient {
    /// Create a new client with default configuration
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_config(ClientConfig::default(), base_url)
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClientConfig, base_url: &str) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(UploadError::Config(
                "chunk_size must be greater than zero".to_string(),
            ));
        }

        let http_client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: normalize_base_url(base_url)?,
            chunk_size: config.chunk_size,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Resolve a server-provided location against the base URL
    pub(crate) fn resolve(&self, location: &str) -> Result<Url> {
        Ok(self.base_url.join(location)?)
    }

    /// Build request builder for an endpoint relative to the base URL
    pub(crate) fn request(&self, method: Method, endpoint: &str) -> Result<RequestBuilder> {
        let url = self.base_url.join(endpoint)?;
        Ok(self.http_client.request(method, url))
    }

    /// Send a request and decode its JSON body, racing the cancellation token
    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<T> {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UploadError::Canceled),
            res = builder.send() => res?,
        };

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(UploadError::api_error(status, message));
        }

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UploadError::Canceled),
            res = response.bytes() => res?,
        };

        Ok(serde_json::from_slice(&body)?)
    }
}

/// Joining relative endpoints only keeps the base path when it ends in '/'
fn normalize_base_url(base_url: &str) -> Result<Url> {
    let mut url = Url::parse(base_url)?;
    if url.cannot_be_a_base() {
        return Err(UploadError::Config(format!(
            "base url cannot be used as a base: {base_url}"
        )));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
