//! Downloads bulk operation results.

use crate::client;
use futures_util::StreamExt;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use url::Url;

/// Errors that can occur while downloading a result file.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The request failed or the body stream broke off.
    #[error("download failed: {source}")]
    Http {
        #[source]
        source: reqwest::Error,
    },

    /// The storage service answered with a non-2xx status.
    #[error("non-2xx status code: {status} body: {body:?}")]
    Status {
        status: reqwest::StatusCode,
        /// Response body, or a note saying why it could not be read.
        body: String,
    },

    /// The download HTTP client could not be built.
    #[error("Client configuration error: {source}")]
    Config {
        #[source]
        source: client::Error,
    },

    /// The temporary file could not be created or written.
    #[error("failed to write result file: {source}")]
    Io {
        #[source]
        source: std::io::Error,
    },
}

/// Retrieves the object behind a result URL.
///
/// The returned file is removed when dropped.
#[async_trait::async_trait]
pub trait ResultFetcher: Send + Sync {
    /// Downloads `url` completely into a temporary file.
    async fn fetch(&self, url: &Url) -> Result<NamedTempFile, Error>;
}

/// Streams result files over HTTP into a temporary `.jsonl` file.
///
/// Result URLs are pre-signed, so no store credentials are sent.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    http_client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher over an existing HTTP client.
    ///
    /// Any total timeout set on `http_client` covers the whole streamed body.
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Creates a fetcher for the store described by `config`.
    ///
    /// Only the connect timeout and the optional download timeout apply.
    pub fn from_config(config: &client::Client) -> Result<Self, Error> {
        let http_client = config
            .build_download_client()
            .map_err(|source| Error::Config { source })?;
        Ok(Self::new(http_client))
    }
}

/// Keeps an error body when it was readable and says so when it was not.
fn error_body(body: Result<String, reqwest::Error>) -> String {
    body.unwrap_or_else(|error| format!("<body unavailable: {error}>"))
}

#[async_trait::async_trait]
impl ResultFetcher for HttpFetcher {
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    async fn fetch(&self, url: &Url) -> Result<NamedTempFile, Error> {
        let response = self
            .http_client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| Error::Http { source })?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response.text().await);
            return Err(Error::Status { status, body });
        }

        let temp = tempfile::Builder::new()
            .prefix("bulk-")
            .suffix(".jsonl")
            .tempfile()
            .map_err(|source| Error::Io { source })?;
        let mut file = tokio::fs::File::from_std(temp.reopen().map_err(|source| Error::Io { source })?);

        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| Error::Http { source })?;
            file.write_all(&chunk)
                .await
                .map_err(|source| Error::Io { source })?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|source| Error::Io { source })?;

        tracing::debug!(bytes = written, path = %temp.path().display(), "downloaded bulk result");
        Ok(temp)
    }
}
