//! `reqwest`-backed GraphQL transport.

use super::{Error, Request, Response, Transport};
use crate::client;

/// Posts GraphQL requests as JSON to the configured store endpoint.
///
/// The transport does not retry; network failures and non-2xx statuses are
/// returned to the caller as-is.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    config: client::Client,
    http_client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport for the given store configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the HTTP client cannot be built.
    pub fn new(config: client::Client) -> Result<Self, Error> {
        let http_client = config
            .build_http_client()
            .map_err(|source| Error::Config { source })?;
        Ok(Self {
            config,
            http_client,
        })
    }

    /// Returns the store configuration.
    pub fn config(&self) -> &client::Client {
        &self.config
    }

    /// Returns the underlying HTTP client.
    pub fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    async fn execute(&self, request: &Request) -> Result<Response, Error> {
        let builder = self
            .http_client
            .post(self.config.endpoint().clone())
            .json(request);

        let response = self
            .config
            .authorize(builder)
            .send()
            .await
            .map_err(|source| Error::Http { source })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|source| Error::Http { source })?;

        if !status.is_success() {
            return Err(Error::Status {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        serde_json::from_slice(&body).map_err(|source| Error::Decode { source })
    }
}
