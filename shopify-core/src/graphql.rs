//! GraphQL request execution.
//!
//! This module provides:
//! - **[`Transport`]**: the seam that executes one request against the service
//! - **[`HttpTransport`]**: the default transport, a JSON POST over `reqwest`
//! - **[`Client`]**: decodes `data`, surfaces `errors` and applies the
//!   [`ThrottlePolicy`] when the service reports it is throttling
//!
//! # Example
//!
//! ```no_run
//! use shopify_core::client::{self, Credentials};
//! use shopify_core::graphql::{Client as GraphQLClient, HttpTransport};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = client::Builder::new()
//!     .credentials_from_env()
//!     .build()?;
//!
//! let graphql = GraphQLClient::new(HttpTransport::new(config)?);
//! let shop: serde_json::Value = graphql
//!     .execute("{ shop { name } }", serde_json::json!({}))
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod throttle;
mod transport;

pub use throttle::{throttle_delay, ThrottlePolicy};
pub use transport::HttpTransport;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Message of the first error when the service throttles a request.
pub const THROTTLED_MESSAGE: &str = "Throttled";

/// A single GraphQL request.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    /// Query or mutation text.
    pub query: String,
    /// Variable bindings. Serialized only when non-null.
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub variables: serde_json::Value,
}

/// Decoded response envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Response {
    /// The `data` member, if any.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    /// Service-reported errors, in order.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub errors: Vec<GraphQLError>,
    /// The `extensions` member, if any.
    #[serde(default)]
    pub extensions: Option<Extensions>,
}

impl Response {
    /// Returns the cost envelope, if the service sent one.
    pub fn cost(&self) -> Option<&Cost> {
        self.extensions.as_ref().and_then(|e| e.cost.as_ref())
    }

    /// Returns true if the first error is the throttling signal.
    pub fn is_throttled(&self) -> bool {
        self.errors
            .first()
            .is_some_and(|error| error.message == THROTTLED_MESSAGE)
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// One entry of the `errors` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    /// Human-readable message.
    pub message: String,
    /// Source locations in the query text.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub locations: Vec<Location>,
}

/// Location of an error in the query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
}

/// A non-empty list of GraphQL errors; displays as its first message.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphQLErrors(pub Vec<GraphQLError>);

impl GraphQLErrors {
    /// Returns the first message, which represents the whole failure.
    pub fn message(&self) -> &str {
        self.0.first().map(|e| e.message.as_str()).unwrap_or_default()
    }
}

impl fmt::Display for GraphQLErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// The `extensions` member.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Extensions {
    /// Query cost accounting.
    #[serde(default)]
    pub cost: Option<Cost>,
}

/// Query cost accounting returned with every admin response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cost {
    /// Cost the service computed for the request before running it.
    #[serde(default)]
    pub requested_query_cost: f64,
    /// Cost actually charged, absent when the request was throttled.
    #[serde(default)]
    pub actual_query_cost: Option<f64>,
    /// Budget state after the request.
    #[serde(default)]
    pub throttle_status: ThrottleStatus,
}

/// Leaky-bucket state of the store's query budget.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrottleStatus {
    /// Bucket size.
    #[serde(default)]
    pub maximum_available: f64,
    /// Points currently available.
    #[serde(default)]
    pub currently_available: f64,
    /// Points restored per second.
    #[serde(default)]
    pub restore_rate: f64,
}

/// Errors that can occur while executing a GraphQL request.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The HTTP request could not be sent or its body could not be read.
    #[error("HTTP request failed: {source}")]
    Http {
        #[source]
        source: reqwest::Error,
    },

    /// The service answered with a non-2xx status.
    #[error("non-2xx status code: {status} body: {body:?}")]
    Status {
        /// HTTP status code.
        status: reqwest::StatusCode,
        /// Raw response body, kept for diagnostics.
        body: String,
    },

    /// The response body or its `data` member did not match the expected shape.
    #[error("failed to decode GraphQL response: {source}")]
    Decode {
        #[source]
        source: serde_json::Error,
    },

    /// The service reported errors for the request.
    #[error("GraphQL error: {errors}")]
    GraphQL {
        /// All reported errors; the first is representative.
        errors: GraphQLErrors,
        /// Cost envelope sent with the errors, if any.
        cost: Option<Cost>,
    },

    /// The response had neither `data` nor `errors`.
    #[error("GraphQL response contained no data")]
    MissingData,

    /// The caller's cancellation token fired during a throttle back-off.
    #[error("cancelled while backing off a throttled request")]
    Cancelled,

    /// The configuration could not produce a transport.
    #[error("Client configuration error: {source}")]
    Config {
        #[source]
        source: crate::client::Error,
    },
}

impl Error {
    /// Returns true if the service rejected the request because of throttling.
    pub fn is_throttled(&self) -> bool {
        matches!(self, Error::GraphQL { errors, .. } if errors.message() == THROTTLED_MESSAGE)
    }
}

/// Executes a single GraphQL request.
///
/// Implementations only move bytes: throttling, error envelopes and decoding
/// are handled by [`Client`]. A transport returns `Err` for transport-level
/// failures only (network errors, non-2xx statuses, undecodable bodies).
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` and returns the decoded response envelope.
    async fn execute(&self, request: &Request) -> Result<Response, Error>;
}

#[async_trait::async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn execute(&self, request: &Request) -> Result<Response, Error> {
        (**self).execute(request).await
    }
}

/// GraphQL client that decodes responses and applies the throttling policy.
#[derive(Clone, Debug)]
pub struct Client<T> {
    transport: T,
    throttle: ThrottlePolicy,
}

impl<T: Transport> Client<T> {
    /// Creates a client with the default [`ThrottlePolicy`].
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            throttle: ThrottlePolicy::default(),
        }
    }

    /// Sets the throttling policy.
    pub fn with_throttle_policy(mut self, throttle: ThrottlePolicy) -> Self {
        self.throttle = throttle;
        self
    }

    /// Returns the configured throttling policy.
    pub fn throttle_policy(&self) -> ThrottlePolicy {
        self.throttle
    }

    /// Returns the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Executes `query` with `variables` and decodes `data` into `D`.
    ///
    /// When the service reports throttling and sends a cost envelope, the
    /// computed back-off is slept before returning. Under
    /// [`ThrottlePolicy::SleepThenFail`] the throttled error is then returned;
    /// under [`ThrottlePolicy::SleepThenRetry`] the request is resent.
    ///
    /// # Errors
    ///
    /// Returns the transport error unchanged, [`Error::GraphQL`] when the
    /// service reports errors, [`Error::Decode`] when `data` has the wrong
    /// shape, and [`Error::MissingData`] when `data` is absent.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn execute<D: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<D, Error> {
        self.execute_cancellable(query, variables, &CancellationToken::new())
            .await
    }

    /// Like [`execute`](Self::execute), but a throttle back-off is cut short
    /// when `cancel` fires.
    ///
    /// # Errors
    ///
    /// As [`execute`](Self::execute), plus [`Error::Cancelled`] if `cancel`
    /// fires while sleeping off a throttled request.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn execute_cancellable<D: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<D, Error> {
        let request = Request {
            query: query.to_string(),
            variables,
        };

        let mut retries = 0;
        loop {
            let response = self.transport.execute(&request).await?;

            if response.errors.is_empty() {
                let data = response.data.ok_or(Error::MissingData)?;
                return serde_json::from_value(data).map_err(|source| Error::Decode { source });
            }

            if let Some(delay) = throttle_delay(&response) {
                tracing::debug!(delay_secs = delay.as_secs(), "request throttled, backing off");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }

                if self.throttle.allows_retry(retries) {
                    retries += 1;
                    tracing::debug!(attempt = retries, "retrying throttled request");
                    continue;
                }
            }

            let cost = response.cost().cloned();
            return Err(Error::GraphQL {
                errors: GraphQLErrors(response.errors),
                cost,
            });
        }
    }
}
