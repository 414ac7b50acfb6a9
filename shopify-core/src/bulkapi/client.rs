//! Bulk operation controller.

use super::fetch::{HttpFetcher, ResultFetcher};
use super::operation::{BulkOperation, OperationId, Status, UserError};
use super::reconcile::{self, BulkRecord};
use super::Error;
use crate::client;
use crate::graphql::{self, HttpTransport, ThrottlePolicy, Transport};
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

const RUN_QUERY_MUTATION: &str = r#"mutation bulkOperationRunQuery($query: String!) {
  bulkOperationRunQuery(query: $query) {
    bulkOperation { id status }
    userErrors { field message }
  }
}"#;

const CANCEL_MUTATION: &str = r#"mutation bulkOperationCancel($id: ID!) {
  bulkOperationCancel(id: $id) {
    bulkOperation { id status }
    userErrors { field message }
  }
}"#;

const CURRENT_QUERY: &str = r#"query {
  currentBulkOperation {
    id
    status
    errorCode
    createdAt
    completedAt
    objectCount
    fileSize
    url
    partialDataUrl
    query
  }
}"#;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunQueryData {
    bulk_operation_run_query: Option<MutationPayload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelData {
    bulk_operation_cancel: Option<MutationPayload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentData {
    current_bulk_operation: Option<BulkOperation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MutationPayload {
    bulk_operation: Option<OperationRef>,
    #[serde(default)]
    user_errors: Vec<UserError>,
}

#[derive(Deserialize)]
struct OperationRef {
    id: Option<OperationId>,
}

/// Client for running bulk queries against a single store.
///
/// A store runs at most one bulk query at a time. The controller does not
/// lock across processes; [`run_bulk_query`](Self::run_bulk_query) and
/// [`run_only`](Self::run_only) wait for any in-flight operation before
/// submitting, while [`submit`](Self::submit) does not.
///
/// # Example
///
/// ```no_run
/// use shopify_core::bulkapi::Client as BulkClient;
/// use shopify_core::client;
/// use shopify_core::model::Order;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = client::Builder::new().credentials_from_env().build()?;
/// let bulk_client = BulkClient::new(config)?.with_poll_interval(Duration::from_secs(5));
///
/// let orders: Vec<Order> = bulk_client
///     .run_bulk_query(
///         "{ orders { edges { node { id name lineItems { edges { node { id name quantity } } } } } } }",
///         &CancellationToken::new(),
///     )
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Client<T = HttpTransport, F = HttpFetcher> {
    graphql: graphql::Client<T>,
    fetcher: F,
    poll_interval: Duration,
}

impl Client {
    /// Creates a controller that talks to the store described by `config`.
    ///
    /// Result downloads use their own HTTP client, which is not bound by the
    /// API request timeout.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub fn new(config: client::Client) -> Result<Self, Error> {
        let fetcher = HttpFetcher::from_config(&config).map_err(|source| Error::Fetch { source })?;
        let transport = HttpTransport::new(config).map_err(|source| Error::GraphQL { source })?;
        Ok(Self::with_parts(transport, fetcher))
    }
}

impl<T: Transport, F: ResultFetcher> Client<T, F> {
    /// Creates a controller over a custom transport and result fetcher.
    pub fn with_parts(transport: T, fetcher: F) -> Self {
        Self {
            graphql: graphql::Client::new(transport),
            fetcher,
            poll_interval: Duration::from_secs(crate::DEFAULT_POLL_INTERVAL_SECS),
        }
    }

    /// Sets the interval between status polls.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Sets the throttling policy of the underlying GraphQL client.
    pub fn with_throttle_policy(mut self, throttle: ThrottlePolicy) -> Self {
        self.graphql = self.graphql.with_throttle_policy(throttle);
        self
    }

    /// Returns the interval between status polls.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Returns the GraphQL client.
    pub fn graphql(&self) -> &graphql::Client<T> {
        &self.graphql
    }

    /// Returns the result fetcher.
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Submits `query` as a new bulk operation and returns its id.
    ///
    /// Does not check whether another operation is in flight; the service
    /// rejects the submission with a user error in that case.
    ///
    /// # Errors
    ///
    /// [`Error::UserErrors`] if the service rejects the query and
    /// [`Error::MissingOperationId`] if it accepts it without an id.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn submit(&self, query: &str) -> Result<OperationId, Error> {
        let data: RunQueryData = self
            .graphql
            .execute(RUN_QUERY_MUTATION, serde_json::json!({ "query": query }))
            .await
            .map_err(graphql_error)?;

        let payload = data
            .bulk_operation_run_query
            .ok_or(Error::MissingOperationId)?;
        if !payload.user_errors.is_empty() {
            return Err(Error::UserErrors(payload.user_errors));
        }

        let id = payload
            .bulk_operation
            .and_then(|operation| operation.id)
            .ok_or(Error::MissingOperationId)?;
        tracing::debug!(%id, "submitted bulk operation");
        Ok(id)
    }

    /// Returns the store's current bulk operation, if there is one.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn current(&self) -> Result<Option<BulkOperation>, Error> {
        self.fetch_current(&CancellationToken::new()).await
    }

    /// Returns the current bulk operation, checking it against `expected_id`.
    ///
    /// # Errors
    ///
    /// [`Error::OperationIdMismatch`] if an operation exists and its id
    /// differs from `expected_id`.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn operation(
        &self,
        expected_id: Option<&OperationId>,
    ) -> Result<Option<BulkOperation>, Error> {
        let current = self.current().await?;
        if let Some(operation) = &current {
            check_id(expected_id, operation)?;
        }
        Ok(current)
    }

    /// Polls every `interval` until the current operation is no longer in
    /// flight and returns that snapshot.
    ///
    /// Returns `None` if the store has no bulk operation.
    ///
    /// # Errors
    ///
    /// [`Error::Cancelled`] if `cancel` fires while waiting.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn wait_until_terminal(
        &self,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<BulkOperation>, Error> {
        let snapshot = self.fetch_current(cancel).await?;
        self.poll_until_terminal(snapshot, interval, cancel).await
    }

    /// Cancels the current operation and waits until it has stopped.
    ///
    /// Only CREATED and RUNNING operations are sent a cancel request. An
    /// operation already CANCELING is waited on; anything else is left
    /// untouched, so repeated calls are harmless.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn cancel(&self, cancel: &CancellationToken) -> Result<(), Error> {
        let snapshot = match self.fetch_current(cancel).await? {
            Some(operation) if operation.status.is_cancelable() => {
                self.request_cancel(&operation.id).await?;
                self.fetch_current(cancel).await?
            }
            Some(operation) if operation.status.is_in_flight() => Some(operation),
            Some(operation) => {
                tracing::debug!(id = %operation.id, status = %operation.status, "bulk operation already finished");
                return Ok(());
            }
            None => {
                tracing::debug!("no bulk operation to cancel");
                return Ok(());
            }
        };
        self.poll_until_terminal(snapshot, self.poll_interval, cancel)
            .await?;
        Ok(())
    }

    /// Waits for the current operation and returns the URL of its result.
    ///
    /// Returns `None` when the operation completed without producing any
    /// objects.
    ///
    /// # Errors
    ///
    /// - [`Error::OperationIdMismatch`] if `expected_id` is given and another
    ///   operation is current. Checked before waiting.
    /// - [`Error::NoOperation`] if the store has no bulk operation.
    /// - [`Error::OperationFailed`] if the operation failed, expired, ended in
    ///   an unrecognised state or reports an error code.
    /// - [`Error::OperationCanceled`] if the operation was canceled.
    /// - [`Error::InvalidResultUrl`] if the result URL is missing or malformed.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn resolve_result_url(
        &self,
        expected_id: Option<&OperationId>,
        cancel: &CancellationToken,
    ) -> Result<Option<Url>, Error> {
        let snapshot = self.operation(expected_id).await?;
        if snapshot.is_none() {
            return Err(Error::NoOperation);
        }

        let operation = self
            .poll_until_terminal(snapshot, self.poll_interval, cancel)
            .await?
            .ok_or(Error::NoOperation)?;
        check_id(expected_id, &operation)?;

        match operation.status {
            Status::Completed => {}
            Status::Canceled => {
                return Err(Error::OperationCanceled { id: operation.id });
            }
            status => {
                return Err(Error::OperationFailed {
                    id: operation.id,
                    status,
                    error_code: operation.error_code,
                });
            }
        }

        if operation.error_code().is_some() {
            return Err(Error::OperationFailed {
                id: operation.id,
                status: operation.status,
                error_code: operation.error_code,
            });
        }

        if operation.object_count == 0 {
            tracing::debug!(id = %operation.id, "bulk operation completed without objects");
            return Ok(None);
        }

        let Some(raw) = operation.url else {
            return Err(Error::InvalidResultUrl {
                id: operation.id,
                url: None,
                source: None,
            });
        };
        match Url::parse(&raw) {
            Ok(url) => {
                tracing::debug!(
                    id = %operation.id,
                    objects = operation.object_count,
                    file_size = operation.file_size,
                    "bulk operation completed"
                );
                Ok(Some(url))
            }
            Err(source) => Err(Error::InvalidResultUrl {
                id: operation.id,
                url: Some(raw),
                source: Some(source),
            }),
        }
    }

    /// Waits for the current operation, whatever its id, and returns its
    /// result URL.
    pub async fn current_result_url(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<Url>, Error> {
        self.resolve_result_url(None, cancel).await
    }

    /// Waits for any in-flight operation to finish, then submits `query`
    /// without waiting for its result.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn run_only(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<OperationId, Error> {
        if let Some(previous) = self.wait_until_terminal(self.poll_interval, cancel).await? {
            tracing::debug!(id = %previous.id, status = %previous.status, "previous bulk operation finished");
        }
        self.submit(query).await
    }

    /// Downloads the result at `url` and rebuilds the nested records.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn fetch_results<P: BulkRecord>(&self, url: &Url) -> Result<Vec<P>, Error> {
        let file = self
            .fetcher
            .fetch(url)
            .await
            .map_err(|source| Error::Fetch { source })?;
        reconcile::parse_file(file.path())
            .await
            .map_err(|source| Error::Reconcile { source })
    }

    /// Runs `query` as a bulk operation and returns the reconciled records.
    ///
    /// Waits for any in-flight operation before submitting, then waits for
    /// the submitted one to finish. An operation that completes without
    /// objects yields an empty vector.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn run_bulk_query<P: BulkRecord>(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<P>, Error> {
        let id = self.run_only(query, cancel).await?;
        match self.resolve_result_url(Some(&id), cancel).await? {
            Some(url) => self.fetch_results(&url).await,
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_current(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<BulkOperation>, Error> {
        let data: CurrentData = self
            .graphql
            .execute_cancellable(CURRENT_QUERY, serde_json::Value::Null, cancel)
            .await
            .map_err(graphql_error)?;
        Ok(data.current_bulk_operation)
    }

    async fn request_cancel(&self, id: &OperationId) -> Result<(), Error> {
        let data: CancelData = self
            .graphql
            .execute(CANCEL_MUTATION, serde_json::json!({ "id": id }))
            .await
            .map_err(graphql_error)?;

        if let Some(payload) = data.bulk_operation_cancel {
            if !payload.user_errors.is_empty() {
                return Err(Error::UserErrors(payload.user_errors));
            }
        }
        tracing::debug!(%id, "requested bulk operation cancel");
        Ok(())
    }

    async fn poll_until_terminal(
        &self,
        mut snapshot: Option<BulkOperation>,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<BulkOperation>, Error> {
        loop {
            let in_flight = match &snapshot {
                Some(operation) if operation.status.is_in_flight() => {
                    tracing::trace!(id = %operation.id, status = %operation.status, "bulk operation in flight");
                    true
                }
                _ => false,
            };
            if !in_flight {
                return Ok(snapshot);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(interval) => {}
            }
            snapshot = self.fetch_current(cancel).await?;
        }
    }
}

fn graphql_error(source: graphql::Error) -> Error {
    match source {
        graphql::Error::Cancelled => Error::Cancelled,
        source => Error::GraphQL { source },
    }
}

fn check_id(expected_id: Option<&OperationId>, operation: &BulkOperation) -> Result<(), Error> {
    match expected_id {
        Some(expected) if *expected != operation.id => Err(Error::OperationIdMismatch {
            expected: expected.clone(),
            actual: operation.id.clone(),
        }),
        _ => Ok(()),
    }
}
