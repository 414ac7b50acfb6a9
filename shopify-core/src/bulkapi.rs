//! Bulk operations for exporting large data sets.
//!
//! A bulk operation runs a GraphQL query asynchronously on the service and
//! writes every node it visits to a JSONL file. This module provides:
//! - **Lifecycle control**: submit, poll, cancel and resolve the result URL
//! - **Download**: stream the result file to a temporary file
//! - **Reconciliation**: rebuild nested records from the flat result lines
//!
//! # Example
//!
//! ```no_run
//! use shopify_core::bulkapi::Client as BulkClient;
//! use shopify_core::client;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = client::Builder::new().credentials_from_env().build()?;
//! let bulk_client = BulkClient::new(config)?;
//! let cancel = CancellationToken::new();
//!
//! let id = bulk_client.run_only("{ products { edges { node { id } } } }", &cancel).await?;
//! if let Some(url) = bulk_client.resolve_result_url(Some(&id), &cancel).await? {
//!     println!("results at {url}");
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod operation;
pub mod fetch;
pub mod reconcile;
pub mod resolver;

pub use client::Client;
pub use fetch::{HttpFetcher, ResultFetcher};
pub use operation::{BulkOperation, OperationId, Status, UserError};
pub use reconcile::{BulkRecord, ChildField, Reconciler};
pub use resolver::{ChildRecord, ResourceKind};

use crate::graphql;

/// Error type for bulk operations.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A GraphQL request failed.
    #[error("GraphQL request failed: {source}")]
    GraphQL {
        #[source]
        source: graphql::Error,
    },

    /// The service rejected the request.
    #[error("bulk operation request rejected: {}", join_user_errors(.0))]
    UserErrors(Vec<UserError>),

    /// The service accepted a submission but returned no operation id.
    #[error("bulk operation was submitted but no id was returned")]
    MissingOperationId,

    /// The store has no bulk operation.
    #[error("no bulk operation found")]
    NoOperation,

    /// The current operation is not the one the caller asked about.
    #[error("expected bulk operation {expected}, but the current one is {actual}")]
    OperationIdMismatch {
        expected: OperationId,
        actual: OperationId,
    },

    /// The operation failed, expired or reported an error code.
    #[error(
        "bulk operation {id} ended with status {status} (error code: {})",
        .error_code.as_deref().unwrap_or("none")
    )]
    OperationFailed {
        id: OperationId,
        status: Status,
        error_code: Option<String>,
    },

    /// The operation was canceled.
    #[error("bulk operation {id} was canceled")]
    OperationCanceled { id: OperationId },

    /// A completed operation's result URL is missing or malformed.
    #[error("bulk operation {id} has no usable result URL: {url:?}")]
    InvalidResultUrl {
        id: OperationId,
        url: Option<String>,
        #[source]
        source: Option<url::ParseError>,
    },

    /// Downloading the result file failed.
    #[error("failed to download bulk result: {source}")]
    Fetch {
        #[source]
        source: fetch::Error,
    },

    /// The result file could not be reconciled.
    #[error("failed to reconcile bulk result: {source}")]
    Reconcile {
        #[source]
        source: reconcile::Error,
    },

    /// The caller's cancellation token fired while waiting.
    #[error("cancelled while waiting for bulk operation")]
    Cancelled,
}

impl Error {
    /// Returns true if the service rejected a request because of throttling.
    pub fn is_throttled(&self) -> bool {
        matches!(self, Error::GraphQL { source } if source.is_throttled())
    }
}

fn join_user_errors(errors: &[UserError]) -> String {
    errors
        .iter()
        .map(UserError::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let error = Error::UserErrors(vec![
            UserError {
                field: Some(vec!["query".to_string()]),
                message: "Invalid bulk query".to_string(),
            },
            UserError {
                field: None,
                message: "try again".to_string(),
            },
        ]);
        assert_eq!(
            error.to_string(),
            "bulk operation request rejected: query: Invalid bulk query; try again"
        );

        let error = Error::OperationFailed {
            id: OperationId::from("gid://shopify/BulkOperation/1"),
            status: Status::Failed,
            error_code: None,
        };
        assert_eq!(
            error.to_string(),
            "bulk operation gid://shopify/BulkOperation/1 ended with status FAILED (error code: none)"
        );
    }
}
