//! Unofficial Rust SDK for Shopify GraphQL bulk operations.
//!
//! This crate runs asynchronous bulk exports against a store's GraphQL API and
//! rebuilds the nested records from the flat JSONL result file.
//!
//! # Examples
//!
//! ```no_run
//! use shopify_core::bulkapi::Client as BulkClient;
//! use shopify_core::client::{self, Credentials};
//! use shopify_core::model::Product;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = client::Builder::new()
//!     .credentials(Credentials {
//!         store_domain: "my-store.myshopify.com".to_string(),
//!         access_token: Some("shpat_...".to_string()),
//!         api_key: None,
//!         password: None,
//!         storefront_access_token: None,
//!     })
//!     .build()?;
//!
//! let bulk_client = BulkClient::new(client)?;
//! let products: Vec<Product> = bulk_client
//!     .run_bulk_query("{ products { edges { node { id title } } } }", &CancellationToken::new())
//!     .await?;
//! # Ok(())
//! # }
//! ```

/// Default Shopify Admin API version.
pub const DEFAULT_API_VERSION: &str = "2022-07";

/// Default connection timeout for HTTP requests (30 seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default request timeout for API requests (120 seconds).
///
/// Result downloads are not bounded by it; see
/// [`client::Builder::download_timeout`].
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Default interval between bulk operation status polls (1 second).
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 1;

/// Store configuration and credentials.
pub mod client;

/// Global identifier parsing.
pub mod gid;

/// GraphQL transport, error envelope and throttling.
pub mod graphql;

/// Typed records produced by bulk exports.
pub mod model;

/// Bulk operations: lifecycle control, result download and reconciliation.
pub mod bulkapi;
