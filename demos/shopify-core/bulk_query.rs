//! Example of running a bulk query and reconciling its result.
//!
//! This example demonstrates:
//! - Loading store credentials from the environment
//! - Cancelling a bulk operation left over from an earlier run
//! - Running a bulk query and rebuilding nested products
//! - Stopping the wait with Ctrl-C
//!
//! Set `STORE_NAME` and `STORE_ACCESS_TOKEN` (or `STORE_API_KEY` and
//! `STORE_PASSWORD`) and run with `RUST_LOG=shopify_core=debug` to see the
//! lifecycle events.

use shopify_core::bulkapi::Client as BulkClient;
use shopify_core::client;
use shopify_core::graphql::ThrottlePolicy;
use shopify_core::model::Product;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const PRODUCTS_QUERY: &str = r#"{
  products {
    edges {
      node {
        id
        title
        handle
        variants {
          edges { node { id title sku price } }
        }
        metafields {
          edges { node { id namespace key value type } }
        }
      }
    }
  }
}"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = client::Builder::new()
        .credentials_from_env()
        .api_version(shopify_core::DEFAULT_API_VERSION)
        .build()?;
    info!("Using endpoint {}", config.endpoint());

    let bulk_client = BulkClient::new(config)?
        .with_poll_interval(Duration::from_secs(2))
        .with_throttle_policy(ThrottlePolicy::SleepThenRetry { max_retries: 3 });

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    info!("Cancelling any running bulk operation");
    bulk_client.cancel(&cancel).await?;

    info!("Running bulk query");
    match bulk_client
        .run_bulk_query::<Product>(PRODUCTS_QUERY, &cancel)
        .await
    {
        Ok(products) => {
            info!("Fetched {} products", products.len());
            for product in products.iter().take(10) {
                info!(
                    "{} ({}): {} variants, {} metafields",
                    product.title,
                    product.handle,
                    product.variants.len(),
                    product.metafields.len()
                );
            }
        }
        Err(shopify_core::bulkapi::Error::Cancelled) => {
            info!("Interrupted, cancelling bulk operation");
            bulk_client.cancel(&CancellationToken::new()).await?;
        }
        Err(e) => {
            error!("Bulk query failed: {e}");
        }
    }

    Ok(())
}
