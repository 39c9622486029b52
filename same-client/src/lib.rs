//! SAME HTTP Clients
//!
//! Thin, typed clients for the two cluster APIs the CLI talks to:
//! - [`KubeSecretClient`]: Kubernetes secrets, implementing
//!   [`same_core::secret::SecretStore`]
//! - [`PipelinesClient`]: the Kubeflow Pipelines v1beta1 API
//!
//! # Example
//!
//! ```no_run
//! use same_client::PipelinesClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = PipelinesClient::new("http://localhost:8888");
//!     let pipelines = client.list_pipelines(None).await?;
//!     println!("{} pipeline(s)", pipelines.total_size);
//!     Ok(())
//! }
//! ```

pub mod error;
mod pipelines;
mod secrets;

pub use error::{ClientError, Result};
pub use pipelines::PipelinesClient;
pub use secrets::KubeSecretClient;

use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Build a reqwest client, optionally bounding every request
pub fn http_client(timeout: Option<Duration>) -> Result<Client> {
    let mut builder = Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

fn normalize_base_url(base_url: impl Into<String>) -> String {
    base_url.into().trim_end_matches('/').to_string()
}

/// Handle an API response and deserialize JSON
///
/// Checks the status code and returns an API error with the response body
/// if the request failed.
async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ClientError::api_error(status.as_u16(), error_text));
    }

    response
        .json()
        .await
        .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
}

/// Handle a response whose body carries nothing of interest (e.g. DELETE)
async fn handle_empty_response(response: reqwest::Response) -> Result<()> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ClientError::api_error(status.as_u16(), error_text));
    }

    Ok(())
}
