//! HTTP transport for remote configuration sources.
//!
//! Every call is bounded by a timeout. Dropping the returned future cancels
//! the request; callers apply results only after the future completes, so a
//! cancelled call leaves no trace.

use errors::{ConfigError, Result};
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::debug;

/// Remote I/O settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOptions {
    /// Upper bound for a single fetch or upload.
    pub timeout: Duration,
}

impl Default for RemoteOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

pub(crate) fn build_client(options: &RemoteOptions) -> Result<Client> {
    Client::builder()
        .timeout(options.timeout)
        .build()
        .map_err(|e| ConfigError::io("http client", e))
}

/// GET `url` and return the body. Non-success status is an I/O error.
pub(crate) async fn fetch(client: &Client, url: &Url, timeout: Duration) -> Result<Vec<u8>> {
    let request = async {
        let response = client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ConfigError::io(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConfigError::io(url, format!("unexpected status {}", status)));
        }

        let body = response.bytes().await.map_err(|e| ConfigError::io(url, e))?;
        debug!(url = %url, bytes = body.len(), "Fetched remote configuration");
        Ok(body.to_vec())
    };

    tokio::time::timeout(timeout, request)
        .await
        .map_err(|_| ConfigError::io(url, format!("timed out after {:?}", timeout)))?
}

/// PUT `body` to `url`. Non-success status is an I/O error.
pub(crate) async fn upload(client: &Client, url: &Url, body: Vec<u8>, timeout: Duration) -> Result<()> {
    let len = body.len();
    let request = async {
        let response = client
            .put(url.clone())
            .timeout(timeout)
            .body(body)
            .send()
            .await
            .map_err(|e| ConfigError::io(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConfigError::io(url, format!("unexpected status {}", status)));
        }
        debug!(url = %url, bytes = len, "Uploaded configuration");
        Ok(())
    };

    tokio::time::timeout(timeout, request)
        .await
        .map_err(|_| ConfigError::io(url, format!("timed out after {:?}", timeout)))?
}
