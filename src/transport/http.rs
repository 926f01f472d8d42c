//! Stateless HTTP transport.
//!
//! Every call is an independent `POST` carrying one JSON-RPC request;
//! there is no connection to maintain.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;
use url::Url;

use crate::client::ClientConfig;
use crate::error::{Error, Result};
use crate::protocol::{Request, Response};

use super::OneShot;

// ============================================================================
// HttpTransport
// ============================================================================

/// Posts JSON-RPC requests to one endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// Pooled HTTP client.
    client: reqwest::Client,
    /// Endpoint URL, `http://host:port{path}`.
    url: Url,
}

impl HttpTransport {
    /// Creates a transport for the configured endpoint.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL cannot be formed
    /// - [`Error::Http`] if the HTTP client cannot be built
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.call_timeout)
            .build()?;

        Ok(Self {
            client,
            url: config.endpoint_url("http")?,
        })
    }

    /// Returns the endpoint URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl OneShot for HttpTransport {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let request = Request::new(method, params);
        let request_id = request.id;

        let response = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: Response = response.json().await?;
        if let Some(id) = body.id
            && id != request_id
        {
            return Err(Error::protocol(format!(
                "response id {id} does not match request {request_id}"
            )));
        }

        trace!(%request_id, "HTTP call completed");
        body.into_result()
    }
}

// ============================================================================
// Tests
// ============================================================================
