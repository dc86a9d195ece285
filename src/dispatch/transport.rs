//! HTTP transport seam. The dispatch engine only sees [`Transport`].

use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;

use crate::config::RelayConfig;
use crate::dispatch::DispatchRequest;
use crate::error::DispatchError;

/// Sends one prepared request and reports the response status.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform a single attempt. Any HTTP status is `Ok`; only failures to
    /// get a response are errors.
    async fn send(&self, request: &DispatchRequest) -> Result<u16, DispatchError>;
}

/// [`Transport`] backed by a shared `reqwest::Client`.
pub struct ReqwestTransport {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl ReqwestTransport {
    /// Client with the configured timeout and user agent.
    pub fn new(config: &RelayConfig) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| DispatchError::InvalidRequest(e.to_string()))?;
        Ok(Self {
            client,
            default_timeout: config.http_timeout,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &DispatchRequest) -> Result<u16, DispatchError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .body(request.body.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        // Header problems surface here, before anything goes on the wire.
        let prepared = builder
            .build()
            .map_err(|e| DispatchError::InvalidRequest(e.to_string()))?;

        let response = self.client.execute(prepared).await.map_err(|e| {
            if e.is_timeout() {
                DispatchError::Timeout(request.timeout.unwrap_or(self.default_timeout))
            } else {
                DispatchError::Transport(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        trace!(url = %request.url, status, "Webhook responded");
        Ok(status)
    }
}
