//! Outbound merchant callbacks.

use std::time::Duration;

use algopay::dispatch::{CallbackSender, WebhookPayload};
use algopay::error::DeliveryError;
use async_trait::async_trait;
use http::header::CONTENT_TYPE;
use reqwest::Client;
use url::Url;

/// Delivers [`WebhookPayload`]s with a single JSON `POST`.
///
/// Any 2xx answer is success. There is no retry.
#[derive(Clone, Debug)]
pub struct WebhookClient {
    /// Shared Reqwest HTTP client
    client: Client,
    /// Per-delivery timeout
    timeout: Duration,
}

impl Default for WebhookClient {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookClient {
    /// Default per-delivery timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a client with [`Self::DEFAULT_TIMEOUT`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Sets the per-delivery timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the per-delivery timeout.
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl CallbackSender for WebhookClient {
    async fn deliver(&self, target: &Url, payload: &WebhookPayload) -> Result<(), DeliveryError> {
        let body = serde_json::to_vec(payload)?;
        let response = self
            .client
            .post(target.clone())
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.timeout)
            .body(body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(Box::new(e)))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Status {
                status: status.as_u16(),
            })
        }
    }
}
