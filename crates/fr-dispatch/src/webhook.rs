//! Webhook channel
//!
//! POSTs the composed notification as JSON to each webhook recipient. Any
//! HTTP response counts as delivered, including 4xx/5xx: the receiver got the
//! payload and its status handling is its own concern. Only transport-level
//! failures (connect, DNS, timeout) fail the dispatch.

use std::time::Duration;

use fr_common::DeliveryJob;
use serde::Serialize;
use tracing::{debug, info};

use crate::DispatchError;

pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(2);

/// Wire payload posted to webhook receivers. The field set is a stable
/// contract: exactly these four keys, `reply_to` and `from` nullable.
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    pub subject: &'a str,
    pub body: &'a str,
    pub reply_to: Option<&'a str>,
    pub from: Option<&'a str>,
}

pub struct WebhookChannel {
    client: reqwest::Client,
    timeout: Duration,
}

impl WebhookChannel {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    pub async fn post(
        &self,
        url: &str,
        job: &DeliveryJob,
        from: Option<String>,
    ) -> Result<(), DispatchError> {
        let payload = WebhookPayload {
            subject: &job.subject,
            body: &job.body,
            reply_to: job.reply_to.as_deref(),
            from: from.as_deref(),
        };

        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DispatchError::Transport(format!("Webhook POST failed: {e}")))?;

        debug!(url = %url, status = %response.status(), "Webhook response received");
        info!(url = %url, subject = %job.subject, "Webhook delivered");
        Ok(())
    }
}

impl Default for WebhookChannel {
    fn default() -> Self {
        Self::new(DEFAULT_WEBHOOK_TIMEOUT)
    }
}
