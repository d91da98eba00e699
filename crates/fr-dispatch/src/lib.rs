//! Dispatch Channel Router
//!
//! Classifies each recipient of a delivery job as an email address or a
//! webhook URL and sends over the matching transport. A job mixing both
//! kinds attempts both paths; a failure in either reports the whole job as
//! failed, which hands it to the worker's retry policy. Duplicate delivery
//! to the already-successful channel on retry is the documented at-least-once
//! tradeoff.

use std::sync::Arc;

use async_trait::async_trait;
use fr_common::{DeliveryJob, DispatchOutcome};
use tracing::{debug, warn};

pub mod email;
pub mod webhook;

pub use email::{EmailChannel, SmtpSettings};
pub use webhook::{WebhookChannel, WebhookPayload};

/// A classified delivery target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientKind {
    Email,
    Webhook,
}

/// Classify a recipient string.
///
/// Pure function: anything starting with `http://` or `https://` is a
/// webhook; everything else is treated as an email address, matching the
/// lenient legacy input (any string containing `@` without a `/`).
pub fn classify_recipient(recipient: &str) -> RecipientKind {
    if recipient.starts_with("http://") || recipient.starts_with("https://") {
        RecipientKind::Webhook
    } else {
        RecipientKind::Email
    }
}

/// Errors raised by an individual dispatch path.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Hard configuration problem. Retrying cannot help.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transient transport failure. Eligible for retry.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl DispatchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::Transport(_))
    }
}

/// Trait for dispatching a delivery job. The worker consumes the outcome.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, job: &DeliveryJob) -> DispatchOutcome;
}

/// Router that sends email recipients over SMTP (or the dev fallback) and
/// webhook recipients over HTTP POST.
pub struct ChannelRouter {
    email: Arc<EmailChannel>,
    webhook: Arc<WebhookChannel>,
}

impl ChannelRouter {
    pub fn new(email: EmailChannel, webhook: WebhookChannel) -> Self {
        Self {
            email: Arc::new(email),
            webhook: Arc::new(webhook),
        }
    }
}

#[async_trait]
impl Dispatcher for ChannelRouter {
    async fn dispatch(&self, job: &DeliveryJob) -> DispatchOutcome {
        let mut email_recipients = Vec::new();
        let mut webhook_recipients = Vec::new();
        for recipient in &job.recipients {
            let recipient = recipient.trim();
            if recipient.is_empty() {
                continue;
            }
            match classify_recipient(recipient) {
                RecipientKind::Email => email_recipients.push(recipient.to_string()),
                RecipientKind::Webhook => webhook_recipients.push(recipient.to_string()),
            }
        }

        if email_recipients.is_empty() && webhook_recipients.is_empty() {
            return DispatchOutcome::failed_permanent("No recipients specified");
        }

        let mut failures: Vec<DispatchError> = Vec::new();

        if !email_recipients.is_empty() {
            if let Err(e) = self.email.send(job, &email_recipients).await {
                warn!(error = %e, recipients = email_recipients.len(), "Email path failed");
                failures.push(e);
            }
        }

        for url in &webhook_recipients {
            if let Err(e) = self.webhook.post(url, job, self.email.effective_from(job)).await {
                warn!(error = %e, url = %url, "Webhook path failed");
                failures.push(e);
            }
        }

        if failures.is_empty() {
            debug!(
                email_recipients = email_recipients.len(),
                webhook_recipients = webhook_recipients.len(),
                "Job dispatched"
            );
            return DispatchOutcome::Delivered;
        }

        let retryable = failures.iter().any(DispatchError::is_retryable);
        let reason = failures
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        DispatchOutcome::Failed { reason, retryable }
    }
}
