//! SMTP email channel
//!
//! Sends one message per job to all email recipients. When no SMTP host is
//! configured the channel degrades to a development fallback that emits the
//! message to the log instead of the wire, which keeps local setups working
//! without a relay.

use fr_common::DeliveryJob;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

use crate::DispatchError;

/// SMTP relay settings.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    /// Relay hostname. None selects the development fallback.
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Use STARTTLS on the relay connection.
    pub use_tls: bool,
    /// Default sender address. Required for actual SMTP delivery.
    pub mail_from: Option<String>,
    /// Permit jobs to override the sender address.
    pub allow_from_override: bool,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: None,
            port: 587,
            username: None,
            password: None,
            use_tls: true,
            mail_from: None,
            allow_from_override: false,
        }
    }
}

pub struct EmailChannel {
    settings: SmtpSettings,
}

impl EmailChannel {
    pub fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }

    /// Resolve the sender address for a job. A job-level override wins only
    /// when overrides are enabled; otherwise the configured default applies.
    pub fn effective_from(&self, job: &DeliveryJob) -> Option<String> {
        if self.settings.allow_from_override {
            if let Some(ref from) = job.from_override {
                return Some(from.clone());
            }
        }
        self.settings.mail_from.clone()
    }

    pub async fn send(
        &self,
        job: &DeliveryJob,
        recipients: &[String],
    ) -> Result<(), DispatchError> {
        let from = self
            .effective_from(job)
            .ok_or_else(|| DispatchError::Config("No sender address configured".to_string()))?;

        let Some(ref host) = self.settings.host else {
            // Development fallback: no relay configured, surface the message
            // in the log and report success.
            info!(
                from = %from,
                to = %recipients.join(", "),
                reply_to = job.reply_to.as_deref().unwrap_or("-"),
                subject = %job.subject,
                body = %job.body,
                "SMTP not configured, emitting email to log"
            );
            return Ok(());
        };

        let mut builder = Message::builder()
            .from(
                from.parse()
                    .map_err(|e| DispatchError::Config(format!("Invalid sender address: {e}")))?,
            )
            .subject(job.subject.clone())
            .header(ContentType::TEXT_PLAIN);

        if let Some(ref reply_to) = job.reply_to {
            match reply_to.parse() {
                Ok(mailbox) => builder = builder.reply_to(mailbox),
                Err(e) => warn!(reply_to = %reply_to, error = %e, "Skipping unparseable Reply-To"),
            }
        }

        for recipient in recipients {
            builder = builder.to(recipient.parse().map_err(|e| {
                DispatchError::Config(format!("Invalid recipient address '{recipient}': {e}"))
            })?);
        }

        let message = builder
            .body(job.body.clone())
            .map_err(|e| DispatchError::Config(format!("Failed to build message: {e}")))?;

        let transport_builder = if self.settings.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| DispatchError::Config(format!("Invalid SMTP relay: {e}")))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };

        let mut transport_builder = transport_builder.port(self.settings.port);
        if let (Some(user), Some(pass)) = (&self.settings.username, &self.settings.password) {
            transport_builder =
                transport_builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        let transport = transport_builder.build();

        transport
            .send(message)
            .await
            .map_err(|e| DispatchError::Transport(format!("SMTP send failed: {e}")))?;

        info!(to = %recipients.join(", "), subject = %job.subject, "Email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> DeliveryJob {
        DeliveryJob::new(
            vec!["ops@example.com".to_string()],
            "Subject".to_string(),
            "Body".to_string(),
        )
    }

    #[test]
    fn test_effective_from_prefers_override_when_allowed() {
        let channel = EmailChannel::new(SmtpSettings {
            mail_from: Some("relay@example.com".to_string()),
            allow_from_override: true,
            ..Default::default()
        });
        let job = job().with_from_override("custom@example.com".to_string());
        assert_eq!(
            channel.effective_from(&job).as_deref(),
            Some("custom@example.com")
        );
    }

    #[test]
    fn test_effective_from_ignores_override_when_disabled() {
        let channel = EmailChannel::new(SmtpSettings {
            mail_from: Some("relay@example.com".to_string()),
            allow_from_override: false,
            ..Default::default()
        });
        let job = job().with_from_override("custom@example.com".to_string());
        assert_eq!(
            channel.effective_from(&job).as_deref(),
            Some("relay@example.com")
        );
    }

    #[tokio::test]
    async fn test_dev_fallback_delivers_without_relay() {
        let channel = EmailChannel::new(SmtpSettings {
            mail_from: Some("relay@example.com".to_string()),
            ..Default::default()
        });
        let recipients = vec!["ops@example.com".to_string()];
        assert!(channel.send(&job(), &recipients).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_sender_is_permanent() {
        let channel = EmailChannel::new(SmtpSettings::default());
        let recipients = vec!["ops@example.com".to_string()];
        let err = channel.send(&job(), &recipients).await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
