use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod logging;

// ============================================================================
// Submission Types
// ============================================================================

/// A contact-form submission after trimming.
///
/// Field ceilings are enforced by the admission layer before a submission is
/// constructed; this type carries whatever survived validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Submission {
    pub name: String,
    pub email: String,
    pub message: String,
}

/// A stored submission as returned by the contacts listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSubmission {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Delivery Types
// ============================================================================

/// One unit of queued notification work.
///
/// The recipient list is non-empty at enqueue time and may mix email
/// addresses and webhook URLs. `attempts` starts at 0 and is incremented by
/// the worker on each dispatch failure; it is the sole retry-decision input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryJob {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub reply_to: Option<String>,
    pub from_override: Option<String>,
    #[serde(default)]
    pub attempts: u32,
}

impl DeliveryJob {
    pub fn new(recipients: Vec<String>, subject: String, body: String) -> Self {
        Self {
            recipients,
            subject,
            body,
            reply_to: None,
            from_override: None,
            attempts: 0,
        }
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn with_from_override(mut self, from_override: impl Into<String>) -> Self {
        self.from_override = Some(from_override.into());
        self
    }
}

/// Result of a dispatch attempt, consumed by the worker's retry state machine.
///
/// Expected transient failures (transport errors, timeouts) are `Failed` with
/// `retryable: true`; hard configuration errors (no sender configured, no
/// recipients) are `Failed` with `retryable: false` and skip the retry ladder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    Failed { reason: String, retryable: bool },
}

impl DispatchOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
            retryable: true,
        }
    }

    pub fn failed_permanent(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
            retryable: false,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered)
    }
}

// ============================================================================
// Audit Types
// ============================================================================

/// Delivery-relevant occurrences recorded through the audit sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Sent,
    Retry,
    PermanentFailure,
    ComposeFailure,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::Sent => "sent",
            AuditEventType::Retry => "retry",
            AuditEventType::PermanentFailure => "permanent_failure",
            AuditEventType::ComposeFailure => "compose_failure",
        }
    }
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of a delivery-related occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, details: serde_json::Value) -> Self {
        Self {
            event_type,
            details,
            created_at: Utc::now(),
        }
    }
}

/// Write-only side channel for audit events.
///
/// Implementations must swallow their own errors: a failing sink never
/// impacts the delivery flow. The core never reads audit history back.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event_type: AuditEventType, details: serde_json::Value);
}

/// Sink that drops every event. Useful when auditing is not wired up.
pub struct NoOpAuditSink;

#[async_trait]
impl AuditSink for NoOpAuditSink {
    async fn record(&self, _event_type: AuditEventType, _details: serde_json::Value) {}
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum FormRelayError {
    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Shutdown in progress")]
    ShutdownInProgress,
}

pub type Result<T> = std::result::Result<T, FormRelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_builder_defaults() {
        let job = DeliveryJob::new(
            vec!["ops@example.com".to_string()],
            "subject".to_string(),
            "body".to_string(),
        );
        assert_eq!(job.attempts, 0);
        assert!(job.reply_to.is_none());
        assert!(job.from_override.is_none());
    }

    #[test]
    fn test_audit_event_type_names() {
        assert_eq!(AuditEventType::Sent.as_str(), "sent");
        assert_eq!(AuditEventType::Retry.as_str(), "retry");
        assert_eq!(AuditEventType::PermanentFailure.as_str(), "permanent_failure");
        assert_eq!(AuditEventType::ComposeFailure.as_str(), "compose_failure");
    }

    #[test]
    fn test_dispatch_outcome_retryability() {
        assert!(DispatchOutcome::Delivered.is_delivered());
        match DispatchOutcome::failed("connection refused") {
            DispatchOutcome::Failed { retryable, .. } => assert!(retryable),
            DispatchOutcome::Delivered => unreachable!(),
        }
        match DispatchOutcome::failed_permanent("sender not configured") {
            DispatchOutcome::Failed { retryable, .. } => assert!(!retryable),
            DispatchOutcome::Delivered => unreachable!(),
        }
    }
}
