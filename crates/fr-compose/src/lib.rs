//! Notification Composer
//!
//! Produces a (subject, body) pair from a submission. When a generative
//! endpoint is configured the composer asks it to draft the notification,
//! under a strict timeout and a strict response-shape requirement; any
//! failure falls back to a deterministic template. `compose` is total: it
//! never fails the caller.

use std::sync::Arc;
use std::time::Duration;

use fr_common::{AuditEventType, AuditSink, Submission};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

/// Composer configuration
#[derive(Debug, Clone)]
pub struct ComposerConfig {
    /// Chat-completions endpoint. None disables the generative path entirely.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

/// A composed notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composed {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    response_format: serde_json::Value,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Strict shape required from the generative response content.
#[derive(Debug, Deserialize)]
struct DraftedNotification {
    subject: String,
    body: String,
}

/// Composes notification subject/body pairs from submissions.
pub struct Composer {
    config: ComposerConfig,
    client: reqwest::Client,
    audit: Arc<dyn AuditSink>,
}

impl Composer {
    pub fn new(config: ComposerConfig, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            audit,
        }
    }

    /// Compose a notification for a submission. Total: always returns a pair.
    pub async fn compose(&self, submission: &Submission) -> Composed {
        let Some(endpoint) = self.config.endpoint.clone() else {
            return fallback_compose(submission);
        };

        match self.compose_generative(&endpoint, submission).await {
            Ok(composed) => {
                debug!(subject = %composed.subject, "Generative compose succeeded");
                composed
            }
            Err(reason) => {
                warn!(error = %reason, "Generative compose failed, using fallback");
                self.audit
                    .record(
                        AuditEventType::ComposeFailure,
                        json!({ "error": reason }),
                    )
                    .await;
                fallback_compose(submission)
            }
        }
    }

    async fn compose_generative(
        &self,
        endpoint: &str,
        submission: &Submission,
    ) -> std::result::Result<Composed, String> {
        let prompt = format!(
            "You are an assistant that formats a professional email subject and body from form input.\n\
             Return ONLY JSON with keys: subject, body. Keep body concise and clear.\n\n\
             Form Input:\n{}\n",
            serde_json::to_string_pretty(submission).map_err(|e| e.to_string())?
        );

        let request = ChatRequest {
            model: &self.config.model,
            response_format: json!({ "type": "json_object" }),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You format emails and respond in strict JSON.".to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.2,
        };

        let mut builder = self
            .client
            .post(endpoint)
            .timeout(self.config.timeout)
            .json(&request);
        if let Some(ref key) = self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("composer endpoint returned HTTP {status}"));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| e.to_string())?;
        let content = chat
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .ok_or_else(|| "response has no message content".to_string())?;

        let drafted: DraftedNotification = serde_json::from_str(content)
            .map_err(|e| format!("malformed draft content: {e}"))?;

        let subject = drafted.subject.trim();
        let body = drafted.body.trim();
        if subject.is_empty() || body.is_empty() {
            return Err("draft subject or body is empty".to_string());
        }

        Ok(Composed {
            subject: subject.to_string(),
            body: body.to_string(),
        })
    }
}

/// Deterministic fallback template. Pure and side-effect-free.
pub fn fallback_compose(submission: &Submission) -> Composed {
    let name = non_empty_or(&submission.name, "Someone");
    let email = non_empty_or(&submission.email, "unknown@example.com");
    let message = non_empty_or(&submission.message, "(no message)");

    let subject = format!("New contact from {name}");
    let body = format!(
        "You received a new contact submission.\n\n\
         Name: {name}\n\
         Email: {email}\n\n\
         Message:\n{message}\n"
    );

    Composed { subject, body }
}

fn non_empty_or<'a>(value: &'a str, default: &'a str) -> &'a str {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        default
    } else {
        trimmed
    }
}
